//! Top-level control plane assembly.

use std::net::{Ipv4Addr, SocketAddr};

use serde_json::Value;
use tokio::task::JoinHandle;
use url::Url;

use musiccast_soap::SoapClient;
use musiccast_upnp::RootDescription;
use musiccast_yxc::YxcClient;

use crate::agent::{AgentHandle, Lookup};
use crate::config::Config;
use crate::discovery::{self, DiscoveryHandle};
use crate::error::{ControlError, Result};
use crate::ingress;
use crate::pubsub::{PubSub, Subscription};
use crate::registry::DeviceRegistry;
use crate::supervisor::Supervisor;

/// A running control plane for one LAN segment.
///
/// `start` wires the registry, pub/sub, supervisor, SSDP listener, YXC
/// unicast ingress and (when configured) the UPnP callback endpoint, then
/// hands back this facade. All state lives in memory and is rebuilt by
/// discovery after a restart.
pub struct MusicCast {
    registry: DeviceRegistry,
    pubsub: PubSub,
    supervisor: Supervisor,
    discovery: DiscoveryHandle,
    yxc_ingress: JoinHandle<()>,
    callback_server: Option<JoinHandle<()>>,
}

impl MusicCast {
    pub async fn start(config: Config) -> Result<Self> {
        let registry = DeviceRegistry::new();
        let pubsub = PubSub::new();
        let yxc = YxcClient::new().with_event_port(config.yxc_event_port);
        let soap = SoapClient::new();

        let supervisor = Supervisor::new(
            yxc,
            soap,
            registry.clone(),
            pubsub.clone(),
            config.clone(),
        );

        let (_, yxc_ingress) =
            ingress::serve_yxc_events(registry.clone(), config.yxc_event_port).await?;

        let callback_server = match &config.upnp_callback_url {
            Some(url) => {
                let addr = callback_bind_addr(url)?;
                Some(ingress::serve_upnp_callback(registry.clone(), addr))
            }
            None => None,
        };

        let discovery = discovery::spawn(supervisor.clone())?;

        Ok(Self {
            registry,
            pubsub,
            supervisor,
            discovery,
            yxc_ingress,
            callback_server,
        })
    }

    /// Probe the LAN for MediaRenderer devices.
    pub async fn discover(&self) {
        self.discovery.discover().await;
    }

    /// Bring a known device under management without waiting for SSDP.
    pub fn add_device(&self, ip: Ipv4Addr, root: RootDescription) -> AgentHandle {
        self.supervisor.add_device(ip, root)
    }

    /// Subscribe to a topic: `"network"` or a device id.
    pub async fn subscribe(&self, topic: &str) -> Subscription {
        self.pubsub.subscribe(topic).await
    }

    pub async fn unsubscribe(&self, subscription: &Subscription) {
        self.pubsub
            .unsubscribe(subscription.topic(), subscription.id())
            .await;
    }

    /// Handle of the agent owning `device_id`, if any.
    pub async fn whereis(&self, device_id: &str) -> Option<AgentHandle> {
        self.registry.whereis(device_id).await.map(|e| e.handle)
    }

    /// All registered device ids.
    pub async fn which_devices(&self) -> Vec<String> {
        self.registry.device_ids().await
    }

    /// Snapshot the given state keys from every registered device.
    ///
    /// Devices whose agent terminates mid-query are omitted.
    pub async fn which_devices_lookup(
        &self,
        keys: &[&str],
    ) -> Result<std::collections::HashMap<String, Value>> {
        let lookup = Lookup::Keys(keys.iter().map(|k| k.to_string()).collect());
        let mut out = std::collections::HashMap::new();
        for device_id in self.registry.device_ids().await {
            if let Some(handle) = self.whereis(&device_id).await {
                match handle.lookup(lookup.clone()).await {
                    Ok(value) => {
                        out.insert(device_id, value);
                    }
                    Err(ControlError::AgentGone) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(out)
    }

    /// Snapshot part of a device's state.
    pub async fn lookup(&self, device_id: &str, lookup: Lookup) -> Result<Value> {
        let handle = self
            .whereis(device_id)
            .await
            .ok_or_else(|| ControlError::NotFound(device_id.to_string()))?;
        handle.lookup(lookup).await
    }

    /// Stop all agents and background tasks.
    pub async fn shutdown(self) {
        self.supervisor.stop_all().await;
        self.yxc_ingress.abort();
        if let Some(server) = self.callback_server {
            server.abort();
        }
    }
}

fn callback_bind_addr(callback_url: &str) -> Result<SocketAddr> {
    let url = Url::parse(callback_url)
        .map_err(|e| ControlError::Argument(format!("invalid callback URL: {e}")))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| ControlError::Argument("callback URL has no port".to_string()))?;
    Ok(SocketAddr::from(([0, 0, 0, 0], port)))
}
