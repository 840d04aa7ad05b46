//! Dynamic one-for-one supervision of device agents.
//!
//! Agents are transient: they are spawned on demand and never restarted by
//! the supervisor. A dead device is re-admitted by the next SSDP sighting.
//! Registry and pub/sub entries are released by the agent's own exit path.

use std::net::Ipv4Addr;

use musiccast_soap::SoapClient;
use musiccast_upnp::RootDescription;
use musiccast_yxc::YxcClient;

use crate::agent::{self, AgentContext, AgentHandle};
use crate::config::Config;
use crate::pubsub::PubSub;
use crate::registry::DeviceRegistry;

/// Spawns and tracks device agents.
#[derive(Clone)]
pub struct Supervisor {
    ctx: AgentContext,
}

impl Supervisor {
    pub fn new(
        yxc: YxcClient,
        soap: SoapClient,
        registry: DeviceRegistry,
        pubsub: PubSub,
        config: Config,
    ) -> Self {
        Self {
            ctx: AgentContext {
                yxc,
                soap,
                registry,
                pubsub,
                config,
            },
        }
    }

    /// Start one agent for the device at `ip` with its parsed description.
    ///
    /// Returns immediately; initialization runs inside the agent task and a
    /// failure terminates that task without affecting anything else.
    pub fn add_device(&self, ip: Ipv4Addr, root: RootDescription) -> AgentHandle {
        tracing::debug!(ip = %ip, "starting device agent");
        agent::spawn(self.ctx.clone(), ip, root)
    }

    /// Test/support entry: same as [`add_device`](Self::add_device) but with
    /// an explicit host (for devices not on port 80).
    pub fn add_device_with_host(
        &self,
        ip: Ipv4Addr,
        host: String,
        root: RootDescription,
    ) -> AgentHandle {
        agent::spawn_with_host(self.ctx.clone(), ip, host, root)
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.ctx.registry
    }

    pub fn pubsub(&self) -> &PubSub {
        &self.ctx.pubsub
    }

    /// Ask every registered agent to stop and wait for the registry to
    /// drain.
    pub async fn stop_all(&self) {
        let ids = self.ctx.registry.device_ids().await;
        for device_id in ids {
            if let Some(entry) = self.ctx.registry.whereis(&device_id).await {
                entry.handle.stop().await;
            }
        }
    }
}
