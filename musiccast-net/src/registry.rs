//! Unique device registry.
//!
//! Maps each `device_id` to the agent that owns it, plus a secondary index
//! from GENA subscription id to device id so the UPnP callback dispatcher
//! can route notifications. At most one live agent may claim a device id;
//! entries are reclaimed when the owning agent terminates.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::agent::AgentHandle;
use crate::error::{ControlError, Result};

/// One registered device.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub agent_id: u64,
    pub host: Ipv4Addr,
    pub handle: AgentHandle,
}

#[derive(Default)]
struct Inner {
    by_device: HashMap<String, RegistryEntry>,
    by_sid: HashMap<String, String>,
}

/// Process-wide registry of running device agents.
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `device_id` for an agent. Fails with `AlreadyRegistered` when
    /// another agent holds the key.
    pub async fn register(&self, device_id: &str, entry: RegistryEntry) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.by_device.contains_key(device_id) {
            return Err(ControlError::AlreadyRegistered(device_id.to_string()));
        }
        inner.by_device.insert(device_id.to_string(), entry);
        Ok(())
    }

    /// Look up the agent owning `device_id`.
    pub async fn whereis(&self, device_id: &str) -> Option<RegistryEntry> {
        self.inner.read().await.by_device.get(device_id).cloned()
    }

    /// All registered device ids.
    pub async fn device_ids(&self) -> Vec<String> {
        self.inner.read().await.by_device.keys().cloned().collect()
    }

    /// Reverse lookup: the device ids registered by one agent.
    pub async fn keys_of(&self, agent_id: u64) -> Vec<String> {
        self.inner
            .read()
            .await
            .by_device
            .iter()
            .filter(|(_, e)| e.agent_id == agent_id)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Associate a GENA subscription id with a device.
    pub async fn register_sid(&self, sid: &str, device_id: &str) {
        self.inner
            .write()
            .await
            .by_sid
            .insert(sid.to_string(), device_id.to_string());
    }

    pub async fn unregister_sid(&self, sid: &str) {
        self.inner.write().await.by_sid.remove(sid);
    }

    /// Find the agent whose subscription id matches `sid`.
    pub async fn find_by_sid(&self, sid: &str) -> Option<RegistryEntry> {
        let inner = self.inner.read().await;
        let device_id = inner.by_sid.get(sid)?;
        inner.by_device.get(device_id).cloned()
    }

    /// Remove every entry owned by `agent_id` (called from the agent's own
    /// shutdown path).
    pub async fn remove_agent(&self, agent_id: u64) {
        let mut inner = self.inner.write().await;
        let removed: Vec<String> = inner
            .by_device
            .iter()
            .filter(|(_, e)| e.agent_id == agent_id)
            .map(|(k, _)| k.clone())
            .collect();
        for device_id in &removed {
            inner.by_device.remove(device_id);
        }
        inner.by_sid.retain(|_, device| !removed.contains(device));
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_device.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
