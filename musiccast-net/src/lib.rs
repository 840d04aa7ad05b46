//! Local-network control plane for Yamaha MusicCast devices.
//!
//! Discovers MediaRenderer devices over SSDP, runs one agent task per
//! device that fuses YXC unicast events, UPnP AVTransport notifications and
//! polls into a coherent state model, and publishes structural state deltas
//! over topic-based pub/sub.
//!
//! ```no_run
//! use musiccast_net::{Config, MusicCast, StateDelta, NETWORK_TOPIC};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let system = MusicCast::start(Config::default()).await?;
//!     let mut network = system.subscribe(NETWORK_TOPIC).await;
//!     system.discover().await;
//!
//!     while let Some(delta) = network.recv().await {
//!         if let StateDelta::Online { state } = delta {
//!             println!("device online: {}", state["device_id"]);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod agent;
mod config;
mod diff;
mod discovery;
mod error;
mod ingress;
mod pubsub;
mod registry;
mod state;
mod supervisor;
mod system;

pub use agent::{renewal_interval, AgentHandle, Command, CommandReply, Lookup};
pub use config::{Config, ConfigBuilder};
pub use diff::{apply, diff, merge_existing, strip_nulls};
pub use discovery::{DiscoveryHandle, MEDIA_RENDERER_URN};
pub use error::{ControlError, Result};
pub use ingress::{serve_yxc_events, upnp_callback_filter};
pub use pubsub::{PubSub, StateDelta, Subscription, NETWORK_TOPIC};
pub use registry::{DeviceRegistry, RegistryEntry};
pub use state::{absolutize_albumart, DeviceState, PlaybackQueue, STATE_KEYS};
pub use supervisor::Supervisor;
pub use system::MusicCast;

// The per-device command surface lives on `AgentHandle`; protocol types it
// uses come from the protocol crates.
pub use musiccast_upnp::{Metadata, TrackMetadata};
pub use musiccast_yxc::{Power, VolumeChange, Zone};
