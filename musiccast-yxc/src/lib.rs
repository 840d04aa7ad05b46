//! Yamaha Extended Control (YXC) REST client.
//!
//! Stateless HTTP/JSON client for MusicCast devices. Covers the system,
//! zone, tuner, netusb and CD endpoint families, maps the `response_code`
//! envelope to typed errors, and handles unicast event enrollment headers.

mod client;
mod error;
mod models;

pub use client::{
    PlaybackCommand, Power, VolumeChange, YxcClient, Zone, EVENT_APP_NAME, EVENT_PORT,
    SUBSCRIPTION_TIMEOUT_SECS,
};
pub use error::{Result, YxcError};
pub use models::{
    DeviceInfo, Equalizer, FeatureInput, FeatureSystem, Features, NetworkStatus, PlayInfo,
    ZoneStatus,
};
