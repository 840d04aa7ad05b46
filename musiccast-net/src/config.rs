//! Process-level configuration.

use musiccast_yxc::EVENT_PORT;

/// Configuration for a [`MusicCast`](crate::MusicCast) instance.
///
/// When `upnp_callback_url` is unset, UPnP eventing is disabled: agents skip
/// the GENA subscription and their `upnp_session_id` stays `None`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Full URL where this process receives UPnP event notifications.
    pub upnp_callback_url: Option<String>,
    /// UDP port unicast YXC events are received on.
    pub yxc_event_port: u16,
    /// Step used for relative volume commands.
    pub volume_step: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upnp_callback_url: None,
            yxc_event_port: EVENT_PORT,
            volume_step: 1,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Enable UPnP eventing, delivered to the given callback URL.
    pub fn upnp_callback_url(mut self, url: impl Into<String>) -> Self {
        self.config.upnp_callback_url = Some(url.into());
        self
    }

    pub fn yxc_event_port(mut self, port: u16) -> Self {
        self.config.yxc_event_port = port;
        self
    }

    pub fn volume_step(mut self, step: u32) -> Self {
        self.config.volume_step = step;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
