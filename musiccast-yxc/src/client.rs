//! HTTP client for the Yamaha Extended Control REST API.
//!
//! Every endpoint is a GET under `/YamahaExtendedControl/v1` (search-string
//! entry excepted, which POSTs a JSON body). Responses carry a
//! `response_code` envelope field; zero means success and the field is
//! stripped before results reach callers, any other value maps to a
//! [`YxcError`] kind.

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::error::{Result, YxcError};
use crate::models::{DeviceInfo, Features, NetworkStatus, PlayInfo, ZoneStatus};

const BASE_PATH: &str = "/YamahaExtendedControl/v1";

/// Application name sent when enrolling for unicast events.
pub const EVENT_APP_NAME: &str = "MusicCast/1.50";

/// Default UDP port unicast events are delivered to.
pub const EVENT_PORT: u16 = 41100;

/// Server-side lifetime of a unicast event enrollment, in seconds.
pub const SUBSCRIPTION_TIMEOUT_SECS: u64 = 180;

/// A zone on a multi-zone device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Zone {
    #[default]
    Main,
    Zone2,
    Zone3,
    Zone4,
}

impl Zone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Main => "main",
            Zone::Zone2 => "zone2",
            Zone::Zone3 => "zone3",
            Zone::Zone4 => "zone4",
        }
    }

    /// Parse a zone name as it appears in event payloads.
    pub fn from_name(name: &str) -> Option<Zone> {
        match name {
            "main" => Some(Zone::Main),
            "zone2" => Some(Zone::Zone2),
            "zone3" => Some(Zone::Zone3),
            "zone4" => Some(Zone::Zone4),
            _ => None,
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Power target for `setPower`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Power {
    On,
    Standby,
    Toggle,
}

impl Power {
    fn as_str(&self) -> &'static str {
        match self {
            Power::On => "on",
            Power::Standby => "standby",
            Power::Toggle => "toggle",
        }
    }
}

/// Transport verbs accepted by the netusb and CD `setPlayback` endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackCommand {
    Play,
    Pause,
    Stop,
    Next,
    Previous,
    PlayPause,
}

impl PlaybackCommand {
    fn as_str(&self) -> &'static str {
        match self {
            PlaybackCommand::Play => "play",
            PlaybackCommand::Pause => "pause",
            PlaybackCommand::Stop => "stop",
            PlaybackCommand::Next => "next",
            PlaybackCommand::Previous => "previous",
            PlaybackCommand::PlayPause => "play_pause",
        }
    }
}

/// Volume argument for `setVolume`.
///
/// The `step` parameter goes on the wire only for the relative forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeChange {
    Level(i64),
    Up(u32),
    Down(u32),
}

/// Client for one LAN's worth of MusicCast devices.
///
/// The client is stateless; every method takes the target host. Cloning
/// shares the underlying connection pool.
#[derive(Debug, Clone)]
pub struct YxcClient {
    http: reqwest::Client,
    event_port: u16,
}

impl YxcClient {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .build()
            .expect("default reqwest client");
        Self {
            http,
            event_port: EVENT_PORT,
        }
    }

    pub fn with_http(http: reqwest::Client) -> Self {
        Self {
            http,
            event_port: EVENT_PORT,
        }
    }

    /// Override the advertised unicast event port (testing).
    pub fn with_event_port(mut self, port: u16) -> Self {
        self.event_port = port;
        self
    }

    fn url(&self, host: &str, path: &str) -> String {
        format!("http://{}{}{}", host, BASE_PATH, path)
    }

    async fn get_value(
        &self,
        host: &str,
        path: &str,
        query: &[(&str, String)],
        enroll: bool,
    ) -> Result<Value> {
        let mut request = self.http.get(self.url(host, path));
        if !query.is_empty() {
            request = request.query(query);
        }
        if enroll {
            request = request
                .header("X-AppName", EVENT_APP_NAME)
                .header("X-AppPort", self.event_port.to_string());
        }
        self.finish(request).await
    }

    async fn get_unit(&self, host: &str, path: &str, query: &[(&str, String)]) -> Result<()> {
        self.get_value(host, path, query, false).await.map(|_| ())
    }

    async fn finish(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(YxcError::Transport(format!("HTTP {}", status)));
        }

        let mut value: Value = response
            .json()
            .await
            .map_err(|e| YxcError::InvalidResponse(e.to_string()))?;
        let object = value
            .as_object_mut()
            .ok_or_else(|| YxcError::InvalidResponse("body is not a JSON object".to_string()))?;

        let code = object
            .remove("response_code")
            .and_then(|c| c.as_i64())
            .ok_or_else(|| YxcError::InvalidResponse("missing response_code".to_string()))?;

        if code == 0 {
            Ok(value)
        } else {
            tracing::debug!(response_code = code, "YXC request failed");
            Err(YxcError::from_response_code(code))
        }
    }

    fn typed<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
        serde_json::from_value(value).map_err(|e| YxcError::InvalidResponse(e.to_string()))
    }

    // ---- system ----------------------------------------------------------

    /// `getDeviceInfo`. With `enroll` set, the request carries the
    /// `X-AppName`/`X-AppPort` headers that register this process for
    /// unicast events.
    pub async fn get_device_info(&self, host: &str, enroll: bool) -> Result<DeviceInfo> {
        Self::typed(
            self.get_value(host, "/system/getDeviceInfo", &[], enroll)
                .await?,
        )
    }

    pub async fn get_features(&self, host: &str) -> Result<Features> {
        Self::typed(self.get_value(host, "/system/getFeatures", &[], false).await?)
    }

    pub async fn get_network_status(&self, host: &str) -> Result<NetworkStatus> {
        Self::typed(
            self.get_value(host, "/system/getNetworkStatus", &[], false)
                .await?,
        )
    }

    pub async fn get_func_status(&self, host: &str) -> Result<Value> {
        self.get_value(host, "/system/getFuncStatus", &[], false).await
    }

    pub async fn get_location_info(&self, host: &str) -> Result<Value> {
        self.get_value(host, "/system/getLocationInfo", &[], false)
            .await
    }

    pub async fn set_auto_power_standby(&self, host: &str, enable: bool) -> Result<()> {
        self.get_unit(
            host,
            "/system/setAutoPowerStandby",
            &[("enable", enable.to_string())],
        )
        .await
    }

    pub async fn send_ir_code(&self, host: &str, code: &str) -> Result<()> {
        self.get_unit(host, "/system/sendIrCode", &[("code", code.to_string())])
            .await
    }

    // ---- zone ------------------------------------------------------------

    /// Per-zone `getStatus`. With `enroll` set this also refreshes the
    /// unicast event enrollment.
    pub async fn get_status(&self, host: &str, zone: Zone, enroll: bool) -> Result<ZoneStatus> {
        Self::typed(
            self.get_value(host, &format!("/{}/getStatus", zone), &[], enroll)
                .await?,
        )
    }

    pub async fn set_power(&self, host: &str, zone: Zone, power: Power) -> Result<()> {
        self.get_unit(
            host,
            &format!("/{}/setPower", zone),
            &[("power", power.as_str().to_string())],
        )
        .await
    }

    pub async fn set_sleep(&self, host: &str, zone: Zone, sleep: u32) -> Result<()> {
        self.get_unit(
            host,
            &format!("/{}/setSleep", zone),
            &[("sleep", sleep.to_string())],
        )
        .await
    }

    /// `setVolume`. The `step` parameter is included only for the relative
    /// `up`/`down` forms.
    pub async fn set_volume(&self, host: &str, zone: Zone, volume: VolumeChange) -> Result<()> {
        let query = match volume {
            VolumeChange::Level(level) => vec![("volume", level.to_string())],
            VolumeChange::Up(step) => {
                vec![("volume", "up".to_string()), ("step", step.to_string())]
            }
            VolumeChange::Down(step) => {
                vec![("volume", "down".to_string()), ("step", step.to_string())]
            }
        };
        self.get_unit(host, &format!("/{}/setVolume", zone), &query)
            .await
    }

    pub async fn set_mute(&self, host: &str, zone: Zone, enable: bool) -> Result<()> {
        self.get_unit(
            host,
            &format!("/{}/setMute", zone),
            &[("enable", enable.to_string())],
        )
        .await
    }

    pub async fn set_input(&self, host: &str, zone: Zone, input: &str) -> Result<()> {
        self.get_unit(
            host,
            &format!("/{}/setInput", zone),
            &[("input", input.to_string())],
        )
        .await
    }

    pub async fn set_sound_program(&self, host: &str, zone: Zone, program: &str) -> Result<()> {
        self.get_unit(
            host,
            &format!("/{}/setSoundProgram", zone),
            &[("program", program.to_string())],
        )
        .await
    }

    pub async fn prepare_input_change(&self, host: &str, zone: Zone, input: &str) -> Result<()> {
        self.get_unit(
            host,
            &format!("/{}/prepareInputChange", zone),
            &[("input", input.to_string())],
        )
        .await
    }

    // ---- tuner -----------------------------------------------------------

    pub async fn tuner_get_preset_info(&self, host: &str, band: &str) -> Result<Value> {
        self.get_value(
            host,
            "/tuner/getPresetInfo",
            &[("band", band.to_string())],
            false,
        )
        .await
    }

    pub async fn tuner_get_play_info(&self, host: &str) -> Result<Value> {
        self.get_value(host, "/tuner/getPlayInfo", &[], false).await
    }

    pub async fn tuner_recall_preset(
        &self,
        host: &str,
        zone: Zone,
        band: &str,
        num: u32,
    ) -> Result<()> {
        self.get_unit(
            host,
            "/tuner/recallPreset",
            &[
                ("zone", zone.to_string()),
                ("band", band.to_string()),
                ("num", num.to_string()),
            ],
        )
        .await
    }

    pub async fn tuner_store_preset(&self, host: &str, num: u32) -> Result<()> {
        self.get_unit(host, "/tuner/storePreset", &[("num", num.to_string())])
            .await
    }

    pub async fn tuner_switch_preset(&self, host: &str, dir: &str) -> Result<()> {
        self.get_unit(host, "/tuner/switchPreset", &[("dir", dir.to_string())])
            .await
    }

    pub async fn tuner_set_dab_service(&self, host: &str, dir: &str) -> Result<()> {
        self.get_unit(host, "/tuner/setDabService", &[("dir", dir.to_string())])
            .await
    }

    // ---- netusb ----------------------------------------------------------

    pub async fn netusb_get_preset_info(&self, host: &str) -> Result<Value> {
        self.get_value(host, "/netusb/getPresetInfo", &[], false).await
    }

    pub async fn netusb_get_play_info(&self, host: &str) -> Result<PlayInfo> {
        Self::typed(self.get_value(host, "/netusb/getPlayInfo", &[], false).await?)
    }

    pub async fn netusb_set_playback(&self, host: &str, playback: PlaybackCommand) -> Result<()> {
        self.get_unit(
            host,
            "/netusb/setPlayback",
            &[("playback", playback.as_str().to_string())],
        )
        .await
    }

    pub async fn netusb_toggle_repeat(&self, host: &str) -> Result<()> {
        self.get_unit(host, "/netusb/toggleRepeat", &[]).await
    }

    pub async fn netusb_toggle_shuffle(&self, host: &str) -> Result<()> {
        self.get_unit(host, "/netusb/toggleShuffle", &[]).await
    }

    /// `getListInfo`. `index` defaults to 0 and `size` to 8 when not given.
    pub async fn netusb_get_list_info(
        &self,
        host: &str,
        input: &str,
        index: Option<u32>,
        size: Option<u32>,
    ) -> Result<Value> {
        self.get_value(
            host,
            "/netusb/getListInfo",
            &[
                ("input", input.to_string()),
                ("index", index.unwrap_or(0).to_string()),
                ("size", size.unwrap_or(8).to_string()),
            ],
            false,
        )
        .await
    }

    pub async fn netusb_set_list_control(
        &self,
        host: &str,
        control: &str,
        index: Option<u32>,
        zone: Zone,
    ) -> Result<()> {
        let mut query = vec![("type", control.to_string()), ("zone", zone.to_string())];
        if let Some(index) = index {
            query.push(("index", index.to_string()));
        }
        self.get_unit(host, "/netusb/setListControl", &query).await
    }

    /// `setSearchString` is the one POST endpoint; the search text rides in
    /// a JSON body.
    pub async fn netusb_set_search_string(&self, host: &str, text: &str) -> Result<()> {
        let request = self
            .http
            .post(self.url(host, "/netusb/setSearchString"))
            .json(&serde_json::json!({ "string": text }));
        self.finish(request).await.map(|_| ())
    }

    pub async fn netusb_recall_preset(&self, host: &str, zone: Zone, num: u32) -> Result<()> {
        self.get_unit(
            host,
            "/netusb/recallPreset",
            &[("zone", zone.to_string()), ("num", num.to_string())],
        )
        .await
    }

    pub async fn netusb_store_preset(&self, host: &str, num: u32) -> Result<()> {
        self.get_unit(host, "/netusb/storePreset", &[("num", num.to_string())])
            .await
    }

    pub async fn netusb_get_account_status(&self, host: &str) -> Result<Value> {
        self.get_value(host, "/netusb/getAccountStatus", &[], false)
            .await
    }

    pub async fn netusb_switch_account(&self, host: &str, input: &str, index: u32) -> Result<()> {
        self.get_unit(
            host,
            "/netusb/switchAccount",
            &[("input", input.to_string()), ("index", index.to_string())],
        )
        .await
    }

    pub async fn netusb_get_service_info(
        &self,
        host: &str,
        input: &str,
        kind: &str,
    ) -> Result<Value> {
        self.get_value(
            host,
            "/netusb/getServiceInfo",
            &[("input", input.to_string()), ("type", kind.to_string())],
            false,
        )
        .await
    }

    // ---- cd --------------------------------------------------------------

    pub async fn cd_get_play_info(&self, host: &str) -> Result<Value> {
        self.get_value(host, "/cd/getPlayInfo", &[], false).await
    }

    pub async fn cd_set_playback(&self, host: &str, playback: PlaybackCommand) -> Result<()> {
        self.get_unit(
            host,
            "/cd/setPlayback",
            &[("playback", playback.as_str().to_string())],
        )
        .await
    }

    pub async fn cd_toggle_tray(&self, host: &str) -> Result<()> {
        self.get_unit(host, "/cd/toggleTray", &[]).await
    }

    pub async fn cd_toggle_repeat(&self, host: &str) -> Result<()> {
        self.get_unit(host, "/cd/toggleRepeat", &[]).await
    }

    pub async fn cd_toggle_shuffle(&self, host: &str) -> Result<()> {
        self.get_unit(host, "/cd/toggleShuffle", &[]).await
    }
}

impl Default for YxcClient {
    fn default() -> Self {
        Self::new()
    }
}
