//! Typed models for Yamaha Extended Control responses.
//!
//! Devices vary wildly in which fields they report, so every known field is
//! optional and unknown keys are preserved in a flattened `extras` map. The
//! full shape (known fields included as nulls) is what downstream merging and
//! diffing operate on.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `getDeviceInfo` response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub device_id: String,
    pub model_name: Option<String>,
    pub device_type: Option<String>,
    pub system_version: Option<Value>,
    pub api_version: Option<Value>,
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

/// `getNetworkStatus` response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkStatus {
    #[serde(default)]
    pub network_name: String,
    pub connection: Option<String>,
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

/// `getFeatures` response, reduced to the parts the control plane reads.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Features {
    #[serde(default)]
    pub system: FeatureSystem,
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureSystem {
    #[serde(default)]
    pub input_list: Vec<FeatureInput>,
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureInput {
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

impl Features {
    /// The ordered input identifiers the device supports.
    pub fn input_ids(&self) -> Vec<String> {
        self.system.input_list.iter().map(|i| i.id.clone()).collect()
    }
}

/// Per-zone `getStatus` response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ZoneStatus {
    pub power: Option<String>,
    pub sleep: Option<i64>,
    pub volume: Option<i64>,
    pub max_volume: Option<i64>,
    pub mute: Option<bool>,
    pub input: Option<String>,
    pub equalizer: Option<Equalizer>,
    pub balance: Option<i64>,
    pub bass_extension: Option<bool>,
    pub direct: Option<bool>,
    pub enhancer: Option<bool>,
    pub link_control: Option<String>,
    pub link_audio_delay: Option<String>,
    pub subwoofer_volume: Option<i64>,
    pub distribution_enable: Option<bool>,
    pub disable_flags: Option<i64>,
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Equalizer {
    pub mode: Option<String>,
    pub low: Option<i64>,
    pub mid: Option<i64>,
    pub high: Option<i64>,
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

/// `netusb getPlayInfo` response (also the shape merged by play events).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayInfo {
    pub input: Option<String>,
    pub playback: Option<String>,
    pub repeat: Option<String>,
    pub shuffle: Option<String>,
    pub play_time: Option<i64>,
    pub total_time: Option<i64>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub track: Option<String>,
    #[serde(default)]
    pub albumart_url: String,
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}
