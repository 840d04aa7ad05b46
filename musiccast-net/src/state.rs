//! Per-device state model.
//!
//! One [`DeviceState`] is owned and mutated exclusively by the device's
//! agent; everyone else sees JSON snapshots. Snapshots are also what the
//! structural differ runs over after each mutation.

use serde::Serialize;
use serde_json::Value;

use musiccast_upnp::{AvTransportEvent, RootDescription, TrackMetadata};
use musiccast_yxc::{PlayInfo, ZoneStatus};

/// Everything known about one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    pub host: String,
    pub device_id: String,
    pub network_name: String,
    pub available_inputs: Vec<String>,
    pub status: ZoneStatus,
    pub playback: PlayInfo,
    pub upnp_service: RootDescription,
    pub upnp: Option<AvTransportEvent>,
    pub upnp_session_id: Option<String>,
    pub playback_queue: PlaybackQueue,
}

/// Keys a lookup may request from a state snapshot.
pub const STATE_KEYS: &[&str] = &[
    "host",
    "device_id",
    "network_name",
    "available_inputs",
    "status",
    "playback",
    "upnp_service",
    "upnp",
    "upnp_session_id",
    "playback_queue",
];

impl DeviceState {
    /// Serialize the full state to a JSON snapshot.
    ///
    /// Unset optional fields are omitted rather than serialized as null, so
    /// the differ can encode key removal as `null` (see [`crate::diff`]).
    pub fn snapshot(&self) -> Value {
        let mut value = serde_json::to_value(self).expect("device state serializes");
        crate::diff::strip_nulls(&mut value);
        value
    }
}

/// An application-managed playback queue driven over AVTransport.
#[derive(Debug, Clone, PartialEq, Default, Serialize, serde::Deserialize)]
pub struct PlaybackQueue {
    /// The queue item currently loaded on the transport, if any.
    pub media_url: Option<String>,
    /// Ordered `(url, metadata)` pairs.
    pub items: Vec<(String, TrackMetadata)>,
}

impl PlaybackQueue {
    pub fn is_active(&self) -> bool {
        !self.items.is_empty()
    }

    /// Index of `media_url` in the queue, or 0 when unknown.
    fn position(&self) -> usize {
        self.media_url
            .as_ref()
            .and_then(|url| self.items.iter().position(|(u, _)| u == url))
            .unwrap_or(0)
    }

    /// The item after the current one, clamped to the last item.
    pub fn next_item(&self) -> Option<&(String, TrackMetadata)> {
        if self.items.is_empty() {
            return None;
        }
        let index = (self.position() + 1).min(self.items.len() - 1);
        self.items.get(index)
    }

    /// The item before the current one, clamped to the first item.
    pub fn previous_item(&self) -> Option<&(String, TrackMetadata)> {
        if self.items.is_empty() {
            return None;
        }
        let index = self.position().saturating_sub(1);
        self.items.get(index)
    }

    /// A uniformly random item, for shuffle mode.
    pub fn random_item(&self) -> Option<&(String, TrackMetadata)> {
        use rand::Rng;
        if self.items.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..self.items.len());
        self.items.get(index)
    }

    /// The item following `url`, clamped to the last item.
    pub fn item_after(&self, url: &str) -> Option<&(String, TrackMetadata)> {
        if self.items.is_empty() {
            return None;
        }
        let position = self
            .items
            .iter()
            .position(|(u, _)| u == url)
            .unwrap_or(0);
        let index = (position + 1).min(self.items.len() - 1);
        self.items.get(index)
    }
}

/// Rewrite a relative album-art path to `http://<host><path>`.
///
/// Empty stays empty and already-absolute URLs pass through.
pub fn absolutize_albumart(playback: &mut PlayInfo, host: &str) {
    if playback.albumart_url.is_empty() || playback.albumart_url.starts_with("http") {
        return;
    }
    playback.albumart_url = format!("http://{}{}", host, playback.albumart_url);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(urls: &[&str], current: Option<&str>) -> PlaybackQueue {
        PlaybackQueue {
            media_url: current.map(str::to_string),
            items: urls
                .iter()
                .map(|u| (u.to_string(), TrackMetadata::default()))
                .collect(),
        }
    }

    #[test]
    fn next_item_advances_and_clamps() {
        let q = queue(&["u1", "u2", "u3"], Some("u1"));
        assert_eq!(q.next_item().unwrap().0, "u2");

        let at_end = queue(&["u1", "u2", "u3"], Some("u3"));
        assert_eq!(at_end.next_item().unwrap().0, "u3");
    }

    #[test]
    fn previous_item_retreats_and_clamps() {
        let q = queue(&["u1", "u2", "u3"], Some("u3"));
        assert_eq!(q.previous_item().unwrap().0, "u2");

        let at_start = queue(&["u1", "u2", "u3"], Some("u1"));
        assert_eq!(at_start.previous_item().unwrap().0, "u1");
    }

    #[test]
    fn unknown_current_url_starts_from_head() {
        let q = queue(&["u1", "u2"], Some("gone"));
        assert_eq!(q.next_item().unwrap().0, "u2");
        assert_eq!(q.previous_item().unwrap().0, "u1");
    }

    #[test]
    fn empty_queue_is_inactive() {
        let q = queue(&[], None);
        assert!(!q.is_active());
        assert!(q.next_item().is_none());
        assert!(q.random_item().is_none());
    }

    #[test]
    fn random_item_stays_in_bounds() {
        let q = queue(&["u1", "u2", "u3"], Some("u2"));
        for _ in 0..32 {
            let (url, _) = q.random_item().unwrap();
            assert!(["u1", "u2", "u3"].contains(&url.as_str()));
        }
    }

    #[test]
    fn albumart_rewrite_rules() {
        let mut playback = PlayInfo {
            albumart_url: "/YamahaRemoteControl/AlbumART/AlbumART3929.jpg".to_string(),
            ..PlayInfo::default()
        };
        absolutize_albumart(&mut playback, "192.168.1.10");
        assert_eq!(
            playback.albumart_url,
            "http://192.168.1.10/YamahaRemoteControl/AlbumART/AlbumART3929.jpg"
        );

        let mut empty = PlayInfo::default();
        absolutize_albumart(&mut empty, "192.168.1.10");
        assert_eq!(empty.albumart_url, "");

        let mut absolute = PlayInfo {
            albumart_url: "http://cdn/art.jpg".to_string(),
            ..PlayInfo::default()
        };
        absolutize_albumart(&mut absolute, "192.168.1.10");
        assert_eq!(absolute.albumart_url, "http://cdn/art.jpg");
    }
}
