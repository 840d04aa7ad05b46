//! GENA event payload decoding for AVTransport.
//!
//! Devices POST an `e:propertyset` whose `LastChange` property holds an
//! escaped XML document; inside it, `Event/InstanceID/*` children carry the
//! changed state variables as `val` attributes. Values are cast using the
//! service's state-variable type table, and the metadata variables are
//! decoded from DIDL-Lite.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use xmltree::Element;

use crate::didl::{self, TrackMetadata};
use crate::error::{ParseError, ParseResult};
use crate::scpd::{DataType, Scpd};

/// A decoded state-variable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventValue {
    Int(i64),
    Status(ChannelStatus),
    Text(String),
}

/// The two literal status markers devices send for unsupported channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "NOT_IMPLEMENTED")]
    NotImplemented,
}

/// Decoded DIDL-Lite metadata: a single item when the document held exactly
/// one, otherwise the full list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DecodedDidl {
    One((String, TrackMetadata)),
    Many(Vec<(String, TrackMetadata)>),
}

impl DecodedDidl {
    fn from_items(mut items: Vec<(String, TrackMetadata)>) -> Self {
        if items.len() == 1 {
            DecodedDidl::One(items.remove(0))
        } else {
            DecodedDidl::Many(items)
        }
    }
}

/// State-variable name to data-type mapping used to cast event values.
#[derive(Debug, Clone)]
pub struct StateVarTable {
    types: HashMap<String, DataType>,
}

impl StateVarTable {
    /// Build a table from a parsed SCPD.
    pub fn from_scpd(scpd: &Scpd) -> Self {
        Self {
            types: scpd
                .state_variables
                .iter()
                .map(|v| (v.name.clone(), v.data_type.clone()))
                .collect(),
        }
    }

    /// The standard AVTransport:1 state-variable table, for devices whose
    /// SCPD has not been fetched.
    pub fn avtransport_default() -> Self {
        let mut types = HashMap::new();
        for name in [
            "TransportState",
            "TransportStatus",
            "PlaybackStorageMedium",
            "PossiblePlaybackStorageMedia",
            "CurrentPlayMode",
            "TransportPlaySpeed",
            "CurrentTrackDuration",
            "CurrentMediaDuration",
            "CurrentTrackMetaData",
            "CurrentTrackURI",
            "AVTransportURI",
            "AVTransportURIMetaData",
            "NextAVTransportURI",
            "NextAVTransportURIMetaData",
            "NextTrackMetaData",
            "RelativeTimePosition",
            "AbsoluteTimePosition",
            "CurrentTransportActions",
            "LastChange",
        ] {
            types.insert(name.to_string(), DataType::String);
        }
        for name in ["NumberOfTracks", "CurrentTrack"] {
            types.insert(name.to_string(), DataType::Ui4);
        }
        for name in ["RelativeCounterPosition", "AbsoluteCounterPosition"] {
            types.insert(name.to_string(), DataType::I4);
        }
        Self { types }
    }

    fn is_integer(&self, variable: &str) -> bool {
        self.types
            .get(variable)
            .map(DataType::is_integer)
            .unwrap_or(false)
    }
}

/// Decoded AVTransport event.
///
/// The URI and metadata variables are lifted into typed fields; every other
/// variable lands in `variables` keyed by its snake_case name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AvTransportEvent {
    pub transport_state: Option<String>,
    pub av_transport_uri: Option<String>,
    pub next_av_transport_uri: Option<String>,
    pub current_track_meta_data: Option<DecodedDidl>,
    pub next_track_meta_data: Option<DecodedDidl>,
    pub av_transport_uri_meta_data: Option<DecodedDidl>,
    pub next_av_transport_uri_meta_data: Option<DecodedDidl>,
    pub variables: BTreeMap<String, EventValue>,
}

/// Decode an event notification body with the default AVTransport table.
pub fn decode(body: &str) -> ParseResult<AvTransportEvent> {
    decode_with_table(body, &StateVarTable::avtransport_default())
}

/// Decode an event notification body, casting values per `table`.
pub fn decode_with_table(body: &str, table: &StateVarTable) -> ParseResult<AvTransportEvent> {
    let propertyset = Element::parse(body.as_bytes())
        .map_err(|e| ParseError::XmlDeserializationFailed(e.to_string()))?;

    let last_change = find_last_change(&propertyset)
        .ok_or(ParseError::MissingElement("LastChange"))?;

    let inner = Element::parse(last_change.as_bytes())
        .map_err(|e| ParseError::XmlDeserializationFailed(e.to_string()))?;
    let instance = inner
        .children
        .iter()
        .filter_map(|c| c.as_element())
        .find(|e| e.name == "InstanceID")
        .ok_or(ParseError::MissingElement("InstanceID"))?;

    let mut event = AvTransportEvent::default();
    for child in &instance.children {
        let element = match child.as_element() {
            Some(e) => e,
            None => continue,
        };
        let value = match element.attributes.get("val") {
            Some(v) => v.clone(),
            None => continue,
        };

        match element.name.as_str() {
            "TransportState" => event.transport_state = Some(value),
            "AVTransportURI" => event.av_transport_uri = Some(value),
            "NextAVTransportURI" => event.next_av_transport_uri = Some(value),
            "CurrentTrackMetaData" => event.current_track_meta_data = decode_metadata(&value),
            "NextTrackMetaData" => event.next_track_meta_data = decode_metadata(&value),
            "AVTransportURIMetaData" => {
                event.av_transport_uri_meta_data = decode_metadata(&value)
            }
            "NextAVTransportURIMetaData" => {
                event.next_av_transport_uri_meta_data = decode_metadata(&value)
            }
            name => {
                event
                    .variables
                    .insert(camel_to_snake(name), cast_value(name, value, table));
            }
        }
    }

    Ok(event)
}

fn decode_metadata(value: &str) -> Option<DecodedDidl> {
    if value.is_empty() || value == "NOT_IMPLEMENTED" {
        return None;
    }
    match didl::decode(value) {
        Ok(items) if !items.is_empty() => Some(DecodedDidl::from_items(items)),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!("undecodable DIDL metadata in event: {}", e);
            None
        }
    }
}

fn cast_value(variable: &str, value: String, table: &StateVarTable) -> EventValue {
    if table.is_integer(variable) {
        if let Ok(n) = value.parse::<i64>() {
            return EventValue::Int(n);
        }
    }
    match value.as_str() {
        "OK" => EventValue::Status(ChannelStatus::Ok),
        "NOT_IMPLEMENTED" => EventValue::Status(ChannelStatus::NotImplemented),
        _ => EventValue::Text(value),
    }
}

fn find_last_change(propertyset: &Element) -> Option<String> {
    for property in propertyset.children.iter().filter_map(|c| c.as_element()) {
        if property.name != "property" {
            continue;
        }
        for child in property.children.iter().filter_map(|c| c.as_element()) {
            if child.name == "LastChange" {
                return child.get_text().map(|t| t.into_owned());
            }
        }
    }
    None
}

/// Convert a CamelCase variable name (acronyms included) to snake_case.
pub fn camel_to_snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev_lower = chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit();
            let next_lower = chars.get(i + 1).map(|n| n.is_lowercase()).unwrap_or(false);
            if prev_lower || next_lower {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn propertyset(inner_vars: &str) -> String {
        let last_change = format!(
            r#"<Event xmlns="urn:schemas-upnp-org:metadata-1-0/AVT/"><InstanceID val="0">{}</InstanceID></Event>"#,
            inner_vars
        );
        format!(
            r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0"><e:property><LastChange>{}</LastChange></e:property></e:propertyset>"#,
            musiccast_soap::escape_text(&last_change)
        )
    }

    #[test]
    fn camel_to_snake_handles_acronym_runs() {
        assert_eq!(camel_to_snake("TransportState"), "transport_state");
        assert_eq!(camel_to_snake("AVTransportURI"), "av_transport_uri");
        assert_eq!(
            camel_to_snake("NextAVTransportURIMetaData"),
            "next_av_transport_uri_meta_data"
        );
        assert_eq!(camel_to_snake("CurrentTrack"), "current_track");
    }

    #[test]
    fn decodes_typed_variables() {
        let body = propertyset(
            r#"<TransportState val="PLAYING"/><CurrentTrack val="3"/><CurrentPlayMode val="NORMAL"/><TransportStatus val="OK"/>"#,
        );
        let event = decode(&body).unwrap();

        assert_eq!(event.transport_state.as_deref(), Some("PLAYING"));
        assert_eq!(
            event.variables.get("current_track"),
            Some(&EventValue::Int(3))
        );
        assert_eq!(
            event.variables.get("current_play_mode"),
            Some(&EventValue::Text("NORMAL".to_string()))
        );
        assert_eq!(
            event.variables.get("transport_status"),
            Some(&EventValue::Status(ChannelStatus::Ok))
        );
    }

    #[test]
    fn decodes_uri_and_metadata() {
        let didl = didl::encode(&[(
            "http://media/a.m4a".to_string(),
            TrackMetadata {
                title: Some("A".to_string()),
                mimetype: Some("audio/mp4".to_string()),
                duration_seconds: Some(240),
                ..TrackMetadata::default()
            },
        )]);
        let body = propertyset(&format!(
            r#"<AVTransportURI val="http://media/a.m4a"/><CurrentTrackMetaData val="{}"/>"#,
            musiccast_soap::escape_text(&didl)
        ));

        let event = decode(&body).unwrap();
        assert_eq!(event.av_transport_uri.as_deref(), Some("http://media/a.m4a"));
        match event.current_track_meta_data {
            Some(DecodedDidl::One((url, meta))) => {
                assert_eq!(url, "http://media/a.m4a");
                assert_eq!(meta.title.as_deref(), Some("A"));
                assert_eq!(meta.duration_seconds, Some(240));
            }
            other => panic!("expected single decoded item, got {:?}", other),
        }
    }

    #[test]
    fn multiple_didl_items_decode_as_list() {
        let didl = didl::encode(&[
            ("http://media/1.mp3".to_string(), TrackMetadata::default()),
            ("http://media/2.mp3".to_string(), TrackMetadata::default()),
        ]);
        let body = propertyset(&format!(
            r#"<CurrentTrackMetaData val="{}"/>"#,
            musiccast_soap::escape_text(&didl)
        ));

        let event = decode(&body).unwrap();
        match event.current_track_meta_data {
            Some(DecodedDidl::Many(items)) => assert_eq!(items.len(), 2),
            other => panic!("expected item list, got {:?}", other),
        }
    }

    #[test]
    fn missing_last_change_is_an_error() {
        let body = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0"><e:property><SinkProtocolInfo>x</SinkProtocolInfo></e:property></e:propertyset>"#;
        assert!(matches!(
            decode(body),
            Err(ParseError::MissingElement("LastChange"))
        ));
    }

    #[test]
    fn scpd_table_overrides_casting() {
        let scpd = Scpd {
            actions: Vec::new(),
            state_variables: vec![crate::scpd::StateVariable {
                name: "CurrentPlayMode".to_string(),
                data_type: DataType::I4,
            }],
        };
        let table = StateVarTable::from_scpd(&scpd);
        let body = propertyset(r#"<CurrentPlayMode val="7"/>"#);

        let event = decode_with_table(&body, &table).unwrap();
        assert_eq!(
            event.variables.get("current_play_mode"),
            Some(&EventValue::Int(7))
        );
    }
}
