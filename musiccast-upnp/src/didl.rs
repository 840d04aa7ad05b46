//! DIDL-Lite metadata codec.
//!
//! AVTransport carries track metadata as DIDL-Lite XML strings inside SOAP
//! arguments and event payloads. This module encodes typed track metadata to
//! that format and decodes it back.

use serde::{Deserialize, Serialize};
use xmltree::Element;

use musiccast_soap::escape_text;

use crate::error::{ParseError, ParseResult};

const DIDL_NS: &str = "urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/";
const UPNP_NS: &str = "urn:schemas-upnp-org:metadata-1-0/upnp/";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";

/// Metadata describing one audio track.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub id: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_cover_url: Option<String>,
    pub duration_seconds: Option<u32>,
    pub mimetype: Option<String>,
}

/// Encode `(url, metadata)` pairs into a DIDL-Lite document.
///
/// Absent metadata fields are omitted from the output. The `artist` value is
/// entity-encoded along with every other text node.
pub fn encode(items: &[(String, TrackMetadata)]) -> String {
    let mut out = format!(
        r#"<DIDL-Lite xmlns="{}" xmlns:upnp="{}" xmlns:dc="{}">"#,
        DIDL_NS, UPNP_NS, DC_NS
    );

    for (url, meta) in items {
        out.push_str(&format!(
            r#"<item id="{}" parentID="0" restricted="0">"#,
            escape_text(meta.id.as_deref().unwrap_or("0"))
        ));
        out.push_str("<upnp:class>object.item.audioItem.musicTrack</upnp:class>");

        if let Some(title) = &meta.title {
            out.push_str(&format!("<dc:title>{}</dc:title>", escape_text(title)));
        }
        if let Some(album) = &meta.album {
            out.push_str(&format!("<upnp:album>{}</upnp:album>", escape_text(album)));
        }
        if let Some(cover) = &meta.album_cover_url {
            out.push_str(&format!(
                "<upnp:albumArtURI>{}</upnp:albumArtURI>",
                escape_text(cover)
            ));
        }
        if let Some(artist) = &meta.artist {
            out.push_str(&format!(
                "<upnp:artist>{}</upnp:artist>",
                escape_text(artist)
            ));
        }

        out.push_str("<res protocolInfo=\"");
        out.push_str(&escape_text(&protocol_info(meta.mimetype.as_deref())));
        out.push('"');
        if let Some(seconds) = meta.duration_seconds {
            out.push_str(&format!(" duration=\"{}\"", encode_duration(seconds)));
        }
        out.push('>');
        out.push_str(&escape_text(url));
        out.push_str("</res></item>");
    }

    out.push_str("</DIDL-Lite>");
    out
}

/// Decode a DIDL-Lite document into `(url, metadata)` pairs.
///
/// Items without a `<res>` element decode with an empty URL.
pub fn decode(xml: &str) -> ParseResult<Vec<(String, TrackMetadata)>> {
    let root = Element::parse(xml.as_bytes())
        .map_err(|e| ParseError::XmlDeserializationFailed(e.to_string()))?;

    let mut items = Vec::new();
    for child in &root.children {
        let item = match child.as_element() {
            Some(e) if e.name == "item" => e,
            _ => continue,
        };

        let mut meta = TrackMetadata {
            id: item.attributes.get("id").cloned(),
            ..TrackMetadata::default()
        };
        let mut url = String::new();

        for field in &item.children {
            let element = match field.as_element() {
                Some(e) => e,
                None => continue,
            };
            let text = element
                .get_text()
                .map(|t| t.into_owned())
                .unwrap_or_default();
            match element.name.as_str() {
                "title" => meta.title = Some(text),
                "artist" | "creator" => meta.artist = Some(text),
                "album" => meta.album = Some(text),
                "albumArtURI" => meta.album_cover_url = Some(text),
                "res" => {
                    url = text;
                    meta.duration_seconds = element
                        .attributes
                        .get("duration")
                        .and_then(|d| decode_duration(d));
                    meta.mimetype = element
                        .attributes
                        .get("protocolInfo")
                        .and_then(|p| mimetype_from_protocol_info(p));
                }
                _ => {}
            }
        }

        items.push((url, meta));
    }

    Ok(items)
}

/// Build the `protocolInfo` attribute for a mimetype.
///
/// `audio/mp4` gets the DLNA AAC profile; other mimetypes get a plain
/// `http-get` triple; no mimetype yields an empty string.
pub fn protocol_info(mimetype: Option<&str>) -> String {
    match mimetype {
        None => String::new(),
        Some("audio/mp4") => "http-get:*:audio/mp4:DLNA.ORG_PN=AAC_ISO_320".to_string(),
        Some(other) => format!("http-get:*:{}", other),
    }
}

fn mimetype_from_protocol_info(protocol_info: &str) -> Option<String> {
    let mime = protocol_info.split(':').nth(2)?;
    if mime.is_empty() || mime == "*" {
        return None;
    }
    Some(mime.to_string())
}

/// Format seconds as `H:MM:SS` with unpadded hours.
pub fn encode_duration(seconds: u32) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{}:{:02}:{:02}", hours, minutes, secs)
}

/// Parse an `H:MM:SS` duration back to seconds.
pub fn decode_duration(duration: &str) -> Option<u32> {
    let mut parts = duration.split(':').rev();
    let secs: u32 = parts.next()?.split('.').next()?.parse().ok()?;
    let minutes: u32 = parts.next()?.parse().ok()?;
    let hours: u32 = match parts.next() {
        Some(h) => h.parse().ok()?,
        None => 0,
    };
    Some(hours * 3600 + minutes * 60 + secs)
}
