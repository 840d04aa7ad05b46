//! UPnP root description parsing.
//!
//! A device's root description lists its metadata, icons and hosted
//! services. Descriptions routinely carry relative URLs; everything here is
//! rewritten to absolute form against the description's base URL so that
//! downstream consumers never have to know where the document came from.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ParseError, ParseResult};
use crate::xml;

/// Parsed and absolutized UPnP root description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootDescription {
    pub device: DeviceDescription,
}

/// Device block of a root description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescription {
    pub device_type: String,
    pub friendly_name: String,
    pub manufacturer: String,
    pub model_name: String,
    pub model_description: Option<String>,
    pub udn: String,
    pub icon_list: Vec<Icon>,
    pub service_list: Vec<ServiceEntry>,
}

/// One entry of the device's icon list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Icon {
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub url: String,
}

/// One hosted service with its three endpoint URLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub service_type: String,
    pub service_id: String,
    pub scpd_url: String,
    pub control_url: String,
    pub event_sub_url: String,
}

/// Service id of the AVTransport service in MediaRenderer descriptions.
pub const AVTRANSPORT_SERVICE_ID: &str = "urn:upnp-org:serviceId:AVTransport";

impl RootDescription {
    /// Parse a root description document fetched from `description_url`.
    ///
    /// All URLs in the icon and service lists come back absolute, joined
    /// against the description URL.
    pub fn parse(xml: &str, description_url: &str) -> ParseResult<Self> {
        let base = Url::parse(description_url)
            .map_err(|e| ParseError::InvalidUrl(format!("{}: {}", description_url, e)))?;
        let raw: raw::Root = xml::parse(xml)?;

        let device = DeviceDescription {
            device_type: raw.device.device_type,
            friendly_name: raw.device.friendly_name,
            manufacturer: raw.device.manufacturer,
            model_name: raw.device.model_name,
            model_description: raw.device.model_description,
            udn: raw.device.udn,
            icon_list: raw
                .device
                .icon_list
                .icons
                .into_iter()
                .map(|i| {
                    Ok(Icon {
                        mime_type: i.mimetype,
                        width: i.width,
                        height: i.height,
                        depth: i.depth,
                        url: absolutize(&base, &i.url)?,
                    })
                })
                .collect::<ParseResult<Vec<_>>>()?,
            service_list: raw
                .device
                .service_list
                .services
                .into_iter()
                .map(|s| {
                    Ok(ServiceEntry {
                        service_type: s.service_type,
                        service_id: s.service_id,
                        scpd_url: absolutize(&base, &s.scpd_url)?,
                        control_url: absolutize(&base, &s.control_url)?,
                        event_sub_url: absolutize(&base, &s.event_sub_url)?,
                    })
                })
                .collect::<ParseResult<Vec<_>>>()?,
        };

        Ok(RootDescription { device })
    }

    /// Find the AVTransport service entry, if the device renders A/V.
    pub fn avtransport(&self) -> Option<&ServiceEntry> {
        self.device
            .service_list
            .iter()
            .find(|s| s.service_id == AVTRANSPORT_SERVICE_ID)
    }
}

fn absolutize(base: &Url, candidate: &str) -> ParseResult<String> {
    base.join(candidate)
        .map(|u| u.to_string())
        .map_err(|e| ParseError::InvalidUrl(format!("{}: {}", candidate, e)))
}

mod raw {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct Root {
        pub device: Device,
    }

    #[derive(Debug, Deserialize)]
    pub struct Device {
        #[serde(rename = "deviceType")]
        pub device_type: String,
        #[serde(rename = "friendlyName")]
        pub friendly_name: String,
        #[serde(default)]
        pub manufacturer: String,
        #[serde(rename = "modelName", default)]
        pub model_name: String,
        #[serde(rename = "modelDescription")]
        pub model_description: Option<String>,
        #[serde(rename = "UDN", default)]
        pub udn: String,
        #[serde(rename = "iconList", default)]
        pub icon_list: IconList,
        #[serde(rename = "serviceList", default)]
        pub service_list: ServiceList,
    }

    #[derive(Debug, Deserialize, Default)]
    pub struct IconList {
        #[serde(rename = "icon", default)]
        pub icons: Vec<Icon>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Icon {
        #[serde(default)]
        pub mimetype: String,
        #[serde(default)]
        pub width: u32,
        #[serde(default)]
        pub height: u32,
        #[serde(default)]
        pub depth: u32,
        #[serde(default)]
        pub url: String,
    }

    #[derive(Debug, Deserialize, Default)]
    pub struct ServiceList {
        #[serde(rename = "service", default)]
        pub services: Vec<Service>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Service {
        #[serde(rename = "serviceType", default)]
        pub service_type: String,
        #[serde(rename = "serviceId", default)]
        pub service_id: String,
        #[serde(rename = "SCPDURL", default)]
        pub scpd_url: String,
        #[serde(rename = "controlURL", default)]
        pub control_url: String,
        #[serde(rename = "eventSubURL", default)]
        pub event_sub_url: String,
    }
}
