//! Typed AVTransport control.
//!
//! Thin wrappers over the SOAP client for the handful of AVTransport actions
//! the control plane drives. URI-loading actions take a metadata argument
//! that is encoded to DIDL-Lite when structured.

use musiccast_soap::{Result, SoapClient};

use crate::didl::{self, TrackMetadata};

/// Service type URN used in SOAP requests to AVTransport.
pub const AVTRANSPORT_SERVICE_TYPE: &str = "urn:schemas-upnp-org:service:AVTransport:1";

/// Metadata argument for the URI-loading actions.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Metadata {
    /// No metadata; an empty string goes on the wire.
    #[default]
    None,
    /// Pre-encoded metadata passed through untouched.
    Raw(String),
    /// Structured track metadata, encoded to DIDL-Lite with the target URI.
    Track(TrackMetadata),
}

impl Metadata {
    fn to_wire(&self, uri: &str) -> String {
        match self {
            Metadata::None => String::new(),
            Metadata::Raw(s) => s.clone(),
            Metadata::Track(meta) => didl::encode(&[(uri.to_string(), meta.clone())]),
        }
    }
}

/// AVTransport service client bound to one device's control URL.
#[derive(Debug, Clone)]
pub struct AvTransport {
    client: SoapClient,
    control_url: String,
}

impl AvTransport {
    pub fn new(client: SoapClient, control_url: impl Into<String>) -> Self {
        Self {
            client,
            control_url: control_url.into(),
        }
    }

    pub async fn set_av_transport_uri(
        &self,
        instance_id: u32,
        uri: &str,
        metadata: &Metadata,
    ) -> Result<()> {
        self.client
            .call_action(
                &self.control_url,
                AVTRANSPORT_SERVICE_TYPE,
                "SetAVTransportURI",
                &[
                    ("InstanceID", instance_id.to_string()),
                    ("CurrentURI", uri.to_string()),
                    ("CurrentURIMetaData", metadata.to_wire(uri)),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn set_next_av_transport_uri(
        &self,
        instance_id: u32,
        uri: &str,
        metadata: &Metadata,
    ) -> Result<()> {
        self.client
            .call_action(
                &self.control_url,
                AVTRANSPORT_SERVICE_TYPE,
                "SetNextAVTransportURI",
                &[
                    ("InstanceID", instance_id.to_string()),
                    ("NextURI", uri.to_string()),
                    ("NextURIMetaData", metadata.to_wire(uri)),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn play(&self, instance_id: u32, speed: &str) -> Result<()> {
        self.client
            .call_action(
                &self.control_url,
                AVTRANSPORT_SERVICE_TYPE,
                "Play",
                &[
                    ("InstanceID", instance_id.to_string()),
                    ("Speed", speed.to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn pause(&self, instance_id: u32) -> Result<()> {
        self.client
            .call_action(
                &self.control_url,
                AVTRANSPORT_SERVICE_TYPE,
                "Pause",
                &[("InstanceID", instance_id.to_string())],
            )
            .await?;
        Ok(())
    }

    pub async fn stop(&self, instance_id: u32) -> Result<()> {
        self.client
            .call_action(
                &self.control_url,
                AVTRANSPORT_SERVICE_TYPE,
                "Stop",
                &[("InstanceID", instance_id.to_string())],
            )
            .await?;
        Ok(())
    }
}
