//! Minimal SOAP client for UPnP device communication.
//!
//! This crate provides SOAP 1.1 action invocation against arbitrary control
//! URLs plus GENA event subscription management (SUBSCRIBE/UNSUBSCRIBE).
//! It knows nothing about specific services; callers supply the service type
//! URN, the action name, and the parameters.

mod error;

pub use error::{Result, SoapError};

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Method;
use xmltree::Element;

/// Response from a GENA subscription request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionResponse {
    /// Subscription ID issued by the device.
    pub sid: String,
    /// Timeout granted by the device, in seconds.
    pub timeout_seconds: u32,
}

/// A SOAP 1.1 / GENA client backed by a shared HTTP connection pool.
///
/// Cloning is cheap; all clones share the underlying `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct SoapClient {
    http: reqwest::Client,
}

impl SoapClient {
    /// Create a client with default timeouts (5 s connect, 10 s total).
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .build()
            .expect("default reqwest client");
        Self { http }
    }

    /// Create a client sharing an existing HTTP client.
    pub fn with_http(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Invoke a SOAP action and return its OUT arguments keyed by name.
    ///
    /// Builds a SOAP 1.1 envelope with the action element in the service
    /// namespace and each parameter as a child element. A 2xx answer yields
    /// the children of `<u:{action}Response>`; a SOAP fault carrying a
    /// `UPnPError` yields [`SoapError::Upnp`].
    pub async fn call_action(
        &self,
        control_url: &str,
        service_type: &str,
        action: &str,
        params: &[(&str, String)],
    ) -> Result<HashMap<String, String>> {
        let mut payload = String::new();
        for (name, value) in params {
            payload.push_str(&format!(
                "<{name}>{value}</{name}>",
                name = name,
                value = escape_text(value)
            ));
        }

        let body = format!(
            r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:{action} xmlns:u="{service_type}">{payload}</u:{action}></s:Body></s:Envelope>"#,
            action = action,
            service_type = service_type,
            payload = payload
        );

        let soap_action = format!("\"{}#{}\"", service_type, action);

        let response = self
            .http
            .post(control_url)
            .header("Content-Type", "text/xml; charset=\"utf-8\"")
            .header("SOAPAction", &soap_action)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        let xml = Element::parse(text.as_bytes())
            .map_err(|e| SoapError::InvalidResponse(e.to_string()))?;

        if status.is_success() {
            extract_response(&xml, action)
        } else if let Some(fault) = extract_fault(&xml) {
            Err(fault)
        } else {
            Err(SoapError::Transport(format!(
                "SOAP request failed: HTTP {}",
                status
            )))
        }
    }

    /// Subscribe to GENA events, or renew an existing subscription.
    ///
    /// When `target` begins with `uuid:` it is treated as a subscription ID
    /// and the request renews that subscription; otherwise it is the callback
    /// URL for a fresh subscription. Returns the SID and granted timeout.
    pub async fn subscribe(
        &self,
        event_sub_url: &str,
        target: &str,
        timeout_seconds: u32,
    ) -> Result<SubscriptionResponse> {
        let method = Method::from_bytes(b"SUBSCRIBE").expect("valid method");
        let timeout_header = format!("Second-{}", timeout_seconds);

        let request = self.http.request(method, event_sub_url);
        let request = if target.starts_with("uuid:") {
            request.header("SID", target)
        } else {
            request
                .header("NT", "upnp:event")
                .header("CALLBACK", format!("<{}>", target))
        };

        let response = request.header("TIMEOUT", &timeout_header).send().await?;

        let status = response.status();
        if status.as_u16() == 412 {
            return Err(SoapError::PreconditionFailed);
        }
        if !status.is_success() {
            return Err(SoapError::Transport(format!(
                "SUBSCRIBE failed: HTTP {}",
                status
            )));
        }

        let sid = response
            .headers()
            .get("SID")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                SoapError::InvalidResponse("missing SID header in SUBSCRIBE response".to_string())
            })?;

        let granted = response
            .headers()
            .get("TIMEOUT")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Second-"))
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(timeout_seconds);

        Ok(SubscriptionResponse {
            sid,
            timeout_seconds: granted,
        })
    }

    /// Cancel a GENA subscription.
    pub async fn unsubscribe(&self, event_sub_url: &str, sid: &str) -> Result<()> {
        let method = Method::from_bytes(b"UNSUBSCRIBE").expect("valid method");

        let response = self
            .http
            .request(method, event_sub_url)
            .header("SID", sid)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SoapError::Transport(format!(
                "UNSUBSCRIBE failed: HTTP {}",
                response.status()
            )));
        }

        Ok(())
    }
}

impl Default for SoapClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Escape text content for inclusion in an XML element.
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn extract_response(xml: &Element, action: &str) -> Result<HashMap<String, String>> {
    let body = xml
        .get_child("Body")
        .ok_or_else(|| SoapError::InvalidResponse("missing SOAP Body".to_string()))?;

    if let Some(fault) = extract_fault(xml) {
        return Err(fault);
    }

    let response_name = format!("{}Response", action);
    let response = body.get_child(response_name.as_str()).ok_or_else(|| {
        SoapError::InvalidResponse(format!("missing {} element", response_name))
    })?;

    let mut out = HashMap::new();
    for child in &response.children {
        if let Some(element) = child.as_element() {
            let text = element
                .get_text()
                .map(|t| t.into_owned())
                .unwrap_or_default();
            out.insert(element.name.clone(), text);
        }
    }
    Ok(out)
}

fn extract_fault(xml: &Element) -> Option<SoapError> {
    let fault = xml.get_child("Body")?.get_child("Fault")?;
    let upnp_error = fault.get_child("detail")?.get_child("UPnPError")?;

    let code = upnp_error
        .get_child("errorCode")
        .and_then(|c| c.get_text())
        .and_then(|t| t.trim().parse::<u16>().ok())
        .unwrap_or(500);
    let description = upnp_error
        .get_child("errorDescription")
        .and_then(|d| d.get_text())
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    Some(SoapError::Upnp { code, description })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> Element {
        Element::parse(xml.as_bytes()).unwrap()
    }

    #[test]
    fn extract_response_returns_out_arguments() {
        let xml = parse(
            r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <u:GetVolumeResponse xmlns:u="urn:schemas-upnp-org:service:RenderingControl:1">
                        <CurrentVolume>42</CurrentVolume>
                    </u:GetVolumeResponse>
                </s:Body>
            </s:Envelope>"#,
        );

        let result = extract_response(&xml, "GetVolume").unwrap();
        assert_eq!(result.get("CurrentVolume").map(String::as_str), Some("42"));
    }

    #[test]
    fn extract_response_with_empty_body_is_error() {
        let xml = parse(
            r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body></s:Body>
            </s:Envelope>"#,
        );

        match extract_response(&xml, "Play") {
            Err(SoapError::InvalidResponse(msg)) => assert!(msg.contains("PlayResponse")),
            other => panic!("expected InvalidResponse, got {:?}", other),
        }
    }

    #[test]
    fn fault_maps_to_upnp_error() {
        let xml = parse(
            r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <s:Fault>
                        <faultcode>s:Client</faultcode>
                        <faultstring>UPnPError</faultstring>
                        <detail>
                            <UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
                                <errorCode>718</errorCode>
                                <errorDescription>Invalid InstanceID</errorDescription>
                            </UPnPError>
                        </detail>
                    </s:Fault>
                </s:Body>
            </s:Envelope>"#,
        );

        match extract_fault(&xml) {
            Some(SoapError::Upnp { code, description }) => {
                assert_eq!(code, 718);
                assert_eq!(description, "Invalid InstanceID");
            }
            other => panic!("expected Upnp fault, got {:?}", other),
        }
    }

    #[test]
    fn escape_text_covers_markup_characters() {
        assert_eq!(
            escape_text(r#"Simon & Garfunkel <"live">"#),
            "Simon &amp; Garfunkel &lt;&quot;live&quot;&gt;"
        );
    }

    #[tokio::test]
    async fn call_action_round_trip() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/AVTransport/ctrl")
            .match_header(
                "soapaction",
                "\"urn:schemas-upnp-org:service:AVTransport:1#GetTransportInfo\"",
            )
            .with_status(200)
            .with_body(
                r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                    <s:Body>
                        <u:GetTransportInfoResponse xmlns:u="urn:schemas-upnp-org:service:AVTransport:1">
                            <CurrentTransportState>PLAYING</CurrentTransportState>
                        </u:GetTransportInfoResponse>
                    </s:Body>
                </s:Envelope>"#,
            )
            .create_async()
            .await;

        let client = SoapClient::new();
        let result = client
            .call_action(
                &format!("{}/AVTransport/ctrl", server.url()),
                "urn:schemas-upnp-org:service:AVTransport:1",
                "GetTransportInfo",
                &[("InstanceID", "0".to_string())],
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(
            result.get("CurrentTransportState").map(String::as_str),
            Some("PLAYING")
        );
    }

    #[tokio::test]
    async fn call_action_soap_fault() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/ctrl")
            .with_status(500)
            .with_body(
                r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                    <s:Body>
                        <s:Fault>
                            <detail>
                                <UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
                                    <errorCode>402</errorCode>
                                    <errorDescription>Invalid Args</errorDescription>
                                </UPnPError>
                            </detail>
                        </s:Fault>
                    </s:Body>
                </s:Envelope>"#,
            )
            .create_async()
            .await;

        let client = SoapClient::new();
        let err = client
            .call_action(
                &format!("{}/ctrl", server.url()),
                "urn:schemas-upnp-org:service:AVTransport:1",
                "Play",
                &[],
            )
            .await
            .unwrap_err();

        match err {
            SoapError::Upnp { code, .. } => assert_eq!(code, 402),
            other => panic!("expected Upnp, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn subscribe_parses_sid_and_timeout() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("SUBSCRIBE", "/event")
            .match_header("nt", "upnp:event")
            .with_status(200)
            .with_header("SID", "uuid:sub-1234")
            .with_header("TIMEOUT", "Second-300")
            .create_async()
            .await;

        let client = SoapClient::new();
        let response = client
            .subscribe(
                &format!("{}/event", server.url()),
                "http://192.168.1.50:8080/callback",
                300,
            )
            .await
            .unwrap();

        assert_eq!(response.sid, "uuid:sub-1234");
        assert_eq!(response.timeout_seconds, 300);
    }

    #[tokio::test]
    async fn renewal_sends_sid_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("SUBSCRIBE", "/event")
            .match_header("sid", "uuid:sub-1234")
            .with_status(200)
            .with_header("SID", "uuid:sub-1234")
            .with_header("TIMEOUT", "Second-180")
            .create_async()
            .await;

        let client = SoapClient::new();
        let response = client
            .subscribe(&format!("{}/event", server.url()), "uuid:sub-1234", 300)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.timeout_seconds, 180);
    }

    #[tokio::test]
    async fn subscribe_412_is_precondition_failed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("SUBSCRIBE", "/event")
            .with_status(412)
            .create_async()
            .await;

        let client = SoapClient::new();
        let err = client
            .subscribe(&format!("{}/event", server.url()), "uuid:stale", 300)
            .await
            .unwrap_err();

        assert!(matches!(err, SoapError::PreconditionFailed));
    }
}
