//! Event ingress: YXC unicast UDP and UPnP HTTP callbacks.
//!
//! Both paths resolve the owning agent through the registry and forward a
//! one-way message onto its inbox. Unroutable events are dropped with a log
//! line; delivery never blocks the listeners.

use std::convert::Infallible;
use std::net::SocketAddr;

use serde_json::{Map, Value};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use warp::http::StatusCode;
use warp::Filter;

use crate::agent::AgentMsg;
use crate::error::Result;
use crate::registry::DeviceRegistry;

/// Bind the YXC unicast event socket and start the dispatch loop.
///
/// Returns the bound address (useful when `port` is 0) and the listener
/// task handle.
pub async fn serve_yxc_events(
    registry: DeviceRegistry,
    port: u16,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
    let local_addr = socket.local_addr()?;
    tracing::debug!(port = local_addr.port(), "listening for YXC unicast events");

    let task = tokio::spawn(async move {
        let mut buf = [0u8; 8192];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, _source)) => {
                    dispatch_yxc_datagram(&registry, &buf[..len]).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "YXC event socket receive failed");
                }
            }
        }
    });
    Ok((local_addr, task))
}

/// Decode one unicast datagram and route it to the matching agent.
///
/// The payload must be a JSON object with a `device_id`; that key is removed
/// before delivery. Unknown devices and undecodable payloads are dropped.
pub(crate) async fn dispatch_yxc_datagram(registry: &DeviceRegistry, datagram: &[u8]) {
    let value: Value = match serde_json::from_slice(datagram) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "undecodable YXC event datagram");
            return;
        }
    };
    let mut payload: Map<String, Value> = match value {
        Value::Object(map) => map,
        _ => {
            tracing::debug!("YXC event payload is not an object");
            return;
        }
    };

    let device_id = match payload.remove("device_id").and_then(|v| match v {
        Value::String(s) => Some(s),
        _ => None,
    }) {
        Some(id) => id,
        None => {
            tracing::debug!("YXC event payload has no device_id");
            return;
        }
    };

    match registry.whereis(&device_id).await {
        Some(entry) => {
            if entry
                .handle
                .sender()
                .try_send(AgentMsg::YxcEvent(payload))
                .is_err()
            {
                tracing::warn!(device_id = %device_id, "agent inbox unavailable, dropping event");
            }
        }
        None => {
            tracing::debug!(device_id = %device_id, "YXC event for unknown device, dropping");
        }
    }
}

/// The UPnP callback endpoint as a warp filter.
///
/// Accepts POSTed notification bodies, resolves the agent by the `SID`
/// header, and replies 200 on a routed event or 410 for an unknown sid.
pub fn upnp_callback_filter(
    registry: DeviceRegistry,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::post()
        .and(warp::header::<String>("sid"))
        .and(warp::body::bytes())
        .and(with_registry(registry))
        .and_then(handle_upnp_notify)
}

fn with_registry(
    registry: DeviceRegistry,
) -> impl Filter<Extract = (DeviceRegistry,), Error = Infallible> + Clone {
    warp::any().map(move || registry.clone())
}

async fn handle_upnp_notify(
    sid: String,
    body: bytes::Bytes,
    registry: DeviceRegistry,
) -> std::result::Result<impl warp::Reply, warp::Rejection> {
    let entry = match registry.find_by_sid(&sid).await {
        Some(entry) => entry,
        None => {
            tracing::debug!(sid = %sid, "UPnP notification for unknown sid");
            return Ok(StatusCode::GONE);
        }
    };

    let text = String::from_utf8_lossy(&body);
    match musiccast_upnp::decode_event(&text) {
        Ok(event) => {
            if entry
                .handle
                .sender()
                .try_send(AgentMsg::UpnpEvent(event))
                .is_err()
            {
                tracing::warn!(sid = %sid, "agent inbox unavailable, dropping UPnP event");
            }
        }
        Err(e) => {
            tracing::warn!(sid = %sid, error = %e, "undecodable UPnP notification body");
        }
    }
    Ok(StatusCode::OK)
}

/// Serve the callback filter on `addr`. Returns the server task handle.
pub(crate) fn serve_upnp_callback(registry: DeviceRegistry, addr: SocketAddr) -> JoinHandle<()> {
    let filter = upnp_callback_filter(registry);
    tokio::spawn(async move {
        warp::serve(filter).run(addr).await;
    })
}
