//! SSDP discovery of MediaRenderer devices.
//!
//! A long-lived listener owns a multicast UDP socket on port 1900. It sends
//! M-SEARCH probes on demand, consumes both search responses and unsolicited
//! NOTIFY announcements, and admits each new device once: fetch its root
//! description, parse it, and hand it to the supervisor. The entity map from
//! source IP to agent handle suppresses duplicate admissions while the agent
//! is alive; a dead handle is dropped so the next announcement re-admits.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use musiccast_upnp::RootDescription;

use crate::agent::AgentHandle;
use crate::error::Result;
use crate::supervisor::Supervisor;

const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
const SSDP_PORT: u16 = 1900;

/// Search target this control plane cares about.
pub const MEDIA_RENDERER_URN: &str = "urn:schemas-upnp-org:device:MediaRenderer:1";

/// Delay before the automatic discovery probe after startup.
const AUTO_DISCOVER_DELAY: Duration = Duration::from_secs(2);

/// Handle to the running SSDP listener.
#[derive(Clone)]
pub struct DiscoveryHandle {
    sender: mpsc::Sender<DiscoveryMsg>,
}

impl DiscoveryHandle {
    /// Send an M-SEARCH probe for MediaRenderer devices.
    pub async fn discover(&self) {
        let _ = self.sender.send(DiscoveryMsg::Discover).await;
    }
}

enum DiscoveryMsg {
    Discover,
}

/// Bind the SSDP socket and start the listener task.
pub(crate) fn spawn(supervisor: Supervisor) -> Result<DiscoveryHandle> {
    let socket = bind_ssdp_socket()?;
    let (sender, commands) = mpsc::channel(8);

    let auto = sender.clone();
    tokio::spawn(async move {
        tokio::time::sleep(AUTO_DISCOVER_DELAY).await;
        let _ = auto.send(DiscoveryMsg::Discover).await;
    });

    let listener = SsdpListener {
        socket,
        supervisor,
        http: reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .build()
            .expect("default reqwest client"),
        entities: HashMap::new(),
        commands,
    };
    tokio::spawn(listener.run());

    Ok(DiscoveryHandle { sender })
}

fn bind_ssdp_socket() -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_multicast_ttl_v4(2)?;
    socket.set_multicast_loop_v4(false)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::from(([0, 0, 0, 0], SSDP_PORT)).into())?;
    socket.join_multicast_v4(&SSDP_MULTICAST_ADDR, &Ipv4Addr::UNSPECIFIED)?;

    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}

struct SsdpListener {
    socket: UdpSocket,
    supervisor: Supervisor,
    http: reqwest::Client,
    entities: HashMap<Ipv4Addr, AgentHandle>,
    commands: mpsc::Receiver<DiscoveryMsg>,
}

impl SsdpListener {
    async fn run(mut self) {
        let mut buf = [0u8; 4096];
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(DiscoveryMsg::Discover) => self.send_search().await,
                    None => break,
                },
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, SocketAddr::V4(source))) => {
                        let text = String::from_utf8_lossy(&buf[..len]).into_owned();
                        self.handle_packet(source, &text).await;
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "SSDP socket receive failed"),
                },
            }
        }
    }

    async fn send_search(&self) {
        let request = format!(
            "M-SEARCH * HTTP/1.1\r\n\
             HOST: {}:{}\r\n\
             MAN: \"ssdp:discover\"\r\n\
             ST: {}\r\n\
             MX: 2\r\n\
             \r\n",
            SSDP_MULTICAST_ADDR, SSDP_PORT, MEDIA_RENDERER_URN
        );
        let target = SocketAddrV4::new(SSDP_MULTICAST_ADDR, SSDP_PORT);
        if let Err(e) = self.socket.send_to(request.as_bytes(), target).await {
            tracing::warn!(error = %e, "failed to send M-SEARCH");
        } else {
            tracing::debug!("sent M-SEARCH for {}", MEDIA_RENDERER_URN);
        }
    }

    async fn handle_packet(&mut self, source: SocketAddrV4, text: &str) {
        let headers = match parse_packet(text) {
            Some(headers) => headers,
            None => return,
        };

        let ip = *source.ip();
        if let Some(handle) = self.entities.get(&ip) {
            if !handle.is_closed() {
                return;
            }
            self.entities.remove(&ip);
        }

        let location = match headers.get("location") {
            Some(location) => location.clone(),
            None => return,
        };

        match self.fetch_description(&location).await {
            Ok(root) => {
                tracing::info!(ip = %ip, name = %root.device.friendly_name, "admitting device");
                let handle = self.supervisor.add_device(ip, root);
                self.entities.insert(ip, handle);
            }
            Err(e) => {
                tracing::debug!(ip = %ip, error = %e, "device description fetch failed, not admitting");
            }
        }
    }

    async fn fetch_description(&self, location: &str) -> Result<RootDescription> {
        let body = self
            .http
            .get(location)
            .send()
            .await
            .map_err(|e| crate::error::ControlError::Transport(e.to_string()))?
            .text()
            .await
            .map_err(|e| crate::error::ControlError::Transport(e.to_string()))?;
        Ok(RootDescription::parse(&body, location)?)
    }
}

/// Parse one SSDP packet into its normalized header map.
///
/// The start line is stripped (M-SEARCH probes from other control points are
/// ignored outright); remaining lines split on the first colon, keys are
/// lowercased with `-` mapped to `_`, values trimmed. Only packets whose
/// `ST` or `NT` names the MediaRenderer URN are kept.
pub(crate) fn parse_packet(text: &str) -> Option<HashMap<String, String>> {
    let mut lines = text.split("\r\n");
    let start_line = lines.next()?;
    if start_line.starts_with("M-SEARCH") {
        return None;
    }

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_ascii_lowercase().replace('-', "_");
            headers.insert(key, value.trim().to_string());
        }
    }

    let target_matches = |key: &str| headers.get(key).map(String::as_str) == Some(MEDIA_RENDERER_URN);
    if target_matches("st") || target_matches("nt") {
        Some(headers)
    } else {
        None
    }
}
