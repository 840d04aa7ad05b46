//! Per-device agent.
//!
//! Each discovered device gets one long-lived task owning that device's
//! state. The task serves a single inbox carrying commands, YXC unicast
//! events, UPnP notifications and renewal ticks, strictly in arrival order.
//! After every mutation the new snapshot is diffed against the previous one
//! and the changes are published on the device-id topic.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use musiccast_soap::SoapClient;
use musiccast_upnp::{AvTransport, AvTransportEvent, Metadata, RootDescription, TrackMetadata};
use musiccast_yxc::{PlaybackCommand, Power, VolumeChange, YxcClient, Zone};

use crate::config::Config;
use crate::diff;
use crate::error::{ControlError, Result};
use crate::pubsub::{PubSub, StateDelta, NETWORK_TOPIC};
use crate::registry::{DeviceRegistry, RegistryEntry};
use crate::state::{absolutize_albumart, DeviceState, PlaybackQueue, STATE_KEYS};

/// Timeout requested on GENA subscribe and renewal.
const UPNP_SUBSCRIBE_TIMEOUT_SECS: u32 = 300;

/// Depth of an agent's inbox.
const INBOX_DEPTH: usize = 64;

static NEXT_AGENT_ID: AtomicU64 = AtomicU64::new(1);

/// Renewals are scheduled this far before the granted timeout expires.
pub fn renewal_interval(granted_seconds: u32) -> Duration {
    Duration::from_secs(granted_seconds.saturating_sub(3) as u64)
}

/// Shared collaborators handed to every agent.
#[derive(Clone)]
pub(crate) struct AgentContext {
    pub yxc: YxcClient,
    pub soap: SoapClient,
    pub registry: DeviceRegistry,
    pub pubsub: PubSub,
    pub config: Config,
}

/// Messages served by an agent's inbox.
pub(crate) enum AgentMsg {
    Command {
        command: Command,
        reply: oneshot::Sender<Result<CommandReply>>,
    },
    /// Unicast YXC event payload, minus the `device_id` key.
    YxcEvent(Map<String, Value>),
    /// Decoded UPnP AVTransport notification.
    UpnpEvent(AvTransportEvent),
    Stop,
}

/// Commands an agent executes, one at a time.
#[derive(Debug, Clone)]
pub enum Command {
    SetPower(Power),
    SetSleep(u32),
    SetInput(String),
    SetVolume(i64),
    IncreaseVolume,
    DecreaseVolume,
    Mute,
    Unmute,
    PlaybackPlay,
    PlaybackPause,
    PlaybackStop,
    PlaybackNext,
    PlaybackPrevious,
    TogglePlayPause,
    ToggleRepeat,
    ToggleShuffle,
    PlaybackLoad {
        url: String,
        metadata: Metadata,
    },
    PlaybackLoadNext {
        url: String,
        metadata: Metadata,
    },
    PlaybackLoadQueue {
        items: Vec<(String, TrackMetadata)>,
    },
    Lookup(Lookup),
}

/// State snapshot selector.
#[derive(Debug, Clone)]
pub enum Lookup {
    Key(String),
    Keys(Vec<String>),
    All,
}

/// Reply to a completed command.
#[derive(Debug)]
pub enum CommandReply {
    Done,
    Snapshot(Value),
}

/// Cloneable handle to a running agent.
///
/// All methods enqueue onto the agent's inbox; command ordering follows
/// enqueue ordering and at most one command executes at a time.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    agent_id: u64,
    sender: mpsc::Sender<AgentMsg>,
}

impl AgentHandle {
    pub fn agent_id(&self) -> u64 {
        self.agent_id
    }

    /// Whether the agent has terminated.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub(crate) fn sender(&self) -> &mpsc::Sender<AgentMsg> {
        &self.sender
    }

    #[cfg(test)]
    pub(crate) fn detached(agent_id: u64) -> Self {
        let (sender, _receiver) = mpsc::channel(1);
        Self { agent_id, sender }
    }

    async fn command(&self, command: Command) -> Result<CommandReply> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(AgentMsg::Command { command, reply })
            .await
            .map_err(|_| ControlError::AgentGone)?;
        rx.await.map_err(|_| ControlError::AgentGone)?
    }

    async fn run(&self, command: Command) -> Result<()> {
        self.command(command).await.map(|_| ())
    }

    pub async fn set_power(&self, power: Power) -> Result<()> {
        self.run(Command::SetPower(power)).await
    }

    pub async fn set_sleep(&self, minutes: u32) -> Result<()> {
        self.run(Command::SetSleep(minutes)).await
    }

    pub async fn set_input(&self, input: impl Into<String>) -> Result<()> {
        self.run(Command::SetInput(input.into())).await
    }

    pub async fn set_volume(&self, volume: i64) -> Result<()> {
        self.run(Command::SetVolume(volume)).await
    }

    pub async fn increase_volume(&self) -> Result<()> {
        self.run(Command::IncreaseVolume).await
    }

    pub async fn decrease_volume(&self) -> Result<()> {
        self.run(Command::DecreaseVolume).await
    }

    pub async fn mute(&self) -> Result<()> {
        self.run(Command::Mute).await
    }

    pub async fn unmute(&self) -> Result<()> {
        self.run(Command::Unmute).await
    }

    pub async fn playback_play(&self) -> Result<()> {
        self.run(Command::PlaybackPlay).await
    }

    pub async fn playback_pause(&self) -> Result<()> {
        self.run(Command::PlaybackPause).await
    }

    pub async fn playback_stop(&self) -> Result<()> {
        self.run(Command::PlaybackStop).await
    }

    pub async fn playback_next(&self) -> Result<()> {
        self.run(Command::PlaybackNext).await
    }

    pub async fn playback_previous(&self) -> Result<()> {
        self.run(Command::PlaybackPrevious).await
    }

    pub async fn toggle_play_pause(&self) -> Result<()> {
        self.run(Command::TogglePlayPause).await
    }

    pub async fn toggle_repeat(&self) -> Result<()> {
        self.run(Command::ToggleRepeat).await
    }

    pub async fn toggle_shuffle(&self) -> Result<()> {
        self.run(Command::ToggleShuffle).await
    }

    pub async fn playback_load(&self, url: impl Into<String>, metadata: Metadata) -> Result<()> {
        self.run(Command::PlaybackLoad {
            url: url.into(),
            metadata,
        })
        .await
    }

    pub async fn playback_load_next(
        &self,
        url: impl Into<String>,
        metadata: Metadata,
    ) -> Result<()> {
        self.run(Command::PlaybackLoadNext {
            url: url.into(),
            metadata,
        })
        .await
    }

    pub async fn playback_load_queue(&self, items: Vec<(String, TrackMetadata)>) -> Result<()> {
        self.run(Command::PlaybackLoadQueue { items }).await
    }

    /// Fetch part of the device state.
    pub async fn lookup(&self, lookup: Lookup) -> Result<Value> {
        match self.command(Command::Lookup(lookup)).await? {
            CommandReply::Snapshot(value) => Ok(value),
            CommandReply::Done => Ok(Value::Null),
        }
    }

    /// Request a graceful stop: queued messages drain, then the agent exits
    /// and releases its registry and pub/sub entries.
    pub async fn stop(&self) {
        let _ = self.sender.send(AgentMsg::Stop).await;
    }
}

/// Spawn an agent for the device at `ip` described by `root`.
pub(crate) fn spawn(ctx: AgentContext, ip: Ipv4Addr, root: RootDescription) -> AgentHandle {
    let host = ip.to_string();
    spawn_with_host(ctx, ip, host, root)
}

/// Spawn with an explicit `host` (lets tests point at a loopback port).
pub(crate) fn spawn_with_host(
    ctx: AgentContext,
    ip: Ipv4Addr,
    host: String,
    root: RootDescription,
) -> AgentHandle {
    let (sender, inbox) = mpsc::channel(INBOX_DEPTH);
    let agent_id = NEXT_AGENT_ID.fetch_add(1, Ordering::Relaxed);
    let handle = AgentHandle { agent_id, sender };
    let task_handle = handle.clone();

    tokio::spawn(async move {
        match DeviceAgent::initialize(ctx, ip, host, root, inbox, task_handle).await {
            Ok(agent) => agent.run().await,
            Err(e) => tracing::warn!(ip = %ip, error = %e, "device agent initialization failed"),
        }
    });

    handle
}

struct DeviceAgent {
    ctx: AgentContext,
    handle: AgentHandle,
    inbox: mpsc::Receiver<AgentMsg>,
    state: DeviceState,
    avtransport: Option<AvTransport>,
    event_sub_url: Option<String>,
    yxc_deadline: Instant,
    upnp_deadline: Option<Instant>,
}

impl DeviceAgent {
    /// Bring a device under management.
    ///
    /// Fetches identity and state over YXC (enrolling for unicast events),
    /// subscribes to UPnP eventing when a callback URL is configured,
    /// registers the device id, schedules both renewals and announces the
    /// device on the `"network"` topic. Any failing step aborts the agent
    /// with that error.
    async fn initialize(
        ctx: AgentContext,
        ip: Ipv4Addr,
        host: String,
        root: RootDescription,
        inbox: mpsc::Receiver<AgentMsg>,
        handle: AgentHandle,
    ) -> Result<Self> {
        let device_info = ctx.yxc.get_device_info(&host, true).await?;
        let device_id = device_info.device_id;
        let network_name = ctx.yxc.get_network_status(&host).await?.network_name;
        let available_inputs = ctx.yxc.get_features(&host).await?.input_ids();
        let status = ctx.yxc.get_status(&host, Zone::Main, false).await?;
        let mut playback = ctx.yxc.netusb_get_play_info(&host).await?;
        absolutize_albumart(&mut playback, &host);

        let avt_entry = root.avtransport().cloned();
        let avtransport = avt_entry
            .as_ref()
            .map(|e| AvTransport::new(ctx.soap.clone(), e.control_url.clone()));
        let event_sub_url = avt_entry.map(|e| e.event_sub_url);

        let mut upnp_session_id = None;
        let mut upnp_granted = 0u32;
        if let (Some(callback_url), Some(event_url)) =
            (ctx.config.upnp_callback_url.as_ref(), event_sub_url.as_ref())
        {
            let response = ctx
                .soap
                .subscribe(event_url, callback_url, UPNP_SUBSCRIBE_TIMEOUT_SECS)
                .await?;
            upnp_granted = response.timeout_seconds;
            upnp_session_id = Some(response.sid);
        }

        let entry = RegistryEntry {
            agent_id: handle.agent_id,
            host: ip,
            handle: handle.clone(),
        };
        if let Err(e) = ctx.registry.register(&device_id, entry).await {
            // Undo the subscription so the device does not notify a dead sid.
            if let (Some(sid), Some(event_url)) = (&upnp_session_id, &event_sub_url) {
                let _ = ctx.soap.unsubscribe(event_url, sid).await;
            }
            return Err(e);
        }
        if let Some(sid) = &upnp_session_id {
            ctx.registry.register_sid(sid, &device_id).await;
        }

        let yxc_deadline =
            Instant::now() + renewal_interval(musiccast_yxc::SUBSCRIPTION_TIMEOUT_SECS as u32);
        let upnp_deadline = upnp_session_id
            .as_ref()
            .map(|_| Instant::now() + renewal_interval(upnp_granted));

        let state = DeviceState {
            host,
            device_id,
            network_name,
            available_inputs,
            status,
            playback,
            upnp_service: root,
            upnp: None,
            upnp_session_id,
            playback_queue: PlaybackQueue::default(),
        };

        tracing::info!(device_id = %state.device_id, host = %state.host, "device online");
        ctx.pubsub
            .publish(
                NETWORK_TOPIC,
                StateDelta::Online {
                    state: state.snapshot(),
                },
            )
            .await;

        Ok(Self {
            ctx,
            handle,
            inbox,
            state,
            avtransport,
            event_sub_url,
            yxc_deadline,
            upnp_deadline,
        })
    }

    async fn run(mut self) {
        let reason = self.event_loop().await;
        match &reason {
            ExitReason::Stopped => {
                tracing::info!(device_id = %self.state.device_id, "device agent stopped")
            }
            ExitReason::RenewalFailed(e) => tracing::warn!(
                device_id = %self.state.device_id,
                error = %e,
                "subscription renewal failed, terminating agent"
            ),
        }
        self.shutdown().await;
    }

    async fn event_loop(&mut self) -> ExitReason {
        loop {
            let yxc_sleep = tokio::time::sleep_until(self.yxc_deadline);
            tokio::pin!(yxc_sleep);
            let upnp_enabled = self.upnp_deadline.is_some();
            let upnp_at = self
                .upnp_deadline
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400));
            let upnp_sleep = tokio::time::sleep_until(upnp_at);
            tokio::pin!(upnp_sleep);

            tokio::select! {
                message = self.inbox.recv() => match message {
                    Some(AgentMsg::Command { command, reply }) => {
                        let result = self.handle_command(command).await;
                        let _ = reply.send(result);
                    }
                    Some(AgentMsg::YxcEvent(payload)) => self.handle_yxc_event(payload).await,
                    Some(AgentMsg::UpnpEvent(event)) => self.handle_upnp_event(event).await,
                    Some(AgentMsg::Stop) => {
                        self.drain().await;
                        return ExitReason::Stopped;
                    }
                    None => return ExitReason::Stopped,
                },
                _ = &mut yxc_sleep => {
                    if let Err(e) = self.yxc_renewal_tick().await {
                        return ExitReason::RenewalFailed(e);
                    }
                }
                _ = &mut upnp_sleep, if upnp_enabled => {
                    if let Err(e) = self.upnp_renewal_tick().await {
                        return ExitReason::RenewalFailed(e);
                    }
                }
            }
        }
    }

    /// Serve messages already enqueued, then return.
    async fn drain(&mut self) {
        self.inbox.close();
        while let Some(message) = self.inbox.recv().await {
            match message {
                AgentMsg::Command { command, reply } => {
                    let result = self.handle_command(command).await;
                    let _ = reply.send(result);
                }
                AgentMsg::YxcEvent(payload) => self.handle_yxc_event(payload).await,
                AgentMsg::UpnpEvent(event) => self.handle_upnp_event(event).await,
                AgentMsg::Stop => {}
            }
        }
    }

    async fn shutdown(self) {
        if let (Some(sid), Some(event_url)) = (&self.state.upnp_session_id, &self.event_sub_url) {
            let _ = self.ctx.soap.unsubscribe(event_url, sid).await;
        }
        self.ctx.registry.remove_agent(self.handle.agent_id).await;
        self.ctx
            .pubsub
            .publish(
                NETWORK_TOPIC,
                StateDelta::Offline {
                    device_id: self.state.device_id.clone(),
                },
            )
            .await;
    }

    // ---- commands --------------------------------------------------------

    async fn handle_command(&mut self, command: Command) -> Result<CommandReply> {
        let host = self.state.host.clone();
        let yxc = self.ctx.yxc.clone();
        match command {
            Command::SetPower(power) => yxc.set_power(&host, Zone::Main, power).await?,
            Command::SetSleep(minutes) => yxc.set_sleep(&host, Zone::Main, minutes).await?,
            Command::SetInput(input) => yxc.set_input(&host, Zone::Main, &input).await?,
            Command::SetVolume(level) => {
                yxc.set_volume(&host, Zone::Main, VolumeChange::Level(level))
                    .await?
            }
            Command::IncreaseVolume => {
                yxc.set_volume(
                    &host,
                    Zone::Main,
                    VolumeChange::Up(self.ctx.config.volume_step),
                )
                .await?
            }
            Command::DecreaseVolume => {
                yxc.set_volume(
                    &host,
                    Zone::Main,
                    VolumeChange::Down(self.ctx.config.volume_step),
                )
                .await?
            }
            Command::Mute => yxc.set_mute(&host, Zone::Main, true).await?,
            Command::Unmute => yxc.set_mute(&host, Zone::Main, false).await?,
            Command::PlaybackPlay => {
                yxc.netusb_set_playback(&host, PlaybackCommand::Play).await?
            }
            Command::PlaybackPause => {
                yxc.netusb_set_playback(&host, PlaybackCommand::Pause).await?
            }
            Command::PlaybackStop => {
                yxc.netusb_set_playback(&host, PlaybackCommand::Stop).await?
            }
            Command::TogglePlayPause => {
                yxc.netusb_set_playback(&host, PlaybackCommand::PlayPause)
                    .await?
            }
            Command::ToggleRepeat => yxc.netusb_toggle_repeat(&host).await?,
            Command::ToggleShuffle => yxc.netusb_toggle_shuffle(&host).await?,
            Command::PlaybackNext => return self.queue_advance(QueueDirection::Next).await,
            Command::PlaybackPrevious => {
                return self.queue_advance(QueueDirection::Previous).await
            }
            Command::PlaybackLoad { url, metadata } => {
                let before = self.state.snapshot();
                self.upnp_load(&url, &metadata).await?;
                self.state.playback_queue.media_url = None;
                self.publish_changes(&before).await;
            }
            Command::PlaybackLoadNext { url, metadata } => {
                self.transport()?
                    .set_next_av_transport_uri(0, &url, &metadata)
                    .await
                    .map_err(ControlError::from)?;
            }
            Command::PlaybackLoadQueue { items } => {
                let before = self.state.snapshot();
                let first = items.first().cloned();
                self.state.playback_queue.items = items;
                if let Some((url, meta)) = first {
                    self.upnp_load(&url, &Metadata::Track(meta)).await?;
                    self.state.playback_queue.media_url = Some(url);
                }
                self.publish_changes(&before).await;
            }
            Command::Lookup(lookup) => return self.lookup(lookup),
        }
        Ok(CommandReply::Done)
    }

    fn transport(&self) -> Result<&AvTransport> {
        self.avtransport.as_ref().ok_or(ControlError::NoTransport)
    }

    /// Stop, load the URI (with metadata) and start playback.
    async fn upnp_load(&mut self, url: &str, metadata: &Metadata) -> Result<()> {
        let transport = self.transport()?;
        transport.stop(0).await.map_err(ControlError::from)?;
        transport
            .set_av_transport_uri(0, url, metadata)
            .await
            .map_err(ControlError::from)?;
        transport.play(0, "1").await.map_err(ControlError::from)?;
        Ok(())
    }

    /// Advance within the playback queue, or fall through to the device's
    /// own next/previous when no queue is loaded.
    async fn queue_advance(&mut self, direction: QueueDirection) -> Result<CommandReply> {
        if !self.state.playback_queue.is_active() {
            let verb = match direction {
                QueueDirection::Next => PlaybackCommand::Next,
                QueueDirection::Previous => PlaybackCommand::Previous,
            };
            self.ctx
                .yxc
                .netusb_set_playback(&self.state.host, verb)
                .await?;
            return Ok(CommandReply::Done);
        }

        let shuffled = self.state.playback.shuffle.as_deref() == Some("on");
        let target = if shuffled {
            self.state.playback_queue.random_item()
        } else {
            match direction {
                QueueDirection::Next => self.state.playback_queue.next_item(),
                QueueDirection::Previous => self.state.playback_queue.previous_item(),
            }
        }
        .cloned();

        if let Some((url, meta)) = target {
            let before = self.state.snapshot();
            self.upnp_load(&url, &Metadata::Track(meta)).await?;
            self.state.playback_queue.media_url = Some(url);
            self.publish_changes(&before).await;
        }
        Ok(CommandReply::Done)
    }

    fn lookup(&self, lookup: Lookup) -> Result<CommandReply> {
        let snapshot = self.state.snapshot();
        let object = snapshot.as_object().expect("state snapshot is an object");

        let value = match lookup {
            Lookup::All => snapshot.clone(),
            Lookup::Key(key) => {
                if !STATE_KEYS.contains(&key.as_str()) {
                    return Err(ControlError::Argument(format!("unknown state key {key}")));
                }
                object.get(&key).cloned().unwrap_or(Value::Null)
            }
            Lookup::Keys(keys) => {
                let mut out = Map::new();
                for key in keys {
                    if !STATE_KEYS.contains(&key.as_str()) {
                        return Err(ControlError::Argument(format!("unknown state key {key}")));
                    }
                    out.insert(key.clone(), object.get(&key).cloned().unwrap_or(Value::Null));
                }
                Value::Object(out)
            }
        };
        Ok(CommandReply::Snapshot(value))
    }

    // ---- events ----------------------------------------------------------

    /// Flags in YXC event payloads that are consumed by the handler chain
    /// rather than merged into state.
    const DRAINED_FLAGS: &'static [&'static str] = &[
        "status_updated",
        "play_info_updated",
        "signal_info_updated",
        "recent_info_updated",
        "play_queue",
    ];

    async fn handle_yxc_event(&mut self, payload: Map<String, Value>) {
        let before = self.state.snapshot();

        for (section, value) in &payload {
            let dict = match value.as_object() {
                Some(d) => d,
                None => continue,
            };
            let zone = Zone::from_name(section).unwrap_or(Zone::Main);

            if dict.get("status_updated").and_then(Value::as_bool) == Some(true) {
                match self.ctx.yxc.get_status(&self.state.host, zone, false).await {
                    Ok(status) => self.state.status = status,
                    Err(e) => {
                        tracing::warn!(device_id = %self.state.device_id, error = %e, "status refetch failed")
                    }
                }
            }

            if dict.get("play_info_updated").and_then(Value::as_bool) == Some(true) {
                match self.ctx.yxc.netusb_get_play_info(&self.state.host).await {
                    Ok(mut playback) => {
                        absolutize_albumart(&mut playback, &self.state.host);
                        self.state.playback = playback;
                    }
                    Err(e) => {
                        tracing::warn!(device_id = %self.state.device_id, error = %e, "play info refetch failed")
                    }
                }
            }

            let patch: Map<String, Value> = dict
                .iter()
                .filter(|(k, _)| !Self::DRAINED_FLAGS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            if !patch.is_empty() {
                self.merge_into_state(&Value::Object(patch));
            }
        }

        self.publish_changes(&before).await;
    }

    /// Field-wise merge of leftover event keys into status and playback.
    /// Only fields the targets already carry are overwritten.
    fn merge_into_state(&mut self, patch: &Value) {
        let mut status = serde_json::to_value(&self.state.status).expect("status serializes");
        diff::merge_existing(&mut status, patch);
        if let Ok(status) = serde_json::from_value(status) {
            self.state.status = status;
        }

        let mut playback = serde_json::to_value(&self.state.playback).expect("playback serializes");
        diff::merge_existing(&mut playback, patch);
        if let Ok(playback) = serde_json::from_value(playback) {
            let host = self.state.host.clone();
            self.state.playback = playback;
            absolutize_albumart(&mut self.state.playback, &host);
        }
    }

    async fn handle_upnp_event(&mut self, event: AvTransportEvent) {
        let before = self.state.snapshot();

        let previous_uri = self
            .state
            .upnp
            .as_ref()
            .and_then(|e| e.av_transport_uri.clone());
        let new_uri = event.av_transport_uri.clone();
        self.state.upnp = Some(event);

        if let Some(uri) = new_uri {
            if Some(&uri) != previous_uri.as_ref() {
                self.state.playback_queue.media_url = Some(uri.clone());

                // Preload the following queue item for gapless playback.
                if self.state.playback_queue.is_active() {
                    if let (Some((next_url, next_meta)), Some(transport)) = (
                        self.state.playback_queue.item_after(&uri).cloned(),
                        self.avtransport.clone(),
                    ) {
                        tokio::spawn(async move {
                            if let Err(e) = transport
                                .set_next_av_transport_uri(
                                    0,
                                    &next_url,
                                    &Metadata::Track(next_meta),
                                )
                                .await
                            {
                                tracing::debug!(error = %e, "gapless preload failed");
                            }
                        });
                    }
                }
            }
        }

        self.publish_changes(&before).await;
    }

    // ---- renewals --------------------------------------------------------

    /// Refresh the YXC unicast event enrollment. Fatal on error.
    async fn yxc_renewal_tick(&mut self) -> Result<()> {
        self.ctx
            .yxc
            .get_status(&self.state.host, Zone::Main, true)
            .await?;
        self.yxc_deadline =
            Instant::now() + renewal_interval(musiccast_yxc::SUBSCRIPTION_TIMEOUT_SECS as u32);
        Ok(())
    }

    /// Renew the GENA subscription. A changed sid is taken over and
    /// published; errors are fatal.
    async fn upnp_renewal_tick(&mut self) -> Result<()> {
        let sid = match self.state.upnp_session_id.clone() {
            Some(sid) => sid,
            None => {
                self.upnp_deadline = None;
                return Ok(());
            }
        };
        let event_url = match self.event_sub_url.clone() {
            Some(url) => url,
            None => {
                self.upnp_deadline = None;
                return Ok(());
            }
        };

        let response = self
            .ctx
            .soap
            .subscribe(&event_url, &sid, UPNP_SUBSCRIBE_TIMEOUT_SECS)
            .await?;

        if response.sid != sid {
            let before = self.state.snapshot();
            self.state.upnp_session_id = Some(response.sid.clone());
            self.ctx.registry.unregister_sid(&sid).await;
            self.ctx
                .registry
                .register_sid(&response.sid, &self.state.device_id)
                .await;
            self.publish_changes(&before).await;
        }

        self.upnp_deadline = Some(Instant::now() + renewal_interval(response.timeout_seconds));
        Ok(())
    }

    // ---- diffing ---------------------------------------------------------

    async fn publish_changes(&mut self, before: &Value) {
        let after = self.state.snapshot();
        if let Some(changes) = diff::diff(before, &after) {
            self.ctx
                .pubsub
                .publish(
                    &self.state.device_id,
                    StateDelta::Update {
                        device_id: self.state.device_id.clone(),
                        changes,
                    },
                )
                .await;
        }
    }
}

enum QueueDirection {
    Next,
    Previous,
}


enum ExitReason {
    Stopped,
    RenewalFailed(ControlError),
}
