//! End-to-end tests of the agent lifecycle against a mock device.
//!
//! A mockito server plays the device: it answers the YXC REST endpoints, the
//! GENA subscription requests and the AVTransport SOAP actions. Agents are
//! started through the supervisor exactly as discovery would start them.

use std::net::Ipv4Addr;
use std::time::Duration;

use mockito::{Matcher, Server, ServerGuard};

use musiccast_net::{
    serve_yxc_events, Config, DeviceRegistry, Metadata, PubSub, StateDelta, Supervisor,
    TrackMetadata, NETWORK_TOPIC,
};
use musiccast_soap::SoapClient;
use musiccast_upnp::RootDescription;
use musiccast_yxc::YxcClient;

const DEVICE_ID: &str = "00A0DEDCF73E";

fn description_xml() -> &'static str {
    r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>Living Room</friendlyName>
    <manufacturer>Yamaha Corporation</manufacturer>
    <modelName>WX-030</modelName>
    <UDN>uuid:9ab0c000-f668-11de-9976-00a0dedcf73e</UDN>
    <iconList>
      <icon>
        <mimetype>image/jpeg</mimetype>
        <width>120</width>
        <height>120</height>
        <depth>24</depth>
        <url>/Icons/120x120.jpg</url>
      </icon>
    </iconList>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:AVTransport</serviceId>
        <SCPDURL>/AVTransport/desc.xml</SCPDURL>
        <controlURL>/AVTransport/ctrl</controlURL>
        <eventSubURL>/AVTransport/event</eventSubURL>
      </service>
    </serviceList>
  </device>
</root>"#
}

/// Mount the YXC endpoints the agent touches during initialization.
async fn mock_yxc_init(server: &mut ServerGuard) {
    server
        .mock("GET", "/YamahaExtendedControl/v1/system/getDeviceInfo")
        .match_header("x-appname", "MusicCast/1.50")
        .with_body(format!(
            r#"{{"response_code": 0, "device_id": "{}", "model_name": "WX-030"}}"#,
            DEVICE_ID
        ))
        .create_async()
        .await;
    server
        .mock("GET", "/YamahaExtendedControl/v1/system/getNetworkStatus")
        .with_body(r#"{"response_code": 0, "network_name": "Living Room"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/YamahaExtendedControl/v1/system/getFeatures")
        .with_body(
            r#"{"response_code": 0, "system": {"input_list": [{"id": "net_radio"}, {"id": "bluetooth"}]}}"#,
        )
        .create_async()
        .await;
    server
        .mock("GET", "/YamahaExtendedControl/v1/main/getStatus")
        .with_body(
            r#"{"response_code": 0, "power": "on", "volume": 30, "max_volume": 60, "mute": false}"#,
        )
        .create_async()
        .await;
    server
        .mock("GET", "/YamahaExtendedControl/v1/netusb/getPlayInfo")
        .with_body(
            r#"{"response_code": 0, "input": "net_radio", "playback": "stop", "shuffle": "off", "albumart_url": "/AlbumART/1.jpg"}"#,
        )
        .create_async()
        .await;
}

async fn mock_gena_subscribe(server: &mut ServerGuard, sid: &str) {
    server
        .mock("SUBSCRIBE", "/AVTransport/event")
        .match_header("nt", "upnp:event")
        .with_header("SID", sid)
        .with_header("TIMEOUT", "Second-300")
        .create_async()
        .await;
}

fn soap_ok(action: &str) -> String {
    format!(
        r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><u:{a}Response xmlns:u="urn:schemas-upnp-org:service:AVTransport:1"></u:{a}Response></s:Body></s:Envelope>"#,
        a = action
    )
}

struct Harness {
    server: ServerGuard,
    registry: DeviceRegistry,
    pubsub: PubSub,
    supervisor: Supervisor,
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

async fn harness(callback_url: Option<String>) -> Harness {
    init_tracing();
    let server = Server::new_async().await;
    let registry = DeviceRegistry::new();
    let pubsub = PubSub::new();
    let mut config = Config::default();
    config.upnp_callback_url = callback_url;

    let supervisor = Supervisor::new(
        YxcClient::new(),
        SoapClient::new(),
        registry.clone(),
        pubsub.clone(),
        config,
    );

    Harness {
        server,
        registry,
        pubsub,
        supervisor,
    }
}

impl Harness {
    fn root(&self) -> RootDescription {
        RootDescription::parse(description_xml(), &format!("{}/desc.xml", self.server.url()))
            .unwrap()
    }

    fn start_agent(&self) -> musiccast_net::AgentHandle {
        self.supervisor.add_device_with_host(
            Ipv4Addr::new(192, 168, 1, 10),
            self.server.host_with_port(),
            self.root(),
        )
    }
}

async fn expect_online(
    subscription: &mut musiccast_net::Subscription,
) -> serde_json::Value {
    let delta = tokio::time::timeout(Duration::from_secs(3), subscription.recv())
        .await
        .expect("online announcement within 3s")
        .expect("subscription alive");
    match delta {
        StateDelta::Online { state } => state,
        other => panic!("expected Online, got {:?}", other),
    }
}

#[tokio::test]
async fn initialization_announces_online_and_registers() {
    let mut h = harness(Some("http://192.168.1.50:8090/upnp".to_string())).await;
    mock_yxc_init(&mut h.server).await;
    mock_gena_subscribe(&mut h.server, "uuid:sub-1").await;

    let mut network = h.pubsub.subscribe(NETWORK_TOPIC).await;
    h.start_agent();

    let state = expect_online(&mut network).await;
    assert_eq!(state["device_id"], DEVICE_ID);
    assert_eq!(state["network_name"], "Living Room");
    assert_eq!(
        state["available_inputs"],
        serde_json::json!(["net_radio", "bluetooth"])
    );
    assert_eq!(state["status"]["volume"], 30);
    assert_eq!(state["upnp_session_id"], "uuid:sub-1");

    // Album art was made absolute against the device host.
    let art = state["playback"]["albumart_url"].as_str().unwrap();
    assert_eq!(art, format!("http://{}/AlbumART/1.jpg", h.server.host_with_port()));

    // UPnP description URLs are absolute.
    let control_url = state["upnp_service"]["device"]["service_list"][0]["control_url"]
        .as_str()
        .unwrap();
    assert!(control_url.starts_with("http://"));

    // Exactly one registry entry, reachable by sid as well.
    assert_eq!(h.registry.device_ids().await, vec![DEVICE_ID.to_string()]);
    assert!(h.registry.find_by_sid("uuid:sub-1").await.is_some());
}

#[tokio::test]
async fn no_callback_url_means_no_subscription() {
    let mut h = harness(None).await;
    mock_yxc_init(&mut h.server).await;
    // No GENA mock mounted: a SUBSCRIBE request would 501 and kill the init.

    let mut network = h.pubsub.subscribe(NETWORK_TOPIC).await;
    h.start_agent();

    let state = expect_online(&mut network).await;
    assert_eq!(state["upnp_session_id"], serde_json::Value::Null);
}

#[tokio::test]
async fn duplicate_device_id_is_rejected() {
    let mut h = harness(None).await;
    mock_yxc_init(&mut h.server).await;

    let mut network = h.pubsub.subscribe(NETWORK_TOPIC).await;
    let first = h.start_agent();
    expect_online(&mut network).await;

    let second = h.start_agent();
    // The duplicate agent terminates during initialization.
    tokio::time::timeout(Duration::from_secs(3), async {
        while !second.is_closed() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("duplicate agent exits");

    assert!(!first.is_closed());
    assert_eq!(h.registry.device_ids().await.len(), 1);
}

#[tokio::test]
async fn volume_event_produces_minimal_delta() {
    let mut h = harness(None).await;
    mock_yxc_init(&mut h.server).await;
    let set_volume = h
        .server
        .mock("GET", "/YamahaExtendedControl/v1/main/setVolume")
        .match_query(Matcher::UrlEncoded("volume".into(), "42".into()))
        .with_body(r#"{"response_code": 0}"#)
        .create_async()
        .await;

    let mut network = h.pubsub.subscribe(NETWORK_TOPIC).await;
    let handle = h.start_agent();
    expect_online(&mut network).await;

    let mut deltas = h.pubsub.subscribe(DEVICE_ID).await;

    // Command goes out; the device acknowledges and then pushes the event.
    handle.set_volume(42).await.unwrap();
    set_volume.assert_async().await;

    let (ingress_addr, _task) = serve_yxc_events(h.registry.clone(), 0).await.unwrap();
    let probe = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    probe
        .send_to(
            format!(r#"{{"device_id":"{}","main":{{"volume":42}}}}"#, DEVICE_ID).as_bytes(),
            ("127.0.0.1", ingress_addr.port()),
        )
        .await
        .unwrap();

    let delta = tokio::time::timeout(Duration::from_secs(3), deltas.recv())
        .await
        .expect("delta within 3s")
        .unwrap();
    match delta {
        StateDelta::Update { device_id, changes } => {
            assert_eq!(device_id, DEVICE_ID);
            assert_eq!(changes, serde_json::json!({"status": {"volume": 42}}));
        }
        other => panic!("expected update, got {:?}", other),
    }
}

#[tokio::test]
async fn unknown_device_unicast_is_dropped() {
    let mut h = harness(None).await;
    mock_yxc_init(&mut h.server).await;

    let mut network = h.pubsub.subscribe(NETWORK_TOPIC).await;
    h.start_agent();
    expect_online(&mut network).await;

    let mut deltas = h.pubsub.subscribe(DEVICE_ID).await;

    let (ingress_addr, _task) = serve_yxc_events(h.registry.clone(), 0).await.unwrap();
    let probe = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    probe
        .send_to(
            br#"{"device_id":"ZZZZ","main":{"volume":5}}"#,
            ("127.0.0.1", ingress_addr.port()),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(deltas.try_recv().is_none());
    assert_eq!(h.registry.device_ids().await.len(), 1);
}

#[tokio::test]
async fn load_url_issues_stop_set_play() {
    let mut h = harness(None).await;
    mock_yxc_init(&mut h.server).await;

    let stop = h
        .server
        .mock("POST", "/AVTransport/ctrl")
        .match_header(
            "soapaction",
            "\"urn:schemas-upnp-org:service:AVTransport:1#Stop\"",
        )
        .with_body(soap_ok("Stop"))
        .create_async()
        .await;
    let set_uri = h
        .server
        .mock("POST", "/AVTransport/ctrl")
        .match_header(
            "soapaction",
            "\"urn:schemas-upnp-org:service:AVTransport:1#SetAVTransportURI\"",
        )
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("http://media/a.m4a".to_string()),
            Matcher::Regex("0:04:00".to_string()),
            Matcher::Regex("DLNA.ORG_PN=AAC_ISO_320".to_string()),
        ]))
        .with_body(soap_ok("SetAVTransportURI"))
        .create_async()
        .await;
    let play = h
        .server
        .mock("POST", "/AVTransport/ctrl")
        .match_header(
            "soapaction",
            "\"urn:schemas-upnp-org:service:AVTransport:1#Play\"",
        )
        .match_body(Matcher::Regex("<Speed>1</Speed>".to_string()))
        .with_body(soap_ok("Play"))
        .create_async()
        .await;

    let mut network = h.pubsub.subscribe(NETWORK_TOPIC).await;
    let handle = h.start_agent();
    expect_online(&mut network).await;

    let meta = Metadata::Track(TrackMetadata {
        title: Some("A".to_string()),
        mimetype: Some("audio/mp4".to_string()),
        duration_seconds: Some(240),
        ..TrackMetadata::default()
    });
    handle.playback_load("http://media/a.m4a", meta).await.unwrap();

    stop.assert_async().await;
    set_uri.assert_async().await;
    play.assert_async().await;
}

#[tokio::test]
async fn queue_load_then_next_walks_the_queue() {
    let mut h = harness(None).await;
    mock_yxc_init(&mut h.server).await;
    for action in ["Stop", "SetAVTransportURI", "Play"] {
        h.server
            .mock("POST", "/AVTransport/ctrl")
            .match_header(
                "soapaction",
                format!("\"urn:schemas-upnp-org:service:AVTransport:1#{}\"", action).as_str(),
            )
            .with_body(soap_ok(action))
            .create_async()
            .await;
    }

    let mut network = h.pubsub.subscribe(NETWORK_TOPIC).await;
    let handle = h.start_agent();
    expect_online(&mut network).await;

    let items: Vec<(String, TrackMetadata)> = ["u1", "u2", "u3"]
        .iter()
        .map(|u| (u.to_string(), TrackMetadata::default()))
        .collect();
    handle.playback_load_queue(items).await.unwrap();

    let queue = handle
        .lookup(musiccast_net::Lookup::Key("playback_queue".to_string()))
        .await
        .unwrap();
    assert_eq!(queue["media_url"], "u1");

    // Shuffle is "off" in the mocked play info, so next is the neighbor.
    handle.playback_next().await.unwrap();
    let queue = handle
        .lookup(musiccast_net::Lookup::Key("playback_queue".to_string()))
        .await
        .unwrap();
    assert_eq!(queue["media_url"], "u2");

    handle.playback_previous().await.unwrap();
    let queue = handle
        .lookup(musiccast_net::Lookup::Key("playback_queue".to_string()))
        .await
        .unwrap();
    assert_eq!(queue["media_url"], "u1");
}

#[tokio::test]
async fn commands_execute_in_dispatch_order() {
    let mut h = harness(None).await;
    mock_yxc_init(&mut h.server).await;
    let set_volume = h
        .server
        .mock("GET", "/YamahaExtendedControl/v1/main/setVolume")
        .match_query(Matcher::Any)
        .with_body(r#"{"response_code": 0}"#)
        .expect(10)
        .create_async()
        .await;

    let mut network = h.pubsub.subscribe(NETWORK_TOPIC).await;
    let handle = h.start_agent();
    expect_online(&mut network).await;

    // Fire ten commands concurrently; each must complete before the next
    // begins, so all ten replies arrive without interleaving failures.
    let mut joins = Vec::new();
    for n in 0..10 {
        let handle = handle.clone();
        joins.push(tokio::spawn(async move { handle.set_volume(n).await }));
    }
    for join in joins {
        join.await.unwrap().unwrap();
    }
    set_volume.assert_async().await;
}

#[tokio::test]
async fn stop_unsubscribes_and_reclaims_entries() {
    let mut h = harness(Some("http://192.168.1.50:8090/upnp".to_string())).await;
    mock_yxc_init(&mut h.server).await;
    mock_gena_subscribe(&mut h.server, "uuid:sub-9").await;
    let unsubscribe = h
        .server
        .mock("UNSUBSCRIBE", "/AVTransport/event")
        .match_header("sid", "uuid:sub-9")
        .create_async()
        .await;

    let mut network = h.pubsub.subscribe(NETWORK_TOPIC).await;
    let handle = h.start_agent();
    expect_online(&mut network).await;

    handle.stop().await;

    let delta = tokio::time::timeout(Duration::from_secs(3), network.recv())
        .await
        .expect("offline within 3s")
        .unwrap();
    match delta {
        StateDelta::Offline { device_id } => assert_eq!(device_id, DEVICE_ID),
        other => panic!("expected Offline, got {:?}", other),
    }

    unsubscribe.assert_async().await;
    assert!(h.registry.device_ids().await.is_empty());
    assert!(h.registry.find_by_sid("uuid:sub-9").await.is_none());
}

#[tokio::test]
async fn init_failure_leaves_no_registry_entry() {
    let mut h = harness(None).await;
    // Only device info answers; network status is missing, so init fails.
    h.server
        .mock("GET", "/YamahaExtendedControl/v1/system/getDeviceInfo")
        .with_body(format!(
            r#"{{"response_code": 0, "device_id": "{}"}}"#,
            DEVICE_ID
        ))
        .create_async()
        .await;

    let handle = h.start_agent();
    tokio::time::timeout(Duration::from_secs(3), async {
        while !handle.is_closed() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("agent exits after failed init");

    assert!(h.registry.device_ids().await.is_empty());
}
