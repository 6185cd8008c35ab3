//! End-to-end tests for the bridge.
//!
//! The host side of the serial link is one end of a `tokio::io::duplex`
//! pipe. Network collaborators are either the mocks or real local servers
//! (axum for HTTP, tokio-tungstenite for WebSocket).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::net::TcpListener;
use tokio::time::timeout;

use flipper_bridge_core::{BridgeConfig, FileSettingsStorage, MemorySettingsStorage, SettingsStorage};
use flipper_bridge_engine::mock::{MockConnector, MockHttpClient, MockReply, MockWifi};
use flipper_bridge_engine::{
    Bridge, Exit, HttpClient, LogLed, SettingsBridge, StreamTransport, TungsteniteConnector,
    UreqClient, WebSocketConnector,
};

type Device = StreamTransport<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

fn serial_link() -> (DuplexStream, Device) {
    let (host, device) = duplex(256 * 1024);
    let (rx, tx) = tokio::io::split(device);
    (host, StreamTransport::new(rx, tx))
}

fn build<H, C>(
    config: BridgeConfig,
    transport: Device,
    http: H,
    sockets: C,
    storage: Arc<MemorySettingsStorage>,
) -> Bridge<Device, H, C, MockWifi, Arc<MemorySettingsStorage>, LogLed>
where
    H: HttpClient,
    C: WebSocketConnector,
{
    let wifi = MockWifi::new().with_network("home", "secret");
    let settings = SettingsBridge::new(wifi, storage);
    Bridge::new(config, transport, http, sockets, settings, LogLed::new(true))
}

/// Read from the host end until `needle` shows up.
async fn read_until(host: &mut DuplexStream, seen: &mut String, needle: &str) {
    let wait = async {
        let mut buf = [0u8; 1024];
        while !seen.contains(needle) {
            let n = host.read(&mut buf).await.unwrap();
            assert!(n > 0, "link closed before {:?}; got {:?}", needle, seen);
            seen.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
    };
    timeout(Duration::from_secs(10), wait)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {:?}", needle));
}

/// Send `input`, close the host's write side, and collect the replies.
async fn exchange<H, C>(
    mut host: DuplexStream,
    bridge: &mut Bridge<Device, H, C, MockWifi, Arc<MemorySettingsStorage>, LogLed>,
    input: &str,
) -> (Exit, String)
where
    H: HttpClient,
    C: WebSocketConnector,
{
    host.write_all(input.as_bytes()).await.unwrap();
    host.shutdown().await.unwrap();

    let exit = bridge.run().await.unwrap();
    // Replies are buffered in the pipe; the bridge keeps its end open.
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    while let Ok(Ok(n)) = timeout(Duration::from_millis(100), host.read(&mut buf)).await {
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    (exit, String::from_utf8_lossy(&out).into_owned())
}

// ---------------------------------------------------------------------------
// Dispatcher scenarios with scripted collaborators
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_get_streams_head_and_body() {
    let (host, transport) = serial_link();
    let http = MockHttpClient::new().with_reply(MockReply::ok(200, "ok"));
    let mut bridge = build(
        BridgeConfig::default(),
        transport,
        http.clone(),
        MockConnector::new(),
        Arc::new(MemorySettingsStorage::new()),
    );

    let (exit, out) = exchange(host, &mut bridge, "[GET]\nhttp://example.com\n").await;

    assert_eq!(exit, Exit::TransportClosed);
    assert_eq!(out, "[200][2]ok");
    assert_eq!(http.open_bodies(), 0);
}

#[tokio::test]
async fn test_unknown_tag_produces_nothing() {
    let (host, transport) = serial_link();
    let mut bridge = build(
        BridgeConfig::default(),
        transport,
        MockHttpClient::new(),
        MockConnector::new(),
        Arc::new(MemorySettingsStorage::new()),
    );

    let (_, out) = exchange(host, &mut bridge, "[FOO]\n").await;

    assert_eq!(out, "");
}

#[tokio::test(start_paused = true)]
async fn test_unresponsive_server_gets_one_error_frame() {
    let (host, transport) = serial_link();
    let http = MockHttpClient::new().with_reply(MockReply::Hang);
    let config = BridgeConfig {
        http_timeout_ms: 10_000,
        ..Default::default()
    };
    let mut bridge = build(
        config,
        transport,
        http,
        MockConnector::new(),
        Arc::new(MemorySettingsStorage::new()),
    );

    let started = tokio::time::Instant::now();
    let (_, out) = exchange(host, &mut bridge, "[GET] http://example.com\n").await;

    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(out, "[ERROR] Request timed out after 10000 ms\n");
}

#[tokio::test]
async fn test_wifi_save_validation_persists_nothing() {
    let (host, transport) = serial_link();
    let storage = Arc::new(MemorySettingsStorage::new());
    let mut bridge = build(
        BridgeConfig::default(),
        transport,
        MockHttpClient::new(),
        MockConnector::new(),
        storage.clone(),
    );

    let (_, out) = exchange(
        host,
        &mut bridge,
        "[WIFI/SAVE] {\"ssid\":\"\",\"password\":\"secret\"}\n",
    )
    .await;

    assert!(out.starts_with("[ERROR] "));
    assert_eq!(out.lines().count(), 1);
    assert_eq!(storage.save_count(), 0);
}

#[tokio::test]
async fn test_wifi_save_twice_is_idempotent() {
    let (host, transport) = serial_link();
    let storage = Arc::new(MemorySettingsStorage::new());
    let mut bridge = build(
        BridgeConfig::default(),
        transport,
        MockHttpClient::new(),
        MockConnector::new(),
        storage.clone(),
    );
    let save = "[WIFI/SAVE]\n{\"ssid\":\"home\",\"password\":\"secret\"}\n";

    let (_, out) = exchange(host, &mut bridge, &save.repeat(2)).await;

    let expected = "[SUCCESS] Settings saved and connected to home.\n";
    assert_eq!(out, expected.repeat(2));
    let stored = storage.load().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored.networks[0].password, "secret");
}

#[tokio::test]
async fn test_wifi_commands_after_save() {
    let (host, transport) = serial_link();
    let mut bridge = build(
        BridgeConfig::default(),
        transport,
        MockHttpClient::new(),
        MockConnector::new(),
        Arc::new(MemorySettingsStorage::new()),
    );
    let input = concat!(
        "[WIFI/SAVE] {\"ssid\":\"home\",\"password\":\"secret\",\"connect\":false}\n",
        "[WIFI/STATUS]\n",
        "[WIFI/CONNECT]\n",
        "[WIFI/IP]\n",
        "[WIFI/LIST]\n",
        "[WIFI/DISCONNECT]\n",
        "[WIFI/STATUS]\n",
    );

    let (_, out) = exchange(host, &mut bridge, input).await;

    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(
        lines,
        vec![
            "[SUCCESS] Settings saved.",
            "false",
            "[SUCCESS] Connected to home.",
            "192.168.4.2",
            "{\"networks\":[\"home\"]}",
            "[DISCONNECTED] Wi-Fi has been disconnected.",
            "false",
        ]
    );
}

#[tokio::test]
async fn test_boot_joins_saved_network() {
    let (host, transport) = serial_link();
    let storage = Arc::new(MemorySettingsStorage::new());
    let mut saved = flipper_bridge_core::WifiSettings::default();
    saved.remember(flipper_bridge_core::WifiCredentials::new("home", "secret").unwrap());
    storage.save(&saved).unwrap();

    let mut bridge = build(
        BridgeConfig::default(),
        transport,
        MockHttpClient::new(),
        MockConnector::new(),
        storage,
    );
    bridge.boot().await.unwrap();

    let (_, out) = exchange(host, &mut bridge, "[WIFI/STATUS]\n").await;
    assert_eq!(out, "true\n");
}

#[tokio::test]
async fn test_boot_survives_corrupt_settings_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flipper-http.json");
    std::fs::write(&path, "not json").unwrap();

    let (mut host, transport) = serial_link();
    let settings = SettingsBridge::new(
        MockWifi::new().with_network("home", "secret"),
        FileSettingsStorage::new(path.clone()),
    );
    let mut bridge = Bridge::new(
        BridgeConfig::default(),
        transport,
        MockHttpClient::new(),
        MockConnector::new(),
        settings,
        LogLed::new(true),
    );
    bridge.boot().await.unwrap();
    assert!(bridge.settings().settings().is_empty());

    host.write_all(b"[PING]\n[WIFI/STATUS]\n[WIFI/LIST]\n").await.unwrap();
    host.shutdown().await.unwrap();
    let exit = bridge.run().await.unwrap();
    drop(bridge);

    let mut out = String::new();
    host.read_to_string(&mut out).await.unwrap();
    assert_eq!(exit, Exit::TransportClosed);
    assert_eq!(out, "[PONG]\nfalse\n{\"networks\":[]}\n");
}

#[tokio::test]
async fn test_socket_session_relays_inbound_text() {
    let (host, transport) = serial_link();
    let connector = MockConnector::new();
    let remote = connector.remote();
    remote.push_text("hello");
    let mut bridge = build(
        BridgeConfig::default(),
        transport,
        MockHttpClient::new(),
        connector,
        Arc::new(MemorySettingsStorage::new()),
    );

    let host_side = async move {
        let mut host = host;
        let mut seen = String::new();
        host.write_all(b"[SOCKET/START]\nws://example.com\n").await.unwrap();
        read_until(&mut host, &mut seen, "hello\n").await;
        host.write_all(b"from flipper\n[SOCKET/STOP]\n[PING]\n").await.unwrap();
        read_until(&mut host, &mut seen, "[PONG]\n").await;
        host.shutdown().await.unwrap();
        seen
    };
    let (exit, seen) = tokio::join!(bridge.run(), host_side);

    assert_eq!(exit.unwrap(), Exit::TransportClosed);
    assert!(seen.starts_with("[SOCKET/CONNECTED] Connected to ws://example.com.\nhello\n"));
    assert!(seen.ends_with("[SOCKET/STOPPED] Disconnected from ws://example.com.\n[PONG]\n"));
    assert_eq!(remote.sent(), vec!["from flipper".to_string()]);
}

#[tokio::test]
async fn test_socket_large_message_is_chunked() {
    let (host, transport) = serial_link();
    let connector = MockConnector::new();
    let remote = connector.remote();
    let mut bridge = build(
        BridgeConfig::default(),
        transport,
        MockHttpClient::new(),
        connector,
        Arc::new(MemorySettingsStorage::new()),
    );
    let message = "abcdefghij".repeat(30);
    let input = format!("[SOCKET/START] ws://example.com\n{}\n[SOCKET/STOP]\n", message);

    let (_, out) = exchange(host, &mut bridge, &input).await;

    assert!(out.ends_with("[SOCKET/STOPPED] Disconnected from ws://example.com.\n"));
    let sent = remote.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|frame| frame.len() <= 128));
    assert_eq!(sent.concat(), message);
}

// ---------------------------------------------------------------------------
// Real network clients against local servers
// ---------------------------------------------------------------------------

async fn start_http_server() -> SocketAddr {
    let app = Router::new()
        .route("/hello", get(|| async { "ok" }))
        .route("/echo", post(|body: String| async move { body }))
        .route("/missing", get(|| async { (StatusCode::NOT_FOUND, "gone") }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    if (message.is_text() || message.is_binary()) && ws.send(message).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    addr
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ureq_client_against_local_server() {
    let addr = start_http_server().await;
    let (host, transport) = serial_link();
    let mut bridge = build(
        BridgeConfig::default(),
        transport,
        UreqClient::default(),
        MockConnector::new(),
        Arc::new(MemorySettingsStorage::new()),
    );
    let input = format!(
        "[GET] http://{addr}/hello\n[POST] {{\"url\":\"http://{addr}/echo\",\"payload\":\"hi\"}}\n[GET] http://{addr}/missing\n",
        addr = addr
    );

    let (_, out) = exchange(host, &mut bridge, &input).await;

    assert_eq!(out, "[200][2]ok[200][2]hi[404][4]gone");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ureq_client_refused_connection() {
    // Bind and drop to get a port nobody listens on.
    let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
    let (host, transport) = serial_link();
    let mut bridge = build(
        BridgeConfig::default(),
        transport,
        UreqClient::default(),
        MockConnector::new(),
        Arc::new(MemorySettingsStorage::new()),
    );

    let (_, out) = exchange(host, &mut bridge, &format!("[GET] http://{}/\n", addr)).await;

    assert!(out.starts_with("[ERROR] Connection failed: "));
    assert_eq!(out.lines().count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_tungstenite_echo_round_trip() {
    let addr = start_echo_server().await;
    let (host, transport) = serial_link();
    let mut bridge = build(
        BridgeConfig::default(),
        transport,
        MockHttpClient::new(),
        TungsteniteConnector::new(),
        Arc::new(MemorySettingsStorage::new()),
    );
    let message = "0123456789".repeat(30);

    let host_side = {
        let message = message.clone();
        async move {
            let mut host = host;
            let mut seen = String::new();
            host.write_all(format!("[SOCKET/START] ws://{}\n", addr).as_bytes())
                .await
                .unwrap();
            read_until(&mut host, &mut seen, "[SOCKET/CONNECTED]").await;
            host.write_all(format!("{}\n", message).as_bytes()).await.unwrap();
            read_until(&mut host, &mut seen, "0123456789\n").await;
            host.write_all(b"[SOCKET/STOP]\n").await.unwrap();
            read_until(&mut host, &mut seen, "[SOCKET/STOPPED]").await;
            host.shutdown().await.unwrap();
            seen
        }
    };
    let (exit, seen) = tokio::join!(bridge.run(), host_side);

    assert_eq!(exit.unwrap(), Exit::TransportClosed);
    // One echoed line per frame, in order.
    let echoed: Vec<&str> = seen
        .lines()
        .filter(|line| !line.starts_with('['))
        .collect();
    assert_eq!(echoed.len(), 3);
    assert!(echoed.iter().all(|line| line.len() <= 128));
    assert_eq!(echoed.concat(), message);
}
