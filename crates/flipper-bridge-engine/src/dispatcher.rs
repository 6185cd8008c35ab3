//! Command Dispatcher: the main loop.
//!
//! One command at a time: read a line, classify it, read its payload (inline
//! or on the next line), run it, answer. Lines outside the vocabulary are
//! ignored without a reply. Only I/O failures on the serial link stop the
//! loop; every other error becomes an `[ERROR]` frame.

use tracing::{debug, info, warn};

use flipper_bridge_core::{BridgeConfig, BridgeError, SettingsStorage};
use flipper_bridge_protocol::payload::{parse_request, parse_socket_target, parse_wifi_save};
use flipper_bridge_protocol::query::{lookup_array, lookup_key};
use flipper_bridge_protocol::{Command, CommandFrame, Reply};

use crate::http::HttpClient;
use crate::peripherals::{StatusLed, WifiManager};
use crate::request;
use crate::session::run_session;
use crate::settings::{SaveOutcome, SettingsBridge};
use crate::socket::WebSocketConnector;
use crate::transport::{write_reply, SerialTransport};

/// Reported by `[VERSION]`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Why `run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The serial link closed.
    TransportClosed,
    /// `[REBOOT]` was received; the caller should boot again.
    Reboot,
}

/// What the loop does after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Reboot,
}

/// The bridge: a serial link plus the collaborators its commands drive.
pub struct Bridge<T, H, C, W, S, L> {
    config: BridgeConfig,
    transport: T,
    http: H,
    sockets: C,
    settings: SettingsBridge<W, S>,
    led: L,
}

impl<T, H, C, W, S, L> Bridge<T, H, C, W, S, L>
where
    T: SerialTransport,
    H: HttpClient,
    C: WebSocketConnector,
    W: WifiManager,
    S: SettingsStorage,
    L: StatusLed,
{
    pub fn new(
        config: BridgeConfig,
        transport: T,
        http: H,
        sockets: C,
        settings: SettingsBridge<W, S>,
        led: L,
    ) -> Self {
        Self {
            config,
            transport,
            http,
            sockets,
            settings,
            led,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn settings(&self) -> &SettingsBridge<W, S> {
        &self.settings
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Start-up: reload settings, join a saved network if there is one, and
    /// drop any input that arrived before the bridge was ready.
    pub async fn boot(&mut self) -> Result<(), BridgeError> {
        self.led.set_enabled(self.config.use_led);
        if let Err(e) = self.settings.reload() {
            warn!("Starting without saved networks: {}", e);
        }

        if !self.settings.settings().is_empty() {
            match self.settings.connect_saved().await {
                Ok(ssid) => info!("Joined saved network '{}'", ssid),
                Err(e) => warn!("No saved network joined: {}", e),
            }
        }

        let dropped = self.transport.discard_input();
        if dropped > 0 {
            debug!("Discarded {} stale input bytes", dropped);
        }
        info!("Bridge v{} ready", VERSION);
        Ok(())
    }

    /// Serve commands until the link closes or a reboot is requested.
    pub async fn run(&mut self) -> Result<Exit, BridgeError> {
        loop {
            let Some(line) = self.transport.read_line().await? else {
                info!("Serial link closed");
                return Ok(Exit::TransportClosed);
            };
            if self.handle_line(&line).await? == Flow::Reboot {
                info!("Reboot requested");
                return Ok(Exit::Reboot);
            }
        }
    }

    /// Handle one received line.
    pub async fn handle_line(&mut self, line: &str) -> Result<Flow, BridgeError> {
        let Some(frame) = CommandFrame::parse(line) else {
            if !line.is_empty() {
                debug!("Ignoring unrecognized line: {:?}", line);
            }
            return Ok(Flow::Continue);
        };
        debug!("Command {}", frame.tag);

        self.led.activity(true);
        let result = self.execute(frame).await;
        self.led.activity(false);

        match result {
            Ok(flow) => Ok(flow),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("{} failed: {}", frame.tag, e);
                self.reply(Reply::error(&e)).await?;
                Ok(Flow::Continue)
            }
        }
    }

    async fn execute(&mut self, frame: CommandFrame<'_>) -> Result<Flow, BridgeError> {
        let payload = if frame.command.takes_payload() {
            self.payload(&frame).await?
        } else {
            String::new()
        };

        if let Some((method, mode)) = frame.command.request() {
            let request = parse_request(method, mode, &payload)?;
            request::execute(&mut self.transport, &mut self.http, &self.config, &request).await?;
            return Ok(Flow::Continue);
        }

        match frame.command {
            Command::SocketStart => {
                let target = parse_socket_target(&payload)?;
                let end = run_session(&mut self.transport, &mut self.sockets, &self.config, &target).await?;
                debug!("WebSocket session ended: {:?}", end);
            }
            Command::SocketStop => {
                self.reply(Reply::Error("No active WebSocket session.".to_string())).await?;
            }
            Command::WifiSave => {
                let request = parse_wifi_save(&payload)?;
                let reply = match self.settings.save(&request).await? {
                    SaveOutcome::Saved => Reply::Success("Settings saved.".to_string()),
                    SaveOutcome::Connected(ssid) => {
                        Reply::Success(format!("Settings saved and connected to {}.", ssid))
                    }
                    SaveOutcome::ConnectFailed { ssid, error } => {
                        Reply::Error(format!("Settings saved but failed to connect to {}: {}", ssid, error))
                    }
                };
                self.reply(reply).await?;
            }
            Command::WifiList => {
                let listing = self.settings.list_json();
                self.reply(Reply::Value(listing)).await?;
            }
            Command::WifiScan => {
                let listing = self.settings.scan_json().await?;
                self.reply(Reply::Value(listing)).await?;
            }
            Command::WifiIp | Command::IpAddress => {
                let reply = match self.settings.ip_address() {
                    Some(ip) => Reply::Value(ip.to_string()),
                    None => Reply::Error("Not connected to Wi-Fi.".to_string()),
                };
                self.reply(reply).await?;
            }
            Command::WifiStatus => {
                let connected = self.settings.is_connected();
                self.reply(Reply::Value(connected.to_string())).await?;
            }
            Command::WifiConnect => {
                let reply = match self.settings.wifi().current_ssid() {
                    Some(ssid) => Reply::Info(format!("Already connected to {}.", ssid)),
                    None => {
                        let ssid = self.settings.connect_saved().await?;
                        Reply::Success(format!("Connected to {}.", ssid))
                    }
                };
                self.reply(reply).await?;
            }
            Command::WifiDisconnect => {
                self.settings.disconnect().await?;
                self.reply(Reply::Disconnected("Wi-Fi has been disconnected.".to_string()))
                    .await?;
            }
            Command::LedOn => self.led.set_enabled(true),
            Command::LedOff => self.led.set_enabled(false),
            Command::Reboot => return Ok(Flow::Reboot),
            Command::Version => self.reply(Reply::Value(VERSION.to_string())).await?,
            Command::Ping => self.reply(Reply::Pong).await?,
            Command::List => {
                let tags: Vec<&str> = Command::vocabulary().collect();
                self.reply(Reply::Value(tags.join(","))).await?;
            }
            Command::Parse => {
                self.reply(Reply::Value(lookup_key(&payload)?)).await?;
            }
            Command::ParseArray => {
                self.reply(Reply::Value(lookup_array(&payload)?)).await?;
            }
            // HTTP commands were handled above.
            Command::Get
            | Command::Post
            | Command::Put
            | Command::Delete
            | Command::GetBytes
            | Command::PostBytes => {}
        }
        Ok(Flow::Continue)
    }

    /// The payload written after the tag, or else the next line.
    async fn payload(&mut self, frame: &CommandFrame<'_>) -> Result<String, BridgeError> {
        if let Some(inline) = frame.inline_payload {
            return Ok(inline.to_string());
        }
        self.transport.set_timeout(self.config.payload_timeout());
        match self.transport.read_line_timeout().await? {
            Some(line) if !line.is_empty() => Ok(line),
            _ => Err(BridgeError::Parse(format!("{} expects a payload", frame.tag))),
        }
    }

    async fn reply(&mut self, reply: Reply) -> Result<(), BridgeError> {
        write_reply(&mut self.transport, &reply).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

    use flipper_bridge_core::MemorySettingsStorage;

    use super::*;
    use crate::mock::{MockConnector, MockHttpClient, MockReply, MockWifi, RecordingLed};
    use crate::transport::StreamTransport;

    type Device = StreamTransport<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;
    type TestBridge =
        Bridge<Device, MockHttpClient, MockConnector, MockWifi, Arc<MemorySettingsStorage>, RecordingLed>;

    fn bridge(http: MockHttpClient, led: RecordingLed) -> (DuplexStream, TestBridge) {
        let (host, device) = duplex(64 * 1024);
        let (rx, tx) = tokio::io::split(device);
        let settings = SettingsBridge::new(MockWifi::new(), Arc::new(MemorySettingsStorage::new()));
        let bridge = Bridge::new(
            BridgeConfig::default(),
            StreamTransport::new(rx, tx),
            http,
            MockConnector::new(),
            settings,
            led,
        );
        (host, bridge)
    }

    /// Feed `input`, run to completion, return everything written back.
    async fn session(mut host: DuplexStream, mut bridge: TestBridge, input: &str) -> (Exit, String) {
        host.write_all(input.as_bytes()).await.unwrap();
        host.shutdown().await.unwrap();
        let exit = bridge.run().await.unwrap();
        drop(bridge);
        let mut out = String::new();
        host.read_to_string(&mut out).await.unwrap();
        (exit, out)
    }

    #[tokio::test]
    async fn test_get_with_payload_on_next_line() {
        let http = MockHttpClient::new().with_reply(MockReply::ok(200, "ok"));
        let probe = http.clone();
        let (host, bridge) = bridge(http, RecordingLed::new());

        let (exit, out) = session(host, bridge, "[GET]\nhttp://example.com\n").await;

        assert_eq!(exit, Exit::TransportClosed);
        assert_eq!(out, "[200][2]ok");
        assert_eq!(probe.requests()[0].url, "http://example.com");
        assert_eq!(probe.open_bodies(), 0);
    }

    #[tokio::test]
    async fn test_unknown_tags_are_silent() {
        let (host, bridge) = bridge(MockHttpClient::new(), RecordingLed::new());
        let (_, out) = session(host, bridge, "[FOO]\nhello\n\n[PING]\n").await;
        assert_eq!(out, "[PONG]\n");
    }

    #[tokio::test]
    async fn test_invalid_url_is_one_error_frame() {
        let (host, bridge) = bridge(MockHttpClient::new(), RecordingLed::new());
        let (_, out) = session(host, bridge, "[GET] ftp://example.com\n").await;
        assert!(out.starts_with("[ERROR] "));
        assert_eq!(out.lines().count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_payload_times_out() {
        let (mut host, mut bridge) = bridge(MockHttpClient::new(), RecordingLed::new());
        host.write_all(b"[POST]\n").await.unwrap();

        let started = tokio::time::Instant::now();
        let line = bridge.transport_mut().read_line().await.unwrap().unwrap();
        bridge.handle_line(&line).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(2));

        drop(bridge);
        let mut out = String::new();
        host.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "[ERROR] [POST] expects a payload\n");
    }

    #[tokio::test]
    async fn test_led_follows_commands() {
        let led = RecordingLed::new();
        let (host, mut bridge) = bridge(MockHttpClient::new(), led.clone());
        bridge.boot().await.unwrap();

        let (_, out) = session(host, bridge, "[PING]\n[LED/OFF]\n[PING]\n").await;

        assert_eq!(out, "[PONG]\n[PONG]\n");
        assert_eq!(led.events(), vec![true, false, true]);
        assert!(!led.enabled());
    }

    #[tokio::test]
    async fn test_reboot_exits_loop() {
        let (host, bridge) = bridge(MockHttpClient::new(), RecordingLed::new());
        let (exit, out) = session(host, bridge, "[REBOOT]\n[PING]\n").await;
        assert_eq!(exit, Exit::Reboot);
        assert_eq!(out, "");
    }

    #[tokio::test]
    async fn test_version_and_list() {
        let (host, bridge) = bridge(MockHttpClient::new(), RecordingLed::new());
        let (_, out) = session(host, bridge, "[VERSION]\n[LIST]\n").await;

        let mut lines = out.lines();
        assert_eq!(lines.next(), Some(VERSION));
        let list = lines.next().unwrap();
        assert!(list.starts_with("[GET],"));
        assert!(list.contains("[SOCKET/START]"));
    }

    #[tokio::test]
    async fn test_socket_stop_without_session() {
        let (host, bridge) = bridge(MockHttpClient::new(), RecordingLed::new());
        let (_, out) = session(host, bridge, "[SOCKET/STOP]\n").await;
        assert_eq!(out, "[ERROR] No active WebSocket session.\n");
    }

    #[tokio::test]
    async fn test_wifi_without_network() {
        let (host, bridge) = bridge(MockHttpClient::new(), RecordingLed::new());
        let (_, out) = session(host, bridge, "[WIFI/STATUS]\n[IP/ADDRESS]\n[WIFI/LIST]\n").await;
        assert_eq!(
            out,
            "false\n[ERROR] Not connected to Wi-Fi.\n{\"networks\":[]}\n"
        );
    }

    #[tokio::test]
    async fn test_parse_commands() {
        let (host, bridge) = bridge(MockHttpClient::new(), RecordingLed::new());
        let input = concat!(
            "[PARSE] {\"key\":\"name\",\"json\":{\"name\":\"flipper\"}}\n",
            "[PARSE/ARRAY]\n",
            "{\"key\":\"ids\",\"index\":2,\"json\":{\"ids\":[4,5,6]}}\n",
        );
        let (_, out) = session(host, bridge, input).await;
        assert_eq!(out, "flipper\n6\n");
    }
}
