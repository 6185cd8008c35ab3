//! Scriptable collaborators for tests.
//!
//! Every mock is a cheap handle around shared state: keep a clone, hand the
//! other to the bridge, then inspect what the bridge did.

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use flipper_bridge_core::{BridgeError, RequestDescriptor, ResponseHead, SocketTarget, WifiCredentials};

use crate::http::{HttpClient, ResponseBody, ResponseEnvelope};
use crate::peripherals::{StatusLed, WifiManager};
use crate::socket::{InboundFrame, WebSocketConnector, WebSocketSession};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Scripted outcome of one request.
#[derive(Debug, Clone)]
pub enum MockReply {
    Respond {
        head: ResponseHead,
        chunks: Vec<Result<Vec<u8>, String>>,
        /// Keep the body open after the last chunk instead of ending it.
        stall: bool,
    },
    /// Fail before any response head.
    Refuse(String),
    /// Never produce a response head.
    Hang,
}

impl MockReply {
    /// Complete response with a correct `Content-Length`.
    pub fn ok(status: u16, body: &str) -> Self {
        Self::Respond {
            head: ResponseHead::new(status, Some(body.len() as u64)),
            chunks: vec![Ok(body.as_bytes().to_vec())],
            stall: false,
        }
    }

    /// Response whose body arrives in the given pieces.
    pub fn chunked(status: u16, content_length: Option<u64>, pieces: &[&[u8]]) -> Self {
        Self::Respond {
            head: ResponseHead::new(status, content_length),
            chunks: pieces.iter().map(|piece| Ok(piece.to_vec())).collect(),
            stall: false,
        }
    }

    pub fn stalled(self) -> Self {
        match self {
            Self::Respond { head, chunks, .. } => Self::Respond { head, chunks, stall: true },
            other => other,
        }
    }

    /// Append a read failure after the scripted pieces.
    pub fn then_fail(self, reason: &str) -> Self {
        match self {
            Self::Respond { head, mut chunks, stall } => {
                chunks.push(Err(reason.to_string()));
                Self::Respond { head, chunks, stall }
            }
            other => other,
        }
    }
}

#[derive(Debug, Default)]
struct HttpState {
    replies: VecDeque<MockReply>,
    requests: Vec<RequestDescriptor>,
}

/// HTTP client answering from a script and recording every request.
#[derive(Debug, Clone, Default)]
pub struct MockHttpClient {
    state: Arc<Mutex<HttpState>>,
    open_bodies: Arc<AtomicUsize>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, reply: MockReply) -> Self {
        self.push_reply(reply);
        self
    }

    pub fn push_reply(&self, reply: MockReply) {
        lock(&self.state).replies.push_back(reply);
    }

    pub fn requests(&self) -> Vec<RequestDescriptor> {
        lock(&self.state).requests.clone()
    }

    /// Response bodies handed out and not yet dropped.
    pub fn open_bodies(&self) -> usize {
        self.open_bodies.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct MockBody {
    chunks: VecDeque<Result<Vec<u8>, String>>,
    stall: bool,
    open: Arc<AtomicUsize>,
}

impl Drop for MockBody {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ResponseBody for MockBody {
    async fn next_chunk(&mut self) -> Option<Result<Vec<u8>, BridgeError>> {
        match self.chunks.pop_front() {
            Some(chunk) => Some(chunk.map_err(BridgeError::Connection)),
            None if self.stall => std::future::pending().await,
            None => None,
        }
    }
}

impl HttpClient for MockHttpClient {
    type Body = MockBody;

    async fn send(
        &mut self,
        request: &RequestDescriptor,
    ) -> Result<ResponseEnvelope<MockBody>, BridgeError> {
        let reply = {
            let mut state = lock(&self.state);
            state.requests.push(request.clone());
            state.replies.pop_front()
        };

        match reply {
            Some(MockReply::Respond { head, chunks, stall }) => {
                self.open_bodies.fetch_add(1, Ordering::SeqCst);
                Ok(ResponseEnvelope {
                    head,
                    body: MockBody {
                        chunks: chunks.into(),
                        stall,
                        open: self.open_bodies.clone(),
                    },
                })
            }
            Some(MockReply::Refuse(reason)) => Err(BridgeError::Connection(reason)),
            Some(MockReply::Hang) => std::future::pending().await,
            None => Err(BridgeError::Connection("No scripted response".to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RemoteState {
    sent: Vec<String>,
    fail_after: Option<usize>,
    refuse: Option<String>,
    targets: Vec<SocketTarget>,
    inbound: Option<mpsc::UnboundedSender<InboundFrame>>,
    pending: Vec<InboundFrame>,
    closes: usize,
}

/// The far end of mock WebSocket sessions.
#[derive(Debug, Clone, Default)]
pub struct MockRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl MockRemote {
    /// Text frames received from the bridge, in order.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.state).sent.clone()
    }

    /// Accept `frames` more sends in total, then fail every one after.
    pub fn fail_sends_after(&self, frames: usize) {
        lock(&self.state).fail_after = Some(frames);
    }

    /// Fail the next handshakes with `reason`.
    pub fn refuse(&self, reason: &str) {
        lock(&self.state).refuse = Some(reason.to_string());
    }

    pub fn targets(&self) -> Vec<SocketTarget> {
        lock(&self.state).targets.clone()
    }

    /// Sessions the bridge closed.
    pub fn closes(&self) -> usize {
        lock(&self.state).closes
    }

    pub fn push_text(&self, text: &str) {
        self.push(InboundFrame::Text(text.to_string()));
    }

    pub fn push_binary(&self, data: &[u8]) {
        self.push(InboundFrame::Binary(data.to_vec()));
    }

    /// Send a close frame.
    pub fn close(&self) {
        self.push(InboundFrame::Closed);
    }

    /// Drop the connection without a close frame.
    pub fn hang_up(&self) {
        lock(&self.state).inbound = None;
    }

    /// Frames pushed before a session exists are delivered once it opens.
    fn push(&self, frame: InboundFrame) {
        let mut state = lock(&self.state);
        let frame = match &state.inbound {
            Some(tx) => match tx.send(frame) {
                Ok(()) => return,
                Err(mpsc::error::SendError(frame)) => frame,
            },
            None => frame,
        };
        state.pending.push(frame);
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    remote: MockRemote,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remote(&self) -> MockRemote {
        self.remote.clone()
    }
}

#[derive(Debug)]
pub struct MockSession {
    state: Arc<Mutex<RemoteState>>,
    inbound: mpsc::UnboundedReceiver<InboundFrame>,
}

impl WebSocketConnector for MockConnector {
    type Session = MockSession;

    async fn connect(&mut self, target: &SocketTarget) -> Result<MockSession, BridgeError> {
        let mut state = lock(&self.remote.state);
        state.targets.push(target.clone());
        if let Some(reason) = &state.refuse {
            return Err(BridgeError::Connection(reason.clone()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for frame in state.pending.drain(..) {
            let _ = tx.send(frame);
        }
        state.inbound = Some(tx);

        Ok(MockSession {
            state: self.remote.state.clone(),
            inbound: rx,
        })
    }
}

impl WebSocketSession for MockSession {
    async fn send_text(&mut self, text: &str) -> Result<(), BridgeError> {
        let mut state = lock(&self.state);
        if let Some(limit) = state.fail_after {
            if state.sent.len() >= limit {
                return Err(BridgeError::Connection("Remote stopped accepting frames".to_string()));
            }
        }
        state.sent.push(text.to_string());
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<InboundFrame, BridgeError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), BridgeError> {
        let mut state = lock(&self.state);
        state.closes += 1;
        state.inbound = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Peripherals
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct WifiState {
    in_range: HashMap<String, String>,
    connected: Option<String>,
    attempts: Vec<String>,
    address: IpAddr,
}

/// Wi-Fi radio that can join only the networks it was told about.
#[derive(Debug, Clone)]
pub struct MockWifi {
    state: Arc<Mutex<WifiState>>,
}

impl Default for MockWifi {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(WifiState {
                in_range: HashMap::new(),
                connected: None,
                attempts: Vec::new(),
                address: IpAddr::V4(Ipv4Addr::new(192, 168, 4, 2)),
            })),
        }
    }
}

impl MockWifi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a network in range that accepts `password`.
    pub fn with_network(self, ssid: &str, password: &str) -> Self {
        lock(&self.state)
            .in_range
            .insert(ssid.to_string(), password.to_string());
        self
    }

    /// SSIDs of every connect attempt, in order.
    pub fn attempts(&self) -> Vec<String> {
        lock(&self.state).attempts.clone()
    }

    pub fn connected_to(&self) -> Option<String> {
        lock(&self.state).connected.clone()
    }
}

impl WifiManager for MockWifi {
    async fn connect(&mut self, credentials: &WifiCredentials) -> Result<(), BridgeError> {
        let mut state = lock(&self.state);
        state.attempts.push(credentials.ssid.clone());
        state.connected = None;
        match state.in_range.get(&credentials.ssid) {
            Some(password) if *password == credentials.password => {
                state.connected = Some(credentials.ssid.clone());
                Ok(())
            }
            Some(_) => Err(BridgeError::Connection(format!(
                "Authentication with '{}' failed",
                credentials.ssid
            ))),
            None => Err(BridgeError::Connection(format!(
                "Network '{}' not found",
                credentials.ssid
            ))),
        }
    }

    async fn disconnect(&mut self) -> Result<(), BridgeError> {
        lock(&self.state).connected = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected.is_some()
    }

    fn current_ssid(&self) -> Option<String> {
        self.connected_to()
    }

    fn ip_address(&self) -> Option<IpAddr> {
        let state = lock(&self.state);
        state.connected.as_ref().map(|_| state.address)
    }

    async fn scan(&mut self) -> Result<Vec<String>, BridgeError> {
        let mut ssids: Vec<String> = lock(&self.state).in_range.keys().cloned().collect();
        ssids.sort();
        Ok(ssids)
    }
}

#[derive(Debug, Default)]
struct LedState {
    enabled: bool,
    events: Vec<bool>,
}

/// LED recording every activity change it shows.
#[derive(Debug, Clone, Default)]
pub struct RecordingLed {
    state: Arc<Mutex<LedState>>,
}

impl RecordingLed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activity changes shown while enabled.
    pub fn events(&self) -> Vec<bool> {
        lock(&self.state).events.clone()
    }

    pub fn enabled(&self) -> bool {
        lock(&self.state).enabled
    }
}

impl StatusLed for RecordingLed {
    fn set_enabled(&mut self, enabled: bool) {
        lock(&self.state).enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled()
    }

    fn activity(&mut self, active: bool) {
        let mut state = lock(&self.state);
        if state.enabled {
            state.events.push(active);
        }
    }
}
