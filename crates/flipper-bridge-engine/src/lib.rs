//! # flipper-bridge-engine
//!
//! The running bridge: reads bracket-tagged commands from a serial link,
//! performs HTTP requests and WebSocket sessions on the host's behalf, and
//! streams the results back.
//!
//! ## Architecture
//!
//! ```text
//! serial link ──► Bridge (dispatcher) ──► request::execute ──► HttpClient
//!                    │                 ──► session::run_session ──► WebSocketConnector
//!                    │                 ──► SettingsBridge ──► WifiManager + SettingsStorage
//!                    └──────────────────── StatusLed
//! ```
//!
//! Every collaborator is a trait, so the same engine drives a host process
//! (stdio or TCP, `ureq`, `tokio-tungstenite`) and tests (the `mock` module,
//! behind the `test-util` feature).

pub mod dispatcher;
pub mod http;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod peripherals;
pub mod request;
pub mod session;
pub mod settings;
pub mod socket;
pub mod transport;

pub use dispatcher::{Bridge, Exit, Flow, VERSION};
pub use http::{HttpClient, ResponseBody, ResponseEnvelope};
pub use peripherals::{HostWifi, LogLed, StatusLed, WifiManager};
pub use session::SessionEnd;
pub use settings::{SaveOutcome, SettingsBridge};
pub use socket::{send_large_message, InboundFrame, SessionState, WebSocketConnector, WebSocketSession};
pub use transport::{SerialTransport, StreamTransport};

#[cfg(feature = "net")]
pub use http::UreqClient;
#[cfg(feature = "net")]
pub use socket::TungsteniteConnector;
