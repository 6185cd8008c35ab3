//! Bridge configuration.
//!
//! Every wait point and size ceiling of the engine is configured here rather
//! than embedded as a constant, so hosts with different serial links can tune
//! them without a rebuild.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Smallest chunk ceiling accepted; one UTF-8 scalar must always fit.
pub const MIN_CHUNK_SIZE: usize = 4;

/// Runtime configuration of the bridge engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// Wait for an HTTP response head, and between body reads.
    pub http_timeout_ms: u64,

    /// Wait for a payload line after a bare command tag.
    pub payload_timeout_ms: u64,

    /// Wait for a WebSocket handshake.
    pub socket_connect_timeout_ms: u64,

    /// Close a WebSocket session after this long without traffic.
    pub socket_idle_timeout_ms: Option<u64>,

    /// Largest WebSocket frame written by `send_large_message`.
    pub socket_chunk_size: usize,

    /// Largest single write to the serial link.
    pub serial_chunk_size: usize,

    /// Largest byte-mode body buffered when the server sends no length.
    pub max_buffered_body: usize,

    /// Light the activity LED while a command runs.
    pub use_led: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            http_timeout_ms: 10_000,
            payload_timeout_ms: 2_000,
            socket_connect_timeout_ms: 10_000,
            socket_idle_timeout_ms: Some(300_000),
            socket_chunk_size: 128,
            serial_chunk_size: 128,
            max_buffered_body: 64 * 1024,
            use_led: true,
        }
    }
}

impl BridgeConfig {
    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::InvalidData(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.socket_chunk_size < MIN_CHUNK_SIZE || self.serial_chunk_size < MIN_CHUNK_SIZE {
            return Err(ConfigError::InvalidData(format!(
                "chunk sizes must be at least {} bytes",
                MIN_CHUNK_SIZE
            )));
        }
        let zero_wait = self.http_timeout_ms == 0
            || self.payload_timeout_ms == 0
            || self.socket_connect_timeout_ms == 0
            || self.socket_idle_timeout_ms == Some(0);
        if zero_wait {
            return Err(ConfigError::InvalidData(
                "timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn payload_timeout(&self) -> Duration {
        Duration::from_millis(self.payload_timeout_ms)
    }

    pub fn socket_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_connect_timeout_ms)
    }

    pub fn socket_idle_timeout(&self) -> Option<Duration> {
        self.socket_idle_timeout_ms.map(Duration::from_millis)
    }
}
