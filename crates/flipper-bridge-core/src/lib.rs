//! # flipper-bridge-core
//!
//! Core data model for the serial command bridge.
//!
//! This crate provides:
//! - Request and response types (`RequestDescriptor`, `ResponseHead`, `SocketTarget`)
//! - Wi-Fi credentials and the remembered-network list
//! - Settings storage abstraction with memory and file backends
//! - Bridge configuration and the error taxonomy
//!
//! This crate is intentionally runtime-agnostic and contains no async code,
//! so the same types serve the host binary and firmware builds.

pub mod config;
pub mod error;
pub mod model;
pub mod settings;

pub use config::BridgeConfig;
pub use error::{BridgeError, ConfigError};
pub use model::*;
pub use settings::{
    FileSettingsStorage, MemorySettingsStorage, SettingsStorage, WifiCredentials, WifiSettings,
    MAX_PASSWORD_LEN, MAX_SSID_LEN,
};
