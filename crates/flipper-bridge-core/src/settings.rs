//! Wi-Fi settings and their persistent storage.
//!
//! The remembered-network list is an explicit value handed to whoever needs
//! it. Storage is abstracted so each platform can provide its own backend:
//! - `FileSettingsStorage` for hosts (a JSON file)
//! - `MemorySettingsStorage` for tests and volatile setups
//!
//! All storage methods are synchronous to support embedded platforms.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, ConfigError};

/// Longest SSID accepted (802.11 limit).
pub const MAX_SSID_LEN: usize = 32;

/// Longest WPA2 passphrase accepted.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Credentials for one station network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

impl WifiCredentials {
    /// Build validated credentials.
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Result<Self, BridgeError> {
        let credentials = Self {
            ssid: ssid.into(),
            password: password.into(),
        };
        credentials.validate()?;
        Ok(credentials)
    }

    /// Check both fields are non-empty and within length bounds.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.ssid.is_empty() {
            return Err(BridgeError::Validation("SSID cannot be empty".to_string()));
        }
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(BridgeError::Validation(format!(
                "SSID too long (max {} bytes)",
                MAX_SSID_LEN
            )));
        }
        if self.password.is_empty() {
            return Err(BridgeError::Validation(
                "Password cannot be empty".to_string(),
            ));
        }
        if self.password.len() > MAX_PASSWORD_LEN {
            return Err(BridgeError::Validation(format!(
                "Password too long (max {} bytes)",
                MAX_PASSWORD_LEN
            )));
        }
        Ok(())
    }
}

/// Remembered networks, in the order they were first saved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiSettings {
    #[serde(rename = "wifi_list", default)]
    pub networks: Vec<WifiCredentials>,
}

impl WifiSettings {
    /// Remember a network.
    ///
    /// A known SSID keeps its position and gets the new password. Returns
    /// whether anything changed.
    pub fn remember(&mut self, credentials: WifiCredentials) -> bool {
        match self
            .networks
            .iter_mut()
            .find(|known| known.ssid == credentials.ssid)
        {
            Some(known) if known.password == credentials.password => false,
            Some(known) => {
                known.password = credentials.password;
                true
            }
            None => {
                self.networks.push(credentials);
                true
            }
        }
    }

    pub fn get(&self, ssid: &str) -> Option<&WifiCredentials> {
        self.networks.iter().find(|known| known.ssid == ssid)
    }

    pub fn ssids(&self) -> impl Iterator<Item = &str> {
        self.networks.iter().map(|known| known.ssid.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }
}

/// Abstract settings storage.
pub trait SettingsStorage: Send + Sync {
    /// Load the remembered networks.
    ///
    /// Returns `ConfigError::NotFound` when nothing was ever saved.
    fn load(&self) -> Result<WifiSettings, ConfigError>;

    /// Persist the remembered networks, replacing what was stored.
    fn save(&self, settings: &WifiSettings) -> Result<(), ConfigError>;
}

impl<S: SettingsStorage + ?Sized> SettingsStorage for Box<S> {
    fn load(&self) -> Result<WifiSettings, ConfigError> {
        (**self).load()
    }

    fn save(&self, settings: &WifiSettings) -> Result<(), ConfigError> {
        (**self).save(settings)
    }
}

impl<S: SettingsStorage + ?Sized> SettingsStorage for std::sync::Arc<S> {
    fn load(&self) -> Result<WifiSettings, ConfigError> {
        (**self).load()
    }

    fn save(&self, settings: &WifiSettings) -> Result<(), ConfigError> {
        (**self).save(settings)
    }
}

const SETTINGS_KEY: &str = "wifi_list";

/// In-memory storage, serialized the same way as the file backend.
#[derive(Debug, Default)]
pub struct MemorySettingsStorage {
    data: RwLock<Option<String>>,
    saves: AtomicUsize,
}

impl MemorySettingsStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that already holds the given settings.
    pub fn with_settings(settings: &WifiSettings) -> Result<Self, ConfigError> {
        let storage = Self::new();
        *storage
            .data
            .write()
            .map_err(|_| ConfigError::WriteError("storage lock poisoned".to_string()))? =
            Some(encode(settings)?);
        Ok(storage)
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl SettingsStorage for MemorySettingsStorage {
    fn load(&self) -> Result<WifiSettings, ConfigError> {
        let data = self
            .data
            .read()
            .map_err(|_| ConfigError::ReadError("storage lock poisoned".to_string()))?;
        let json = data
            .as_ref()
            .ok_or_else(|| ConfigError::NotFound(SETTINGS_KEY.to_string()))?;
        decode(json)
    }

    fn save(&self, settings: &WifiSettings) -> Result<(), ConfigError> {
        let json = encode(settings)?;
        *self
            .data
            .write()
            .map_err(|_| ConfigError::WriteError("storage lock poisoned".to_string()))? = Some(json);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// JSON file storage for hosts.
#[derive(Debug, Clone)]
pub struct FileSettingsStorage {
    path: PathBuf,
}

impl FileSettingsStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStorage for FileSettingsStorage {
    fn load(&self) -> Result<WifiSettings, ConfigError> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(self.path.display().to_string()))
            }
            Err(e) => return Err(ConfigError::ReadError(e.to_string())),
        };
        decode(&json)
    }

    fn save(&self, settings: &WifiSettings) -> Result<(), ConfigError> {
        let json = encode(settings)?;
        // Write then rename so a power cut never leaves a truncated file.
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, json).map_err(|e| ConfigError::WriteError(e.to_string()))?;
        fs::rename(&staging, &self.path).map_err(|e| ConfigError::WriteError(e.to_string()))
    }
}

fn encode(settings: &WifiSettings) -> Result<String, ConfigError> {
    serde_json::to_string(settings).map_err(|e| ConfigError::WriteError(e.to_string()))
}

fn decode(json: &str) -> Result<WifiSettings, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::InvalidData(e.to_string()))
}
