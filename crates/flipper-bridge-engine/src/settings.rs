//! Settings Bridge: remembered Wi-Fi networks and the station link.

use std::net::IpAddr;

use serde::Serialize;
use tracing::{debug, info, warn};

use flipper_bridge_core::{BridgeError, ConfigError, SettingsStorage, WifiSettings};
use flipper_bridge_protocol::payload::WifiSaveRequest;

use crate::peripherals::WifiManager;

/// Result of a `[WIFI/SAVE]`.
#[derive(Debug)]
pub enum SaveOutcome {
    /// Persisted; no connection was requested.
    Saved,
    Connected(String),
    /// Persisted, but joining the network failed.
    ConnectFailed { ssid: String, error: BridgeError },
}

/// Owns the persisted network list and the Wi-Fi manager.
#[derive(Debug)]
pub struct SettingsBridge<W, S> {
    wifi: W,
    storage: S,
    settings: WifiSettings,
}

#[derive(Serialize)]
struct NetworkListing<'a> {
    networks: Vec<&'a str>,
}

impl<W, S> SettingsBridge<W, S>
where
    W: WifiManager,
    S: SettingsStorage,
{
    /// Create the bridge and load whatever was persisted.
    pub fn new(wifi: W, storage: S) -> Self {
        let mut bridge = Self {
            wifi,
            storage,
            settings: WifiSettings::default(),
        };
        if let Err(e) = bridge.reload() {
            warn!("Ignoring unreadable Wi-Fi settings: {}", e);
        }
        bridge
    }

    /// Replace the in-memory list with the persisted one.
    ///
    /// A store that was never written yields an empty list. An unreadable
    /// store also leaves the list empty, and the error is returned.
    pub fn reload(&mut self) -> Result<(), BridgeError> {
        self.settings = match self.storage.load() {
            Ok(settings) => settings,
            Err(ConfigError::NotFound(_)) => WifiSettings::default(),
            Err(e) => {
                self.settings = WifiSettings::default();
                return Err(e.into());
            }
        };
        debug!("Loaded {} saved network(s)", self.settings.len());
        Ok(())
    }

    pub fn settings(&self) -> &WifiSettings {
        &self.settings
    }

    pub fn wifi(&self) -> &W {
        &self.wifi
    }

    /// Validate, persist, then optionally connect.
    ///
    /// Nothing is persisted when validation fails. Saving the same
    /// credentials twice leaves the store unchanged.
    pub async fn save(&mut self, request: &WifiSaveRequest) -> Result<SaveOutcome, BridgeError> {
        let credentials = request.credentials();
        credentials.validate()?;

        let mut updated = self.settings.clone();
        updated.remember(credentials.clone());
        self.storage.save(&updated)?;
        self.settings = updated;
        info!("Saved Wi-Fi network '{}'", credentials.ssid);

        if !request.connect {
            return Ok(SaveOutcome::Saved);
        }
        match self.wifi.connect(&credentials).await {
            Ok(()) => Ok(SaveOutcome::Connected(credentials.ssid)),
            Err(error) if error.is_fatal() => Err(error),
            Err(error) => {
                warn!("Could not join '{}': {}", credentials.ssid, error);
                Ok(SaveOutcome::ConnectFailed {
                    ssid: credentials.ssid,
                    error,
                })
            }
        }
    }

    /// Try each remembered network in the order saved; return the one joined.
    pub async fn connect_saved(&mut self) -> Result<String, BridgeError> {
        if self.settings.is_empty() {
            return Err(BridgeError::Connection("No saved Wi-Fi networks".to_string()));
        }

        let mut last_error = None;
        for credentials in &self.settings.networks {
            match self.wifi.connect(credentials).await {
                Ok(()) => {
                    info!("Connected to '{}'", credentials.ssid);
                    return Ok(credentials.ssid.clone());
                }
                Err(e) => {
                    debug!("'{}' unavailable: {}", credentials.ssid, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| BridgeError::Connection("No saved network reachable".to_string())))
    }

    pub async fn disconnect(&mut self) -> Result<(), BridgeError> {
        self.wifi.disconnect().await
    }

    pub fn is_connected(&self) -> bool {
        self.wifi.is_connected()
    }

    pub fn ip_address(&self) -> Option<IpAddr> {
        self.wifi.ip_address()
    }

    /// Saved SSIDs as `{"networks":[...]}`. Passwords never leave the store.
    pub fn list_json(&self) -> String {
        listing(self.settings.ssids().collect())
    }

    /// SSIDs in range as `{"networks":[...]}`.
    pub async fn scan_json(&mut self) -> Result<String, BridgeError> {
        let found = self.wifi.scan().await?;
        Ok(listing(found.iter().map(String::as_str).collect()))
    }
}

fn listing(networks: Vec<&str>) -> String {
    serde_json::to_string(&NetworkListing { networks }).unwrap_or_else(|_| "{\"networks\":[]}".to_string())
}
