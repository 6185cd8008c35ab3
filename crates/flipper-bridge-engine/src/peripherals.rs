//! Board peripherals the engine drives: the Wi-Fi station and the status LED.

use std::net::{IpAddr, UdpSocket};

use tracing::{debug, info, trace};

use flipper_bridge_core::{BridgeError, WifiCredentials};

/// Station-mode network link.
pub trait WifiManager {
    /// Associate with the network. Replaces any current association.
    async fn connect(&mut self, credentials: &WifiCredentials) -> Result<(), BridgeError>;

    async fn disconnect(&mut self) -> Result<(), BridgeError>;

    fn is_connected(&self) -> bool;

    /// SSID of the network currently joined.
    fn current_ssid(&self) -> Option<String>;

    /// Station address, once connected.
    fn ip_address(&self) -> Option<IpAddr>;

    /// SSIDs currently in range.
    async fn scan(&mut self) -> Result<Vec<String>, BridgeError>;
}

/// Activity indicator.
pub trait StatusLed {
    /// `[LED/ON]` and `[LED/OFF]`; a disabled LED ignores activity.
    fn set_enabled(&mut self, enabled: bool);

    fn is_enabled(&self) -> bool;

    /// Called with `true` when a command starts and `false` when it ends.
    fn activity(&mut self, active: bool);
}

/// Wi-Fi stand-in for hosts whose network is managed by the OS.
///
/// "Connecting" only records the SSID, provided the host has a route out;
/// the station address is the host's outbound address.
#[derive(Debug, Default)]
pub struct HostWifi {
    ssid: Option<String>,
}

impl HostWifi {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Address the host would use for outbound traffic. Sends nothing.
fn outbound_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

impl WifiManager for HostWifi {
    async fn connect(&mut self, credentials: &WifiCredentials) -> Result<(), BridgeError> {
        let ip = outbound_address()
            .ok_or_else(|| BridgeError::Connection("Host has no network route".to_string()))?;
        info!("Using host network as '{}' ({})", credentials.ssid, ip);
        self.ssid = Some(credentials.ssid.clone());
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), BridgeError> {
        if let Some(ssid) = self.ssid.take() {
            info!("Released '{}'", ssid);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.ssid.is_some()
    }

    fn current_ssid(&self) -> Option<String> {
        self.ssid.clone()
    }

    fn ip_address(&self) -> Option<IpAddr> {
        self.ssid.as_ref().and_then(|_| outbound_address())
    }

    async fn scan(&mut self) -> Result<Vec<String>, BridgeError> {
        debug!("Host network cannot be scanned; reporting the joined network only");
        Ok(self.ssid.iter().cloned().collect())
    }
}

/// LED that reports to the log, for boards without one.
#[derive(Debug)]
pub struct LogLed {
    enabled: bool,
}

impl LogLed {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl StatusLed for LogLed {
    fn set_enabled(&mut self, enabled: bool) {
        debug!("Status LED {}", if enabled { "enabled" } else { "disabled" });
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn activity(&mut self, active: bool) {
        if self.enabled {
            trace!("LED {}", if active { "on" } else { "off" });
        }
    }
}
