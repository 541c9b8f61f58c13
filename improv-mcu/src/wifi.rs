//! WiFi Abstraction Traits
//!
//! Traits for WiFi operations that MCU-specific crates implement.

use std::net::Ipv4Addr;

/// WiFi network scan result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub ssid: String,
    pub rssi: i8,
    pub auth_required: bool,
}

impl ScanResult {
    pub fn new(ssid: impl Into<String>, rssi: i8, auth_required: bool) -> Self {
        Self {
            ssid: ssid.into(),
            rssi,
            auth_required,
        }
    }
}

/// WiFi connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiStatus {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// Trait for WiFi operations
///
/// MCU-specific crates implement this trait using their WiFi stack.
/// `begin_connect` must not block until the link is up; the engine polls
/// `status` afterwards.
pub trait Wifi {
    /// Error type for WiFi operations
    type Error: std::fmt::Display;

    /// Scan for available networks
    fn scan(&mut self) -> Result<Vec<ScanResult>, Self::Error>;

    /// Start joining a WiFi network
    fn begin_connect(&mut self, ssid: &str, password: &str) -> Result<(), Self::Error>;

    /// Disconnect from WiFi
    fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Get current connection status
    fn status(&self) -> WifiStatus;

    /// Local IPv4 address (if connected)
    fn local_ip(&self) -> Option<Ipv4Addr>;

    /// Check if connected
    fn is_connected(&self) -> bool {
        self.status() == WifiStatus::Connected
    }
}
