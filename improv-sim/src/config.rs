//! Simulator configuration, stored in IMPROV_HOME

use std::fs;
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use improv_mcu::{ChipFamily, Config, DeviceInfo};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid simulator config {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// A network the simulated radio can see
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimNetwork {
    pub ssid: String,
    /// Empty for an open network
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_rssi")]
    pub rssi: i8,
}

fn default_rssi() -> i8 {
    -60
}

impl SimNetwork {
    pub fn new(ssid: impl Into<String>, password: impl Into<String>, rssi: i8) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
            rssi,
        }
    }

    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub device: DeviceInfo,
    pub engine: Config,
    pub networks: Vec<SimNetwork>,
    /// How long the radio takes to associate with a known network
    pub join_delay_ms: u64,
    /// Address reported once connected
    pub ip: Ipv4Addr,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            device: DeviceInfo::new(
                ChipFamily::Esp32,
                "improv-sim",
                env!("CARGO_PKG_VERSION"),
                "Simulated Device",
            ),
            engine: Config::default(),
            networks: vec![
                SimNetwork::new("improv-lab", "improv123", -45),
                SimNetwork::new("guest", "", -72),
            ],
            join_delay_ms: 1_500,
            ip: Ipv4Addr::new(192, 168, 1, 50),
        }
    }
}

impl SimConfig {
    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&content).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Get IMPROV_HOME directory, creating it if needed
pub fn improv_home() -> io::Result<PathBuf> {
    let home = match std::env::var_os("IMPROV_HOME") {
        Some(home) => PathBuf::from(home),
        None => dirs::home_dir()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no home directory"))?
            .join(".improv"),
    };

    fs::create_dir_all(&home)?;
    Ok(home)
}
