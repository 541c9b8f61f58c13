//! Improv Device Simulator
//!
//! Host-side implementations of the `improv-mcu` collaborator traits, used
//! to run the provisioning engine on a desktop:
//!
//! - `SerialBridge` exposes the device's serial line as a TCP socket
//! - `SimWifi` pretends to be a radio with a configurable set of networks
//! - `SimConfig` loads device info, engine tuning and networks from JSON
//!
//! Credentials are persisted with `improv_mcu::JsonFileStorage` under
//! `IMPROV_HOME` (default `~/.improv`).

mod config;
mod serial;
mod wifi;

pub use config::{ConfigError, SimConfig, SimNetwork, improv_home};
pub use serial::SerialBridge;
pub use wifi::SimWifi;
