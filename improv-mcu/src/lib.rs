//! Improv MCU Library
//!
//! Serial WiFi provisioning for microcontroller firmware.
//!
//! This crate provides:
//! - `Provisioner`, the state machine that answers Improv commands
//! - Traits for the serial transport, WiFi radio, credential storage and clock
//! - Steady-state reconnection with a bounded retry budget
//!
//! The embedding application supplies the trait implementations and calls
//! `Provisioner::poll` from its main loop. Wire types come from
//! `improv-proto`.

pub mod config;
pub mod connection;
pub mod device;
pub mod engine;
pub mod observers;
pub mod storage;
pub mod transport;
pub mod wifi;

pub use config::*;
pub use connection::*;
pub use device::*;
pub use engine::*;
pub use observers::*;
pub use storage::*;
pub use transport::*;
pub use wifi::*;

pub use improv_proto::{ErrorCode, State};
