//! Engine tuning knobs

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What happens once no valid frame arrived within the session window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionExpiry {
    /// Keep parsing; the deadline is informational only
    #[default]
    KeepListening,
    /// Drop inbound bytes until the owner restarts the engine
    StopListening,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Steady-state reconnection attempts before giving up; 0 counts as 1
    pub max_retries: u16,
    /// How long one steady-state attempt may take
    pub connect_timeout_ms: u64,
    /// Pause between link checks while joining freshly supplied credentials
    pub join_attempt_delay_ms: u64,
    /// Link checks before a fresh join is declared failed; 0 counts as 1
    pub join_max_attempts: u32,
    /// Extension granted by every valid frame
    pub session_window_ms: u64,
    pub session_expiry: SessionExpiry,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_retries: 120,
            connect_timeout_ms: 5_000,
            join_attempt_delay_ms: 500,
            join_max_attempts: 20,
            session_window_ms: 60_000,
            session_expiry: SessionExpiry::KeepListening,
        }
    }
}

impl Config {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn join_attempt_delay(&self) -> Duration {
        Duration::from_millis(self.join_attempt_delay_ms)
    }

    pub fn session_window(&self) -> Duration {
        Duration::from_millis(self.session_window_ms)
    }
}
