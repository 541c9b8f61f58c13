//! Connection attempts
//!
//! Both the initial join for freshly supplied credentials and steady-state
//! reconnection are step machines: the engine advances them once per poll,
//! so serial input keeps flowing while a join is in progress.

use std::time::Duration;

use log::{debug, info, warn};

use crate::{Config, Credentials, Wifi};

/// Result of advancing a [`JoinAttempt`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPoll {
    Pending,
    Connected,
    Failed,
}

/// Bounded join for freshly supplied credentials
///
/// Checks the link every `join_attempt_delay` and gives up after
/// `join_max_attempts` checks. Does not touch the steady-state retry
/// counters.
#[derive(Debug)]
pub struct JoinAttempt {
    credentials: Credentials,
    checks_done: u32,
    max_checks: u32,
    delay: Duration,
    next_check: Duration,
}

impl JoinAttempt {
    pub fn start<W: Wifi>(wifi: &mut W, credentials: Credentials, config: &Config, now: Duration) -> Self {
        if wifi.is_connected() {
            if let Err(e) = wifi.disconnect() {
                warn!("Failed to drop current WiFi link: {e}");
            }
        }

        info!("Joining WiFi network '{}'", credentials.ssid);
        if let Err(e) = wifi.begin_connect(&credentials.ssid, &credentials.password) {
            warn!("WiFi join request failed: {e}");
        }

        Self {
            credentials,
            checks_done: 0,
            max_checks: config.join_max_attempts.max(1),
            delay: config.join_attempt_delay(),
            next_check: now + config.join_attempt_delay(),
        }
    }

    pub fn poll<W: Wifi>(&mut self, wifi: &mut W, now: Duration) -> JoinPoll {
        if now < self.next_check {
            return JoinPoll::Pending;
        }

        if wifi.is_connected() {
            return JoinPoll::Connected;
        }

        self.checks_done += 1;
        if self.checks_done >= self.max_checks {
            warn!(
                "Could not join '{}' after {} checks",
                self.credentials.ssid, self.checks_done
            );
            if let Err(e) = wifi.disconnect() {
                warn!("Failed to abort WiFi join: {e}");
            }
            return JoinPoll::Failed;
        }

        self.next_check = now + self.delay;
        JoinPoll::Pending
    }

    /// When the next link check is due
    pub fn next_check(&self) -> Duration {
        self.next_check
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn into_credentials(self) -> Credentials {
        self.credentials
    }
}

/// Something the engine has to tell observers about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Link came up; credentials if known
    Connected(Option<Credentials>),
    Disconnected,
    /// Retry budget used up
    RetriesExhausted,
    /// First tick after exhaustion; reported once
    GaveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cycle {
    Idle,
    Waiting { deadline: Duration },
}

/// Steady-state reconnection with a bounded retry budget
#[derive(Debug)]
pub struct ConnectionManager {
    retries_done: u16,
    max_retries: u16,
    connect_timeout: Duration,
    last_known_connected: bool,
    credentials: Option<Credentials>,
    credentials_available: bool,
    failed: bool,
    give_up_reported: bool,
    cycle: Cycle,
}

impl ConnectionManager {
    pub fn new(config: &Config) -> Self {
        Self {
            retries_done: 0,
            max_retries: config.max_retries.max(1),
            connect_timeout: config.connect_timeout(),
            last_known_connected: false,
            credentials: None,
            // storage has not been asked yet
            credentials_available: true,
            failed: false,
            give_up_reported: false,
            cycle: Cycle::Idle,
        }
    }

    pub fn retries_done(&self) -> u16 {
        self.retries_done
    }

    pub fn max_retries(&self) -> u16 {
        self.max_retries
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    pub fn last_known_connected(&self) -> bool {
        self.last_known_connected
    }

    pub fn credentials_available(&self) -> bool {
        self.credentials_available
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.cycle, Cycle::Waiting { .. })
    }

    /// Explicit credential-set event
    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials_available = !credentials.ssid.is_empty();
        self.credentials = Some(credentials);
        self.clear_failure();
        self.cycle = Cycle::Idle;
    }

    /// Reset after the owner dealt with a give-up
    pub fn clear_failure(&mut self) {
        self.failed = false;
        self.give_up_reported = false;
        self.retries_done = 0;
    }

    /// Forget an in-flight attempt, e.g. when a fresh join takes over
    pub fn abort_cycle(&mut self) {
        self.cycle = Cycle::Idle;
    }

    /// Record a successful join made outside the retry loop
    pub fn mark_connected(&mut self, credentials: Credentials, connected: bool) {
        self.set_credentials(credentials);
        self.last_known_connected = connected;
    }

    /// Edge detection against the previous observation
    pub fn observe(&mut self, connected: bool) -> Option<ConnectionEvent> {
        if connected == self.last_known_connected {
            return None;
        }
        self.last_known_connected = connected;

        if connected {
            self.cycle = Cycle::Idle;
            self.clear_failure();
            Some(ConnectionEvent::Connected(self.credentials.clone()))
        } else {
            Some(ConnectionEvent::Disconnected)
        }
    }

    /// One scheduling tick while the link is down
    ///
    /// `load` is only consulted when no credentials are cached.
    pub fn step<W, L>(&mut self, wifi: &mut W, now: Duration, load: L) -> Option<ConnectionEvent>
    where
        W: Wifi,
        L: FnOnce() -> Option<Credentials>,
    {
        if self.failed {
            if self.give_up_reported {
                return None;
            }
            self.give_up_reported = true;
            return Some(ConnectionEvent::GaveUp);
        }

        match self.cycle {
            Cycle::Idle => {
                if self.credentials.is_none() {
                    if !self.credentials_available {
                        return None;
                    }
                    match load() {
                        Some(credentials) if !credentials.ssid.is_empty() => {
                            self.credentials = Some(credentials);
                        }
                        _ => {
                            debug!("No stored WiFi credentials");
                            self.credentials_available = false;
                            return None;
                        }
                    }
                }
                let credentials = self.credentials.as_ref()?;

                if self.retries_done == 0 {
                    info!("Starting WiFi connection to '{}'", credentials.ssid);
                    if let Err(e) = wifi.disconnect() {
                        debug!("Disconnect before connecting failed: {e}");
                    }
                }
                if let Err(e) = wifi.begin_connect(&credentials.ssid, &credentials.password) {
                    warn!("WiFi connect request failed: {e}");
                }
                self.cycle = Cycle::Waiting {
                    deadline: now + self.connect_timeout,
                };
                None
            }
            Cycle::Waiting { deadline } => {
                if now < deadline {
                    return None;
                }

                self.retries_done += 1;
                self.cycle = Cycle::Idle;
                info!(
                    "Waiting {}/{}s for WiFi",
                    self.connect_timeout.as_secs() * self.retries_done as u64,
                    self.connect_timeout.as_secs() * self.max_retries as u64
                );

                if self.retries_done >= self.max_retries {
                    warn!("Failed to connect WiFi after {} attempts", self.retries_done);
                    self.failed = true;
                    return Some(ConnectionEvent::RetriesExhausted);
                }
                None
            }
        }
    }
}
