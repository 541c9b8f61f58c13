//! The provisioning engine
//!
//! `Provisioner::poll` is the single entry point. Each call drains the
//! transport through the frame parser, dispatches complete commands,
//! advances any pending join and runs one reconnection step. Nothing
//! blocks except [`Provisioner::try_connect_to_wifi`], which exists for
//! applications that want the simple bounded loop.

use std::collections::HashSet;
use std::time::Duration;

use improv_proto::{
    CMD_GET_CURRENT_STATE, CMD_GET_DEVICE_INFO, CMD_GET_WIFI_NETWORKS, CMD_WIFI_SETTINGS,
    Command, ErrorCode, Frame, FrameParser, ParseEvent, State, TYPE_RPC_COMMAND,
    build_rpc_response,
};
use log::{debug, error, info, warn};

use crate::connection::{ConnectionEvent, ConnectionManager, JoinAttempt, JoinPoll};
use crate::{
    Clock, Config, Credentials, DeviceInfo, Observers, ScanResult, SessionExpiry, Storage,
    Transport, Wifi,
};

/// Name used in network listings for hidden networks
const HIDDEN_SSID: &str = "no_name";

type ConnectOverride = Box<dyn FnMut(&str, &str) -> bool>;
type SaveOverride = Box<dyn FnMut(&Credentials)>;
type LoadOverride = Box<dyn FnMut() -> Option<Credentials>>;

/// What the last poll left the engine doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// Nothing to do: no credentials, or waiting for the next attempt
    Idle,
    /// Joining credentials received over the wire
    Provisioning,
    /// Steady-state attempt in flight
    Connecting,
    Connected,
    /// Retry budget exhausted; the owner decides what to do (e.g. restart)
    GaveUp,
}

pub struct Provisioner<T, W, S, C> {
    transport: T,
    wifi: W,
    storage: S,
    clock: C,
    info: DeviceInfo,
    config: Config,
    parser: FrameParser,
    session_deadline: Duration,
    connection: ConnectionManager,
    join: Option<JoinAttempt>,
    /// Set while `try_connect_to_wifi` owns the radio
    blocking_join: bool,
    /// Wire settings that arrived during a blocking join
    deferred: Option<Credentials>,
    observers: Observers,
    connect_override: Option<ConnectOverride>,
    save_override: Option<SaveOverride>,
    load_override: Option<LoadOverride>,
}

impl<T, W, S, C> Provisioner<T, W, S, C>
where
    T: Transport,
    W: Wifi,
    S: Storage,
    C: Clock,
{
    pub fn new(transport: T, wifi: W, storage: S, clock: C, info: DeviceInfo, config: Config) -> Self {
        let session_deadline = clock.now() + config.session_window();
        let connection = ConnectionManager::new(&config);
        Self {
            transport,
            wifi,
            storage,
            clock,
            info,
            config,
            parser: FrameParser::new(),
            session_deadline,
            connection,
            join: None,
            blocking_join: false,
            deferred: None,
            observers: Observers::default(),
            connect_override: None,
            save_override: None,
            load_override: None,
        }
    }

    pub fn on_connected(&mut self, cb: impl FnMut(&str, &str) + 'static) {
        self.observers.on_connected(cb);
    }

    pub fn on_error(&mut self, cb: impl FnMut(ErrorCode) + 'static) {
        self.observers.on_error(cb);
    }

    pub fn on_disconnected(&mut self, cb: impl FnMut() + 'static) {
        self.observers.on_disconnected(cb);
    }

    /// Replace the built-in join for `WifiSettings` with a synchronous one
    pub fn set_custom_connect(&mut self, connect: impl FnMut(&str, &str) -> bool + 'static) {
        self.connect_override = Some(Box::new(connect));
    }

    /// Persist credentials somewhere other than the storage backend
    pub fn set_credential_saver(&mut self, save: impl FnMut(&Credentials) + 'static) {
        self.save_override = Some(Box::new(save));
    }

    /// Load credentials from somewhere other than the storage backend
    pub fn set_credential_loader(&mut self, load: impl FnMut() -> Option<Credentials> + 'static) {
        self.load_override = Some(Box::new(load));
    }

    /// Supply credentials directly, e.g. from a local UI
    pub fn set_credentials(&mut self, ssid: &str, password: &str) {
        self.connection.set_credentials(Credentials::new(ssid, password));
    }

    /// Allow reconnection again after a give-up
    pub fn clear_failure(&mut self) {
        self.connection.clear_failure();
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn is_connected(&self) -> bool {
        self.wifi.is_connected()
    }

    /// Whether a valid frame arrived within the session window
    pub fn session_active(&self) -> bool {
        self.clock.now() < self.session_deadline
    }

    pub fn session_deadline(&self) -> Duration {
        self.session_deadline
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn wifi(&self) -> &W {
        &self.wifi
    }

    pub fn wifi_mut(&mut self) -> &mut W {
        &mut self.wifi
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// One scheduling tick
    pub fn poll(&mut self) -> PollStatus {
        self.poll_transport();
        self.advance_join();
        if self.join.is_some() {
            return PollStatus::Provisioning;
        }

        let connected = self.wifi.is_connected();
        if let Some(event) = self.connection.observe(connected) {
            self.dispatch(event);
        }
        if connected {
            return PollStatus::Connected;
        }

        let now = self.clock.now();
        let storage = &self.storage;
        let load_override = &mut self.load_override;
        let event = self.connection.step(&mut self.wifi, now, || {
            load_credentials(storage, load_override)
        });
        if let Some(event) = event {
            self.dispatch(event);
        }

        if self.connection.has_failed() {
            PollStatus::GaveUp
        } else if self.connection.is_waiting() {
            PollStatus::Connecting
        } else {
            PollStatus::Idle
        }
    }

    /// Feed bytes received outside of the transport
    ///
    /// Returns whether any byte was accepted as part of a frame.
    pub fn handle_buffer(&mut self, bytes: &[u8]) -> bool {
        let mut accepted = false;
        for &byte in bytes {
            accepted |= self.receive_byte(byte);
        }
        accepted
    }

    /// Join a network with the simple bounded loop, blocking until done
    ///
    /// The transport is still drained between link checks. WiFi settings
    /// received meanwhile are acknowledged with `Provisioning` and joined
    /// once this call returns. A wire join that was already pending is
    /// abandoned with a `Stopped` state. Steady-state retry counters are
    /// left alone.
    pub fn try_connect_to_wifi(&mut self, ssid: &str, password: &str) -> bool {
        if let Some(pending) = self.join.take() {
            info!(
                "Abandoning join of '{}' for a direct connection request",
                pending.credentials().ssid
            );
            self.set_state(State::Stopped);
        }

        let now = self.clock.now();
        let mut attempt = JoinAttempt::start(
            &mut self.wifi,
            Credentials::new(ssid, password),
            &self.config,
            now,
        );

        self.blocking_join = true;
        let connected = loop {
            let now = self.clock.now();
            let due = attempt.next_check();
            if due > now {
                self.clock.sleep(due - now);
            }
            self.poll_transport();

            let now = self.clock.now();
            match attempt.poll(&mut self.wifi, now) {
                JoinPoll::Pending => {}
                JoinPoll::Connected => break true,
                JoinPoll::Failed => break false,
            }
        };
        self.blocking_join = false;

        if let Some(credentials) = self.deferred.take() {
            self.begin_join(credentials);
        }
        connected
    }

    fn poll_transport(&mut self) {
        while let Some(byte) = self.transport.read_byte() {
            self.receive_byte(byte);
        }
    }

    fn receive_byte(&mut self, byte: u8) -> bool {
        if self.config.session_expiry == SessionExpiry::StopListening && !self.session_active() {
            if self.parser.position() > 0 {
                debug!("Session window lapsed, dropping partial frame");
                self.parser.reset();
            }
            return false;
        }

        match self.parser.push(byte) {
            ParseEvent::Pending => true,
            ParseEvent::Rejected => false,
            ParseEvent::BadChecksum => {
                warn!("Dropping frame with bad checksum");
                self.send_error(ErrorCode::InvalidRpc);
                self.observers.error(ErrorCode::InvalidRpc);
                false
            }
            ParseEvent::Frame(frame) => {
                self.session_deadline = self.clock.now() + self.config.session_window();
                if frame.frame_type == TYPE_RPC_COMMAND {
                    let command = Command::decode(&frame.payload, false);
                    self.handle_command(command);
                } else {
                    debug!("Ignoring frame of type 0x{:02X}", frame.frame_type);
                }
                true
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        debug!("Received command {:?}", command.code());
        match command {
            Command::GetCurrentState => {
                if self.wifi.is_connected() {
                    self.set_state(State::Provisioned);
                    self.send_device_url(CMD_GET_CURRENT_STATE);
                } else {
                    self.set_state(State::Authorized);
                }
            }
            Command::WifiSettings { ssid, password } => self.start_provisioning(ssid, password),
            Command::GetDeviceInfo => self.send_device_info(),
            Command::GetWifiNetworks => self.send_wifi_networks(),
            Command::Unknown | Command::BadChecksum => {
                warn!("Unknown or malformed RPC command");
                self.send_error(ErrorCode::UnknownRpc);
            }
        }
    }

    fn start_provisioning(&mut self, ssid: Vec<u8>, password: Vec<u8>) {
        if ssid.is_empty() {
            warn!("Rejecting WiFi settings with empty SSID");
            self.send_error(ErrorCode::InvalidRpc);
            return;
        }
        let credentials = Credentials::new(utf8_lossy(ssid, "SSID"), utf8_lossy(password, "password"));

        // the newest settings win; the older request ends as Stopped
        let superseded = self
            .deferred
            .take()
            .or_else(|| self.join.take().map(JoinAttempt::into_credentials));
        if let Some(previous) = superseded {
            info!("Dropping pending join of '{}' for newer WiFi settings", previous.ssid);
            self.set_state(State::Stopped);
        }

        self.set_state(State::Provisioning);
        self.connection.abort_cycle();

        if self.blocking_join {
            info!("Queueing WiFi settings for '{}' until the current join ends", credentials.ssid);
            self.deferred = Some(credentials);
            return;
        }
        self.begin_join(credentials);
    }

    fn begin_join(&mut self, credentials: Credentials) {
        if let Some(connect) = self.connect_override.as_mut() {
            let success = connect(&credentials.ssid, &credentials.password);
            self.finish_provisioning(credentials, success);
        } else {
            let now = self.clock.now();
            self.join = Some(JoinAttempt::start(&mut self.wifi, credentials, &self.config, now));
        }
    }

    fn advance_join(&mut self) {
        let Some(join) = self.join.as_mut() else {
            return;
        };
        let now = self.clock.now();
        let outcome = join.poll(&mut self.wifi, now);
        if outcome == JoinPoll::Pending {
            return;
        }
        if let Some(join) = self.join.take() {
            self.finish_provisioning(join.into_credentials(), outcome == JoinPoll::Connected);
        }
    }

    fn finish_provisioning(&mut self, credentials: Credentials, success: bool) {
        if !success {
            self.set_state(State::Stopped);
            self.send_error(ErrorCode::UnableToConnect);
            self.observers.error(ErrorCode::UnableToConnect);
            return;
        }

        info!("Provisioned onto '{}'", credentials.ssid);
        self.save_credentials(&credentials);
        let connected = self.wifi.is_connected();
        self.connection.mark_connected(credentials.clone(), connected);

        self.send_error(ErrorCode::None);
        self.set_state(State::Provisioned);
        self.send_device_url(CMD_WIFI_SETTINGS);
        self.observers.connected(&credentials.ssid, &credentials.password);
    }

    fn save_credentials(&mut self, credentials: &Credentials) {
        if let Some(save) = self.save_override.as_mut() {
            save(credentials);
            return;
        }
        if let Err(e) = self
            .storage
            .set_wifi_credentials(&credentials.ssid, &credentials.password)
        {
            error!("Failed to save WiFi credentials: {e}");
        }
    }

    fn dispatch(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected(credentials) => {
                let ip = self
                    .wifi
                    .local_ip()
                    .map(|ip| ip.to_string())
                    .unwrap_or_default();
                info!("WiFi connected with IP: {ip}");
                let credentials = credentials.unwrap_or_default();
                self.observers.connected(&credentials.ssid, &credentials.password);
            }
            ConnectionEvent::Disconnected => {
                info!("WiFi connection lost");
                self.observers.disconnected();
                self.observers.error(ErrorCode::WifiDisconnected);
            }
            ConnectionEvent::RetriesExhausted => {
                self.observers.error(ErrorCode::UnableToConnect);
            }
            ConnectionEvent::GaveUp => {
                warn!(
                    "Connection failure detected after {} tries, giving up",
                    self.connection.retries_done()
                );
                self.observers.error(ErrorCode::ConnectGiveup);
            }
        }
    }

    fn send_device_info(&mut self) {
        let response = build_rpc_response(CMD_GET_DEVICE_INFO, &self.info.rpc_fields(), false);
        match response {
            Ok(response) => self.send_response(response),
            Err(e) => error!("Device info does not fit a response: {e}"),
        }
    }

    fn send_device_url(&mut self, command: u8) {
        let url = self.info.device_url(self.wifi.local_ip());
        match build_rpc_response(command, &[url.as_str()], false) {
            Ok(response) => self.send_response(response),
            Err(e) => error!("Device URL does not fit a response: {e}"),
        }
    }

    fn send_wifi_networks(&mut self) {
        let mut networks = self.scan();
        if networks.is_empty() {
            networks = self.scan();
        }

        // strongest first, one entry per SSID
        networks.sort_by(|a, b| b.rssi.cmp(&a.rssi));
        let mut seen = HashSet::new();
        for network in networks {
            if !seen.insert(network.ssid.clone()) {
                continue;
            }
            let ssid = if network.ssid.is_empty() {
                HIDDEN_SSID
            } else {
                network.ssid.as_str()
            };
            let rssi = network.rssi.to_string();
            let auth = if network.auth_required { "YES" } else { "NO" };

            match build_rpc_response(CMD_GET_WIFI_NETWORKS, &[ssid, rssi.as_str(), auth], false) {
                Ok(response) => self.send_response(response),
                Err(e) => warn!("Skipping network '{ssid}': {e}"),
            }
        }

        match build_rpc_response::<&str>(CMD_GET_WIFI_NETWORKS, &[], false) {
            Ok(response) => self.send_response(response),
            Err(e) => error!("Failed to build network list terminator: {e}"),
        }
    }

    fn scan(&mut self) -> Vec<ScanResult> {
        self.wifi.scan().unwrap_or_else(|e| {
            warn!("WiFi scan failed: {e}");
            Vec::new()
        })
    }

    fn set_state(&mut self, state: State) {
        debug!("State -> {state:?}");
        self.send_frame(Frame::state(state));
    }

    fn send_error(&mut self, code: ErrorCode) {
        if !code.is_wire_code() {
            debug!("Not sending device-local error {code:?}");
            return;
        }
        self.send_frame(Frame::error(code));
    }

    fn send_response(&mut self, response: Vec<u8>) {
        self.send_frame(Frame::rpc_response(response));
    }

    fn send_frame(&mut self, frame: Frame) {
        let bytes = match frame.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to encode frame: {e}");
                return;
            }
        };
        if let Err(e) = self.transport.write_frame(&bytes) {
            warn!("Failed to write frame: {e}");
        }
    }
}

/// SSIDs are arbitrary octets; invalid sequences become U+FFFD
fn utf8_lossy(bytes: Vec<u8>, what: &str) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| {
        warn!("WiFi {what} is not valid UTF-8, replacing invalid bytes");
        String::from_utf8_lossy(e.as_bytes()).into_owned()
    })
}

fn load_credentials<S: Storage>(
    storage: &S,
    load_override: &mut Option<LoadOverride>,
) -> Option<Credentials> {
    if let Some(load) = load_override.as_mut() {
        return load();
    }
    match storage.get_wifi_credentials() {
        Ok(credentials) => credentials,
        Err(e) => {
            warn!("Failed to load WiFi credentials: {e}");
            None
        }
    }
}
