//! Scripted collaborators for driving the engine in tests
//!
//! The WiFi fake and the clock share one time cell, so a link that comes
//! up "after 800 ms" does so in step with the engine's own deadlines.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::Duration;

use improv_mcu::{
    ChipFamily, Clock, Config, DeviceInfo, MemoryStorage, Provisioner, ScanResult, Transport,
    Wifi, WifiStatus,
};
use improv_proto::{Command, Frame, FrameParser, ParseEvent};

pub type SharedTime = Rc<Cell<Duration>>;

pub const DEVICE_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 20);

/// Serial line with a scripted inbox and a recorded outbox
#[derive(Debug, Default)]
pub struct FakeTransport {
    inbox: VecDeque<u8>,
    outbox: Vec<u8>,
    pub writes: usize,
}

impl FakeTransport {
    pub fn feed(&mut self, bytes: &[u8]) {
        self.inbox.extend(bytes);
    }

    /// Every frame written since the last call
    pub fn take_frames(&mut self) -> Vec<Frame> {
        let bytes = std::mem::take(&mut self.outbox);
        decode_frames(&bytes)
    }
}

impl Transport for FakeTransport {
    type Error = Infallible;

    fn read_byte(&mut self) -> Option<u8> {
        self.inbox.pop_front()
    }

    fn write_frame(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.writes += 1;
        self.outbox.extend_from_slice(bytes);
        Ok(())
    }
}

/// Clock advanced by hand; `sleep` moves it forward instantly
#[derive(Debug, Clone)]
pub struct ManualClock {
    time: SharedTime,
}

impl ManualClock {
    pub fn new(time: SharedTime) -> Self {
        Self { time }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.time.get()
    }

    fn sleep(&mut self, duration: Duration) {
        self.time.set(self.time.get() + duration);
    }
}

/// Radio that joins known networks after a fixed delay
#[derive(Debug)]
pub struct FakeWifi {
    time: SharedTime,
    pub networks: Vec<ScanResult>,
    pub empty_scans: usize,
    pub known: HashMap<String, String>,
    pub join_delay: Duration,
    link: Option<(String, Duration)>,
    pub joins: Vec<String>,
    pub disconnects: usize,
    pub scans: usize,
}

impl FakeWifi {
    pub fn new(time: SharedTime) -> Self {
        Self {
            time,
            networks: Vec::new(),
            empty_scans: 0,
            known: HashMap::new(),
            join_delay: Duration::ZERO,
            link: None,
            joins: Vec::new(),
            disconnects: 0,
            scans: 0,
        }
    }

    pub fn with_network(mut self, ssid: &str, password: &str) -> Self {
        self.known.insert(ssid.to_string(), password.to_string());
        self
    }

    /// Link dropped by the access point
    pub fn drop_link(&mut self) {
        self.link = None;
    }
}

impl Wifi for FakeWifi {
    type Error = Infallible;

    fn scan(&mut self) -> Result<Vec<ScanResult>, Self::Error> {
        self.scans += 1;
        if self.empty_scans > 0 {
            self.empty_scans -= 1;
            return Ok(Vec::new());
        }
        Ok(self.networks.clone())
    }

    fn begin_connect(&mut self, ssid: &str, password: &str) -> Result<(), Self::Error> {
        self.joins.push(ssid.to_string());
        self.link = match self.known.get(ssid) {
            Some(expected) if expected == password => {
                Some((ssid.to_string(), self.time.get() + self.join_delay))
            }
            _ => None,
        };
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.disconnects += 1;
        self.link = None;
        Ok(())
    }

    fn status(&self) -> WifiStatus {
        match &self.link {
            Some((_, at)) if self.time.get() >= *at => WifiStatus::Connected,
            Some(_) => WifiStatus::Connecting,
            None => WifiStatus::Disconnected,
        }
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        self.is_connected().then_some(DEVICE_IP)
    }
}

pub type TestProvisioner = Provisioner<FakeTransport, FakeWifi, MemoryStorage, ManualClock>;

pub struct Harness {
    pub time: SharedTime,
    pub provisioner: TestProvisioner,
}

impl Harness {
    pub fn new(config: Config) -> Self {
        Self::with_parts(config, |wifi| wifi, MemoryStorage::new())
    }

    pub fn with_parts(
        config: Config,
        wifi: impl FnOnce(FakeWifi) -> FakeWifi,
        storage: MemoryStorage,
    ) -> Self {
        let time: SharedTime = Rc::new(Cell::new(Duration::ZERO));
        let wifi = wifi(FakeWifi::new(time.clone()));
        let provisioner = Provisioner::new(
            FakeTransport::default(),
            wifi,
            storage,
            ManualClock::new(time.clone()),
            device_info(),
            config,
        );
        Self { time, provisioner }
    }

    pub fn advance(&self, by: Duration) {
        self.time.set(self.time.get() + by);
    }

    pub fn send(&mut self, command: &Command) {
        self.provisioner.transport_mut().feed(&command_frame(command));
    }

    pub fn frames(&mut self) -> Vec<Frame> {
        self.provisioner.transport_mut().take_frames()
    }
}

pub fn device_info() -> DeviceInfo {
    DeviceInfo::new(ChipFamily::Esp32, "improv-test", "1.2.3", "Test Device")
}

pub fn command_frame(command: &Command) -> Vec<u8> {
    Frame::rpc_command(command).unwrap().to_bytes().unwrap()
}

pub fn wifi_settings(ssid: &str, password: &str) -> Command {
    Command::WifiSettings {
        ssid: ssid.as_bytes().to_vec(),
        password: password.as_bytes().to_vec(),
    }
}

pub fn decode_frames(bytes: &[u8]) -> Vec<Frame> {
    let mut parser = FrameParser::new();
    let mut frames = Vec::new();
    for &byte in bytes {
        if let ParseEvent::Frame(frame) = parser.push(byte) {
            frames.push(frame);
        }
    }
    frames
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}
