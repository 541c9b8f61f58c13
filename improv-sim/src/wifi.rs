//! Simulated WiFi radio

use std::convert::Infallible;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use improv_mcu::{ScanResult, Wifi, WifiStatus};
use log::{debug, info};

use crate::{SimConfig, SimNetwork};

#[derive(Debug)]
enum Link {
    Down,
    Joining { ssid: String, ready_at: Instant },
    Failed,
}

/// Radio that associates with configured networks after a fixed delay
///
/// A wrong password or an unknown SSID never comes up, the way a real
/// station just keeps failing to associate.
#[derive(Debug)]
pub struct SimWifi {
    networks: Vec<SimNetwork>,
    join_delay: Duration,
    ip: Ipv4Addr,
    link: Link,
}

impl SimWifi {
    pub fn new(networks: Vec<SimNetwork>, join_delay: Duration, ip: Ipv4Addr) -> Self {
        Self {
            networks,
            join_delay,
            ip,
            link: Link::Down,
        }
    }

    pub fn from_config(config: &SimConfig) -> Self {
        Self::new(
            config.networks.clone(),
            Duration::from_millis(config.join_delay_ms),
            config.ip,
        )
    }

    /// SSID of the network the radio is associated with
    pub fn current_ssid(&self) -> Option<&str> {
        match &self.link {
            Link::Joining { ssid, ready_at } if Instant::now() >= *ready_at => Some(ssid.as_str()),
            _ => None,
        }
    }

    /// Simulate the access point going away
    pub fn drop_link(&mut self) {
        if self.current_ssid().is_some() {
            info!("Simulated link loss");
        }
        self.link = Link::Down;
    }
}

impl Wifi for SimWifi {
    type Error = Infallible;

    fn scan(&mut self) -> Result<Vec<ScanResult>, Self::Error> {
        debug!("Scanning {} simulated networks", self.networks.len());
        Ok(self
            .networks
            .iter()
            .map(|n| ScanResult::new(n.ssid.clone(), n.rssi, !n.is_open()))
            .collect())
    }

    fn begin_connect(&mut self, ssid: &str, password: &str) -> Result<(), Self::Error> {
        let accepted = self
            .networks
            .iter()
            .any(|n| n.ssid == ssid && (n.is_open() || n.password == password));

        self.link = if accepted {
            Link::Joining {
                ssid: ssid.to_string(),
                ready_at: Instant::now() + self.join_delay,
            }
        } else {
            debug!("Simulated association with '{ssid}' will not succeed");
            Link::Failed
        };
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.link = Link::Down;
        Ok(())
    }

    fn status(&self) -> WifiStatus {
        match &self.link {
            Link::Down => WifiStatus::Disconnected,
            Link::Failed => WifiStatus::Failed,
            Link::Joining { ready_at, .. } if Instant::now() >= *ready_at => WifiStatus::Connected,
            Link::Joining { .. } => WifiStatus::Connecting,
        }
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        self.is_connected().then_some(self.ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn radio() -> SimWifi {
        SimWifi::new(
            vec![
                SimNetwork::new("home", "secret", -50),
                SimNetwork::new("open", "", -70),
            ],
            Duration::ZERO,
            Ipv4Addr::new(10, 1, 2, 3),
        )
    }

    #[test]
    fn joins_with_the_right_password() {
        let mut wifi = radio();
        wifi.begin_connect("home", "secret").unwrap();
        assert!(wifi.is_connected());
        assert_eq!(wifi.current_ssid(), Some("home"));
        assert_eq!(wifi.local_ip(), Some(Ipv4Addr::new(10, 1, 2, 3)));

        wifi.drop_link();
        assert_eq!(wifi.status(), WifiStatus::Disconnected);
        assert_eq!(wifi.local_ip(), None);
    }

    #[test]
    fn open_network_ignores_password() {
        let mut wifi = radio();
        wifi.begin_connect("open", "whatever").unwrap();
        assert!(wifi.is_connected());
    }

    #[test]
    fn wrong_password_never_connects() {
        let mut wifi = radio();
        wifi.begin_connect("home", "nope").unwrap();
        assert_eq!(wifi.status(), WifiStatus::Failed);

        wifi.begin_connect("elsewhere", "secret").unwrap();
        assert!(!wifi.is_connected());
    }

    #[test]
    fn join_delay_is_honoured() {
        let mut wifi = SimWifi::new(
            vec![SimNetwork::new("home", "secret", -50)],
            Duration::from_secs(3600),
            Ipv4Addr::LOCALHOST,
        );
        wifi.begin_connect("home", "secret").unwrap();
        assert_eq!(wifi.status(), WifiStatus::Connecting);
    }

    #[test]
    fn scan_reports_auth() {
        let mut wifi = radio();
        let found = wifi.scan().unwrap();
        assert_eq!(
            found,
            vec![
                ScanResult::new("home", -50, true),
                ScanResult::new("open", -70, false),
            ]
        );
    }
}
