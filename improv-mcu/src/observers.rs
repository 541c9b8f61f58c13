//! Subscriber lists for connection and error events
//!
//! Every registered callback runs, in registration order, on each event.

use improv_proto::ErrorCode;

pub type ConnectedCallback = Box<dyn FnMut(&str, &str)>;
pub type ErrorCallback = Box<dyn FnMut(ErrorCode)>;
pub type DisconnectedCallback = Box<dyn FnMut()>;

#[derive(Default)]
pub struct Observers {
    connected: Vec<ConnectedCallback>,
    error: Vec<ErrorCallback>,
    disconnected: Vec<DisconnectedCallback>,
}

impl Observers {
    pub fn on_connected(&mut self, cb: impl FnMut(&str, &str) + 'static) {
        self.connected.push(Box::new(cb));
    }

    pub fn on_error(&mut self, cb: impl FnMut(ErrorCode) + 'static) {
        self.error.push(Box::new(cb));
    }

    pub fn on_disconnected(&mut self, cb: impl FnMut() + 'static) {
        self.disconnected.push(Box::new(cb));
    }

    pub fn connected(&mut self, ssid: &str, password: &str) {
        for cb in &mut self.connected {
            cb(ssid, password);
        }
    }

    pub fn error(&mut self, code: ErrorCode) {
        for cb in &mut self.error {
            cb(code);
        }
    }

    pub fn disconnected(&mut self) {
        for cb in &mut self.disconnected {
            cb();
        }
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("connected", &self.connected.len())
            .field("error", &self.error.len())
            .field("disconnected", &self.disconnected.len())
            .finish()
    }
}
