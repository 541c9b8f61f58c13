//! Serial transport and time source traits

use std::time::{Duration, Instant};

/// Byte stream the protocol runs over (UART, USB CDC, a TCP bridge...)
pub trait Transport {
    type Error: std::fmt::Display;

    /// Next received byte, `None` when nothing is buffered
    fn read_byte(&mut self) -> Option<u8>;

    /// Write one complete frame in a single call
    fn write_frame(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
}

/// Monotonic time source
///
/// `now` is measured from an arbitrary fixed origin such as boot.
pub trait Clock {
    fn now(&self) -> Duration;

    /// Block for `duration`; only used by the blocking join helper
    fn sleep(&mut self, duration: Duration);
}

/// Clock backed by `std::time::Instant`
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
