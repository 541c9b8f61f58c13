//! TCP stand-in for the device UART
//!
//! One host at a time; a new connection replaces the previous one. Frames
//! written while no host is attached are dropped, like bytes on an
//! unplugged serial line.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use improv_mcu::Transport;
use log::{debug, info, warn};

const READ_CHUNK: usize = 256;

#[derive(Debug)]
pub struct SerialBridge {
    listener: TcpListener,
    client: Option<TcpStream>,
    rx: VecDeque<u8>,
}

impl SerialBridge {
    pub fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            client: None,
            rx: VecDeque::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    fn accept(&mut self) {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nonblocking(true) {
                    warn!("Rejecting host {peer}: {e}");
                    return;
                }
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Could not disable Nagle for {peer}: {e}");
                }
                if self.client.is_some() {
                    info!("Host {peer} replaces the previous connection");
                } else {
                    info!("Host connected from {peer}");
                }
                self.rx.clear();
                self.client = Some(stream);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => warn!("Accept failed: {e}"),
        }
    }

    fn fill(&mut self) {
        let Some(stream) = self.client.as_mut() else {
            return;
        };

        let mut buf = [0u8; READ_CHUNK];
        match stream.read(&mut buf) {
            Ok(0) => {
                info!("Host disconnected");
                self.client = None;
            }
            Ok(n) => {
                debug!("Received {n} bytes");
                self.rx.extend(&buf[..n]);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => {
                warn!("Serial read failed: {e}");
                self.client = None;
            }
        }
    }
}

impl Transport for SerialBridge {
    type Error = io::Error;

    fn read_byte(&mut self) -> Option<u8> {
        if self.rx.is_empty() {
            self.accept();
            self.fill();
        }
        self.rx.pop_front()
    }

    fn write_frame(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        match self.client.as_mut() {
            Some(stream) => stream.write_all(bytes),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn read_until(bridge: &mut SerialBridge, want: usize) -> Vec<u8> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut got = Vec::new();
        while got.len() < want && Instant::now() < deadline {
            match bridge.read_byte() {
                Some(byte) => got.push(byte),
                None => std::thread::sleep(Duration::from_millis(5)),
            }
        }
        got
    }

    #[test]
    fn bytes_flow_both_ways() {
        let mut bridge = SerialBridge::bind("127.0.0.1:0").unwrap();
        let mut host = TcpStream::connect(bridge.local_addr().unwrap()).unwrap();

        host.write_all(b"IMPROV").unwrap();
        assert_eq!(read_until(&mut bridge, 6), b"IMPROV");
        assert!(bridge.has_client());

        bridge.write_frame(b"reply").unwrap();
        let mut buf = [0u8; 5];
        host.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"reply");
    }

    #[test]
    fn writes_without_a_host_are_dropped() {
        let mut bridge = SerialBridge::bind("127.0.0.1:0").unwrap();
        assert!(bridge.write_frame(b"nobody").is_ok());
        assert_eq!(bridge.read_byte(), None);
    }
}
