//! Improv serial wire protocol - frame types, framing and command codec
//!
//! Every frame on the wire looks like this:
//!
//! ```text
//! "IMPROV" | version | type | len | payload[len] | checksum
//! ```
//!
//! The checksum is the 8-bit wrapping sum of every byte before it.

mod command;
mod error;
mod parser;

pub use command::{Command, RpcResponse, build_rpc_response};
pub use error::ProtocolError;
pub use parser::{ByteVerdict, FrameParser, ParseEvent, validate_byte};

/// Fixed marker at the start of every frame
pub const PREAMBLE: &[u8; 6] = b"IMPROV";

/// The only protocol version this crate speaks
pub const VERSION: u8 = 1;

/// Preamble, version, type and length
pub const HEADER_LEN: usize = 9;
pub const MAX_PAYLOAD_LEN: usize = 255;
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_PAYLOAD_LEN + 1;

// Frame types
pub const TYPE_CURRENT_STATE: u8 = 0x01;
pub const TYPE_ERROR_STATE: u8 = 0x02;
pub const TYPE_RPC_COMMAND: u8 = 0x03;
pub const TYPE_RPC_RESPONSE: u8 = 0x04;

// RPC commands
pub const CMD_WIFI_SETTINGS: u8 = 0x01;
pub const CMD_GET_CURRENT_STATE: u8 = 0x02;
pub const CMD_GET_DEVICE_INFO: u8 = 0x03;
pub const CMD_GET_WIFI_NETWORKS: u8 = 0x04;

/// Provisioning state reported in `CURRENT_STATE` frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    Stopped = 0x00,
    Authorized = 0x02,
    Provisioning = 0x03,
    Provisioned = 0x04,
}

impl TryFrom<u8> for State {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(State::Stopped),
            0x02 => Ok(State::Authorized),
            0x03 => Ok(State::Provisioning),
            0x04 => Ok(State::Provisioned),
            other => Err(ProtocolError::UnknownState(other)),
        }
    }
}

/// Error codes reported in `ERROR_STATE` frames
///
/// `WifiDisconnected` and `ConnectGiveup` are device-local: they are handed
/// to error observers but never written to the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    None = 0x00,
    InvalidRpc = 0x01,
    UnknownRpc = 0x02,
    UnableToConnect = 0x03,
    NotAuthorized = 0x04,
    WifiDisconnected = 0xFD,
    ConnectGiveup = 0xFE,
    Unknown = 0xFF,
}

impl ErrorCode {
    /// Whether this code may appear in an `ERROR_STATE` frame
    pub fn is_wire_code(self) -> bool {
        !matches!(self, ErrorCode::WifiDisconnected | ErrorCode::ConnectGiveup)
    }
}

impl From<u8> for ErrorCode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => ErrorCode::None,
            0x01 => ErrorCode::InvalidRpc,
            0x02 => ErrorCode::UnknownRpc,
            0x03 => ErrorCode::UnableToConnect,
            0x04 => ErrorCode::NotAuthorized,
            0xFD => ErrorCode::WifiDisconnected,
            0xFE => ErrorCode::ConnectGiveup,
            _ => ErrorCode::Unknown,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ErrorCode::None => "no error",
            ErrorCode::InvalidRpc => "invalid RPC packet",
            ErrorCode::UnknownRpc => "unknown RPC command",
            ErrorCode::UnableToConnect => "unable to connect",
            ErrorCode::NotAuthorized => "not authorized",
            ErrorCode::WifiDisconnected => "wifi disconnected",
            ErrorCode::ConnectGiveup => "gave up connecting",
            ErrorCode::Unknown => "unknown error",
        };
        f.write_str(text)
    }
}

/// 8-bit wrapping sum used by both frames and standalone RPC buffers
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Frame: one complete message, type plus payload
///
/// The type is kept raw since the parser accepts any type byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(frame_type: u8, payload: Vec<u8>) -> Self {
        Self { frame_type, payload }
    }

    pub fn state(state: State) -> Self {
        Self::new(TYPE_CURRENT_STATE, vec![state as u8])
    }

    pub fn error(code: ErrorCode) -> Self {
        Self::new(TYPE_ERROR_STATE, vec![code as u8])
    }

    /// RPC command frame, as sent by a host
    pub fn rpc_command(command: &Command) -> Result<Self, ProtocolError> {
        Ok(Self::new(TYPE_RPC_COMMAND, command.encode(false)?))
    }

    /// RPC response frame wrapping an already encoded response payload
    pub fn rpc_response(response: Vec<u8>) -> Self {
        Self::new(TYPE_RPC_RESPONSE, response)
    }

    /// Serialize with preamble, version, length and trailing checksum
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLong {
                len: self.payload.len(),
            });
        }

        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len() + 1);
        buf.extend_from_slice(PREAMBLE);
        buf.push(VERSION);
        buf.push(self.frame_type);
        buf.push(self.payload.len() as u8);
        buf.extend_from_slice(&self.payload);
        buf.push(checksum(&buf));
        Ok(buf)
    }

    /// Parse one frame from a complete byte slice
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut parser = FrameParser::new();
        for &byte in data {
            match parser.push(byte) {
                ParseEvent::Pending => {}
                ParseEvent::Frame(frame) => return Ok(frame),
                ParseEvent::Rejected => return Err(ProtocolError::BadHeader),
                ParseEvent::BadChecksum => return Err(ProtocolError::BadChecksum),
            }
        }
        Err(ProtocolError::Truncated)
    }
}

/// Async frame operations for tokio
#[cfg(feature = "async")]
pub mod async_io {
    use super::*;
    use std::io;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> io::Result<()> {
        let bytes = frame
            .to_bytes()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read the next valid frame, skipping anything that is not a frame
    ///
    /// A frame with a bad checksum is reported as `InvalidData`.
    pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Frame> {
        let mut parser = FrameParser::new();
        loop {
            let byte = reader.read_u8().await?;
            match parser.push(byte) {
                ParseEvent::Pending | ParseEvent::Rejected => {}
                ParseEvent::Frame(frame) => return Ok(frame),
                ParseEvent::BadChecksum => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        ProtocolError::BadChecksum,
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_frame_layout() {
        let bytes = Frame::state(State::Authorized).to_bytes().unwrap();
        assert_eq!(&bytes[..6], b"IMPROV");
        assert_eq!(bytes[6], VERSION);
        assert_eq!(bytes[7], TYPE_CURRENT_STATE);
        assert_eq!(bytes[8], 1);
        assert_eq!(bytes[9], 0x02);
        assert_eq!(bytes[10], checksum(&bytes[..10]));
        assert_eq!(bytes.len(), 11);
    }

    #[test]
    fn error_frame_carries_code() {
        let bytes = Frame::error(ErrorCode::UnableToConnect).to_bytes().unwrap();
        assert_eq!(bytes[7], TYPE_ERROR_STATE);
        assert_eq!(bytes[9], 0x03);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let frame = Frame::rpc_response(vec![0; 256]);
        assert_eq!(
            frame.to_bytes(),
            Err(ProtocolError::PayloadTooLong { len: 256 })
        );
    }

    #[test]
    fn checksum_wraps() {
        assert_eq!(checksum(&[0xFF, 0x02]), 0x01);
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn device_local_codes_stay_off_the_wire() {
        assert!(ErrorCode::InvalidRpc.is_wire_code());
        assert!(!ErrorCode::WifiDisconnected.is_wire_code());
        assert!(!ErrorCode::ConnectGiveup.is_wire_code());
        assert_eq!(ErrorCode::from(0x42), ErrorCode::Unknown);
    }

    #[test]
    fn from_bytes_detects_corruption() {
        let mut bytes = Frame::state(State::Provisioned).to_bytes().unwrap();
        assert_eq!(
            Frame::from_bytes(&bytes).unwrap(),
            Frame::state(State::Provisioned)
        );

        bytes[9] ^= 0x01;
        assert_eq!(Frame::from_bytes(&bytes), Err(ProtocolError::BadChecksum));
        assert_eq!(Frame::from_bytes(&bytes[..5]), Err(ProtocolError::Truncated));
        assert_eq!(Frame::from_bytes(b"XMPROV"), Err(ProtocolError::BadHeader));
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn async_roundtrip_skips_noise() {
        let frame = Frame::rpc_command(&Command::GetDeviceInfo).unwrap();
        let mut wire = Vec::new();
        wire.extend_from_slice(b"noise");
        async_io::write_frame(&mut wire, &frame).await.unwrap();

        let mut reader = wire.as_slice();
        let read = async_io::read_frame(&mut reader).await.unwrap();
        assert_eq!(read, frame);
    }
}
