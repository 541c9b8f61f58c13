//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding or decoding Improv frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A single length-prefixed field does not fit its length byte.
    #[error("field too long: {len} bytes, maximum 255")]
    FieldTooLong { len: usize },

    /// An RPC body or frame payload does not fit its length byte.
    #[error("payload too long: {len} bytes, maximum 255")]
    PayloadTooLong { len: usize },

    /// Input ended before a complete frame or field.
    #[error("truncated data")]
    Truncated,

    /// Preamble or version mismatch.
    #[error("not an Improv frame")]
    BadHeader,

    /// Trailing checksum does not match the frame contents.
    #[error("checksum mismatch")]
    BadChecksum,

    /// `Unknown` and `BadChecksum` only exist on the decode side.
    #[error("command has no wire encoding")]
    NotEncodable,

    /// State byte outside the known set.
    #[error("unknown state: 0x{0:02X}")]
    UnknownState(u8),
}
