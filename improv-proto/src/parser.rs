//! Streaming frame parser
//!
//! Bytes are validated one at a time against their position in the
//! candidate frame, so a bad preamble or version is caught on the first
//! wrong byte instead of after a whole message has been buffered.

use crate::{Frame, HEADER_LEN, MAX_FRAME_LEN, PREAMBLE, VERSION, checksum};

/// Outcome of checking one byte at one position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteVerdict {
    /// Byte fits, keep it and continue
    Accept,
    /// Byte does not fit, start over from the preamble
    Reject,
    /// Byte sits in the checksum slot and does not match
    BadChecksum,
    /// Byte is a matching checksum, the frame is complete
    Complete,
}

/// Check `byte` at `position` given the bytes accepted so far
///
/// `buffer` must hold exactly the `position` bytes accepted before this one.
pub fn validate_byte(position: usize, byte: u8, buffer: &[u8]) -> ByteVerdict {
    if position < PREAMBLE.len() {
        return if byte == PREAMBLE[position] {
            ByteVerdict::Accept
        } else {
            ByteVerdict::Reject
        };
    }

    if position == PREAMBLE.len() {
        return if byte == VERSION {
            ByteVerdict::Accept
        } else {
            ByteVerdict::Reject
        };
    }

    // type and length are captured raw
    if position < HEADER_LEN {
        return ByteVerdict::Accept;
    }

    let Some(&data_len) = buffer.get(HEADER_LEN - 1) else {
        return ByteVerdict::Reject;
    };
    let checksum_pos = HEADER_LEN + data_len as usize;

    if position < checksum_pos {
        return ByteVerdict::Accept;
    }

    if position == checksum_pos && buffer.len() == position {
        return if checksum(buffer) == byte {
            ByteVerdict::Complete
        } else {
            ByteVerdict::BadChecksum
        };
    }

    ByteVerdict::Reject
}

/// Event produced by feeding one byte to a [`FrameParser`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    /// Byte accepted, frame not complete yet
    Pending,
    /// Byte did not match, parser is back at the preamble
    Rejected,
    /// Frame was complete but its checksum did not match
    BadChecksum,
    /// A complete, checksum-verified frame
    Frame(Frame),
}

/// Stateful wrapper around [`validate_byte`]
///
/// The in-flight buffer never grows beyond [`MAX_FRAME_LEN`]. After any event
/// other than `Pending` the parser restarts at position 0; the byte that
/// caused a rejection is not re-examined as the start of a new frame.
#[derive(Debug)]
pub struct FrameParser {
    buffer: Vec<u8>,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_FRAME_LEN),
        }
    }

    /// Position of the next byte within the candidate frame
    pub fn position(&self) -> usize {
        self.buffer.len()
    }

    pub fn push(&mut self, byte: u8) -> ParseEvent {
        match validate_byte(self.buffer.len(), byte, &self.buffer) {
            ByteVerdict::Accept => {
                self.buffer.push(byte);
                ParseEvent::Pending
            }
            ByteVerdict::Reject => {
                self.buffer.clear();
                ParseEvent::Rejected
            }
            ByteVerdict::BadChecksum => {
                log::debug!(
                    "frame checksum mismatch: got 0x{:02X}, expected 0x{:02X}",
                    byte,
                    checksum(&self.buffer)
                );
                self.buffer.clear();
                ParseEvent::BadChecksum
            }
            ByteVerdict::Complete => {
                let frame = Frame::new(self.buffer[7], self.buffer[HEADER_LEN..].to_vec());
                self.buffer.clear();
                ParseEvent::Frame(frame)
            }
        }
    }

    /// Drop any half-parsed frame
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
