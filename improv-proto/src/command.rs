//! RPC command decoding and response encoding
//!
//! RPC payloads share one layout in both directions:
//!
//! ```text
//! command | total_len | (field_len, field_bytes)* | [checksum]
//! ```
//!
//! The trailing checksum only appears when an RPC body travels outside a
//! frame; inside a frame the frame checksum already covers it.

use crate::{
    CMD_GET_CURRENT_STATE, CMD_GET_DEVICE_INFO, CMD_GET_WIFI_NETWORKS, CMD_WIFI_SETTINGS,
    ProtocolError, checksum,
};

/// Command received from a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    GetCurrentState,
    WifiSettings { ssid: Vec<u8>, password: Vec<u8> },
    GetDeviceInfo,
    GetWifiNetworks,
    /// Unknown command byte or inconsistent length
    Unknown,
    /// Standalone buffer whose trailing checksum did not match
    BadChecksum,
}

impl Command {
    /// Decode an RPC payload
    ///
    /// `check_checksum` is for standalone buffers that carry their own
    /// trailing checksum byte; frames from the parser are already verified.
    pub fn decode(data: &[u8], check_checksum: bool) -> Self {
        let trailer = usize::from(check_checksum);
        if data.len() < 2 + trailer {
            return Command::Unknown;
        }

        let command = data[0];
        let data_length = data[1] as usize;
        if data_length != data.len() - 2 - trailer {
            return Command::Unknown;
        }

        if check_checksum {
            let (body, expected) = data.split_at(data.len() - 1);
            if checksum(body) != expected[0] {
                return Command::BadChecksum;
            }
        }

        match command {
            CMD_WIFI_SETTINGS => {
                let mut fields = FieldReader::new(&data[2..2 + data_length]);
                match (fields.next_field(), fields.next_field()) {
                    (Some(ssid), Some(password)) => Command::WifiSettings {
                        ssid: ssid.to_vec(),
                        password: password.to_vec(),
                    },
                    _ => Command::Unknown,
                }
            }
            CMD_GET_CURRENT_STATE => Command::GetCurrentState,
            CMD_GET_DEVICE_INFO => Command::GetDeviceInfo,
            CMD_GET_WIFI_NETWORKS => Command::GetWifiNetworks,
            _ => Command::Unknown,
        }
    }

    /// Command byte, `None` for the two decode-failure variants
    pub fn code(&self) -> Option<u8> {
        match self {
            Command::WifiSettings { .. } => Some(CMD_WIFI_SETTINGS),
            Command::GetCurrentState => Some(CMD_GET_CURRENT_STATE),
            Command::GetDeviceInfo => Some(CMD_GET_DEVICE_INFO),
            Command::GetWifiNetworks => Some(CMD_GET_WIFI_NETWORKS),
            Command::Unknown | Command::BadChecksum => None,
        }
    }

    /// Encode as a host would send it
    pub fn encode(&self, add_checksum: bool) -> Result<Vec<u8>, ProtocolError> {
        let Some(code) = self.code() else {
            return Err(ProtocolError::NotEncodable);
        };
        match self {
            Command::WifiSettings { ssid, password } => {
                build_rpc_response(code, &[ssid.as_slice(), password.as_slice()], add_checksum)
            }
            _ => build_rpc_response::<&[u8]>(code, &[], add_checksum),
        }
    }
}

/// Build an RPC payload from a command byte and its string fields
///
/// Fields longer than 255 bytes, or a body longer than 255 bytes, are
/// rejected rather than truncated.
pub fn build_rpc_response<F: AsRef<[u8]>>(
    command: u8,
    fields: &[F],
    add_checksum: bool,
) -> Result<Vec<u8>, ProtocolError> {
    let mut body = Vec::new();
    for field in fields {
        let field = field.as_ref();
        if field.len() > u8::MAX as usize {
            return Err(ProtocolError::FieldTooLong { len: field.len() });
        }
        body.push(field.len() as u8);
        body.extend_from_slice(field);
    }
    if body.len() > u8::MAX as usize {
        return Err(ProtocolError::PayloadTooLong { len: body.len() });
    }

    let mut out = Vec::with_capacity(body.len() + 3);
    out.push(command);
    out.push(body.len() as u8);
    out.extend_from_slice(&body);
    if add_checksum {
        out.push(checksum(&out));
    }
    Ok(out)
}

/// Decoded RPC response, as seen by a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcResponse {
    pub command: u8,
    pub fields: Vec<Vec<u8>>,
}

impl RpcResponse {
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < 2 {
            return Err(ProtocolError::Truncated);
        }
        let command = data[0];
        let data_length = data[1] as usize;
        let body = data.get(2..2 + data_length).ok_or(ProtocolError::Truncated)?;

        let mut reader = FieldReader::new(body);
        let mut fields = Vec::new();
        while !reader.is_empty() {
            let field = reader.next_field().ok_or(ProtocolError::Truncated)?;
            fields.push(field.to_vec());
        }
        Ok(Self { command, fields })
    }

    /// Fields as text, invalid UTF-8 replaced
    pub fn fields_lossy(&self) -> Vec<String> {
        self.fields
            .iter()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect()
    }
}

/// Walks length-prefixed fields
struct FieldReader<'a> {
    data: &'a [u8],
}

impl<'a> FieldReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn next_field(&mut self) -> Option<&'a [u8]> {
        let (&len, rest) = self.data.split_first()?;
        let field = rest.get(..len as usize)?;
        self.data = &rest[len as usize..];
        Some(field)
    }
}
