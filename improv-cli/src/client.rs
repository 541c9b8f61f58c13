//! Host side of the Improv serial protocol

use std::io;
use std::time::Duration;

use improv_proto::async_io::{read_frame, write_frame};
use improv_proto::{
    CMD_GET_CURRENT_STATE, CMD_GET_DEVICE_INFO, CMD_GET_WIFI_NETWORKS, CMD_WIFI_SETTINGS,
    Command, ErrorCode, Frame, ProtocolError, RpcResponse, State, TYPE_CURRENT_STATE,
    TYPE_ERROR_STATE, TYPE_RPC_RESPONSE,
};
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("device did not answer within {0:?}")]
    Timeout(Duration),
    #[error("device reported: {0}")]
    Device(ErrorCode),
}

/// One decoded message from the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    State(State),
    Error(ErrorCode),
    Response(RpcResponse),
}

/// A network as listed by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub ssid: String,
    pub rssi: i8,
    pub auth_required: bool,
}

pub struct Client<S> {
    stream: S,
    timeout: Duration,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<S> {
    /// `timeout` bounds the wait for each individual reply
    pub fn new(stream: S, timeout: Duration) -> Self {
        Self { stream, timeout }
    }

    pub async fn send(&mut self, command: &Command) -> Result<(), ClientError> {
        let frame = Frame::rpc_command(command)?;
        write_frame(&mut self.stream, &frame).await?;
        Ok(())
    }

    pub async fn next_reply(&mut self) -> Result<Reply, ClientError> {
        loop {
            let frame = tokio::time::timeout(self.timeout, read_frame(&mut self.stream))
                .await
                .map_err(|_| ClientError::Timeout(self.timeout))??;

            let Some(&first) = frame.payload.first() else {
                if frame.frame_type == TYPE_RPC_RESPONSE {
                    return Err(ProtocolError::Truncated.into());
                }
                debug!("Skipping empty frame of type 0x{:02X}", frame.frame_type);
                continue;
            };

            match frame.frame_type {
                TYPE_CURRENT_STATE => return Ok(Reply::State(State::try_from(first)?)),
                TYPE_ERROR_STATE => return Ok(Reply::Error(ErrorCode::from(first))),
                TYPE_RPC_RESPONSE => {
                    return Ok(Reply::Response(RpcResponse::decode(&frame.payload)?));
                }
                other => debug!("Skipping frame of type 0x{other:02X}"),
            }
        }
    }

    /// Wait for the RPC response to `command`, failing on a device error
    async fn response_to(&mut self, command: u8) -> Result<RpcResponse, ClientError> {
        loop {
            match self.next_reply().await? {
                Reply::Response(response) if response.command == command => return Ok(response),
                Reply::Error(ErrorCode::None) => {}
                Reply::Error(code) => return Err(ClientError::Device(code)),
                other => debug!("Ignoring {other:?} while waiting for 0x{command:02X}"),
            }
        }
    }

    /// Current state, plus the device URL once provisioned
    pub async fn current_state(&mut self) -> Result<(State, Option<String>), ClientError> {
        self.send(&Command::GetCurrentState).await?;
        let state = loop {
            match self.next_reply().await? {
                Reply::State(state) => break state,
                Reply::Error(ErrorCode::None) => {}
                Reply::Error(code) => return Err(ClientError::Device(code)),
                Reply::Response(_) => {}
            }
        };

        if state != State::Provisioned {
            return Ok((state, None));
        }
        let response = self.response_to(CMD_GET_CURRENT_STATE).await?;
        Ok((state, response.fields_lossy().into_iter().next()))
    }

    /// Firmware name, firmware version, chip family and device name
    pub async fn device_info(&mut self) -> Result<Vec<String>, ClientError> {
        self.send(&Command::GetDeviceInfo).await?;
        Ok(self.response_to(CMD_GET_DEVICE_INFO).await?.fields_lossy())
    }

    pub async fn scan(&mut self) -> Result<Vec<Network>, ClientError> {
        self.send(&Command::GetWifiNetworks).await?;

        let mut networks = Vec::new();
        loop {
            let fields = self.response_to(CMD_GET_WIFI_NETWORKS).await?.fields_lossy();
            let [ssid, rssi, auth] = fields.as_slice() else {
                if fields.is_empty() {
                    return Ok(networks);
                }
                debug!("Skipping malformed network entry {fields:?}");
                continue;
            };
            networks.push(Network {
                ssid: ssid.clone(),
                rssi: rssi.parse().unwrap_or(i8::MIN),
                auth_required: auth == "YES",
            });
        }
    }

    /// Send credentials and wait for the outcome
    ///
    /// `on_state` sees every state change the device reports. Returns the
    /// device URL on success.
    pub async fn provision(
        &mut self,
        ssid: &str,
        password: &str,
        mut on_state: impl FnMut(State),
    ) -> Result<Option<String>, ClientError> {
        self.send(&Command::WifiSettings {
            ssid: ssid.as_bytes().to_vec(),
            password: password.as_bytes().to_vec(),
        })
        .await?;

        loop {
            match self.next_reply().await? {
                Reply::State(state) => on_state(state),
                Reply::Error(ErrorCode::None) => {}
                Reply::Error(code) => return Err(ClientError::Device(code)),
                Reply::Response(response) if response.command == CMD_WIFI_SETTINGS => {
                    return Ok(response.fields_lossy().into_iter().next());
                }
                Reply::Response(response) => {
                    debug!("Ignoring response to 0x{:02X}", response.command)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use improv_proto::build_rpc_response;
    use tokio::io::{AsyncReadExt, DuplexStream, duplex};

    fn pair() -> (Client<DuplexStream>, DuplexStream) {
        let (host, device) = duplex(4096);
        (Client::new(host, Duration::from_secs(5)), device)
    }

    async fn reply(device: &mut DuplexStream, frame: Frame) {
        write_frame(device, &frame).await.unwrap();
    }

    fn response(command: u8, fields: &[&str]) -> Frame {
        Frame::rpc_response(build_rpc_response(command, fields, false).unwrap())
    }

    #[tokio::test]
    async fn commands_are_framed() {
        let (mut client, mut device) = pair();
        client.send(&Command::GetDeviceInfo).await.unwrap();

        let frame = read_frame(&mut device).await.unwrap();
        assert_eq!(frame, Frame::rpc_command(&Command::GetDeviceInfo).unwrap());
    }

    #[tokio::test]
    async fn state_with_url_once_provisioned() {
        let (mut client, mut device) = pair();
        reply(&mut device, Frame::state(State::Provisioned)).await;
        reply(&mut device, response(CMD_GET_CURRENT_STATE, &["http://10.0.0.9"])).await;

        let (state, url) = client.current_state().await.unwrap();
        assert_eq!(state, State::Provisioned);
        assert_eq!(url.as_deref(), Some("http://10.0.0.9"));
    }

    #[tokio::test]
    async fn scan_collects_until_terminator() {
        let (mut client, mut device) = pair();
        reply(&mut device, response(CMD_GET_WIFI_NETWORKS, &["home", "-41", "YES"])).await;
        reply(&mut device, response(CMD_GET_WIFI_NETWORKS, &["cafe", "-77", "NO"])).await;
        reply(&mut device, response(CMD_GET_WIFI_NETWORKS, &[])).await;

        let networks = client.scan().await.unwrap();
        assert_eq!(
            networks,
            vec![
                Network {
                    ssid: "home".into(),
                    rssi: -41,
                    auth_required: true
                },
                Network {
                    ssid: "cafe".into(),
                    rssi: -77,
                    auth_required: false
                },
            ]
        );
    }

    #[tokio::test]
    async fn provision_reports_states_and_url() {
        let (mut client, mut device) = pair();
        reply(&mut device, Frame::state(State::Provisioning)).await;
        reply(&mut device, Frame::error(ErrorCode::None)).await;
        reply(&mut device, Frame::state(State::Provisioned)).await;
        reply(&mut device, response(CMD_WIFI_SETTINGS, &["http://10.0.0.9"])).await;

        let mut states = Vec::new();
        let url = client
            .provision("home", "secret", |state| states.push(state))
            .await
            .unwrap();
        assert_eq!(url.as_deref(), Some("http://10.0.0.9"));
        assert_eq!(states, vec![State::Provisioning, State::Provisioned]);

        let sent = read_frame(&mut device).await.unwrap();
        let command = Command::decode(&sent.payload, false);
        assert_eq!(
            command,
            Command::WifiSettings {
                ssid: b"home".to_vec(),
                password: b"secret".to_vec()
            }
        );
    }

    #[tokio::test]
    async fn provision_failure_surfaces_device_error() {
        let (mut client, mut device) = pair();
        reply(&mut device, Frame::state(State::Provisioning)).await;
        reply(&mut device, Frame::state(State::Stopped)).await;
        reply(&mut device, Frame::error(ErrorCode::UnableToConnect)).await;

        let result = client.provision("home", "wrong", |_| {}).await;
        assert!(matches!(
            result,
            Err(ClientError::Device(ErrorCode::UnableToConnect))
        ));
    }

    #[tokio::test]
    async fn silence_times_out() {
        let (host, mut device) = duplex(64);
        let mut client = Client::new(host, Duration::from_millis(50));

        let result = client.device_info().await;
        assert!(matches!(result, Err(ClientError::Timeout(_))));

        // the request still went out
        let mut buf = [0u8; 6];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"IMPROV");
    }
}
