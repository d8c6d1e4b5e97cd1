//! OBD-II Client for ELM327 Adapters
//!
//! Runs the initialization handshake over a [`Transport`] and then serves
//! single PID queries. Connection state changes are published on a watch
//! channel.

use crate::codec::{decode_response, decode_supported_pids, encode_request};
use crate::error::ObdError;
use crate::pid::Pid;
use crate::protocol::ObdProtocol;
use crate::transport::{read_until_prompt, send_line, Transport};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Default timeout for OBD commands
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Default value sent with ATST (in milliseconds)
pub const DEFAULT_ADAPTER_TIMEOUT_MS: u64 = 200;

/// The only handshake command allowed to answer with a version banner
const RESET_COMMAND: &str = "ATZ";

/// Where the adapter is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdapterConnectionState {
    Disconnected,
    Initializing,
    Ready,
    Failed,
}

/// Client tuning
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long to wait for the prompt after each command
    pub command_timeout: Duration,
    /// Protocol selected during the handshake
    pub protocol: ObdProtocol,
    /// Adapter-side response timeout programmed with ATST
    pub adapter_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            protocol: ObdProtocol::Auto,
            adapter_timeout: Duration::from_millis(DEFAULT_ADAPTER_TIMEOUT_MS),
        }
    }
}

/// OBD-II client for communicating with ELM327-compatible adapters
pub struct ObdClient {
    transport: Box<dyn Transport>,
    config: ClientConfig,
    state_tx: watch::Sender<AdapterConnectionState>,
    /// A request went out whose reply has not been read to the prompt
    awaiting_reply: bool,
}

impl ObdClient {
    /// Wrap an already opened transport
    pub fn new(transport: Box<dyn Transport>, config: ClientConfig) -> Self {
        let (state_tx, _) = watch::channel(AdapterConnectionState::Disconnected);
        Self {
            transport,
            config,
            state_tx,
            awaiting_reply: false,
        }
    }

    /// The fixed handshake, in the order it is sent
    pub fn handshake_commands(&self) -> Vec<String> {
        // ATST counts in 4 ms steps
        let st_units = (self.config.adapter_timeout.as_millis() / 4).clamp(1, 0xFF);
        vec![
            RESET_COMMAND.to_string(),
            "ATE0".to_string(),
            "ATL0".to_string(),
            "ATS0".to_string(),
            "ATH0".to_string(),
            self.config.protocol.to_elm_command().to_string(),
            format!("ATST{:02X}", st_units),
        ]
    }

    /// Initialize the ELM327 adapter, reporting only success
    pub async fn initialize(&mut self) -> bool {
        self.try_initialize().await.is_ok()
    }

    /// Initialize the ELM327 adapter
    ///
    /// Stops at the first command that times out or is not acknowledged and
    /// leaves the client in [`AdapterConnectionState::Failed`].
    pub async fn try_initialize(&mut self) -> Result<(), ObdError> {
        self.set_state(AdapterConnectionState::Initializing);

        if !self.transport.is_open() {
            self.set_state(AdapterConnectionState::Failed);
            return Err(ObdError::ChannelClosed);
        }

        for command in self.handshake_commands() {
            if let Err(e) = self.handshake_step(&command).await {
                warn!("Adapter handshake failed: {}", e);
                self.set_state(AdapterConnectionState::Failed);
                return Err(e);
            }
        }

        self.set_state(AdapterConnectionState::Ready);
        info!("OBD adapter initialized successfully");
        Ok(())
    }

    async fn handshake_step(&mut self, command: &str) -> Result<(), ObdError> {
        debug!("Handshake -> {}", command);
        send_line(&mut *self.transport, command).await?;

        let timeout = self.config.command_timeout;
        let reply = tokio::time::timeout(timeout, read_until_prompt(&mut *self.transport))
            .await
            .map_err(|_| ObdError::HandshakeTimeout {
                command: command.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })??;
        debug!("Handshake <- {:?}", reply);

        if is_acknowledged(command, &reply) {
            Ok(())
        } else {
            Err(ObdError::HandshakeRejected {
                command: command.to_string(),
                reply: reply.trim().to_string(),
            })
        }
    }

    /// Send one PID request and return the raw reply text
    pub async fn query(&mut self, pid: Pid) -> Result<String, ObdError> {
        if self.state() != AdapterConnectionState::Ready {
            return Err(ObdError::AdapterNotReady);
        }

        let timeout = self.config.command_timeout;
        if self.awaiting_reply {
            self.discard_late_reply(timeout).await?;
        }

        let request = encode_request(pid);
        debug!("Querying PID {}", request);
        send_line(&mut *self.transport, &request).await?;
        self.awaiting_reply = true;

        let reply = tokio::time::timeout(timeout, read_until_prompt(&mut *self.transport))
            .await
            .map_err(|_| ObdError::Timeout(timeout.as_millis() as u64))??;
        self.awaiting_reply = false;
        Ok(reply)
    }

    /// Read past the reply to an earlier request that was given up on, so
    /// the next reply read belongs to the next request.
    ///
    /// Waits at most `timeout`; if nothing arrives the reply is taken as lost.
    async fn discard_late_reply(&mut self, timeout: Duration) -> Result<(), ObdError> {
        match tokio::time::timeout(timeout, read_until_prompt(&mut *self.transport)).await {
            Ok(Ok(late)) => debug!("Discarded late reply {:?}", late),
            Ok(Err(e)) => return Err(e),
            Err(_) => debug!("Late reply never arrived"),
        }
        self.awaiting_reply = false;
        Ok(())
    }

    /// Query a PID and decode it into its physical value
    pub async fn read_pid(&mut self, pid: Pid, tank_volume_liters: f64) -> Result<f64, ObdError> {
        let reply = self.query(pid).await?;
        decode_response(pid, &reply, tank_volume_liters)
    }

    /// Read the `01 00` supported-PID bitmask
    pub async fn supported_pids(&mut self) -> Result<u32, ObdError> {
        let reply = self.query(Pid::SupportedPids).await?;
        decode_supported_pids(&reply)
    }

    /// Current connection state
    pub fn state(&self) -> AdapterConnectionState {
        *self.state_tx.borrow()
    }

    /// Observe connection state changes
    pub fn subscribe(&self) -> watch::Receiver<AdapterConnectionState> {
        self.state_tx.subscribe()
    }

    /// Check if the handshake completed
    pub fn is_ready(&self) -> bool {
        self.state() == AdapterConnectionState::Ready
    }

    /// Disconnect from the OBD adapter
    pub async fn close(&mut self) -> Result<(), ObdError> {
        info!("Disconnecting OBD client");
        self.set_state(AdapterConnectionState::Disconnected);
        self.transport.close().await
    }

    fn set_state(&self, state: AdapterConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("Adapter state {:?} -> {:?}", previous, state);
        }
    }
}

/// `OK` acknowledges any command; the reset command may answer with its
/// version banner instead.
fn is_acknowledged(command: &str, reply: &str) -> bool {
    let mut lines = reply
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty());

    lines.any(|line| {
        line.eq_ignore_ascii_case("OK")
            || (command == RESET_COMMAND && line.to_ascii_uppercase().contains("ELM"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{ScriptedTransport, Step};

    const BANNER: &str = "ATZ\r\rELM327 v1.5\r\r";
    const OK: &str = "OK\r\r";

    fn client(steps: Vec<Step>) -> ObdClient {
        ObdClient::new(Box::new(ScriptedTransport::new(steps)), ClientConfig::default())
    }

    fn happy_handshake() -> Vec<Step> {
        let mut steps = vec![Step::Reply(BANNER)];
        steps.extend(std::iter::repeat(Step::Reply(OK)).take(6));
        steps
    }

    #[test]
    fn test_handshake_commands() {
        let client = client(vec![]);
        assert_eq!(
            client.handshake_commands(),
            vec!["ATZ", "ATE0", "ATL0", "ATS0", "ATH0", "ATSP0", "ATST32"]
        );
    }

    #[tokio::test]
    async fn test_initialize_success() {
        let mut client = client(happy_handshake());
        let mut states = client.subscribe();
        assert_eq!(client.state(), AdapterConnectionState::Disconnected);

        assert!(client.initialize().await);
        assert!(client.is_ready());
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), AdapterConnectionState::Ready);
    }

    #[tokio::test]
    async fn test_echo_off_rejection_stops_handshake() {
        let mut client = ObdClient::new(
            Box::new(ScriptedTransport::new([Step::Reply(BANNER), Step::Reply("?\r\r")])),
            ClientConfig::default(),
        );

        let err = client.try_initialize().await.unwrap_err();
        assert!(matches!(err, ObdError::HandshakeRejected { ref command, .. } if command == "ATE0"));
        assert_eq!(client.state(), AdapterConnectionState::Failed);

        // No PID request may reach the wire after a failed handshake
        assert!(matches!(
            client.read_pid(Pid::Rpm, 50.0).await,
            Err(ObdError::AdapterNotReady)
        ));
    }

    #[test]
    fn test_banner_only_accepted_for_reset() {
        assert!(is_acknowledged("ATZ", BANNER));
        assert!(!is_acknowledged("ATE0", "ELM327 v1.5\r\r"));
        assert!(is_acknowledged("ATE0", "ATE0\rOK\r\r"));
        assert!(!is_acknowledged("ATL0", "NO DATA\r\r"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout() {
        let mut client = client(vec![Step::Reply(BANNER), Step::Reply(OK), Step::Silent]);
        let err = client.try_initialize().await.unwrap_err();
        assert!(matches!(err, ObdError::HandshakeTimeout { ref command, timeout_ms: 2000 } if command == "ATL0"));
        assert_eq!(client.state(), AdapterConnectionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_reply_is_given_up_after_one_more_timeout() {
        let mut steps = happy_handshake();
        steps.push(Step::Silent);
        steps.push(Step::Reply("41 0D 28\r\r"));
        let mut client = client(steps);
        assert!(client.initialize().await);

        assert!(matches!(
            client.read_pid(Pid::Rpm, 50.0).await,
            Err(ObdError::Timeout(2000))
        ));
        assert_eq!(client.read_pid(Pid::Speed, 50.0).await.unwrap(), 40.0);
    }

    #[tokio::test]
    async fn test_read_pid_after_handshake() {
        let mut steps = happy_handshake();
        steps.push(Step::Reply("41 0C 0D 8C\r\r"));
        steps.push(Step::Reply("NO DATA\r\r"));
        let mut client = client(steps);
        assert!(client.initialize().await);

        assert_eq!(client.read_pid(Pid::Rpm, 50.0).await.unwrap(), 867.0);
        assert!(matches!(
            client.read_pid(Pid::Speed, 50.0).await,
            Err(ObdError::NoData)
        ));
    }

    #[tokio::test]
    async fn test_close_sets_disconnected() {
        let mut client = client(happy_handshake());
        assert!(client.initialize().await);
        client.close().await.unwrap();
        assert_eq!(client.state(), AdapterConnectionState::Disconnected);
    }
}
