//! Server side of the AMQP 0-9-1 connection opening:
//!
//! ```text
//! open-connection = C:protocol-header
//!                   S:START C:START-OK
//!                   S:TUNE  C:TUNE-OK
//!                   C:OPEN  S:OPEN-OK
//! ```

use crate::constants::{self, AMQP_0_9_1};
use crate::error::{AmqpError, Result};
use crate::field::{FieldTable, FieldValue};
use crate::frame::{FrameTransport, FrameType};
use crate::method::{self, ConnectionOpen, ConnectionStartOk, ConnectionTuneOk, Method};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    AwaitHeader,
    SendStart,
    AwaitStartOk,
    SendTune,
    AwaitTuneOk,
    AwaitOpen,
    SendOpenOk,
    Open,
    Failed,
}

/// Values proposed to the client in connection.tune.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub channel_max: u16,
    pub frame_max: u32,
    pub heartbeat: u16,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            channel_max: 2047,
            frame_max: 131072,
            heartbeat: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HandshakeSettings {
    pub params: ConnectionParams,
    /// Deadline for each individual read or write.
    pub io_timeout: Duration,
    pub server_properties: FieldTable,
}

impl Default for HandshakeSettings {
    fn default() -> Self {
        Self {
            params: ConnectionParams::default(),
            io_timeout: Duration::from_secs(30),
            server_properties: default_server_properties(),
        }
    }
}

pub fn default_server_properties() -> FieldTable {
    let capabilities: FieldTable = [
        "consumer_priorities",
        "authentication_failure_close",
        "direct_reply_to",
        "publisher_confirms",
        "exchange_exchange_bindings",
        "basic.nack",
        "consumer_cancel_notify",
        "connection.blocked",
        "per_consumer_qos",
    ]
    .into_iter()
    .map(|name| (name.to_string(), FieldValue::Bool(true)))
    .collect();

    let mut properties = FieldTable::new();
    properties.insert("capabilities".to_string(), capabilities.into());
    properties.insert("cluster_name".to_string(), "amqproxy".into());
    properties.insert(
        "copyright".to_string(),
        "Copyright (c) amqproxy contributors".into(),
    );
    properties.insert(
        "information".to_string(),
        "AMQP 0-9-1 connection handshake endpoint".into(),
    );
    properties.insert(
        "platform".to_string(),
        format!("Rust / {}", std::env::consts::OS).into(),
    );
    properties.insert("product".to_string(), env!("CARGO_PKG_NAME").into());
    properties.insert("version".to_string(), env!("CARGO_PKG_VERSION").into());
    properties
}

/// What the client told us while opening the connection.
#[derive(Debug, Clone)]
pub struct HandshakeOutcome {
    pub client_properties: FieldTable,
    pub mechanism: String,
    pub locale: String,
    pub client_tune: ConnectionTuneOk,
    pub virtual_host: String,
}

pub struct Connection<S> {
    id: String,
    transport: FrameTransport<S>,
    settings: HandshakeSettings,
    state: HandshakeState,
    failed_during: Option<HandshakeState>,
    connected: bool,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(id: impl Into<String>, stream: S, settings: HandshakeSettings) -> Self {
        let transport = FrameTransport::new(stream, settings.io_timeout, settings.params.frame_max);
        Self {
            id: id.into(),
            transport,
            settings,
            state: HandshakeState::AwaitHeader,
            failed_during: None,
            connected: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// The step that was running when the handshake failed.
    pub fn failed_during(&self) -> Option<HandshakeState> {
        self.failed_during
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn into_inner(self) -> S {
        self.transport.into_inner()
    }

    /// Runs the whole opening sequence. Any error leaves the connection in
    /// [`HandshakeState::Failed`]; nothing is retried.
    pub async fn open(&mut self) -> Result<HandshakeOutcome> {
        if self.state != HandshakeState::AwaitHeader {
            return Err(AmqpError::Connection(format!(
                "handshake cannot start from state {:?}",
                self.state
            )));
        }

        match self.handshake().await {
            Ok(outcome) => {
                self.state = HandshakeState::Open;
                self.connected = true;
                Ok(outcome)
            }
            Err(e) => {
                tracing::debug!(
                    conn = %self.id,
                    state = ?self.state,
                    error = %e,
                    "handshake aborted"
                );
                self.failed_during = Some(self.state);
                self.state = HandshakeState::Failed;
                Err(e)
            }
        }
    }

    async fn handshake(&mut self) -> Result<HandshakeOutcome> {
        let header = self.transport.read_protocol_header().await?;
        if header != AMQP_0_9_1.header() {
            return Err(AmqpError::ProtocolMismatch(header.to_vec()));
        }
        tracing::debug!(conn = %self.id, "C:protocol-header");

        self.state = HandshakeState::SendStart;
        let start =
            method::build_connection_start_frame(AMQP_0_9_1, &self.settings.server_properties)?;
        self.transport.write_frame(&start).await?;
        tracing::debug!(conn = %self.id, "S:START");

        self.state = HandshakeState::AwaitStartOk;
        let start_ok = self.expect_start_ok().await?;
        tracing::debug!(
            conn = %self.id,
            mechanism = %start_ok.mechanism,
            locale = %start_ok.locale,
            "C:START-OK"
        );

        self.state = HandshakeState::SendTune;
        let tune = method::build_connection_tune_frame(&self.settings.params)?;
        self.transport.write_frame(&tune).await?;
        tracing::debug!(conn = %self.id, params = ?self.settings.params, "S:TUNE");

        self.state = HandshakeState::AwaitTuneOk;
        let tune_ok = self.expect_tune_ok().await?;
        tracing::debug!(conn = %self.id, tune_ok = ?tune_ok, "C:TUNE-OK");

        self.state = HandshakeState::AwaitOpen;
        let open = self.expect_open().await?;
        tracing::debug!(conn = %self.id, vhost = %open.virtual_host, "C:OPEN");

        self.state = HandshakeState::SendOpenOk;
        let open_ok = method::build_connection_open_ok_frame()?;
        self.transport.write_frame(&open_ok).await?;
        tracing::debug!(conn = %self.id, "S:OPEN-OK");

        Ok(HandshakeOutcome {
            client_properties: start_ok.client_properties,
            mechanism: start_ok.mechanism,
            locale: start_ok.locale,
            client_tune: tune_ok,
            virtual_host: open.virtual_host,
        })
    }

    /// Reads the next method on the control channel.
    async fn read_method(&mut self, expected: &'static str) -> Result<Method> {
        let frame = self.transport.read_frame().await?;

        if frame.frame_type != FrameType::Method {
            return Err(AmqpError::UnexpectedMethod {
                expected,
                received: format!("{} frame", frame.frame_type.display_name()),
            });
        }

        let method = Method::decode(&frame.payload)?;
        if frame.channel != constants::CONNECTION_CHANNEL {
            return Err(AmqpError::UnexpectedMethod {
                expected,
                received: format!("{} on channel {}", method.name(), frame.channel),
            });
        }
        Ok(method)
    }

    async fn expect_start_ok(&mut self) -> Result<ConnectionStartOk> {
        const EXPECTED: &str = "connection.start-ok";
        match self.read_method(EXPECTED).await? {
            Method::StartOk(m) => Ok(m),
            other => Err(unexpected(EXPECTED, &other)),
        }
    }

    async fn expect_tune_ok(&mut self) -> Result<ConnectionTuneOk> {
        const EXPECTED: &str = "connection.tune-ok";
        match self.read_method(EXPECTED).await? {
            Method::TuneOk(m) => Ok(m),
            other => Err(unexpected(EXPECTED, &other)),
        }
    }

    async fn expect_open(&mut self) -> Result<ConnectionOpen> {
        const EXPECTED: &str = "connection.open";
        match self.read_method(EXPECTED).await? {
            Method::Open(m) => Ok(m),
            other => Err(unexpected(EXPECTED, &other)),
        }
    }
}

fn unexpected(expected: &'static str, received: &Method) -> AmqpError {
    AmqpError::UnexpectedMethod {
        expected,
        received: received.name().to_string(),
    }
}
