//! A single SCPI session with one instrument.
//!
//! The session is either **Disconnected** (no transport) or **Connected** (one
//! exclusively owned transport). `connect` moves to Connected; `close` and any
//! transport failure move back to Disconnected. Every I/O method takes
//! `&mut self`, so at most one query is ever outstanding: the protocol has no
//! request IDs, and a reply must be consumed before the next command goes out.

use crate::error::{ScpiError, ScpiResult};
use crate::transport::{Connector, Endpoint, TcpConnector, Transport};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Default connection-establishment timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default size of a single query read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Line terminator appended to every command.
pub const TERMINATOR: &str = "\n";

/// Timeouts and buffer sizes for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long `connect` waits before giving up.
    pub connect_timeout: Duration,
    /// How long a read waits for data. `None` waits indefinitely.
    pub read_timeout: Option<Duration>,
    /// Maximum bytes returned by one read.
    pub read_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: None,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No open socket.
    Disconnected,
    /// One open socket.
    Connected,
}

/// Connection to one SCPI instrument.
pub struct InstrumentSession {
    endpoint: Endpoint,
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
}

impl InstrumentSession {
    /// Create a disconnected TCP session.
    pub fn new(endpoint: Endpoint, config: SessionConfig) -> Self {
        Self::with_connector(endpoint, config, Arc::new(TcpConnector))
    }

    /// Create a disconnected session that opens transports through `connector`.
    pub fn with_connector(
        endpoint: Endpoint,
        config: SessionConfig,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            endpoint,
            config,
            connector,
            transport: None,
        }
    }

    /// Instrument address.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Session settings.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        if self.transport.is_some() {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        }
    }

    /// True when a socket is open.
    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Open the connection. An already open socket is closed first.
    ///
    /// No retry: a refused, unreachable or timed-out connect is returned as a
    /// connection error and the session stays Disconnected.
    pub async fn connect(&mut self) -> ScpiResult<()> {
        self.close().await;

        tracing::debug!(endpoint = %self.endpoint, "Connecting");
        let transport = self
            .connector
            .connect(&self.endpoint, self.config.connect_timeout)
            .await
            .map_err(|source| ScpiError::Connect {
                endpoint: self.endpoint.to_string(),
                source,
            })?;

        tracing::info!("Connected to instrument at {}", self.endpoint);
        self.transport = Some(transport);
        Ok(())
    }

    /// Close the old socket, re-point the session at `endpoint` and connect.
    ///
    /// The old socket is always released before the new connect is attempted.
    /// On failure the session is Disconnected and keeps the new endpoint.
    pub async fn reconnect(&mut self, endpoint: Endpoint) -> ScpiResult<()> {
        self.close().await;
        tracing::info!(from = %self.endpoint, to = %endpoint, "Re-pointing instrument session");
        self.endpoint = endpoint;
        self.connect().await
    }

    /// Close the socket if one is open. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.shutdown().await {
                tracing::debug!(endpoint = %self.endpoint, error = %e, "Socket shutdown reported an error");
            }
            tracing::info!("Closed session to {}", self.endpoint);
        }
    }

    /// Send a command line without reading a reply.
    pub async fn send(&mut self, command: &str) -> ScpiResult<()> {
        let endpoint = self.endpoint.to_string();
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| ScpiError::NotConnected(endpoint.clone()))?;

        tracing::debug!("SCPI write: {:?}", command);
        let line = format!("{}{}", command, TERMINATOR);
        if let Err(source) = transport.write_all(line.as_bytes()).await {
            self.close().await;
            return Err(ScpiError::Transport { endpoint, source });
        }
        Ok(())
    }

    /// Send a query and return a single read of the reply, trailing
    /// whitespace removed.
    ///
    /// Only one read of at most `read_buffer_size` bytes is performed, so a
    /// longer reply comes back truncated and the remainder stays in the socket.
    pub async fn query(&mut self, command: &str) -> ScpiResult<String> {
        self.send(command).await?;

        let mut buf = vec![0u8; self.config.read_buffer_size];
        let n = self.read_chunk(&mut buf).await?;
        if n == 0 {
            return Err(ScpiError::Transport {
                endpoint: self.endpoint.to_string(),
                source: io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by instrument",
                ),
            });
        }
        buf.truncate(n);

        let text = String::from_utf8(buf).map_err(|e| {
            ScpiError::Protocol(format!("reply to {:?} is not valid text: {}", command, e))
        })?;
        let reply = text.trim_end().to_string();
        tracing::debug!("SCPI response: {:?}", reply);
        Ok(reply)
    }

    /// Read whatever the instrument has sent, up to `buf.len()` bytes.
    ///
    /// `Ok(0)` means the instrument closed the connection; the session is
    /// Disconnected afterwards. Read failures and an elapsed `read_timeout`
    /// also close the session.
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> ScpiResult<usize> {
        let endpoint = self.endpoint.to_string();
        let read_timeout = self.config.read_timeout;
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| ScpiError::NotConnected(endpoint.clone()))?;

        let result = match read_timeout {
            Some(limit) => match timeout(limit, transport.read_chunk(buf)).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no reply within {:?}", limit),
                )),
            },
            None => transport.read_chunk(buf).await,
        };
        self.finish_read(endpoint, result).await
    }

    /// Like [`read_chunk`](Self::read_chunk), but waits at most `limit`.
    ///
    /// `Ok(None)` means nothing arrived in time; unlike the configured read
    /// timeout this leaves the session Connected.
    pub async fn read_chunk_within(
        &mut self,
        buf: &mut [u8],
        limit: Duration,
    ) -> ScpiResult<Option<usize>> {
        let endpoint = self.endpoint.to_string();
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| ScpiError::NotConnected(endpoint.clone()))?;

        let Ok(result) = timeout(limit, transport.read_chunk(buf)).await else {
            return Ok(None);
        };
        self.finish_read(endpoint, result).await.map(Some)
    }

    async fn finish_read(&mut self, endpoint: String, result: io::Result<usize>) -> ScpiResult<usize> {
        match result {
            Ok(0) => {
                tracing::warn!(endpoint = %endpoint, "Instrument closed the connection");
                self.close().await;
                Ok(0)
            }
            Ok(n) => {
                tracing::trace!(endpoint = %endpoint, bytes = n, "SCPI read");
                Ok(n)
            }
            Err(source) => {
                self.close().await;
                Err(ScpiError::Transport { endpoint, source })
            }
        }
    }
}

impl std::fmt::Debug for InstrumentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentSession")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::transport::mock::MockConnector;

    fn mock_session(connector: &MockConnector, host: &str) -> InstrumentSession {
        InstrumentSession::with_connector(
            Endpoint::new(host, 5025),
            SessionConfig::default(),
            Arc::new(connector.clone()),
        )
    }

    #[tokio::test]
    async fn send_without_connection_is_an_error() {
        let connector = MockConnector::new();
        let mut session = mock_session(&connector, "scope");

        let err = session.send(":TIM:SCAL 0.001").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(matches!(err, ScpiError::NotConnected(_)));

        let err = session.query("*IDN?").await.unwrap_err();
        assert!(matches!(err, ScpiError::NotConnected(_)));
        assert!(connector.written().is_empty());
    }

    #[tokio::test]
    async fn connect_close_is_idempotent() {
        let connector = MockConnector::new();
        let mut session = mock_session(&connector, "scope");

        session.connect().await.unwrap();
        assert_eq!(session.state(), SessionState::Connected);

        session.close().await;
        assert_eq!(session.state(), SessionState::Disconnected);
        session.close().await;
        assert_eq!(session.state(), SessionState::Disconnected);

        assert_eq!(
            connector.call_log(),
            vec!["connect scope:5025", "close scope:5025"]
        );
    }

    #[tokio::test]
    async fn failed_connect_stays_disconnected() {
        let connector = MockConnector::new();
        connector.fail_next_connect();
        let mut session = mock_session(&connector, "scope");

        let err = session.connect().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn query_appends_terminator_and_trims_reply() {
        let connector = MockConnector::new();
        connector.reply("*IDN?", "KEYSIGHT,DSOX1204G,CN0001,2.1\r\n");
        let mut session = mock_session(&connector, "scope");
        session.connect().await.unwrap();

        let reply = session.query("*IDN?").await.unwrap();
        assert_eq!(reply, "KEYSIGHT,DSOX1204G,CN0001,2.1");
        assert_eq!(connector.written(), vec!["*IDN?"]);
    }

    #[tokio::test]
    async fn query_returns_only_one_buffer() {
        let connector = MockConnector::new();
        connector.reply("LONG?", "abcdefghij");
        let mut session = InstrumentSession::with_connector(
            Endpoint::new("scope", 5025),
            SessionConfig {
                read_buffer_size: 4,
                ..Default::default()
            },
            Arc::new(connector.clone()),
        );
        session.connect().await.unwrap();

        assert_eq!(session.query("LONG?").await.unwrap(), "abcd");
    }

    #[tokio::test]
    async fn undecodable_reply_is_a_protocol_error() {
        let connector = MockConnector::new();
        connector.reply_chunks("BIN?", vec![vec![0xff, 0xfe, 0x00]]);
        let mut session = mock_session(&connector, "scope");
        session.connect().await.unwrap();

        let err = session.query("BIN?").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn read_failure_disconnects() {
        let connector = MockConnector::new();
        let mut session = mock_session(&connector, "scope");
        session.connect().await.unwrap();

        // No scripted reply: the mock read fails like a timeout would.
        let err = session.query(":WAV:DATA?").await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn reconnect_closes_before_connecting_even_on_failure() {
        let connector = MockConnector::new();
        let mut session = mock_session(&connector, "old-scope");
        session.connect().await.unwrap();

        connector.fail_next_connect();
        let err = session
            .reconnect(Endpoint::new("new-scope", 5025))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(session.endpoint(), &Endpoint::new("new-scope", 5025));
        assert!(!session.is_connected());

        assert_eq!(
            connector.call_log(),
            vec![
                "connect old-scope:5025",
                "close old-scope:5025",
                "connect new-scope:5025",
            ]
        );
    }
}
