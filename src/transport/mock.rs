//! Mock connector for testing sessions without instruments.
//!
//! The mock provides:
//! - Scripted replies per command line
//! - One-shot connection failure injection
//! - A call log (`connect`, `write`, `close`) shared by every transport it opens

use super::{Connector, Endpoint, Transport};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Default)]
struct MockState {
    call_log: Vec<String>,
    replies: HashMap<String, Vec<Vec<u8>>>,
    fail_next_connect: bool,
}

/// Connector that hands out in-memory transports.
///
/// # Example
///
/// ```
/// use scpi_console::session::{InstrumentSession, SessionConfig};
/// use scpi_console::transport::mock::MockConnector;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let connector = MockConnector::new();
/// connector.reply("*IDN?", "MOCK,SCOPE,0,1.0\n");
///
/// let mut session = InstrumentSession::with_connector(
///     "10.0.0.5".parse().unwrap(),
///     SessionConfig::default(),
///     Arc::new(connector.clone()),
/// );
/// session.connect().await.unwrap();
/// assert_eq!(session.query("*IDN?").await.unwrap(), "MOCK,SCOPE,0,1.0");
/// # })
/// ```
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    /// Create a connector with no scripted replies.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reply to `command` with `response` in a single read.
    pub fn reply(&self, command: &str, response: &str) {
        self.reply_chunks(command, vec![response.as_bytes().to_vec()]);
    }

    /// Reply to `command` with `chunks`, one per read.
    pub fn reply_chunks(&self, command: &str, chunks: Vec<Vec<u8>>) {
        self.state().replies.insert(command.to_string(), chunks);
    }

    /// Make the next `connect` fail with `ConnectionRefused`.
    pub fn fail_next_connect(&self) {
        self.state().fail_next_connect = true;
    }

    /// Snapshot of every call made through this connector and its transports.
    pub fn call_log(&self) -> Vec<String> {
        self.state().call_log.clone()
    }

    /// Lines written to any transport, in order.
    pub fn written(&self) -> Vec<String> {
        self.call_log()
            .into_iter()
            .filter_map(|entry| entry.split_once("write ").map(|(_, line)| line.to_string()))
            .collect()
    }

    /// Clear the call log.
    pub fn clear_call_log(&self) {
        self.state().call_log.clear();
    }

    fn log_call(&self, entry: String) {
        self.state().call_log.push(entry);
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        _connect_timeout: Duration,
    ) -> io::Result<Box<dyn Transport>> {
        self.log_call(format!("connect {}", endpoint));

        if std::mem::take(&mut self.state().fail_next_connect) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "mock connection failure",
            ));
        }

        Ok(Box::new(MockTransport {
            connector: self.clone(),
            endpoint: endpoint.to_string(),
            pending: VecDeque::new(),
        }))
    }
}

struct MockTransport {
    connector: MockConnector,
    endpoint: String,
    pending: VecDeque<Vec<u8>>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let line = String::from_utf8_lossy(bytes).trim_end().to_string();
        self.connector
            .log_call(format!("{} write {}", self.endpoint, line));

        if let Some(chunks) = self.connector.state().replies.get(&line) {
            self.pending.extend(chunks.iter().cloned());
        }
        Ok(())
    }

    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(mut chunk) = self.pending.pop_front() else {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "no scripted reply pending",
            ));
        };

        if chunk.len() > buf.len() {
            let rest = chunk.split_off(buf.len());
            self.pending.push_front(rest);
        }
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.connector.log_call(format!("close {}", self.endpoint));
        Ok(())
    }
}
