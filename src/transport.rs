//! Byte transports underneath an instrument session.
//!
//! [`Connector`] opens a [`Transport`] to an [`Endpoint`]; the session owns the
//! returned transport and never shares it. The production implementation is
//! [`TcpConnector`]; [`mock::MockConnector`] records every call for tests.

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

pub mod mock;

/// Default SCPI raw-socket port.
pub const DEFAULT_PORT: u16 = 5025;

/// Host and TCP port of an instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Hostname or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Build an endpoint from a host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host`, `host:port`, `ip` or `[ipv6]:port`, using `default_port`
    /// when none is given.
    pub fn parse_with_default_port(address: &str, default_port: u16) -> Result<Self, String> {
        let address = address.trim();
        if address.is_empty() {
            return Err("address is empty".to_string());
        }

        if let Ok(addr) = SocketAddr::from_str(address) {
            return Ok(Self::new(addr.ip().to_string(), addr.port()));
        }
        if let Ok(ip) = IpAddr::from_str(address) {
            return Ok(Self::new(ip.to_string(), default_port));
        }

        match address.rsplit_once(':') {
            Some((host, port)) => {
                if host.is_empty() || host.contains(':') {
                    return Err(format!("invalid address '{}'", address));
                }
                let port = port
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port '{}' in address '{}'", port, address))?;
                Ok(Self::new(host, port))
            }
            None => Ok(Self::new(address, default_port)),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_with_default_port(s, DEFAULT_PORT)
    }
}

/// A connected, exclusively owned byte stream to one instrument.
#[async_trait]
pub trait Transport: Send {
    /// Write every byte of `bytes`.
    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Read whatever is available, up to `buf.len()` bytes. `Ok(0)` means the
    /// peer closed the connection.
    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Close the stream. Called once; the transport is dropped afterwards.
    async fn shutdown(&mut self) -> io::Result<()>;
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `endpoint`, giving up after `connect_timeout`.
    async fn connect(
        &self,
        endpoint: &Endpoint,
        connect_timeout: Duration,
    ) -> io::Result<Box<dyn Transport>>;
}

/// Raw TCP socket transport.
pub struct TcpTransport {
    stream: TcpStream,
}

#[async_trait]
impl Transport for TcpTransport {
    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf).await
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}

/// Connector for instruments reachable over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        connect_timeout: Duration,
    ) -> io::Result<Box<dyn Transport>> {
        let stream = timeout(
            connect_timeout,
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        )
        .await
        .map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connection timed out after {:?}", connect_timeout),
            )
        })??;

        // Short command lines go out immediately.
        stream.set_nodelay(true)?;

        Ok(Box::new(TcpTransport { stream }))
    }
}
