//! Error types for the console.
//!
//! `ScpiError` is the single error type returned by every externally visible
//! operation in the library (connect, send, query, acquire, persistence and
//! configuration loading). The front-end catches it at the command boundary,
//! reports it, and keeps running.
//!
//! ## Error Kinds
//!
//! Each variant belongs to one [`ErrorKind`]:
//!
//! - **`Connection`**: host unreachable, refused or timed out while connecting,
//!   a write/read failure on a live socket, or an operation attempted on a
//!   session that is not connected.
//! - **`Protocol`**: a response that is not valid text, or a waveform payload
//!   without a single parseable sample.
//! - **`UserInput`**: input the console cannot turn into a request at all.
//!   Parameter values themselves are forwarded to the instrument unchecked.
//! - **`Configuration`**: the configuration file or environment could not be
//!   loaded or failed validation.
//! - **`Persistence`**: the saved-state file could not be written.

use std::io;
use thiserror::Error;

/// Convenience alias for results using the console error type.
pub type ScpiResult<T> = std::result::Result<T, ScpiError>;

/// Coarse classification of a [`ScpiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport-level failure or missing session.
    Connection,
    /// Undecodable or unparseable instrument data.
    Protocol,
    /// Input that cannot be turned into an instrument request.
    UserInput,
    /// Configuration loading or validation.
    Configuration,
    /// Saved-state storage.
    Persistence,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Protocol => "protocol",
            ErrorKind::UserInput => "user_input",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Persistence => "persistence",
        };
        write!(f, "{}", label)
    }
}

/// Primary error type for instrument communication and the console around it.
#[derive(Error, Debug)]
pub enum ScpiError {
    /// Connecting to the instrument failed (refused, unreachable, timed out).
    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        /// `host:port` that was dialled.
        endpoint: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// A write or read on an open session failed. The session is closed afterwards.
    #[error("Connection to {endpoint} lost: {source}")]
    Transport {
        /// `host:port` of the session.
        endpoint: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// `send`/`query`/acquisition was called on a session that is not connected.
    #[error("Not connected to {0}")]
    NotConnected(String),

    /// The instrument replied with something that could not be interpreted.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Console input that cannot be turned into a request.
    #[error("Invalid input: {0}")]
    UserInput(String),

    /// Configuration file or environment could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration values parsed but are semantically invalid.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Saved state could not be written.
    #[error("Failed to save state to {path}: {message}")]
    Persistence {
        /// Target file.
        path: String,
        /// What went wrong.
        message: String,
    },
}

impl ScpiError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScpiError::Connect { .. } | ScpiError::Transport { .. } | ScpiError::NotConnected(_) => {
                ErrorKind::Connection
            }
            ScpiError::Protocol(_) => ErrorKind::Protocol,
            ScpiError::UserInput(_) => ErrorKind::UserInput,
            ScpiError::Config(_) | ScpiError::Configuration(_) => ErrorKind::Configuration,
            ScpiError::Persistence { .. } => ErrorKind::Persistence,
        }
    }

    /// True for transport failures that came from an elapsed timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            ScpiError::Connect { source, .. } | ScpiError::Transport { source, .. } => {
                source.kind() == io::ErrorKind::TimedOut
            }
            _ => false,
        }
    }
}

impl From<figment::Error> for ScpiError {
    fn from(value: figment::Error) -> Self {
        ScpiError::Config(Box::new(value))
    }
}
