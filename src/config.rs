//! Configuration loading using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults ([`ConsoleConfig::default`])
//! 2. `config/scpi_console.toml` (or the file passed with `--config`)
//! 3. Environment variables prefixed with `SCPI_CONSOLE_`, sections separated
//!    by a double underscore (`SCPI_CONSOLE_CONNECTION__READ_TIMEOUT_MS=2000`)
//!
//! # Example
//! ```no_run
//! use scpi_console::config::ConsoleConfig;
//!
//! let config = ConsoleConfig::load()?;
//! config.validate()?;
//! println!("Default port: {}", config.connection.port);
//! # Ok::<(), scpi_console::error::ScpiError>(())
//! ```

use crate::error::{ScpiError, ScpiResult};
use crate::logging::OutputFormat;
use crate::mode::OperatingMode;
use crate::session::{SessionConfig, DEFAULT_READ_BUFFER_SIZE};
use crate::transport::{Endpoint, DEFAULT_PORT};
use crate::waveform::{
    TransferOptions, DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_POINTS, DEFAULT_SETTLE_TIMEOUT,
};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/scpi_console.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "SCPI_CONSOLE_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Logging and persistence
    pub application: ApplicationConfig,
    /// Socket settings shared by both instruments
    pub connection: ConnectionConfig,
    /// Addresses and mode used when nothing was saved
    pub defaults: DefaultsConfig,
    /// Waveform acquisition and plotting
    pub waveform: WaveformConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: OutputFormat,
    /// Where the last-used addresses and mode are remembered.
    /// Unset means `<config dir>/scpi-console/state.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            log_format: OutputFormat::Compact,
            state_file: None,
        }
    }
}

/// Instrument socket configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Port used when an address does not name one
    pub port: u16,
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Read timeout in milliseconds; unset waits indefinitely
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<u64>,
    /// Bytes returned by a single read
    pub read_buffer_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            connect_timeout_ms: 5000,
            read_timeout_ms: None,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

/// Fallback instrument addresses and mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Oscilloscope address (`host` or `host:port`)
    pub oscilloscope_address: String,
    /// Function generator address (`host` or `host:port`)
    pub generator_address: String,
    /// Operating mode
    pub mode: OperatingMode,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            oscilloscope_address: "192.168.0.10".to_string(),
            generator_address: "192.168.0.11".to_string(),
            mode: OperatingMode::Both,
        }
    }
}

/// Waveform acquisition configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveformConfig {
    /// Default source channel
    pub channel: u8,
    /// Default number of points
    pub points: u32,
    /// Largest accepted reply
    pub max_payload_bytes: usize,
    /// Wait for data after a header line that arrived on its own
    pub settle_timeout_ms: u64,
    /// Text plot width in characters
    pub plot_columns: usize,
    /// Text plot height in lines
    pub plot_rows: usize,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            channel: 1,
            points: DEFAULT_POINTS,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            settle_timeout_ms: DEFAULT_SETTLE_TIMEOUT.as_millis() as u64,
            plot_columns: 72,
            plot_rows: 16,
        }
    }
}

impl ConsoleConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> ScpiResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file and the environment. A missing file is not an error.
    pub fn load_from<P: AsRef<Path>>(path: P) -> ScpiResult<Self> {
        let config: Self = Self::figment(path).extract()?;
        tracing::debug!(?config, "Configuration loaded");
        Ok(config)
    }

    /// The layered provider stack behind [`ConsoleConfig::load_from`].
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> ScpiResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(ScpiError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.connection.port == 0 {
            return Err(ScpiError::Configuration(
                "connection.port must be non-zero".to_string(),
            ));
        }
        if self.connection.connect_timeout_ms == 0 {
            return Err(ScpiError::Configuration(
                "connection.connect_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.connection.read_timeout_ms == Some(0) {
            return Err(ScpiError::Configuration(
                "connection.read_timeout_ms must be non-zero when set".to_string(),
            ));
        }
        if self.connection.read_buffer_size == 0 {
            return Err(ScpiError::Configuration(
                "connection.read_buffer_size must be non-zero".to_string(),
            ));
        }

        for (key, address) in [
            ("defaults.oscilloscope_address", &self.defaults.oscilloscope_address),
            ("defaults.generator_address", &self.defaults.generator_address),
        ] {
            Endpoint::parse_with_default_port(address, self.connection.port)
                .map_err(|e| ScpiError::Configuration(format!("{}: {}", key, e)))?;
        }

        if self.waveform.points == 0 {
            return Err(ScpiError::Configuration(
                "waveform.points must be non-zero".to_string(),
            ));
        }
        if self.waveform.max_payload_bytes < self.connection.read_buffer_size {
            return Err(ScpiError::Configuration(format!(
                "waveform.max_payload_bytes ({}) must be at least connection.read_buffer_size ({})",
                self.waveform.max_payload_bytes, self.connection.read_buffer_size
            )));
        }

        Ok(())
    }

    /// Session settings derived from `[connection]`.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            connect_timeout: Duration::from_millis(self.connection.connect_timeout_ms),
            read_timeout: self.connection.read_timeout_ms.map(Duration::from_millis),
            read_buffer_size: self.connection.read_buffer_size,
        }
    }

    /// Transfer limits derived from `[waveform]`.
    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            max_payload_bytes: self.waveform.max_payload_bytes,
            settle_timeout: Duration::from_millis(self.waveform.settle_timeout_ms),
        }
    }

    /// Resolved location of the saved-state file, if one can be determined.
    pub fn state_file_path(&self) -> Option<PathBuf> {
        self.application
            .state_file
            .clone()
            .or_else(|| dirs::config_dir().map(|dir| dir.join("scpi-console").join("state.json")))
    }
}
