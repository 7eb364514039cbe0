//! Remembered instrument addresses and operating mode.
//!
//! The state is a small JSON document:
//!
//! ```json
//! {
//!   "oscilloscope_address": "192.168.0.10",
//!   "generator_address": "192.168.0.11",
//!   "mode": "both"
//! }
//! ```
//!
//! Loading never fails: a missing file yields the configured defaults, and an
//! unreadable or corrupt file is logged and replaced by the defaults too.
//! Fields absent from an otherwise valid file fall back individually, and so
//! do addresses that no longer parse as `host[:port]`.

use crate::config::DefaultsConfig;
use crate::error::{ScpiError, ScpiResult};
use crate::mode::OperatingMode;
use crate::transport::{Endpoint, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// Persisted console state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedState {
    /// Last oscilloscope address.
    pub oscilloscope_address: String,
    /// Last function-generator address.
    pub generator_address: String,
    /// Last operating mode.
    pub mode: OperatingMode,
}

#[derive(Deserialize)]
struct PartialState {
    oscilloscope_address: Option<String>,
    generator_address: Option<String>,
    mode: Option<OperatingMode>,
}

impl From<&DefaultsConfig> for SavedState {
    fn from(defaults: &DefaultsConfig) -> Self {
        Self {
            oscilloscope_address: defaults.oscilloscope_address.clone(),
            generator_address: defaults.generator_address.clone(),
            mode: defaults.mode,
        }
    }
}

impl SavedState {
    /// Load from `path`, falling back to `defaults` for anything missing or unreadable.
    pub fn load_or_default(path: &Path, defaults: &DefaultsConfig) -> Self {
        let fallback = SavedState::from(defaults);

        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No saved state, using defaults");
                return fallback;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot read saved state, using defaults");
                return fallback;
            }
        };

        match serde_json::from_str::<PartialState>(&json) {
            Ok(partial) => Self {
                oscilloscope_address: checked_address(
                    path,
                    "oscilloscope_address",
                    partial.oscilloscope_address,
                    fallback.oscilloscope_address,
                ),
                generator_address: checked_address(
                    path,
                    "generator_address",
                    partial.generator_address,
                    fallback.generator_address,
                ),
                mode: partial.mode.unwrap_or(fallback.mode),
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Saved state is corrupt, using defaults");
                fallback
            }
        }
    }

    /// Write the state to `path` as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> ScpiResult<()> {
        let persistence_error = |message: String| ScpiError::Persistence {
            path: path.display().to_string(),
            message,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| persistence_error(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| persistence_error(e.to_string()))?;
        fs::write(path, json).map_err(|e| persistence_error(e.to_string()))?;

        tracing::debug!(path = %path.display(), "Saved console state");
        Ok(())
    }
}

fn checked_address(path: &Path, field: &str, saved: Option<String>, fallback: String) -> String {
    match saved {
        Some(address) if Endpoint::parse_with_default_port(&address, DEFAULT_PORT).is_ok() => address,
        Some(address) => {
            tracing::warn!(
                path = %path.display(),
                field,
                address = %address,
                "Saved address is invalid, using default"
            );
            fallback
        }
        None => fallback,
    }
}
