//! Which instruments a console run drives.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating mode, chosen once per run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum OperatingMode {
    /// Oscilloscope and function generator.
    #[default]
    Both,
    /// Oscilloscope only.
    #[serde(alias = "scope")]
    #[value(alias = "scope")]
    OscilloscopeOnly,
    /// Function generator only.
    #[serde(alias = "generator")]
    #[value(alias = "generator")]
    GeneratorOnly,
}

impl OperatingMode {
    /// True when an oscilloscope session is created.
    pub fn has_oscilloscope(self) -> bool {
        matches!(self, OperatingMode::Both | OperatingMode::OscilloscopeOnly)
    }

    /// True when a function-generator session is created.
    pub fn has_generator(self) -> bool {
        matches!(self, OperatingMode::Both | OperatingMode::GeneratorOnly)
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OperatingMode::Both => "both",
            OperatingMode::OscilloscopeOnly => "oscilloscope-only",
            OperatingMode::GeneratorOnly => "generator-only",
        };
        f.write_str(label)
    }
}
