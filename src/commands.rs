//! SCPI command strings used by the console.
//!
//! Parameters are formatted verbatim. Range checking is left to the
//! instrument, which rejects bad values according to its own rules.

use std::fmt::Display;

/// Identification query.
pub const IDENTIFY: &str = "*IDN?";

/// Switch waveform transfers to ASCII.
pub const WAVEFORM_FORMAT_ASCII: &str = ":WAV:FORM ASCii";

/// Transfer raw acquisition memory rather than the screen record.
pub const WAVEFORM_POINTS_MODE_RAW: &str = ":WAV:POIN:MODE RAW";

/// Request the waveform data dump.
pub const WAVEFORM_DATA: &str = ":WAV:DATA?";

/// True when `command` expects a reply.
pub fn is_query(command: &str) -> bool {
    command.contains('?')
}

/// Oscilloscope mnemonics.
pub mod scope {
    use super::Display;

    /// `:CHANn:SCAL v`: vertical scale in volts per division.
    pub fn channel_scale(channel: impl Display, volts_per_div: impl Display) -> String {
        format!(":CHAN{}:SCAL {}", channel, volts_per_div)
    }

    /// `:TIM:SCAL t`: horizontal scale in seconds per division.
    pub fn timebase_scale(seconds_per_div: impl Display) -> String {
        format!(":TIM:SCAL {}", seconds_per_div)
    }

    /// `:WAV:SOUR CHANn`
    pub fn waveform_source(channel: impl Display) -> String {
        format!(":WAV:SOUR CHAN{}", channel)
    }

    /// `:WAV:POIN n`
    pub fn waveform_points(points: impl Display) -> String {
        format!(":WAV:POIN {}", points)
    }
}

/// Function-generator mnemonics.
pub mod generator {
    use super::Display;

    /// `:SOURn:FUNC shape`: `SIN`, `SQU`, `RAMP`, ...
    pub fn function(channel: impl Display, shape: impl Display) -> String {
        format!(":SOUR{}:FUNC {}", channel, shape)
    }

    /// `:SOURn:FREQ f` in hertz.
    pub fn frequency(channel: impl Display, hertz: impl Display) -> String {
        format!(":SOUR{}:FREQ {}", channel, hertz)
    }

    /// `:SOURn:VOLT a` in volts peak-to-peak.
    pub fn amplitude(channel: impl Display, volts_pp: impl Display) -> String {
        format!(":SOUR{}:VOLT {}", channel, volts_pp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_commands() {
        assert_eq!(scope::channel_scale(1, 0.5), ":CHAN1:SCAL 0.5");
        assert_eq!(scope::timebase_scale("0.001"), ":TIM:SCAL 0.001");
        assert_eq!(scope::waveform_source(2), ":WAV:SOUR CHAN2");
        assert_eq!(scope::waveform_points(1000), ":WAV:POIN 1000");
    }

    #[test]
    fn generator_commands() {
        assert_eq!(generator::function(1, "SIN"), ":SOUR1:FUNC SIN");
        assert_eq!(generator::frequency(2, 1000.0), ":SOUR2:FREQ 1000");
        assert_eq!(generator::amplitude("1", "2.5"), ":SOUR1:VOLT 2.5");
    }

    #[test]
    fn values_are_forwarded_unchecked() {
        assert_eq!(scope::channel_scale("x", "-3"), ":CHANx:SCAL -3");
    }

    #[test]
    fn query_detection() {
        assert!(is_query(IDENTIFY));
        assert!(is_query(":SOUR1:FREQ?"));
        assert!(!is_query(":SOUR1:FREQ 10"));
    }
}
