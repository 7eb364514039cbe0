//! Oscilloscope and function-generator wrappers around a session.

use crate::commands::{self, generator, scope};
use crate::error::{ScpiError, ScpiResult};
use crate::session::InstrumentSession;
use crate::waveform::{self, TransferOptions, Waveform, WaveformRequest};
use std::fmt::{self, Display};
use std::str::FromStr;

/// The two instruments the console knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum InstrumentRole {
    /// The oscilloscope.
    #[value(alias = "scope")]
    Oscilloscope,
    /// The function generator.
    #[value(alias = "gen")]
    Generator,
}

impl Display for InstrumentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentRole::Oscilloscope => f.write_str("oscilloscope"),
            InstrumentRole::Generator => f.write_str("generator"),
        }
    }
}

impl FromStr for InstrumentRole {
    type Err = ScpiError;

    /// Accepts any prefix-style answer: `o`, `osc`, `scope`, `g`, `gen`, ...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let answer = s.trim().to_lowercase();
        if answer.starts_with('o') || answer.starts_with('s') {
            Ok(InstrumentRole::Oscilloscope)
        } else if answer.starts_with('g') || answer.starts_with('f') {
            Ok(InstrumentRole::Generator)
        } else {
            Err(ScpiError::UserInput(format!(
                "unknown instrument '{}' (expected oscilloscope or generator)",
                s.trim()
            )))
        }
    }
}

/// An oscilloscope reached through one session.
#[derive(Debug)]
pub struct Oscilloscope {
    session: InstrumentSession,
}

impl Oscilloscope {
    /// Wrap a session.
    pub fn new(session: InstrumentSession) -> Self {
        Self { session }
    }

    /// Underlying session.
    pub fn session(&self) -> &InstrumentSession {
        &self.session
    }

    /// Underlying session, mutable.
    pub fn session_mut(&mut self) -> &mut InstrumentSession {
        &mut self.session
    }

    /// `*IDN?`
    pub async fn identify(&mut self) -> ScpiResult<String> {
        self.session.query(commands::IDENTIFY).await
    }

    /// Set a channel's vertical scale and the shared timebase.
    pub async fn configure_channel(
        &mut self,
        channel: impl Display,
        volts_per_div: impl Display,
        seconds_per_div: impl Display,
    ) -> ScpiResult<()> {
        self.session
            .send(&scope::channel_scale(channel, volts_per_div))
            .await?;
        self.session
            .send(&scope::timebase_scale(seconds_per_div))
            .await
    }

    /// Transfer one waveform.
    pub async fn acquire_waveform(
        &mut self,
        request: &WaveformRequest,
        options: &TransferOptions,
    ) -> ScpiResult<Waveform> {
        waveform::acquire(&mut self.session, request, options).await
    }
}

/// A function generator reached through one session.
#[derive(Debug)]
pub struct FunctionGenerator {
    session: InstrumentSession,
}

impl FunctionGenerator {
    /// Wrap a session.
    pub fn new(session: InstrumentSession) -> Self {
        Self { session }
    }

    /// Underlying session.
    pub fn session(&self) -> &InstrumentSession {
        &self.session
    }

    /// Underlying session, mutable.
    pub fn session_mut(&mut self) -> &mut InstrumentSession {
        &mut self.session
    }

    /// `*IDN?`
    pub async fn identify(&mut self) -> ScpiResult<String> {
        self.session.query(commands::IDENTIFY).await
    }

    /// Set shape, frequency and amplitude of an output channel, in that order.
    pub async fn configure_channel(
        &mut self,
        channel: impl Display,
        shape: impl Display,
        frequency_hz: impl Display,
        amplitude_vpp: impl Display,
    ) -> ScpiResult<()> {
        self.session
            .send(&generator::function(&channel, shape))
            .await?;
        self.session
            .send(&generator::frequency(&channel, frequency_hz))
            .await?;
        self.session
            .send(&generator::amplitude(&channel, amplitude_vpp))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;
    use crate::transport::mock::MockConnector;
    use crate::transport::Endpoint;
    use std::sync::Arc;

    fn session(connector: &MockConnector, host: &str) -> InstrumentSession {
        InstrumentSession::with_connector(
            Endpoint::new(host, 5025),
            SessionConfig::default(),
            Arc::new(connector.clone()),
        )
    }

    #[test]
    fn role_answers() {
        assert_eq!("o".parse::<InstrumentRole>().unwrap(), InstrumentRole::Oscilloscope);
        assert_eq!("Oscillo".parse::<InstrumentRole>().unwrap(), InstrumentRole::Oscilloscope);
        assert_eq!("scope".parse::<InstrumentRole>().unwrap(), InstrumentRole::Oscilloscope);
        assert_eq!(" gen ".parse::<InstrumentRole>().unwrap(), InstrumentRole::Generator);
        assert!("x".parse::<InstrumentRole>().is_err());
        assert!("".parse::<InstrumentRole>().is_err());
    }

    #[tokio::test]
    async fn scope_channel_configuration() {
        let connector = MockConnector::new();
        let mut scope = Oscilloscope::new(session(&connector, "scope"));
        scope.session_mut().connect().await.unwrap();

        scope.configure_channel(2, "0.5", "0.001").await.unwrap();
        assert_eq!(connector.written(), vec![":CHAN2:SCAL 0.5", ":TIM:SCAL 0.001"]);
    }

    #[tokio::test]
    async fn generator_channel_configuration() {
        let connector = MockConnector::new();
        let mut gen = FunctionGenerator::new(session(&connector, "gen"));
        gen.session_mut().connect().await.unwrap();

        gen.configure_channel("1", "SQU", "1000", "2.0").await.unwrap();
        assert_eq!(
            connector.written(),
            vec![":SOUR1:FUNC SQU", ":SOUR1:FREQ 1000", ":SOUR1:VOLT 2.0"]
        );
    }

    #[tokio::test]
    async fn identify_queries_idn() {
        let connector = MockConnector::new();
        connector.reply("*IDN?", "RIGOL,DG1022Z,DG1ZA000,00.01\n");
        let mut gen = FunctionGenerator::new(session(&connector, "gen"));
        gen.session_mut().connect().await.unwrap();

        assert_eq!(gen.identify().await.unwrap(), "RIGOL,DG1022Z,DG1ZA000,00.01");
    }

    #[tokio::test]
    async fn acquisition_over_mock() {
        let connector = MockConnector::new();
        connector.reply_chunks(
            ":WAV:DATA?",
            vec![b"#HEADER\n0.1,0.".to_vec(), b"2,0.3\n".to_vec()],
        );
        let mut scope = Oscilloscope::new(session(&connector, "scope"));
        scope.session_mut().connect().await.unwrap();

        let waveform = scope
            .acquire_waveform(&WaveformRequest::new(1, 3), &TransferOptions::default())
            .await
            .unwrap();
        assert_eq!(waveform.samples, vec![0.1, 0.2, 0.3]);
        assert_eq!(
            connector.written(),
            vec![
                ":WAV:FORM ASCii",
                ":WAV:SOUR CHAN1",
                ":WAV:POIN:MODE RAW",
                ":WAV:POIN 3",
                ":WAV:DATA?",
            ]
        );
    }
}
