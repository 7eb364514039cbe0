//! Application state shared by every front-end.
//!
//! `ConsoleApp` owns the instrument wrappers enabled by the operating mode and
//! exposes one handler per user action. Handlers return `ScpiResult` values for
//! the front-end to display; nothing in here prints or exits.

use crate::commands;
use crate::config::ConsoleConfig;
use crate::error::{ScpiError, ScpiResult};
use crate::instrument::{FunctionGenerator, InstrumentRole, Oscilloscope};
use crate::mode::OperatingMode;
use crate::session::InstrumentSession;
use crate::state::SavedState;
use crate::transport::{Connector, Endpoint, TcpConnector};
use crate::waveform::{Waveform, WaveformRequest};
use std::sync::Arc;

/// Console application state.
pub struct ConsoleApp {
    config: ConsoleConfig,
    connector: Arc<dyn Connector>,
    remembered: SavedState,
    oscilloscope: Option<Oscilloscope>,
    generator: Option<FunctionGenerator>,
}

impl ConsoleApp {
    /// Build the application with TCP sessions. Nothing is connected yet.
    pub fn new(config: ConsoleConfig, state: SavedState) -> ScpiResult<Self> {
        Self::with_connector(config, state, Arc::new(TcpConnector))
    }

    /// Build the application with a custom connector.
    pub fn with_connector(
        config: ConsoleConfig,
        state: SavedState,
        connector: Arc<dyn Connector>,
    ) -> ScpiResult<Self> {
        let mut app = Self {
            config,
            connector,
            remembered: state,
            oscilloscope: None,
            generator: None,
        };

        if app.mode().has_oscilloscope() {
            let session = app.new_session(&app.remembered.oscilloscope_address)?;
            app.oscilloscope = Some(Oscilloscope::new(session));
        }
        if app.mode().has_generator() {
            let session = app.new_session(&app.remembered.generator_address)?;
            app.generator = Some(FunctionGenerator::new(session));
        }

        tracing::debug!(mode = %app.mode(), "Console application ready");
        Ok(app)
    }

    fn parse_address(&self, address: &str) -> ScpiResult<Endpoint> {
        Endpoint::parse_with_default_port(address, self.config.connection.port)
            .map_err(ScpiError::UserInput)
    }

    fn new_session(&self, address: &str) -> ScpiResult<InstrumentSession> {
        Ok(InstrumentSession::with_connector(
            self.parse_address(address)?,
            self.config.session_config(),
            Arc::clone(&self.connector),
        ))
    }

    /// Operating mode.
    pub fn mode(&self) -> OperatingMode {
        self.remembered.mode
    }

    /// Effective configuration.
    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    /// Addresses and mode to persist.
    pub fn saved_state(&self) -> SavedState {
        self.remembered.clone()
    }

    /// Address last set for `role`, as typed.
    pub fn address(&self, role: InstrumentRole) -> &str {
        match role {
            InstrumentRole::Oscilloscope => &self.remembered.oscilloscope_address,
            InstrumentRole::Generator => &self.remembered.generator_address,
        }
    }

    /// Instruments enabled by the mode.
    pub fn roles(&self) -> Vec<InstrumentRole> {
        let mut roles = Vec::new();
        if self.oscilloscope.is_some() {
            roles.push(InstrumentRole::Oscilloscope);
        }
        if self.generator.is_some() {
            roles.push(InstrumentRole::Generator);
        }
        roles
    }

    /// True when `role` is enabled by the mode.
    pub fn has(&self, role: InstrumentRole) -> bool {
        match role {
            InstrumentRole::Oscilloscope => self.oscilloscope.is_some(),
            InstrumentRole::Generator => self.generator.is_some(),
        }
    }

    /// The oscilloscope, if the mode enables it.
    pub fn oscilloscope_mut(&mut self) -> ScpiResult<&mut Oscilloscope> {
        let mode = self.mode();
        self.oscilloscope
            .as_mut()
            .ok_or_else(|| not_enabled(InstrumentRole::Oscilloscope, mode))
    }

    /// The function generator, if the mode enables it.
    pub fn generator_mut(&mut self) -> ScpiResult<&mut FunctionGenerator> {
        let mode = self.mode();
        self.generator
            .as_mut()
            .ok_or_else(|| not_enabled(InstrumentRole::Generator, mode))
    }

    /// Session of `role`.
    pub fn session_mut(&mut self, role: InstrumentRole) -> ScpiResult<&mut InstrumentSession> {
        match role {
            InstrumentRole::Oscilloscope => Ok(self.oscilloscope_mut()?.session_mut()),
            InstrumentRole::Generator => Ok(self.generator_mut()?.session_mut()),
        }
    }

    /// Session of `role`, read-only.
    pub fn session(&self, role: InstrumentRole) -> Option<&InstrumentSession> {
        match role {
            InstrumentRole::Oscilloscope => self.oscilloscope.as_ref().map(Oscilloscope::session),
            InstrumentRole::Generator => self.generator.as_ref().map(FunctionGenerator::session),
        }
    }

    /// Connect every enabled instrument. One failure does not stop the others.
    pub async fn connect_all(&mut self) -> Vec<(InstrumentRole, ScpiResult<()>)> {
        let mut results = Vec::new();
        for role in self.roles() {
            let result = match self.session_mut(role) {
                Ok(session) => session.connect().await,
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                tracing::warn!(%role, error = %e, "Instrument not connected");
            }
            results.push((role, result));
        }
        results
    }

    /// `*IDN?` on every enabled instrument.
    pub async fn identify(&mut self) -> Vec<(InstrumentRole, ScpiResult<String>)> {
        let mut results = Vec::new();
        for role in self.roles() {
            let result = match self.session_mut(role) {
                Ok(session) => session.query(commands::IDENTIFY).await,
                Err(e) => Err(e),
            };
            results.push((role, result));
        }
        results
    }

    /// Vertical scale of one oscilloscope channel plus the timebase.
    pub async fn configure_oscilloscope(
        &mut self,
        channel: &str,
        volts_per_div: &str,
        seconds_per_div: &str,
    ) -> ScpiResult<()> {
        self.oscilloscope_mut()?
            .configure_channel(channel, volts_per_div, seconds_per_div)
            .await?;
        tracing::info!(channel, volts_per_div, seconds_per_div, "Oscilloscope channel configured");
        Ok(())
    }

    /// Shape, frequency and amplitude of one generator channel.
    pub async fn configure_generator(
        &mut self,
        channel: &str,
        shape: &str,
        frequency_hz: &str,
        amplitude_vpp: &str,
    ) -> ScpiResult<()> {
        self.generator_mut()?
            .configure_channel(channel, shape, frequency_hz, amplitude_vpp)
            .await?;
        tracing::info!(channel, shape, frequency_hz, amplitude_vpp, "Generator channel configured");
        Ok(())
    }

    /// Forward a raw command. Queries return the reply; other commands return `None`.
    pub async fn custom_command(
        &mut self,
        role: InstrumentRole,
        command: &str,
    ) -> ScpiResult<Option<String>> {
        let command = command.trim();
        if command.is_empty() {
            return Err(ScpiError::UserInput("command is empty".to_string()));
        }

        let session = self.session_mut(role)?;
        if commands::is_query(command) {
            session.query(command).await.map(Some)
        } else {
            session.send(command).await.map(|()| None)
        }
    }

    /// Point `role` at a new address without connecting.
    ///
    /// The old socket, if any, is closed first.
    pub async fn set_address(&mut self, role: InstrumentRole, address: &str) -> ScpiResult<()> {
        let endpoint = self.parse_address(address)?;
        let connector = Arc::clone(&self.connector);
        let session = self.session_mut(role)?;
        session.close().await;
        let config = session.config().clone();
        *session = InstrumentSession::with_connector(endpoint, config, connector);
        self.remember(role, address);
        Ok(())
    }

    /// Close `role`'s socket, re-point it at `address` and connect.
    ///
    /// The new address is remembered even when the connection fails, since the
    /// session now points there.
    pub async fn change_address(
        &mut self,
        role: InstrumentRole,
        address: &str,
    ) -> ScpiResult<Endpoint> {
        let endpoint = self.parse_address(address)?;
        let session = self.session_mut(role)?;
        let result = session.reconnect(endpoint.clone()).await;
        self.remember(role, address);
        result.map(|()| endpoint)
    }

    fn remember(&mut self, role: InstrumentRole, address: &str) {
        let address = address.trim().to_string();
        match role {
            InstrumentRole::Oscilloscope => self.remembered.oscilloscope_address = address,
            InstrumentRole::Generator => self.remembered.generator_address = address,
        }
    }

    /// Transfer a waveform from the oscilloscope.
    pub async fn acquire_waveform(&mut self, request: &WaveformRequest) -> ScpiResult<Waveform> {
        let options = self.config.transfer_options();
        self.oscilloscope_mut()?
            .acquire_waveform(request, &options)
            .await
    }

    /// Close every session.
    pub async fn shutdown(&mut self) {
        if let Some(scope) = self.oscilloscope.as_mut() {
            scope.session_mut().close().await;
        }
        if let Some(generator) = self.generator.as_mut() {
            generator.session_mut().close().await;
        }
    }
}

fn not_enabled(role: InstrumentRole, mode: OperatingMode) -> ScpiError {
    ScpiError::UserInput(format!("the {} is not enabled in {} mode", role, mode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::transport::mock::MockConnector;

    fn app_with(mode: OperatingMode, connector: &MockConnector) -> ConsoleApp {
        let state = SavedState {
            oscilloscope_address: "scope".to_string(),
            generator_address: "gen:6000".to_string(),
            mode,
        };
        ConsoleApp::with_connector(
            ConsoleConfig::default(),
            state,
            Arc::new(connector.clone()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn mode_gates_instruments() {
        let connector = MockConnector::new();
        let mut app = app_with(OperatingMode::GeneratorOnly, &connector);

        assert_eq!(app.roles(), vec![InstrumentRole::Generator]);
        let err = app.configure_oscilloscope("1", "0.5", "0.001").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UserInput);
        assert!(err.to_string().contains("generator-only"));
    }

    #[tokio::test]
    async fn connect_all_reports_each_instrument() {
        let connector = MockConnector::new();
        connector.fail_next_connect();
        let mut app = app_with(OperatingMode::Both, &connector);

        let results = app.connect_all().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, InstrumentRole::Oscilloscope);
        assert!(results[0].1.is_err());
        assert!(results[1].1.is_ok());
        assert_eq!(
            connector.call_log(),
            vec!["connect scope:5025", "connect gen:6000"]
        );
    }

    #[tokio::test]
    async fn identify_collects_replies_and_errors() {
        let connector = MockConnector::new();
        connector.reply("*IDN?", "MOCK,INSTR,1,1\n");
        let mut app = app_with(OperatingMode::Both, &connector);
        app.session_mut(InstrumentRole::Generator)
            .unwrap()
            .connect()
            .await
            .unwrap();

        let results = app.identify().await;
        assert!(matches!(results[0].1, Err(ScpiError::NotConnected(_))));
        assert_eq!(results[1].1.as_ref().unwrap(), "MOCK,INSTR,1,1");
    }

    #[tokio::test]
    async fn custom_command_routes_queries_and_commands() {
        let connector = MockConnector::new();
        connector.reply(":SOUR1:FREQ?", "1.000000E+03\n");
        let mut app = app_with(OperatingMode::Both, &connector);
        app.connect_all().await;

        let reply = app
            .custom_command(InstrumentRole::Generator, ":SOUR1:FREQ?")
            .await
            .unwrap();
        assert_eq!(reply.as_deref(), Some("1.000000E+03"));

        let reply = app
            .custom_command(InstrumentRole::Generator, "  OUTP1 ON ")
            .await
            .unwrap();
        assert_eq!(reply, None);
        assert_eq!(connector.written(), vec![":SOUR1:FREQ?", "OUTP1 ON"]);

        let err = app
            .custom_command(InstrumentRole::Oscilloscope, "   ")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UserInput);
    }

    #[tokio::test]
    async fn change_address_closes_old_session_first() {
        let connector = MockConnector::new();
        let mut app = app_with(OperatingMode::OscilloscopeOnly, &connector);
        app.connect_all().await;

        connector.fail_next_connect();
        let err = app
            .change_address(InstrumentRole::Oscilloscope, "10.9.9.9")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(app.saved_state().oscilloscope_address, "10.9.9.9");
        assert_eq!(
            connector.call_log(),
            vec!["connect scope:5025", "close scope:5025", "connect 10.9.9.9:5025"]
        );

        let endpoint = app
            .change_address(InstrumentRole::Oscilloscope, "10.9.9.10:5030")
            .await
            .unwrap();
        assert_eq!(endpoint, Endpoint::new("10.9.9.10", 5030));
    }

    #[tokio::test]
    async fn bad_address_is_rejected_before_touching_the_session() {
        let connector = MockConnector::new();
        let mut app = app_with(OperatingMode::OscilloscopeOnly, &connector);
        app.connect_all().await;

        let err = app
            .change_address(InstrumentRole::Oscilloscope, "scope:http")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UserInput);
        assert!(app.session(InstrumentRole::Oscilloscope).unwrap().is_connected());
    }

    #[tokio::test]
    async fn set_address_does_not_connect() {
        let connector = MockConnector::new();
        let mut app = app_with(OperatingMode::Both, &connector);
        app.set_address(InstrumentRole::Generator, "gen2").await.unwrap();

        assert_eq!(app.address(InstrumentRole::Generator), "gen2");
        assert_eq!(
            app.session(InstrumentRole::Generator).unwrap().endpoint(),
            &Endpoint::new("gen2", 5025)
        );
        assert!(connector.call_log().is_empty());
    }

    #[tokio::test]
    async fn shutdown_closes_everything() {
        let connector = MockConnector::new();
        let mut app = app_with(OperatingMode::Both, &connector);
        app.connect_all().await;
        connector.clear_call_log();

        app.shutdown().await;
        app.shutdown().await;
        assert_eq!(
            connector.call_log(),
            vec!["close scope:5025", "close gen:6000"]
        );
    }
}
