//! Interactive menu front-end.
//!
//! The console reads answers line by line from any async reader and writes to
//! any async writer, so the whole dialogue can be driven from byte buffers in
//! tests. Instrument errors are printed and the menu comes back; only I/O
//! errors on the console streams themselves end the loop. End of input acts
//! like choosing "Quit".

use crate::app::ConsoleApp;
use crate::error::{ScpiError, ScpiResult};
use crate::instrument::InstrumentRole;
use crate::render::TextCanvas;
use crate::waveform::{Waveform, WaveformRequest};
use std::io;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

enum Step {
    Continue,
    Quit,
}

/// Menu-driven console over a reader/writer pair.
pub struct Console<R, W> {
    input: R,
    output: W,
    state_file: Option<PathBuf>,
}

impl<R, W> Console<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Console reading answers from `input` and printing to `output`.
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            state_file: None,
        }
    }

    /// Save addresses and mode to `path` after address changes and on exit.
    pub fn with_state_file(mut self, path: Option<PathBuf>) -> Self {
        self.state_file = path;
        self
    }

    /// Give back the output stream.
    pub fn into_output(self) -> W {
        self.output
    }

    async fn say(&mut self, text: &str) -> io::Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.write_all(b"\n").await?;
        self.output.flush().await
    }

    /// Print `label`, read one line. `None` at end of input.
    async fn prompt(&mut self, label: &str) -> io::Result<Option<String>> {
        self.output.write_all(label.as_bytes()).await?;
        self.output.flush().await?;

        let mut line = String::new();
        if self.input.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    async fn report<T>(&mut self, result: ScpiResult<T>) -> io::Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::debug!(kind = %e.kind(), error = %e, "Console operation failed");
                self.say(&format!("Error: {}", e)).await?;
                Ok(None)
            }
        }
    }

    /// Ask for each enabled instrument's address, Enter keeping the remembered one.
    pub async fn prompt_addresses(&mut self, app: &mut ConsoleApp) -> io::Result<()> {
        for role in app.roles() {
            let label = format!("{} address [{}]: ", capitalize(role), app.address(role));
            let Some(answer) = self.prompt(&label).await? else {
                return Ok(());
            };
            if !answer.is_empty() {
                let result = app.set_address(role, &answer).await;
                self.report(result).await?;
            }
        }
        Ok(())
    }

    /// Connect, run the menu until the user quits, then close and save.
    pub async fn run(&mut self, app: &mut ConsoleApp) -> io::Result<()> {
        for (role, result) in app.connect_all().await {
            match result {
                Ok(()) => self.say(&format!("{} connected.", capitalize(role))).await?,
                Err(e) => {
                    self.say(&format!("{} not connected: {}", capitalize(role), e))
                        .await?
                }
            }
        }

        loop {
            self.print_menu(app).await?;
            let Some(choice) = self.prompt("Choice: ").await? else {
                break;
            };
            match self.dispatch(app, &choice).await? {
                Step::Continue => {}
                Step::Quit => break,
            }
        }

        self.say("Closing...").await?;
        app.shutdown().await;
        self.save_state(app).await
    }

    async fn print_menu(&mut self, app: &ConsoleApp) -> io::Result<()> {
        let scope = app.has(InstrumentRole::Oscilloscope);
        let generator = app.has(InstrumentRole::Generator);

        let mut menu = vec!["", "--- SCPI instrument control ---", "1. Identify instruments"];
        if scope {
            menu.push("2. Configure an oscilloscope channel");
        }
        if generator {
            menu.push("3. Configure a function generator channel");
        }
        menu.push("4. Send a custom SCPI command");
        menu.push("5. Change an instrument address");
        if scope {
            menu.push("6. Acquire and plot a waveform");
        }
        menu.push("0. Quit");
        self.say(&menu.join("\n")).await
    }

    async fn dispatch(&mut self, app: &mut ConsoleApp, choice: &str) -> io::Result<Step> {
        let scope = app.has(InstrumentRole::Oscilloscope);
        let generator = app.has(InstrumentRole::Generator);

        match choice {
            "1" => self.identify(app).await,
            "2" if scope => self.configure_oscilloscope(app).await,
            "3" if generator => self.configure_generator(app).await,
            "4" => self.custom_command(app).await,
            "5" => self.change_address(app).await,
            "6" if scope => self.acquire(app).await,
            "0" => Ok(Step::Quit),
            _ => {
                self.say("Invalid choice.").await?;
                Ok(Step::Continue)
            }
        }
    }

    async fn identify(&mut self, app: &mut ConsoleApp) -> io::Result<Step> {
        for (role, result) in app.identify().await {
            match result {
                Ok(id) => self.say(&format!("{} ID: {}", capitalize(role), id)).await?,
                Err(e) => self.say(&format!("{} ID: Error: {}", capitalize(role), e)).await?,
            }
        }
        Ok(Step::Continue)
    }

    async fn configure_oscilloscope(&mut self, app: &mut ConsoleApp) -> io::Result<Step> {
        let Some(channel) = self.prompt("Channel to configure (e.g. 1): ").await? else {
            return Ok(Step::Quit);
        };
        let Some(vdiv) = self.prompt("Volts/div (e.g. 0.5): ").await? else {
            return Ok(Step::Quit);
        };
        let Some(tdiv) = self.prompt("Time/div (e.g. 0.001): ").await? else {
            return Ok(Step::Quit);
        };

        let result = app.configure_oscilloscope(&channel, &vdiv, &tdiv).await;
        if self.report(result).await?.is_some() {
            self.say(&format!(
                "Channel {} configured: {} V/div, {} s/div",
                channel, vdiv, tdiv
            ))
            .await?;
        }
        Ok(Step::Continue)
    }

    async fn configure_generator(&mut self, app: &mut ConsoleApp) -> io::Result<Step> {
        let Some(channel) = self.prompt("Channel to configure (e.g. 1): ").await? else {
            return Ok(Step::Quit);
        };
        let Some(freq) = self.prompt("Frequency (Hz): ").await? else {
            return Ok(Step::Quit);
        };
        let Some(ampl) = self.prompt("Amplitude (Vpp): ").await? else {
            return Ok(Step::Quit);
        };
        let Some(shape) = self.prompt("Waveform shape (SIN, SQU, RAMP, ...): ").await? else {
            return Ok(Step::Quit);
        };

        let result = app.configure_generator(&channel, &shape, &freq, &ampl).await;
        if self.report(result).await?.is_some() {
            self.say(&format!(
                "Generator channel {} configured: {}, {} Hz, {} Vpp",
                channel, shape, freq, ampl
            ))
            .await?;
        }
        Ok(Step::Continue)
    }

    async fn choose_instrument(&mut self, app: &ConsoleApp) -> io::Result<Option<ScpiResult<InstrumentRole>>> {
        let roles = app.roles();
        if let [only] = roles.as_slice() {
            return Ok(Some(Ok(*only)));
        }
        let Some(answer) = self.prompt("Which instrument? (oscilloscope/generator): ").await? else {
            return Ok(None);
        };
        Ok(Some(answer.parse::<InstrumentRole>()))
    }

    async fn custom_command(&mut self, app: &mut ConsoleApp) -> io::Result<Step> {
        let Some(role) = self.choose_instrument(app).await? else {
            return Ok(Step::Quit);
        };
        let Some(role) = self.report(role).await? else {
            return Ok(Step::Continue);
        };
        let Some(command) = self.prompt("SCPI command: ").await? else {
            return Ok(Step::Quit);
        };

        let result = app.custom_command(role, &command).await;
        match self.report(result).await? {
            Some(Some(reply)) => self.say(&format!("Response: {}", reply)).await?,
            Some(None) => self.say("Sent.").await?,
            None => {}
        }
        Ok(Step::Continue)
    }

    async fn change_address(&mut self, app: &mut ConsoleApp) -> io::Result<Step> {
        let Some(role) = self.choose_instrument(app).await? else {
            return Ok(Step::Quit);
        };
        let Some(role) = self.report(role).await? else {
            return Ok(Step::Continue);
        };
        let Some(address) = self.prompt("New address: ").await? else {
            return Ok(Step::Quit);
        };

        let result = app.change_address(role, &address).await;
        if let Some(endpoint) = self.report(result).await? {
            self.say(&format!("{} address changed to {}.", capitalize(role), endpoint))
                .await?;
            self.save_state(app).await?;
        }
        Ok(Step::Continue)
    }

    async fn acquire(&mut self, app: &mut ConsoleApp) -> io::Result<Step> {
        let defaults = app.config().waveform.clone();

        let Some(channel) = self
            .prompt(&format!("Channel [{}]: ", defaults.channel))
            .await?
        else {
            return Ok(Step::Quit);
        };
        let Some(points) = self
            .prompt(&format!("Points [{}]: ", defaults.points))
            .await?
        else {
            return Ok(Step::Quit);
        };

        let request = parse_or_default(&channel, defaults.channel, "channel").and_then(|channel| {
            parse_or_default(&points, defaults.points, "points")
                .map(|points| WaveformRequest::new(channel, points))
        });
        let Some(request) = self.report(request).await? else {
            return Ok(Step::Continue);
        };

        let result = app.acquire_waveform(&request).await;
        if let Some(waveform) = self.report(result).await? {
            let summary = summarize(&waveform);
            self.say(&summary).await?;
            let canvas = TextCanvas::plot(&waveform.samples, defaults.plot_columns, defaults.plot_rows);
            self.say(&canvas.to_string()).await?;
        }
        Ok(Step::Continue)
    }

    async fn save_state(&mut self, app: &ConsoleApp) -> io::Result<()> {
        let Some(path) = self.state_file.clone() else {
            return Ok(());
        };
        if let Err(e) = app.saved_state().save(&path) {
            tracing::warn!(error = %e, "Could not save console state");
            self.say(&format!("Warning: {}", e)).await?;
        }
        Ok(())
    }
}

/// One-line description of an acquisition.
pub fn summarize(waveform: &Waveform) -> String {
    let (min, max) = waveform.range();
    format!(
        "Acquired {} samples from channel {} (min {}, max {})",
        waveform.samples.len(),
        waveform.channel,
        min,
        max
    )
}

fn parse_or_default<T: std::str::FromStr>(answer: &str, default: T, what: &str) -> ScpiResult<T> {
    if answer.is_empty() {
        return Ok(default);
    }
    answer
        .parse()
        .map_err(|_| ScpiError::UserInput(format!("invalid {} '{}'", what, answer)))
}

fn capitalize(role: InstrumentRole) -> &'static str {
    match role {
        InstrumentRole::Oscilloscope => "Oscilloscope",
        InstrumentRole::Generator => "Generator",
    }
}
