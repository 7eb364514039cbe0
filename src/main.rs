//! CLI entry point for scpi-console
//!
//! Provides:
//! - An interactive menu for an oscilloscope and a function generator (default)
//! - One-shot `identify`, `query`, `send` and `acquire` commands for scripting
//!
//! # Usage
//!
//! ```bash
//! scpi-console                                   # interactive, prompts for addresses
//! scpi-console --mode scope --scope 10.0.0.5 acquire --channel 2
//! scpi-console query generator ":SOUR1:FREQ?"
//! ```
//!
//! Settings are layered: built-in defaults, then the TOML config file, then
//! `SCPI_CONSOLE_*` environment variables, then the saved state, then flags.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use scpi_console::config::{ConsoleConfig, DEFAULT_CONFIG_PATH};
use scpi_console::console::{self, Console};
use scpi_console::instrument::InstrumentRole;
use scpi_console::logging;
use scpi_console::mode::OperatingMode;
use scpi_console::render::TextCanvas;
use scpi_console::state::SavedState;
use scpi_console::waveform::WaveformRequest;
use scpi_console::ConsoleApp;
use std::path::PathBuf;
use tokio::io::BufReader;

#[derive(Parser)]
#[command(name = "scpi-console")]
#[command(about = "Control a networked oscilloscope and function generator over SCPI", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Which instruments to drive
    #[arg(long, global = true, value_enum)]
    mode: Option<OperatingMode>,

    /// Oscilloscope address (host or host:port)
    #[arg(long, global = true)]
    scope: Option<String>,

    /// Function generator address (host or host:port)
    #[arg(long, global = true)]
    generator: Option<String>,

    /// File remembering addresses and mode between runs
    #[arg(long, global = true)]
    state_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive menu (default)
    Interactive,

    /// Print `*IDN?` of every enabled instrument
    Identify,

    /// Send a query and print the reply
    Query {
        /// Instrument to address
        #[arg(value_enum)]
        target: InstrumentRole,
        /// SCPI query, e.g. "*IDN?"
        command: String,
    },

    /// Send a command without waiting for a reply
    Send {
        /// Instrument to address
        #[arg(value_enum)]
        target: InstrumentRole,
        /// SCPI command, e.g. ":OUTP1 ON"
        command: String,
    },

    /// Transfer a waveform from the oscilloscope and plot it
    Acquire {
        /// Oscilloscope channel
        #[arg(long)]
        channel: Option<u8>,
        /// Number of points to request
        #[arg(long)]
        points: Option<u32>,
        /// Plot width in characters
        #[arg(long)]
        width: Option<usize>,
        /// Plot height in characters
        #[arg(long)]
        height: Option<usize>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ConsoleConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(level) = &cli.log_level {
        config.application.log_level = level.clone();
    }
    if let Some(path) = &cli.state_file {
        config.application.state_file = Some(path.clone());
    }
    config.validate()?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    let state_file = config.state_file_path();
    let mut state = match &state_file {
        Some(path) => SavedState::load_or_default(path, &config.defaults),
        None => SavedState::from(&config.defaults),
    };
    if let Some(mode) = cli.mode {
        state.mode = mode;
    }
    if let Some(address) = &cli.scope {
        state.oscilloscope_address = address.clone();
    }
    if let Some(address) = &cli.generator {
        state.generator_address = address.clone();
    }

    let plot_defaults = config.waveform.clone();
    let mut app = ConsoleApp::new(config, state)?;
    tracing::info!(mode = %app.mode(), "scpi-console starting");

    let addresses_given = cli.scope.is_some() || cli.generator.is_some();
    match cli.command.unwrap_or(Commands::Interactive) {
        Commands::Interactive => {
            let mut console = Console::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
                .with_state_file(state_file);
            if !addresses_given {
                console.prompt_addresses(&mut app).await?;
            }
            console.run(&mut app).await?;
            Ok(())
        }
        Commands::Identify => {
            app.connect_all().await;
            let mut failed = false;
            for (role, result) in app.identify().await {
                match result {
                    Ok(id) => println!("{}: {}", role, id),
                    Err(e) => {
                        failed = true;
                        eprintln!("{}: {}", role, e);
                    }
                }
            }
            app.shutdown().await;
            if failed {
                bail!("identification failed");
            }
            Ok(())
        }
        Commands::Query { target, command } => {
            let session = app.session_mut(target)?;
            session.connect().await?;
            let result = session.query(command.trim()).await;
            app.shutdown().await;
            println!("{}", result?);
            Ok(())
        }
        Commands::Send { target, command } => {
            let session = app.session_mut(target)?;
            session.connect().await?;
            let result = session.send(command.trim()).await;
            app.shutdown().await;
            result?;
            tracing::info!(%target, %command, "Command sent");
            Ok(())
        }
        Commands::Acquire {
            channel,
            points,
            width,
            height,
        } => {
            let request = WaveformRequest::new(
                channel.unwrap_or(plot_defaults.channel),
                points.unwrap_or(plot_defaults.points),
            );
            app.session_mut(InstrumentRole::Oscilloscope)?.connect().await?;
            let result = app.acquire_waveform(&request).await;
            app.shutdown().await;

            let waveform = result?;
            println!("{}", console::summarize(&waveform));
            let canvas = TextCanvas::plot(
                &waveform.samples,
                width.unwrap_or(plot_defaults.plot_columns),
                height.unwrap_or(plot_defaults.plot_rows),
            );
            println!("{}", canvas);
            Ok(())
        }
    }
}
