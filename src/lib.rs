//! # SCPI Console Library
//!
//! Control of a networked oscilloscope and function generator over raw SCPI
//! sockets (TCP, port 5025 by default). The library holds everything except
//! process startup, so the interactive console in `main.rs` and the
//! integration tests drive exactly the same code.
//!
//! ## Crate Structure
//!
//! - **`transport`**: endpoints, the `Transport`/`Connector` seam, TCP and mock implementations.
//! - **`session`**: `InstrumentSession`, one socket with connect/send/query/close/reconnect.
//! - **`commands`**: SCPI command strings used by the console.
//! - **`instrument`**: `Oscilloscope` and `FunctionGenerator` wrappers over a session.
//! - **`waveform`**: waveform transfer, end-of-transfer detection and sample parsing.
//! - **`render`**: scaling samples into a drawing area and a text plot.
//! - **`app`**: `ConsoleApp`, per-action handlers shared by every front-end.
//! - **`console`**: the interactive menu loop.
//! - **`config`**: figment-based configuration (defaults, TOML file, environment).
//! - **`state`**: remembered addresses and mode in a JSON file.
//! - **`mode`**: which instruments are enabled.
//! - **`logging`**: tracing subscriber setup.
//! - **`error`**: `ScpiError` and its `ErrorKind` classification.

pub mod app;
pub mod commands;
pub mod config;
pub mod console;
pub mod error;
pub mod instrument;
pub mod logging;
pub mod mode;
pub mod render;
pub mod session;
pub mod state;
pub mod transport;
pub mod waveform;

pub use app::ConsoleApp;
pub use error::{ErrorKind, ScpiError, ScpiResult};
pub use session::{InstrumentSession, SessionConfig};
pub use transport::Endpoint;
