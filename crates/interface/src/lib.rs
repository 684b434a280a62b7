//! Sentinel Interface - front end and server clients
//!
//! Responsibilities:
//! - CLI entry point
//! - Interactive line console
//! - REST and WebSocket clients for the dashboard server
//!
//! Architecture:
//! - http: chat, command preparation and flag endpoints
//! - socket: terminal WebSocket channel
//! - console: incremental rendering and slash commands
//! - input_handler: keyboard input, hidden while a password is asked for
//! - cli: command line entry

pub mod cli;
pub mod console;
mod error;
pub mod http;
pub mod input_handler;
pub mod socket;


pub use cli::{CliError, OutputFormat, run_cli};
pub use console::{ConsoleCommand, ConsoleObserver, load_flag, parse_console_line, run_console};
pub use error::ClientError;
pub use http::{API_KEY_HEADER, HttpChatApi};
pub use input_handler::{LineEditor, LineInput, MaskedInput, read_input};
pub use socket::{WsTerminalChannel, WsTerminalConnector, terminal_socket_url};
