// Sentinel Core - shared data model
//!
//! Contains:
//! - Transcript entries and roles
//! - Command proposals and terminal session state
//! - Investigation flags raised by the parent application
//! - Wire messages for the chat stream and the terminal socket
//! - The SSE event frame decoder
//! - Configuration

mod config;
mod entry;
mod flag;
mod proposal;
mod session;
pub mod sse;
mod wire;

pub use config::*;
pub use entry::*;
pub use flag::*;
pub use proposal::*;
pub use session::*;
pub use sse::{DEFAULT_EVENT_TYPE, SseDecoder, SseFrame, decode_stream};
pub use wire::*;
