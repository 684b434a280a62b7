//! Sentinel Runtime - streaming session engine
//!
//! Responsibilities:
//! - Chat transcript and streamed assistant answers
//! - Command proposals and the terminal session state machine
//! - Prompt routing for interactive remote commands
//! - Investigation flags and post-execution analysis
//!
//! Architecture:
//! - Engine: synchronous handlers over all session state, returning effects
//! - Driver: single event loop performing effects through collaborators
//! - collaborators: traits for the REST API, terminal socket, event bus and front end

mod analysis;
mod bus;
mod collaborators;
mod driver;
mod engine;
mod error;
mod flags;
mod prompt;
mod proposal;
mod terminal;
mod transcript;

pub use analysis::{PostExecutionAnalyzer, truncate};
pub use bus::BroadcastBus;
pub use collaborators::{
    BusEvent, ByteStream, ChatApi, ChatApiRef, EngineObserver, EventBus, EventBusRef,
    TerminalChannel, TerminalConnector, TerminalConnectorRef,
};
pub use driver::{Driver, DriverHandle};
pub use engine::{Effect, Engine, EngineEvent, OperatorAction, RequestId};
pub use error::{CollaboratorError, Rejected};
pub use flags::{FlagHandler, escalation_message};
pub use prompt::{InputAffordance, confirm_answer, route, route_hint};
pub use proposal::ProposalController;
pub use terminal::{CloseReason, Closure, TerminalReaction, TerminalSession};
pub use transcript::Transcript;
