//! Runtime errors
//!
//! `Rejected` is a precondition violation: the operation was a disabled
//! affordance and nothing changed. `CollaboratorError` is a transport failure
//! reported by one of the external collaborators.

use thiserror::Error;

use sentinel_core::TerminalPhase;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejected {
    #[error("no proposal is pending")]
    NoProposal,

    #[error("a terminal session is already {phase}")]
    TerminalBusy { phase: TerminalPhase },

    #[error("a chat request is already in flight")]
    ChatBusy,

    #[error("message is empty")]
    EmptyMessage,

    #[error("input is empty")]
    EmptyInput,

    #[error("terminal is not accepting input ({phase})")]
    NotAcceptingInput { phase: TerminalPhase },

    #[error("no confirmation prompt is pending")]
    NoConfirmPending,

    #[error("no investigation flag is held")]
    NoFlag,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("request failed: {message}")]
    Transport { message: String },

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response: {message}")]
    Protocol { message: String },

    #[error("socket error: {message}")]
    Socket { message: String },
}

impl CollaboratorError {
    pub fn transport(message: impl Into<String>) -> Self {
        CollaboratorError::Transport {
            message: message.into(),
        }
    }

    pub fn socket(message: impl Into<String>) -> Self {
        CollaboratorError::Socket {
            message: message.into(),
        }
    }
}
