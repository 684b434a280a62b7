//! Proposal Controller
//!
//! Holds at most one pending command proposal. A newer proposal silently
//! supersedes an unacted one. Acceptance is gated by the engine, which knows
//! whether a terminal session is active.

use sentinel_core::Proposal;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ProposalController {
    current: Option<Proposal>,
}

impl ProposalController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any pending proposal; returns the superseded one.
    pub fn propose(&mut self, command: impl Into<String>, reason: impl Into<String>) -> Option<Proposal> {
        let next = Proposal::new(command, reason);
        debug!(command = %next.command, "proposal received");
        let previous = self.current.replace(next);
        if let Some(ref old) = previous {
            debug!(command = %old.command, "proposal superseded");
        }
        previous
    }

    pub fn current(&self) -> Option<&Proposal> {
        self.current.as_ref()
    }

    /// Hand the proposal over for execution.
    pub(crate) fn take(&mut self) -> Option<Proposal> {
        self.current.take()
    }

    /// Discard the proposal. No other side effect.
    pub fn reject(&mut self) -> Option<Proposal> {
        self.current.take()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}
