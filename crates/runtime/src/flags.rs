//! Investigation Flag Handler
//!
//! Holds at most one flag raised on the bus. Each held flag is consumed by
//! exactly one of escalate, defer or dismiss.

use sentinel_core::InvestigationFlag;
use tracing::{debug, info};

use crate::error::Rejected;

#[derive(Debug, Default)]
pub struct FlagHandler {
    held: Option<InvestigationFlag>,
}

impl FlagHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn held(&self) -> Option<&InvestigationFlag> {
        self.held.as_ref()
    }

    /// Hold a newly raised flag; returns the one it displaced.
    pub fn raise(&mut self, flag: InvestigationFlag) -> Option<InvestigationFlag> {
        info!(flag_id = %flag.id, severity = %flag.severity, "investigation flag raised");
        let previous = self.held.replace(flag);
        if let Some(ref old) = previous {
            debug!(flag_id = %old.id, "flag superseded");
        }
        previous
    }

    /// Consume the flag and build the chat message that escalates it.
    pub fn escalate(&mut self) -> Result<(InvestigationFlag, String), Rejected> {
        let flag = self.held.take().ok_or(Rejected::NoFlag)?;
        let message = escalation_message(&flag);
        info!(flag_id = %flag.id, "flag escalated to chat");
        Ok((flag, message))
    }

    pub fn defer(&mut self) -> Result<InvestigationFlag, Rejected> {
        let flag = self.held.take().ok_or(Rejected::NoFlag)?;
        info!(flag_id = %flag.id, "flag deferred");
        Ok(flag)
    }

    /// Released locally whatever the dismiss request's outcome.
    pub fn dismiss(&mut self) -> Result<InvestigationFlag, Rejected> {
        let flag = self.held.take().ok_or(Rejected::NoFlag)?;
        info!(flag_id = %flag.id, "flag dismissed");
        Ok(flag)
    }

    pub fn clear(&mut self) -> Option<InvestigationFlag> {
        self.held.take()
    }
}

pub fn escalation_message(flag: &InvestigationFlag) -> String {
    let mut message = format!(
        "Investigate this flagged activity.\n\nSeverity: {}\nTimestamp: {}\nSummary: {}\nRelated events: {}",
        flag.severity,
        if flag.timestamp.is_empty() { "unknown" } else { &flag.timestamp },
        flag.summary,
        flag.related_event_ids.len(),
    );
    if !flag.suggested_actions.is_empty() {
        message.push_str("\n\nSuggested actions:");
        for action in &flag.suggested_actions {
            message.push_str("\n- ");
            message.push_str(action);
        }
    }
    message
}
