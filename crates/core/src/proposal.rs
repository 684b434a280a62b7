use serde::{Deserialize, Serialize};

/// A command the assistant proposes to run, waiting for operator approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub command: String,
    #[serde(default)]
    pub reason: String,
}

impl Proposal {
    pub fn new(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            reason: reason.into(),
        }
    }
}
