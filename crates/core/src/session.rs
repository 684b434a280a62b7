//! Terminal session state
//!
//! The phase enum is the single source of truth for what the front end shows:
//! whether the terminal panel is visible, and which input affordance is live.

use serde::{Deserialize, Serialize};

/// Identifies one terminal session lifecycle. Events tagged with an older id are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalPhase {
    #[default]
    Idle,
    Preparing,
    Connecting,
    Running,
    AwaitingInput,
    Closed,
}

impl TerminalPhase {
    /// A session is in flight; a new one may not start.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TerminalPhase::Preparing
                | TerminalPhase::Connecting
                | TerminalPhase::Running
                | TerminalPhase::AwaitingInput
        )
    }

    /// The remote process is attached and can receive operator input.
    pub fn accepts_input(&self) -> bool {
        matches!(self, TerminalPhase::Running | TerminalPhase::AwaitingInput)
    }

    pub fn is_panel_visible(&self) -> bool {
        !matches!(self, TerminalPhase::Idle)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalPhase::Idle => "idle",
            TerminalPhase::Preparing => "preparing",
            TerminalPhase::Connecting => "connecting",
            TerminalPhase::Running => "running",
            TerminalPhase::AwaitingInput => "awaiting_input",
            TerminalPhase::Closed => "closed",
        }
    }
}

impl std::fmt::Display for TerminalPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of operator input the remote process is blocked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    None,
    Password,
    Confirm,
}

impl InputKind {
    /// Map an output message's `prompt_hint`. Unknown hints mean no prompt.
    pub fn from_hint(hint: Option<&str>) -> Self {
        match hint.map(str::trim) {
            Some(h) if h.eq_ignore_ascii_case("password") => InputKind::Password,
            Some(h) if h.eq_ignore_ascii_case("confirm") => InputKind::Confirm,
            _ => InputKind::None,
        }
    }

    pub fn is_pending(&self) -> bool {
        !matches!(self, InputKind::None)
    }
}

/// Observable state of the (single) terminal session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerminalSessionState {
    pub phase: TerminalPhase,
    pub command_id: Option<String>,
    pub pending_command: String,
    pub lines: Vec<String>,
    pub input_kind: InputKind,
}

impl TerminalSessionState {
    pub fn is_empty(&self) -> bool {
        self.phase == TerminalPhase::Idle
            && self.command_id.is_none()
            && self.pending_command.is_empty()
            && self.lines.is_empty()
            && self.input_kind == InputKind::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_phases() {
        assert!(!TerminalPhase::Idle.is_active());
        assert!(TerminalPhase::Preparing.is_active());
        assert!(TerminalPhase::Connecting.is_active());
        assert!(TerminalPhase::Running.is_active());
        assert!(TerminalPhase::AwaitingInput.is_active());
        assert!(!TerminalPhase::Closed.is_active());
    }

    #[test]
    fn test_input_kind_from_hint() {
        assert_eq!(InputKind::from_hint(Some("password")), InputKind::Password);
        assert_eq!(InputKind::from_hint(Some("Confirm")), InputKind::Confirm);
        assert_eq!(InputKind::from_hint(Some("otp")), InputKind::None);
        assert_eq!(InputKind::from_hint(None), InputKind::None);
    }

    #[test]
    fn test_default_state_is_empty() {
        let state = TerminalSessionState::default();
        assert!(state.is_empty());
        assert!(!state.phase.is_panel_visible());
    }
}
