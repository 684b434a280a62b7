//! Terminal Session Client - state machine
//!
//! ```text
//! idle ──accept──▶ preparing ──prepared──▶ connecting ──opened──▶ running ◀──input── awaiting_input
//!   ▲                 │ failed                 │ error               │ done/error/timeout/drop   ▲
//!   └─────────────────┘                        ▼                     ▼                           │
//!                                            closed ◀────────────────┴──────────── prompt ───────┘
//! ```
//!
//! Exactly one session exists at a time. Every transition is keyed by the
//! session id it was started with; a stale id is ignored. The line buffer is
//! flushed at most once per session, on the transition into `closed`.

use sentinel_core::{InputKind, SessionId, TerminalMessage, TerminalOutbound, TerminalPhase, TerminalSessionState};
use tracing::{debug, info, warn};

use crate::error::Rejected;

/// Why a session reached `closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Remote process finished (`done`).
    Completed { exit_code: Option<i32> },
    /// Remote side reported an `error` message.
    RemoteError,
    /// The socket failed.
    SocketError,
    /// The safety ceiling elapsed.
    TimedOut,
    /// The socket closed without a terminal message.
    Dropped,
}

/// Result of closing a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closure {
    pub session: SessionId,
    pub command: String,
    pub reason: CloseReason,
    /// Buffered output handed to the transcript, if it was flushed.
    pub flushed: Option<String>,
}

/// What an inbound message did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalReaction {
    Ignored,
    Output,
    PromptDetected(InputKind),
    Closed(Closure),
}

#[derive(Debug, Default)]
pub struct TerminalSession {
    state: TerminalSessionState,
    current: Option<SessionId>,
    issued: u64,
}

impl TerminalSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &TerminalSessionState {
        &self.state
    }

    pub fn phase(&self) -> TerminalPhase {
        self.state.phase
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.current
    }

    /// idle/closed → preparing
    pub fn begin(&mut self, command: &str) -> Result<SessionId, Rejected> {
        if self.state.phase.is_active() {
            return Err(Rejected::TerminalBusy {
                phase: self.state.phase,
            });
        }
        self.issued += 1;
        let session = SessionId(self.issued);
        self.current = Some(session);
        self.state = TerminalSessionState {
            phase: TerminalPhase::Preparing,
            command_id: None,
            pending_command: command.to_string(),
            lines: Vec::new(),
            input_kind: InputKind::None,
        };
        info!(%session, command, "terminal session preparing");
        Ok(session)
    }

    /// preparing → connecting
    pub fn prepared(&mut self, session: SessionId, command_id: &str) -> bool {
        if !self.is_current(session, &[TerminalPhase::Preparing]) {
            return false;
        }
        self.state.command_id = Some(command_id.to_string());
        self.transition(TerminalPhase::Connecting);
        true
    }

    /// preparing → idle
    pub fn prepare_failed(&mut self, session: SessionId) -> bool {
        if !self.is_current(session, &[TerminalPhase::Preparing]) {
            return false;
        }
        self.state = TerminalSessionState::default();
        self.current = None;
        true
    }

    /// connecting → running
    pub fn opened(&mut self, session: SessionId) -> bool {
        if !self.is_current(session, &[TerminalPhase::Connecting]) {
            return false;
        }
        self.transition(TerminalPhase::Running);
        true
    }

    pub fn handle_message(&mut self, session: SessionId, message: TerminalMessage) -> TerminalReaction {
        if !self.is_current(session, &[TerminalPhase::Running, TerminalPhase::AwaitingInput]) {
            debug!(%session, "ignoring message for inactive session");
            return TerminalReaction::Ignored;
        }

        match message {
            TerminalMessage::SessionCreated { session_id } => {
                debug!(%session, remote = ?session_id, "remote session created");
                TerminalReaction::Ignored
            }
            TerminalMessage::Output { data, prompt_hint } => {
                self.append_output(&data);
                let kind = InputKind::from_hint(prompt_hint.as_deref());
                if kind.is_pending() {
                    self.state.input_kind = kind;
                    self.transition(TerminalPhase::AwaitingInput);
                    TerminalReaction::PromptDetected(kind)
                } else {
                    TerminalReaction::Output
                }
            }
            TerminalMessage::Done { exit_code } => {
                self.state.input_kind = InputKind::None;
                TerminalReaction::Closed(self.close(CloseReason::Completed { exit_code }))
            }
            TerminalMessage::Error { message } => {
                self.state.input_kind = InputKind::None;
                self.state.lines.push(format!("[error] {}", message));
                TerminalReaction::Closed(self.close(CloseReason::RemoteError))
            }
            TerminalMessage::Unknown => TerminalReaction::Ignored,
        }
    }

    /// Socket failure while connecting or attached.
    pub fn socket_error(&mut self, session: SessionId, message: &str) -> Option<Closure> {
        if !self.is_live(session) {
            return None;
        }
        self.state.lines.push(format!("[connection error] {}", message));
        Some(self.close(CloseReason::SocketError))
    }

    pub fn timed_out(&mut self, session: SessionId, ceiling_secs: u64) -> Option<Closure> {
        if !self.is_live(session) {
            return None;
        }
        warn!(%session, ceiling_secs, "terminal session hit safety timeout");
        self.state
            .lines
            .push(format!("[session closed: exceeded {}s safety limit]", ceiling_secs));
        Some(self.close(CloseReason::TimedOut))
    }

    /// The socket closed with no `done`/`error` message first.
    pub fn socket_closed(&mut self, session: SessionId) -> Option<Closure> {
        if !self.is_live(session) {
            return None;
        }
        Some(self.close(CloseReason::Dropped))
    }

    /// Operator text for the remote process. Resumes `running`.
    pub fn submit_input(&mut self, text: &str) -> Result<(SessionId, TerminalOutbound), Rejected> {
        let session = self.attached_session()?;
        if text.is_empty() {
            return Err(Rejected::EmptyInput);
        }
        self.state.input_kind = InputKind::None;
        if self.state.phase == TerminalPhase::AwaitingInput {
            self.transition(TerminalPhase::Running);
        }
        Ok((session, TerminalOutbound::input(text)))
    }

    pub fn interrupt(&mut self) -> Result<(SessionId, TerminalOutbound), Rejected> {
        let session = self.attached_session()?;
        Ok((session, TerminalOutbound::interrupt()))
    }

    /// Forget everything; used by the full reset. Returns the session that was live, if any.
    pub fn reset(&mut self) -> Option<SessionId> {
        let live = self.current.filter(|_| self.state.phase.is_active());
        self.state = TerminalSessionState::default();
        self.current = None;
        live
    }

    fn attached_session(&self) -> Result<SessionId, Rejected> {
        match self.current {
            Some(session) if self.state.phase.accepts_input() => Ok(session),
            _ => Err(Rejected::NotAcceptingInput {
                phase: self.state.phase,
            }),
        }
    }

    fn append_output(&mut self, data: &str) {
        for (index, fragment) in data.split('\n').enumerate() {
            let fragment = fragment.strip_suffix('\r').unwrap_or(fragment);
            // A leading empty fragment is only noise before any output exists.
            if index == 0 && fragment.is_empty() && self.state.lines.is_empty() {
                continue;
            }
            self.state.lines.push(fragment.to_string());
        }
    }

    fn close(&mut self, reason: CloseReason) -> Closure {
        let session = self.current.unwrap_or(SessionId(self.issued));
        let flushed = if !self.state.lines.is_empty() && !self.state.input_kind.is_pending() {
            let content = self.state.lines.join("\n");
            self.state.lines.clear();
            Some(content)
        } else {
            if !self.state.lines.is_empty() {
                debug!(%session, "closing while input pending; output not flushed");
            }
            None
        };
        self.state.input_kind = InputKind::None;
        self.transition(TerminalPhase::Closed);
        info!(%session, ?reason, "terminal session closed");
        Closure {
            session,
            command: self.state.pending_command.clone(),
            reason,
            flushed,
        }
    }

    fn is_live(&self, session: SessionId) -> bool {
        self.is_current(
            session,
            &[
                TerminalPhase::Connecting,
                TerminalPhase::Running,
                TerminalPhase::AwaitingInput,
            ],
        )
    }

    fn is_current(&self, session: SessionId, phases: &[TerminalPhase]) -> bool {
        self.current == Some(session) && phases.contains(&self.state.phase)
    }

    fn transition(&mut self, next: TerminalPhase) {
        debug!(from = %self.state.phase, to = %next, "terminal phase");
        self.state.phase = next;
    }
}
