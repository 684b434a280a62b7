//! Session engine
//!
//! Owns all mutable session state: transcript, proposal, terminal session,
//! investigation flag and the chat busy marker. Every input arrives as an
//! [`EngineEvent`]; every handler runs to completion and answers with the
//! [`Effect`]s the driver must perform. Nothing in here awaits.

use sentinel_core::{
    ChatEvent, InputKind, InvestigationFlag, Proposal, Role, SentinelConfig, SessionId, SseFrame,
    TerminalMessage, TerminalOutbound, TerminalPhase, TerminalSessionState,
};
use tracing::{debug, info, warn};

use crate::analysis::PostExecutionAnalyzer;
use crate::collaborators::BusEvent;
use crate::error::Rejected;
use crate::flags::FlagHandler;
use crate::prompt::{InputAffordance, confirm_answer, route};
use crate::proposal::ProposalController;
use crate::terminal::{CloseReason, Closure, TerminalReaction, TerminalSession};
use crate::transcript::Transcript;

/// Identifies one chat request; frames from an older request are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "request-{}", self.0)
    }
}

/// Something the operator did in the front end.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorAction {
    /// Send a chat message.
    Send(String),
    /// A submitted line: terminal input while the terminal accepts it, chat otherwise.
    Line(String),
    AcceptProposal,
    RejectProposal,
    SubmitInput(String),
    /// Answer a confirm prompt.
    Confirm(bool),
    Interrupt,
    Clear,
    Escalate,
    Defer,
    Dismiss,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Operator(OperatorAction),

    ChatFrame { request: RequestId, frame: SseFrame },
    ChatFinished { request: RequestId },
    ChatFailed { request: RequestId, message: String },

    HistoryCleared,
    ClearFailed { message: String },

    TerminalPrepared { session: SessionId, command_id: String },
    PrepareFailed { session: SessionId, message: String },
    TerminalOpened { session: SessionId },
    TerminalConnectFailed { session: SessionId, message: String },
    TerminalFrame { session: SessionId, text: String },
    TerminalSocketError { session: SessionId, message: String },
    TerminalTimedOut { session: SessionId },
    TerminalClosed { session: SessionId },

    FlagRaised(InvestigationFlag),

    /// UI teardown.
    Shutdown,
}

/// I/O the driver performs on the engine's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StartChat { request: RequestId, message: String },
    ClearHistory,
    PrepareTerminal { session: SessionId, command: String },
    OpenTerminal { session: SessionId, command_id: String },
    SendTerminal { session: SessionId, message: TerminalOutbound },
    CloseTerminal { session: SessionId },
    DismissFlag { flag_id: String },
    PublishBus(BusEvent),
    FocusInput(InputAffordance),
}

#[derive(Debug)]
pub struct Engine {
    transcript: Transcript,
    proposals: ProposalController,
    terminal: TerminalSession,
    flags: FlagHandler,
    analyzer: PostExecutionAnalyzer,
    safety_timeout_secs: u64,
    chat_in_flight: Option<RequestId>,
    next_request: u64,
    status: Option<String>,
}

impl Engine {
    pub fn new(config: &SentinelConfig) -> Self {
        Self {
            transcript: Transcript::new(),
            proposals: ProposalController::new(),
            terminal: TerminalSession::new(),
            flags: FlagHandler::new(),
            analyzer: PostExecutionAnalyzer::new(config.analysis.clone()),
            safety_timeout_secs: config.terminal.safety_timeout_secs,
            chat_in_flight: None,
            next_request: 0,
            status: None,
        }
    }

    // ===== Snapshot accessors =====

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn proposal(&self) -> Option<&Proposal> {
        self.proposals.current()
    }

    pub fn terminal(&self) -> &TerminalSessionState {
        self.terminal.state()
    }

    pub fn phase(&self) -> TerminalPhase {
        self.terminal.phase()
    }

    pub fn flag(&self) -> Option<&InvestigationFlag> {
        self.flags.held()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn is_chat_busy(&self) -> bool {
        self.chat_in_flight.is_some()
    }

    /// Affordance the input line should offer right now.
    pub fn input_affordance(&self) -> InputAffordance {
        route(self.terminal.state().input_kind)
    }

    // ===== Dispatch =====

    /// Run one event to completion. Rejected operator actions change nothing.
    pub fn handle(&mut self, event: EngineEvent) -> Vec<Effect> {
        match event {
            EngineEvent::Operator(action) => match self.apply(action) {
                Ok(effects) => effects,
                Err(rejected) => {
                    debug!(%rejected, "operator action rejected");
                    Vec::new()
                }
            },
            EngineEvent::ChatFrame { request, frame } => self.on_chat_frame(request, &frame),
            EngineEvent::ChatFinished { request } => {
                if self.is_current_request(request) {
                    self.finish_chat();
                }
                Vec::new()
            }
            EngineEvent::ChatFailed { request, message } => {
                if self.is_current_request(request) {
                    self.finish_chat();
                    self.notice(format!("Chat request failed: {}", message));
                }
                Vec::new()
            }
            EngineEvent::HistoryCleared => self.clear(),
            EngineEvent::ClearFailed { message } => {
                self.notice(format!("Failed to clear history: {}", message));
                Vec::new()
            }
            EngineEvent::TerminalPrepared {
                session,
                command_id,
            } => {
                if self.terminal.prepared(session, &command_id) {
                    vec![Effect::OpenTerminal {
                        session,
                        command_id,
                    }]
                } else {
                    debug!(%session, "stale prepare result");
                    Vec::new()
                }
            }
            EngineEvent::PrepareFailed { session, message } => {
                if self.terminal.prepare_failed(session) {
                    self.notice(format!("Failed to prepare command: {}", message));
                }
                Vec::new()
            }
            EngineEvent::TerminalOpened { session } => {
                if !self.terminal.opened(session) {
                    // The session was cleared while the socket opened.
                    return vec![Effect::CloseTerminal { session }];
                }
                Vec::new()
            }
            EngineEvent::TerminalConnectFailed { session, message }
            | EngineEvent::TerminalSocketError { session, message } => {
                let closure = self.terminal.socket_error(session, &message);
                self.after_close(closure)
            }
            EngineEvent::TerminalFrame { session, text } => self.on_terminal_frame(session, &text),
            EngineEvent::TerminalTimedOut { session } => {
                let closure = self.terminal.timed_out(session, self.safety_timeout_secs);
                self.after_close(closure)
            }
            EngineEvent::TerminalClosed { session } => {
                let closure = self.terminal.socket_closed(session);
                self.after_close(closure)
            }
            EngineEvent::FlagRaised(flag) => match self.flags.raise(flag) {
                Some(superseded) => vec![Effect::PublishBus(BusEvent::ReturnToPending(superseded))],
                None => Vec::new(),
            },
            EngineEvent::Shutdown => self.live_session().map_or_else(Vec::new, |session| {
                vec![Effect::CloseTerminal { session }]
            }),
        }
    }

    /// Apply an operator action, reporting precondition violations.
    pub fn apply(&mut self, action: OperatorAction) -> Result<Vec<Effect>, Rejected> {
        match action {
            OperatorAction::Send(text) => self.send(&text),
            OperatorAction::Line(text) => {
                if self.terminal.phase().accepts_input() {
                    self.submit_input(&text)
                } else {
                    self.send(&text)
                }
            }
            OperatorAction::AcceptProposal => self.accept(),
            OperatorAction::RejectProposal => {
                self.proposals.reject().ok_or(Rejected::NoProposal)?;
                Ok(Vec::new())
            }
            OperatorAction::SubmitInput(text) => self.submit_input(&text),
            OperatorAction::Confirm(yes) => {
                if self.terminal.state().input_kind != InputKind::Confirm {
                    return Err(Rejected::NoConfirmPending);
                }
                self.submit_input(confirm_answer(yes))
            }
            OperatorAction::Interrupt => {
                let (session, message) = self.terminal.interrupt()?;
                Ok(vec![Effect::SendTerminal { session, message }])
            }
            OperatorAction::Clear => Ok(vec![Effect::ClearHistory]),
            OperatorAction::Escalate => {
                if self.flags.held().is_none() {
                    return Err(Rejected::NoFlag);
                }
                self.check_can_send()?;
                let (_, message) = self.flags.escalate()?;
                self.send(&message)
            }
            OperatorAction::Defer => {
                let flag = self.flags.defer()?;
                Ok(vec![Effect::PublishBus(BusEvent::ReturnToPending(flag))])
            }
            OperatorAction::Dismiss => {
                let flag = self.flags.dismiss()?;
                Ok(vec![Effect::DismissFlag { flag_id: flag.id }])
            }
        }
    }

    /// Full local reset. Returns a close effect when a session was live.
    pub fn clear(&mut self) -> Vec<Effect> {
        self.transcript.clear();
        self.proposals.clear();
        self.flags.clear();
        self.chat_in_flight = None;
        self.status = None;
        let live = self.terminal.reset();
        info!("session state cleared");
        live.map_or_else(Vec::new, |session| vec![Effect::CloseTerminal { session }])
    }

    // ===== Chat =====

    fn send(&mut self, text: &str) -> Result<Vec<Effect>, Rejected> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Rejected::EmptyMessage);
        }
        self.check_can_send()?;
        self.transcript.seal_streaming();
        self.transcript.append(Role::User, text);
        Ok(vec![self.start_request(text.to_string())])
    }

    fn check_can_send(&self) -> Result<(), Rejected> {
        if self.chat_in_flight.is_some() {
            return Err(Rejected::ChatBusy);
        }
        let phase = self.terminal.phase();
        if phase.is_active() {
            return Err(Rejected::TerminalBusy { phase });
        }
        Ok(())
    }

    fn start_request(&mut self, message: String) -> Effect {
        self.next_request += 1;
        let request = RequestId(self.next_request);
        self.chat_in_flight = Some(request);
        self.status = None;
        debug!(%request, "chat request started");
        Effect::StartChat { request, message }
    }

    fn finish_chat(&mut self) {
        self.transcript.seal_streaming();
        self.chat_in_flight = None;
        self.status = None;
    }

    fn is_current_request(&self, request: RequestId) -> bool {
        self.chat_in_flight == Some(request)
    }

    fn on_chat_frame(&mut self, request: RequestId, frame: &SseFrame) -> Vec<Effect> {
        if !self.is_current_request(request) {
            debug!(%request, "dropping frame from stale request");
            return Vec::new();
        }
        let event = match ChatEvent::from_frame(frame) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, event_type = %frame.event_type, "dropping chat frame");
                return Vec::new();
            }
        };

        match event {
            ChatEvent::Status { text } => {
                self.status = (!text.is_empty()).then_some(text);
            }
            ChatEvent::Text { content } => {
                self.transcript.append_or_extend_streaming(&content);
            }
            ChatEvent::Proposal { command, reason } => {
                self.proposals.propose(command, reason);
            }
            ChatEvent::Error { message } => {
                self.finish_chat();
                self.notice(format!("Error: {}", message));
            }
            ChatEvent::Done => self.finish_chat(),
            ChatEvent::Unknown => {}
        }
        Vec::new()
    }

    fn notice(&mut self, message: String) {
        warn!(%message, "notice");
        self.transcript.seal_streaming();
        self.transcript.append(Role::Notice, message);
    }

    // ===== Terminal =====

    fn accept(&mut self) -> Result<Vec<Effect>, Rejected> {
        if self.proposals.current().is_none() {
            return Err(Rejected::NoProposal);
        }
        let phase = self.terminal.phase();
        if phase.is_active() {
            return Err(Rejected::TerminalBusy { phase });
        }
        if self.chat_in_flight.is_some() {
            return Err(Rejected::ChatBusy);
        }
        let proposal = self.proposals.take().ok_or(Rejected::NoProposal)?;
        let session = self.terminal.begin(&proposal.command)?;
        Ok(vec![Effect::PrepareTerminal {
            session,
            command: proposal.command,
        }])
    }

    fn submit_input(&mut self, text: &str) -> Result<Vec<Effect>, Rejected> {
        let (session, message) = self.terminal.submit_input(text)?;
        Ok(vec![Effect::SendTerminal { session, message }])
    }

    fn on_terminal_frame(&mut self, session: SessionId, text: &str) -> Vec<Effect> {
        let message = match TerminalMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(%session, error = %e, "dropping terminal frame");
                return Vec::new();
            }
        };
        match self.terminal.handle_message(session, message) {
            TerminalReaction::PromptDetected(kind) => vec![Effect::FocusInput(route(kind))],
            TerminalReaction::Closed(closure) => self.after_close(Some(closure)),
            TerminalReaction::Output | TerminalReaction::Ignored => Vec::new(),
        }
    }

    fn after_close(&mut self, closure: Option<Closure>) -> Vec<Effect> {
        let Some(closure) = closure else {
            return Vec::new();
        };
        let mut effects = vec![Effect::CloseTerminal {
            session: closure.session,
        }];

        let Some(output) = closure.flushed else {
            return effects;
        };
        self.transcript.seal_streaming();
        self.transcript.append(Role::Terminal, output.as_str());

        // Only a normal completion is analyzed.
        if let CloseReason::Completed { exit_code } = closure.reason
            && let Some(request) = self.analyzer.request_for(&closure.command, exit_code, &output)
        {
            if self.chat_in_flight.is_some() {
                warn!(session = %closure.session, "chat busy; skipping analysis");
            } else {
                effects.push(self.start_request(request));
            }
        }
        effects
    }

    fn live_session(&self) -> Option<SessionId> {
        self.terminal
            .current_session()
            .filter(|_| self.terminal.phase().is_active())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(&SentinelConfig::default())
    }
}
