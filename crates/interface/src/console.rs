//! Line-oriented console front end.
//!
//! Plain lines go to the chat, or to the remote process while the terminal is
//! attached. Slash commands drive proposals, prompts and flags.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sentinel_core::{EntryId, InvestigationFlag, Role, SentinelConfig, TerminalPhase};
use sentinel_runtime::{
    BroadcastBus, BusEvent, ChatApiRef, Driver, Engine, EngineObserver, EventBus, InputAffordance,
    OperatorAction, TerminalConnectorRef,
};

use crate::http::HttpChatApi;
use crate::input_handler::{LineInput, MaskedInput, read_input};
use crate::socket::WsTerminalConnector;

pub const CONSOLE_HELP: &str = "\
Commands:
  <text>      send a chat message (or terminal input while a command runs)
  /run        execute the pending proposal
  /reject     discard the pending proposal
  /y, /n      answer a confirmation prompt
  /int        interrupt the running command
  /escalate   send the held investigation flag to the chat
  /defer      return the held flag to the pending queue
  /dismiss    dismiss the held flag
  /clear      clear the conversation
  /help       show this help
  /quit       exit";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Action(OperatorAction),
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_console_line(line: &str) -> ConsoleCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ConsoleCommand::Empty;
    }
    if !trimmed.starts_with('/') {
        return ConsoleCommand::Action(OperatorAction::Line(trimmed.to_string()));
    }

    let action = match trimmed {
        "/run" | "/accept" => OperatorAction::AcceptProposal,
        "/reject" => OperatorAction::RejectProposal,
        "/y" | "/yes" => OperatorAction::Confirm(true),
        "/n" | "/no" => OperatorAction::Confirm(false),
        "/int" | "/interrupt" => OperatorAction::Interrupt,
        "/escalate" => OperatorAction::Escalate,
        "/defer" => OperatorAction::Defer,
        "/dismiss" => OperatorAction::Dismiss,
        "/clear" => OperatorAction::Clear,
        "/help" | "/?" => return ConsoleCommand::Help,
        "/quit" | "/exit" => return ConsoleCommand::Quit,
        other => return ConsoleCommand::Unknown(other.to_string()),
    };
    ConsoleCommand::Action(action)
}

/// Prints only what changed since the previous render.
pub struct ConsoleObserver<W: Write + Send> {
    out: W,
    last_entry: Option<EntryId>,
    last_entry_len: usize,
    open_line: bool,
    had_entries: bool,
    phase: TerminalPhase,
    terminal_lines: usize,
    proposal: Option<String>,
    flag: Option<String>,
    status: Option<String>,
    masked: MaskedInput,
}

impl<W: Write + Send> ConsoleObserver<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_entry: None,
            last_entry_len: 0,
            open_line: false,
            had_entries: false,
            phase: TerminalPhase::Idle,
            terminal_lines: 0,
            proposal: None,
            flag: None,
            status: None,
            masked: MaskedInput::default(),
        }
    }

    /// Share the password-entry switch with the input reader.
    pub fn with_masked_input(mut self, masked: MaskedInput) -> Self {
        self.masked = masked;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            debug!(error = %e, "console write failed");
        }
    }

    fn line(&mut self, text: &str) {
        if self.open_line {
            self.emit("\n");
            self.open_line = false;
        }
        self.emit(text);
        self.emit("\n");
    }

    fn render_transcript(&mut self, engine: &Engine) {
        let entries = engine.transcript().entries();
        if entries.is_empty() {
            if self.had_entries {
                self.line("-- conversation cleared --");
                self.had_entries = false;
            }
            return;
        }
        self.had_entries = true;

        for entry in entries {
            match self.last_entry {
                Some(last) if entry.id < last => continue,
                Some(last) if entry.id == last => {
                    if entry.content.len() > self.last_entry_len {
                        let delta = entry.content[self.last_entry_len..].to_string();
                        self.emit(&delta);
                        self.last_entry_len = entry.content.len();
                    }
                }
                _ => {
                    if self.open_line {
                        self.emit("\n");
                    }
                    match entry.role {
                        // Terminal output was already echoed live.
                        Role::Terminal => {
                            let count = entry.content.lines().count();
                            self.emit(&format!("terminal> output recorded ({} lines)", count));
                        }
                        // Echoed as typed.
                        Role::User => {}
                        role => self.emit(&format!("{}> {}", role.label(), entry.content)),
                    }
                    self.open_line = entry.role != Role::User;
                    self.last_entry = Some(entry.id);
                    self.last_entry_len = entry.content.len();
                }
            }
        }

        // Anything but the streaming answer is complete.
        if self.open_line && engine.transcript().streaming_entry() != self.last_entry {
            self.emit("\n");
            self.open_line = false;
        }
    }

    fn render_terminal(&mut self, engine: &Engine) {
        let state = engine.terminal();
        if state.phase != self.phase {
            if state.phase == TerminalPhase::Preparing {
                self.terminal_lines = 0;
            }
            if state.phase != TerminalPhase::Idle {
                self.line(&format!("[terminal {}] {}", state.phase, state.pending_command));
            }
            self.phase = state.phase;
        }
        if state.lines.len() < self.terminal_lines {
            self.terminal_lines = 0;
        }
        let fresh: Vec<String> = state.lines[self.terminal_lines..]
            .iter()
            .map(|line| format!("  | {}", line))
            .collect();
        for line in fresh {
            self.line(&line);
        }
        self.terminal_lines = state.lines.len();
    }

    fn render_proposal(&mut self, engine: &Engine) {
        let current = engine.proposal().map(|p| p.command.clone());
        if current == self.proposal {
            return;
        }
        if let Some(proposal) = engine.proposal() {
            let reason = if proposal.reason.is_empty() {
                String::new()
            } else {
                format!(" ({})", proposal.reason)
            };
            let text = format!(
                "proposal> {}{}\n           /run to execute, /reject to discard",
                proposal.command, reason
            );
            self.line(&text);
        }
        self.proposal = current;
    }

    fn render_flag(&mut self, engine: &Engine) {
        let current = engine.flag().map(|f| f.id.clone());
        if current == self.flag {
            return;
        }
        if let Some(flag) = engine.flag() {
            let text = format!(
                "flag> [{}] {} (#{})\n       /escalate, /defer or /dismiss",
                flag.severity, flag.summary, flag.id
            );
            self.line(&text);
        }
        self.flag = current;
    }

    fn render_status(&mut self, engine: &Engine) {
        let current = engine.status().map(str::to_string);
        if current == self.status {
            return;
        }
        if let Some(status) = &current {
            let text = format!("... {}", status);
            self.line(&text);
        }
        self.status = current;
    }
}

impl<W: Write + Send> EngineObserver for ConsoleObserver<W> {
    fn render(&mut self, engine: &Engine) {
        if !engine.input_affordance().is_masked() {
            self.masked.disarm();
        }
        self.render_status(engine);
        self.render_transcript(engine);
        self.render_terminal(engine);
        self.render_proposal(engine);
        self.render_flag(engine);
    }

    fn request_focus(&mut self, affordance: InputAffordance) {
        if affordance.is_masked() {
            self.masked.arm();
        }
        let hint = match affordance {
            InputAffordance::Masked => "input> the command is asking for a password (input hidden)",
            InputAffordance::YesNo => "input> the command is asking for confirmation; answer /y or /n",
            InputAffordance::Plain => "input> the command is waiting for input",
        };
        self.line(hint);
    }
}

/// Read a flag handed over by the parent application as JSON.
pub fn load_flag(path: &Path) -> Result<InvestigationFlag> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read flag file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid flag file {}", path.display()))
}

/// Interactive session over stdin/stdout until `/quit` or end of input.
pub async fn run_console(config: &SentinelConfig, flag_file: Option<&Path>) -> Result<()> {
    let api: ChatApiRef = Arc::new(HttpChatApi::new(&config.server)?);
    let connector: TerminalConnectorRef = Arc::new(WsTerminalConnector::new(&config.server)?);
    let bus = Arc::new(BroadcastBus::default());

    let masked = MaskedInput::default();
    let observer = ConsoleObserver::new(std::io::stdout()).with_masked_input(masked.clone());
    let driver = Driver::new(config, api, connector, bus.clone(), observer);
    let handle = driver.handle();
    let running = tokio::spawn(driver.run());

    println!("Connected to {} (type /help for commands)", config.server.base_url);
    if let Some(path) = flag_file {
        let flag = load_flag(path)?;
        info!(flag_id = %flag.id, "investigating flag from file");
        bus.publish(BusEvent::InvestigateFlag(flag));
    }

    let (input_tx, mut input_rx) = mpsc::unbounded_channel();
    let reader = tokio::task::spawn_blocking(move || read_input(masked, input_tx));

    while let Some(input) = input_rx.recv().await {
        let command = match input {
            LineInput::Secret(secret) => ConsoleCommand::Action(OperatorAction::SubmitInput(secret)),
            LineInput::Line(line) => parse_console_line(&line),
            LineInput::Eof => break,
        };
        match command {
            ConsoleCommand::Action(action) => {
                if !handle.operator(action) {
                    break;
                }
            }
            ConsoleCommand::Help => println!("{}", CONSOLE_HELP),
            ConsoleCommand::Quit => break,
            ConsoleCommand::Empty => {}
            ConsoleCommand::Unknown(command) => {
                println!("Unknown command: {} (type /help)", command);
            }
        }
    }

    drop(input_rx);
    if let Err(e) = reader.await {
        warn!(error = %e, "input reader failed");
    }
    handle.shutdown();
    let engine = running.await?;
    debug!(entries = engine.transcript().len(), "console session ended");
    Ok(())
}
