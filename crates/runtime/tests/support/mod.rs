//! In-memory collaborators for driving the engine end to end.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use sentinel_core::{InvestigationFlag, Proposal, Role, SentinelConfig, TerminalPhase, TerminalSessionState};
use sentinel_runtime::{
    BroadcastBus, ByteStream, ChatApi, CollaboratorError, Driver, DriverHandle, Engine,
    EngineObserver, InputAffordance, TerminalChannel, TerminalConnector,
};

pub const DONE_FRAME: &str = "data: {\"event\":\"done\"}\n\n";

// ===== Chat API =====

#[derive(Default)]
pub struct MockApi {
    pub chats: Mutex<Vec<String>>,
    pub responses: Mutex<VecDeque<Vec<String>>>,
    pub prepared: Mutex<Vec<String>>,
    pub prepare_error: Mutex<Option<CollaboratorError>>,
    pub dismissed: Mutex<Vec<String>>,
    pub clears: Mutex<usize>,
}

impl MockApi {
    /// Queue the body chunks of the next chat response.
    pub fn script<I, S>(&self, chunks: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.responses
            .lock()
            .unwrap()
            .push_back(chunks.into_iter().map(Into::into).collect());
    }

    pub fn chats(&self) -> Vec<String> {
        self.chats.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatApi for MockApi {
    async fn send_chat(&self, message: &str) -> Result<ByteStream, CollaboratorError> {
        self.chats.lock().unwrap().push(message.to_string());
        let chunks = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![DONE_FRAME.to_string()]);
        Ok(futures::stream::iter(chunks.into_iter().map(|c| Ok(c.into_bytes()))).boxed())
    }

    async fn clear_history(&self) -> Result<(), CollaboratorError> {
        *self.clears.lock().unwrap() += 1;
        Ok(())
    }

    async fn prepare_terminal(&self, command: &str) -> Result<String, CollaboratorError> {
        self.prepared.lock().unwrap().push(command.to_string());
        if let Some(err) = self.prepare_error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(format!("cmd-{}", self.prepared.lock().unwrap().len()))
    }

    async fn dismiss_flag(&self, flag_id: &str) -> Result<(), CollaboratorError> {
        self.dismissed.lock().unwrap().push(flag_id.to_string());
        Err(CollaboratorError::Status {
            status: 500,
            message: "dismiss is best effort".to_string(),
        })
    }
}

// ===== Terminal socket =====

#[derive(Default)]
pub struct SocketLog {
    pub outbound: Vec<String>,
    pub closed: bool,
    pub connected_to: Option<String>,
}

pub type SharedLog = Arc<Mutex<SocketLog>>;

/// Inbound frames are pushed by the test through `ScriptedConnector::inbound`.
pub struct ScriptedConnector {
    inbound: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    pub log: SharedLog,
}

impl ScriptedConnector {
    pub fn new() -> (Self, mpsc::UnboundedSender<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                inbound: Mutex::new(Some(rx)),
                log: SharedLog::default(),
            },
            tx,
        )
    }
}

#[async_trait]
impl TerminalConnector for ScriptedConnector {
    async fn connect(&self, command_id: &str) -> Result<Box<dyn TerminalChannel>, CollaboratorError> {
        let inbound = self
            .inbound
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| CollaboratorError::socket("already connected"))?;
        self.log.lock().unwrap().connected_to = Some(command_id.to_string());
        Ok(Box::new(ScriptedChannel {
            inbound,
            log: self.log.clone(),
        }))
    }
}

struct ScriptedChannel {
    inbound: mpsc::UnboundedReceiver<String>,
    log: SharedLog,
}

#[async_trait]
impl TerminalChannel for ScriptedChannel {
    async fn next_text(&mut self) -> Option<Result<String, CollaboratorError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn send_text(&mut self, text: String) -> Result<(), CollaboratorError> {
        self.log.lock().unwrap().outbound.push(text);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), CollaboratorError> {
        self.log.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Emits one output line per `interval`, forever.
pub struct TickingConnector {
    pub interval: Duration,
    pub log: SharedLog,
}

#[async_trait]
impl TerminalConnector for TickingConnector {
    async fn connect(&self, _command_id: &str) -> Result<Box<dyn TerminalChannel>, CollaboratorError> {
        Ok(Box::new(TickingChannel {
            interval: self.interval,
            log: self.log.clone(),
        }))
    }
}

struct TickingChannel {
    interval: Duration,
    log: SharedLog,
}

#[async_trait]
impl TerminalChannel for TickingChannel {
    async fn next_text(&mut self) -> Option<Result<String, CollaboratorError>> {
        tokio::time::sleep(self.interval).await;
        Some(Ok(r#"{"event":"output","data":"tick"}"#.to_string()))
    }

    async fn send_text(&mut self, text: String) -> Result<(), CollaboratorError> {
        self.log.lock().unwrap().outbound.push(text);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), CollaboratorError> {
        self.log.lock().unwrap().closed = true;
        Ok(())
    }
}

// ===== Observer =====

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub phase: TerminalPhase,
    pub terminal: TerminalSessionState,
    pub entries: Vec<(Role, String)>,
    pub proposal: Option<Proposal>,
    pub flag: Option<InvestigationFlag>,
    pub chat_busy: bool,
}

impl Snapshot {
    pub fn count(&self, role: Role) -> usize {
        self.entries.iter().filter(|(r, _)| *r == role).count()
    }

    pub fn last(&self) -> Option<&(Role, String)> {
        self.entries.last()
    }
}

pub struct RecordingObserver {
    snapshots: mpsc::UnboundedSender<Snapshot>,
    focus: Arc<Mutex<Vec<InputAffordance>>>,
}

impl EngineObserver for RecordingObserver {
    fn render(&mut self, engine: &Engine) {
        let snapshot = Snapshot {
            phase: engine.phase(),
            terminal: engine.terminal().clone(),
            entries: engine
                .transcript()
                .entries()
                .iter()
                .map(|e| (e.role, e.content.clone()))
                .collect(),
            proposal: engine.proposal().cloned(),
            flag: engine.flag().cloned(),
            chat_busy: engine.is_chat_busy(),
        };
        let _ = self.snapshots.send(snapshot);
    }

    fn request_focus(&mut self, affordance: InputAffordance) {
        self.focus.lock().unwrap().push(affordance);
    }
}

// ===== Harness =====

pub struct Harness {
    pub handle: DriverHandle,
    pub bus: Arc<BroadcastBus>,
    pub focus: Arc<Mutex<Vec<InputAffordance>>>,
    pub snapshots: mpsc::UnboundedReceiver<Snapshot>,
    pub seen: Vec<Snapshot>,
    pub task: tokio::task::JoinHandle<Engine>,
    pub wait_limit: Duration,
}

impl Harness {
    pub fn start(
        config: &SentinelConfig,
        api: Arc<MockApi>,
        connector: Arc<dyn TerminalConnector>,
    ) -> Self {
        let (tx, snapshots) = mpsc::unbounded_channel();
        let focus = Arc::new(Mutex::new(Vec::new()));
        let bus = Arc::new(BroadcastBus::new());
        let observer = RecordingObserver {
            snapshots: tx,
            focus: focus.clone(),
        };
        let driver = Driver::new(config, api, connector, bus.clone(), observer);
        let handle = driver.handle();
        let task = tokio::spawn(driver.run());
        Self {
            handle,
            bus,
            focus,
            snapshots,
            seen: Vec::new(),
            task,
            wait_limit: Duration::from_secs(5),
        }
    }

    /// Wait for the first rendered snapshot satisfying `pred`.
    pub async fn wait_for(&mut self, what: &str, pred: impl Fn(&Snapshot) -> bool) -> Snapshot {
        let limit = self.wait_limit;
        let result = tokio::time::timeout(limit, async {
            while let Some(snapshot) = self.snapshots.recv().await {
                self.seen.push(snapshot.clone());
                if pred(&snapshot) {
                    return Some(snapshot);
                }
            }
            None
        })
        .await;
        match result {
            Ok(Some(snapshot)) => snapshot,
            _ => panic!("timed out waiting for {}", what),
        }
    }

    pub fn phases_seen(&self) -> Vec<TerminalPhase> {
        let mut phases: Vec<TerminalPhase> = Vec::new();
        for snapshot in &self.seen {
            if phases.last() != Some(&snapshot.phase) {
                phases.push(snapshot.phase);
            }
        }
        phases
    }

    pub async fn shutdown(self) -> Engine {
        self.handle.shutdown();
        self.task.await.unwrap()
    }
}

/// Poll `check` until it holds.
pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held: {}", what);
}

pub fn proposal_response(command: &str, reason: &str) -> Vec<String> {
    let payload = serde_json::json!({"event": "proposal", "command": command, "reason": reason}).to_string();
    // Split the frame mid-payload to exercise the decoder across chunks.
    let (head, tail) = payload.split_at(payload.len() / 2);
    vec![
        "event: message\ndata: ".to_string() + head,
        tail.to_string() + "\n\n",
        DONE_FRAME.to_string(),
    ]
}
