//! Driver - the single logical event loop
//!
//! One task owns the [`Engine`] and processes [`EngineEvent`]s one at a time.
//! Network work runs in spawned tasks that only do I/O and post events back,
//! so engine state is never touched concurrently. The terminal socket task
//! also owns the safety timer: an absolute deadline armed on socket open.

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sentinel_core::{ChatEvent, SentinelConfig, SessionId, TerminalOutbound, decode_stream};

use crate::collaborators::{
    BusEvent, ChatApiRef, EngineObserver, EventBusRef, TerminalChannel, TerminalConnectorRef,
};
use crate::engine::{Effect, Engine, EngineEvent, OperatorAction, RequestId};

/// How long teardown waits for the socket task to say goodbye.
const SOCKET_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

type EventSender = mpsc::UnboundedSender<EngineEvent>;

/// Cloneable handle for posting events into a running driver.
#[derive(Debug, Clone)]
pub struct DriverHandle {
    tx: EventSender,
}

impl DriverHandle {
    /// Returns false once the driver has stopped.
    pub fn operator(&self, action: OperatorAction) -> bool {
        self.tx.send(EngineEvent::Operator(action)).is_ok()
    }

    pub fn send(&self, event: EngineEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// UI teardown: closes any live terminal socket and stops the loop.
    pub fn shutdown(&self) {
        let _ = self.tx.send(EngineEvent::Shutdown);
    }
}

#[derive(Debug)]
enum SocketCommand {
    Send(TerminalOutbound),
    Close,
}

struct SocketHandle {
    session: SessionId,
    commands: mpsc::UnboundedSender<SocketCommand>,
    task: JoinHandle<()>,
}

pub struct Driver<O: EngineObserver> {
    engine: Engine,
    api: ChatApiRef,
    connector: TerminalConnectorRef,
    bus: EventBusRef,
    bus_rx: Option<broadcast::Receiver<BusEvent>>,
    observer: O,
    tx: EventSender,
    rx: mpsc::UnboundedReceiver<EngineEvent>,
    socket: Option<SocketHandle>,
    /// Socket tasks told to close that may still be finishing.
    draining: Vec<JoinHandle<()>>,
    safety_timeout: Duration,
}

impl<O: EngineObserver> Driver<O> {
    pub fn new(
        config: &SentinelConfig,
        api: ChatApiRef,
        connector: TerminalConnectorRef,
        bus: EventBusRef,
        observer: O,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        // Subscribe now so flags raised before `run` starts are not lost.
        let bus_rx = Some(bus.subscribe());
        Self {
            engine: Engine::new(config),
            api,
            connector,
            bus,
            bus_rx,
            observer,
            tx,
            rx,
            socket: None,
            draining: Vec::new(),
            safety_timeout: config.terminal.safety_timeout(),
        }
    }

    pub fn handle(&self) -> DriverHandle {
        DriverHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Run until [`DriverHandle::shutdown`]. Returns the final engine state.
    pub async fn run(mut self) -> Engine {
        let forwarder = self.bus_rx.take().map(|rx| self.spawn_bus_forwarder(rx));
        self.observer.render(&self.engine);

        while let Some(event) = self.rx.recv().await {
            let stop = matches!(event, EngineEvent::Shutdown);
            self.dispatch(event);
            if stop {
                break;
            }
        }

        if let Some(socket) = self.socket.take() {
            self.retire(socket);
        }
        let pending = futures::future::join_all(self.draining.drain(..));
        if tokio::time::timeout(SOCKET_DRAIN_TIMEOUT, pending).await.is_err() {
            warn!("terminal socket did not close in time");
        }
        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }
        info!("driver stopped");
        self.engine
    }

    fn dispatch(&mut self, event: EngineEvent) {
        let effects = self.engine.handle(event);
        for effect in effects {
            self.perform(effect);
        }
        self.observer.render(&self.engine);
    }

    fn perform(&mut self, effect: Effect) {
        match effect {
            Effect::StartChat { request, message } => {
                tokio::spawn(stream_chat(self.api.clone(), request, message, self.tx.clone()));
            }
            Effect::ClearHistory => {
                let api = self.api.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let event = match api.clear_history().await {
                        Ok(()) => EngineEvent::HistoryCleared,
                        Err(e) => EngineEvent::ClearFailed {
                            message: e.to_string(),
                        },
                    };
                    let _ = tx.send(event);
                });
            }
            Effect::PrepareTerminal { session, command } => {
                let api = self.api.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let event = match api.prepare_terminal(&command).await {
                        Ok(command_id) => EngineEvent::TerminalPrepared {
                            session,
                            command_id,
                        },
                        Err(e) => EngineEvent::PrepareFailed {
                            session,
                            message: e.to_string(),
                        },
                    };
                    let _ = tx.send(event);
                });
            }
            Effect::OpenTerminal {
                session,
                command_id,
            } => self.open_socket(session, command_id),
            Effect::SendTerminal { session, message } => match &self.socket {
                Some(socket) if socket.session == session => {
                    if socket.commands.send(SocketCommand::Send(message)).is_err() {
                        debug!(%session, "socket task already gone");
                    }
                }
                _ => debug!(%session, "no socket for outbound message"),
            },
            Effect::CloseTerminal { session } => {
                if self.socket.as_ref().is_some_and(|s| s.session == session)
                    && let Some(socket) = self.socket.take()
                {
                    self.retire(socket);
                }
            }
            Effect::DismissFlag { flag_id } => {
                let api = self.api.clone();
                tokio::spawn(async move {
                    if let Err(e) = api.dismiss_flag(&flag_id).await {
                        warn!(%flag_id, error = %e, "dismiss request failed");
                    }
                });
            }
            Effect::PublishBus(event) => self.bus.publish(event),
            Effect::FocusInput(affordance) => self.observer.request_focus(affordance),
        }
    }

    fn open_socket(&mut self, session: SessionId, command_id: String) {
        if let Some(previous) = self.socket.take() {
            self.retire(previous);
        }
        let (commands, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_socket(
            self.connector.clone(),
            session,
            command_id,
            command_rx,
            self.tx.clone(),
            self.safety_timeout,
        ));
        self.socket = Some(SocketHandle {
            session,
            commands,
            task,
        });
    }

    fn retire(&mut self, socket: SocketHandle) {
        debug!(session = %socket.session, "closing terminal socket");
        let _ = socket.commands.send(SocketCommand::Close);
        self.draining.retain(|task| !task.is_finished());
        self.draining.push(socket.task);
    }

    /// Forward `investigate-flag` from the bus into the loop.
    fn spawn_bus_forwarder(&self, mut rx: broadcast::Receiver<BusEvent>) -> JoinHandle<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(BusEvent::InvestigateFlag(flag)) => {
                        if tx.send(EngineEvent::FlagRaised(flag)).is_err() {
                            break;
                        }
                    }
                    Ok(BusEvent::ReturnToPending(_)) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "bus forwarder lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

async fn stream_chat(api: ChatApiRef, request: RequestId, message: String, tx: EventSender) {
    let body = match api.send_chat(&message).await {
        Ok(body) => body,
        Err(e) => {
            let _ = tx.send(EngineEvent::ChatFailed {
                request,
                message: e.to_string(),
            });
            return;
        }
    };

    let frames = decode_stream(body);
    futures::pin_mut!(frames);
    while let Some(item) = frames.next().await {
        match item {
            Ok(frame) => {
                let done = matches!(ChatEvent::from_frame(&frame), Ok(ChatEvent::Done));
                if tx.send(EngineEvent::ChatFrame { request, frame }).is_err() || done {
                    return;
                }
            }
            Err(e) => {
                let _ = tx.send(EngineEvent::ChatFailed {
                    request,
                    message: e.to_string(),
                });
                return;
            }
        }
    }
    let _ = tx.send(EngineEvent::ChatFinished { request });
}

async fn run_socket(
    connector: TerminalConnectorRef,
    session: SessionId,
    command_id: String,
    mut commands: mpsc::UnboundedReceiver<SocketCommand>,
    tx: EventSender,
    ceiling: Duration,
) {
    let mut channel = match connector.connect(&command_id).await {
        Ok(channel) => channel,
        Err(e) => {
            let _ = tx.send(EngineEvent::TerminalConnectFailed {
                session,
                message: e.to_string(),
            });
            return;
        }
    };
    let _ = tx.send(EngineEvent::TerminalOpened { session });
    info!(%session, %command_id, ceiling_secs = ceiling.as_secs(), "terminal socket open");

    let deadline = tokio::time::sleep(ceiling);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                let _ = tx.send(EngineEvent::TerminalTimedOut { session });
                say_goodbye(channel.as_mut()).await;
                break;
            }
            inbound = channel.next_text() => match inbound {
                Some(Ok(text)) => {
                    if tx.send(EngineEvent::TerminalFrame { session, text }).is_err() {
                        say_goodbye(channel.as_mut()).await;
                        break;
                    }
                }
                Some(Err(e)) => {
                    let _ = tx.send(EngineEvent::TerminalSocketError {
                        session,
                        message: e.to_string(),
                    });
                    break;
                }
                None => break,
            },
            command = commands.recv() => match command {
                Some(SocketCommand::Send(message)) => {
                    if let Err(e) = send_outbound(channel.as_mut(), &message).await {
                        let _ = tx.send(EngineEvent::TerminalSocketError {
                            session,
                            message: e.to_string(),
                        });
                        break;
                    }
                }
                Some(SocketCommand::Close) | None => {
                    say_goodbye(channel.as_mut()).await;
                    break;
                }
            },
        }
    }

    debug!(%session, "terminal socket task finished");
    let _ = tx.send(EngineEvent::TerminalClosed { session });
}

async fn send_outbound(
    channel: &mut dyn TerminalChannel,
    message: &TerminalOutbound,
) -> Result<(), crate::error::CollaboratorError> {
    let text = serde_json::to_string(message).map_err(|e| crate::error::CollaboratorError::Protocol {
        message: e.to_string(),
    })?;
    channel.send_text(text).await
}

/// Best-effort `{type:"close"}` followed by a socket close.
async fn say_goodbye(channel: &mut dyn TerminalChannel) {
    if let Err(e) = send_outbound(channel, &TerminalOutbound::Close).await {
        debug!(error = %e, "close message not delivered");
    }
    if let Err(e) = channel.close().await {
        debug!(error = %e, "socket close failed");
    }
}
