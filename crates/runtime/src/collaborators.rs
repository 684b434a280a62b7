//! Collaborator boundaries
//!
//! The engine never performs I/O itself. These traits are the seams where the
//! REST client, the terminal socket, the parent application's event bus and
//! the front end plug in.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::broadcast;

use sentinel_core::InvestigationFlag;

use crate::engine::Engine;
use crate::error::CollaboratorError;
use crate::prompt::InputAffordance;

/// Raw body chunks of a streaming response.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, CollaboratorError>>;

/// REST endpoints of the chat server.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// `POST /api/chat`; yields the SSE body.
    async fn send_chat(&self, message: &str) -> Result<ByteStream, CollaboratorError>;

    /// `DELETE /api/chat/history`
    async fn clear_history(&self) -> Result<(), CollaboratorError>;

    /// `POST /api/terminal/prepare`; returns the command id.
    async fn prepare_terminal(&self, command: &str) -> Result<String, CollaboratorError>;

    /// `POST /api/flags/{id}/dismiss`
    async fn dismiss_flag(&self, flag_id: &str) -> Result<(), CollaboratorError>;
}

/// Opens the duplex terminal socket for a prepared command.
#[async_trait]
pub trait TerminalConnector: Send + Sync {
    async fn connect(&self, command_id: &str) -> Result<Box<dyn TerminalChannel>, CollaboratorError>;
}

/// One open terminal socket, text frames only.
#[async_trait]
pub trait TerminalChannel: Send {
    /// Next text frame. `None` once the socket is closed.
    async fn next_text(&mut self) -> Option<Result<String, CollaboratorError>>;

    async fn send_text(&mut self, text: String) -> Result<(), CollaboratorError>;

    async fn close(&mut self) -> Result<(), CollaboratorError>;
}

/// Typed payloads of the cross-component bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// `investigate-flag`, raised by the parent application.
    InvestigateFlag(InvestigationFlag),
    /// `return-to-pending`, emitted when a flag is deferred.
    ReturnToPending(InvestigationFlag),
}

impl BusEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            BusEvent::InvestigateFlag(_) => "investigate-flag",
            BusEvent::ReturnToPending(_) => "return-to-pending",
        }
    }
}

pub trait EventBus: Send + Sync {
    fn publish(&self, event: BusEvent);

    fn subscribe(&self) -> broadcast::Receiver<BusEvent>;
}

pub type ChatApiRef = Arc<dyn ChatApi>;
pub type TerminalConnectorRef = Arc<dyn TerminalConnector>;
pub type EventBusRef = Arc<dyn EventBus>;

/// Front end. Called after every handler has run to completion.
pub trait EngineObserver: Send {
    fn render(&mut self, engine: &Engine);

    /// The terminal is blocked on operator input.
    fn request_focus(&mut self, affordance: InputAffordance) {
        let _ = affordance;
    }
}
