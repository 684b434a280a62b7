//! Client errors for the concrete collaborators.

use thiserror::Error;

use sentinel_runtime::CollaboratorError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("unsupported URL scheme '{scheme}'")]
    UnsupportedScheme { scheme: String },

    #[error("invalid API key header value")]
    InvalidApiKey,

    #[error("network error: {source}")]
    Network { source: reqwest::Error },

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response: {message}")]
    Protocol { message: String },

    #[error("websocket error: {source}")]
    WebSocket {
        source: tokio_tungstenite::tungstenite::Error,
    },
}

impl From<ClientError> for CollaboratorError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Status { status, message } => CollaboratorError::Status { status, message },
            ClientError::Protocol { message } => CollaboratorError::Protocol { message },
            socket @ ClientError::WebSocket { .. } => CollaboratorError::socket(socket.to_string()),
            other => CollaboratorError::transport(other.to_string()),
        }
    }
}
