//! Terminal socket over WebSocket.
//!
//! The socket URL mirrors the server scheme: `http → ws`, `https → wss`. The
//! handshake carries the same `X-API-Key` header as the REST calls.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};
use url::Url;

use sentinel_core::ServerConfig;
use sentinel_runtime::{CollaboratorError, TerminalChannel, TerminalConnector};

use crate::error::ClientError;
use crate::http::parse_base_url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// `ws(s)://host/ws/terminal/{command_id}` under the configured base URL.
pub fn terminal_socket_url(base: &Url, command_id: &str) -> Result<Url, ClientError> {
    let mut url = base
        .join("ws/terminal/")
        .map_err(|source| ClientError::InvalidUrl {
            url: base.to_string(),
            source,
        })?;
    let scheme = match base.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(ClientError::UnsupportedScheme {
                scheme: other.to_string(),
            });
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::UnsupportedScheme {
            scheme: scheme.to_string(),
        })?;
    url.path_segments_mut()
        .map_err(|_| ClientError::UnsupportedScheme {
            scheme: scheme.to_string(),
        })?
        .pop_if_empty()
        .push(command_id);
    Ok(url)
}

#[derive(Clone)]
pub struct WsTerminalConnector {
    base_url: Url,
    api_key: Option<String>,
}

impl std::fmt::Debug for WsTerminalConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTerminalConnector")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl WsTerminalConnector {
    pub fn new(config: &ServerConfig) -> Result<Self, ClientError> {
        Ok(Self {
            base_url: parse_base_url(&config.base_url)?,
            api_key: config.api_key.clone(),
        })
    }

    pub async fn open(&self, command_id: &str) -> Result<WsTerminalChannel, ClientError> {
        let url = terminal_socket_url(&self.base_url, command_id)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|source| ClientError::WebSocket { source })?;
        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(key).map_err(|_| ClientError::InvalidApiKey)?;
            request
                .headers_mut()
                .insert(HeaderName::from_static("x-api-key"), value);
        }

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|source| ClientError::WebSocket { source })?;
        info!(command_id, "terminal websocket connected");
        Ok(WsTerminalChannel { stream })
    }
}

#[async_trait]
impl TerminalConnector for WsTerminalConnector {
    async fn connect(&self, command_id: &str) -> Result<Box<dyn TerminalChannel>, CollaboratorError> {
        let channel = self.open(command_id).await?;
        Ok(Box::new(channel))
    }
}

pub struct WsTerminalChannel {
    stream: WsStream,
}

#[async_trait]
impl TerminalChannel for WsTerminalChannel {
    async fn next_text(&mut self) -> Option<Result<String, CollaboratorError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => debug!(len = bytes.len(), "dropping non-utf8 binary frame"),
                },
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "terminal websocket closed by server");
                    return None;
                }
                Ok(_) => {}
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None;
                }
                Err(e) => return Some(Err(CollaboratorError::socket(e.to_string()))),
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), CollaboratorError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| CollaboratorError::socket(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), CollaboratorError> {
        match self.stream.close(None).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(CollaboratorError::socket(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    #[test]
    fn test_socket_url_mirrors_scheme() {
        let http = parse_base_url("http://127.0.0.1:8000").unwrap();
        assert_eq!(
            terminal_socket_url(&http, "abc123").unwrap().as_str(),
            "ws://127.0.0.1:8000/ws/terminal/abc123"
        );

        let https = parse_base_url("https://soc.example.com/sentinel/").unwrap();
        assert_eq!(
            terminal_socket_url(&https, "abc123").unwrap().as_str(),
            "wss://soc.example.com/sentinel/ws/terminal/abc123"
        );
    }

    #[test]
    fn test_socket_url_escapes_command_id() {
        let base = parse_base_url("http://localhost:8000").unwrap();
        let url = terminal_socket_url(&base, "a/b c").unwrap();
        assert_eq!(url.path(), "/ws/terminal/a%2Fb%20c");
    }

    #[tokio::test]
    async fn test_channel_round_trip_with_api_key() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen: Arc<Mutex<Option<(String, Option<String>)>>> = Arc::new(Mutex::new(None));
        let seen_by_server = seen.clone();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let callback = move |req: &Request, resp: Response| {
                let key = req
                    .headers()
                    .get("x-api-key")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                *seen_by_server.lock().unwrap() = Some((req.uri().path().to_string(), key));
                Ok::<Response, ErrorResponse>(resp)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(tcp, callback).await.unwrap();
            ws.send(Message::Text(r#"{"event":"output","data":"hi"}"#.to_string().into()))
                .await
                .unwrap();
            let reply = ws.next().await.unwrap().unwrap();
            ws.close(None).await.unwrap();
            reply.into_text().unwrap().to_string()
        });

        let config = ServerConfig {
            base_url: format!("http://{}", addr),
            api_key: Some("k-9".to_string()),
            ..ServerConfig::default()
        };
        let connector = WsTerminalConnector::new(&config).unwrap();
        let mut channel = connector.connect("cmd-7").await.unwrap();

        let first = channel.next_text().await.unwrap().unwrap();
        assert_eq!(first, r#"{"event":"output","data":"hi"}"#);
        channel
            .send_text(r#"{"type":"input","data":"ls\n"}"#.to_string())
            .await
            .unwrap();

        let received = server.await.unwrap();
        assert_eq!(received, r#"{"type":"input","data":"ls\n"}"#);
        assert!(channel.next_text().await.is_none());

        let (path, key) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(path, "/ws/terminal/cmd-7");
        assert_eq!(key.as_deref(), Some("k-9"));
    }

    #[tokio::test]
    async fn test_connect_failure_is_socket_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = ServerConfig {
            base_url: format!("http://{}", addr),
            ..ServerConfig::default()
        };
        let connector = WsTerminalConnector::new(&config).unwrap();
        assert!(matches!(
            connector.connect("x").await,
            Err(CollaboratorError::Socket { .. })
        ));
    }
}
