//! REST client for the dashboard server.
//!
//! Every request carries `X-API-Key` when a key is configured. The chat
//! endpoint streams its body; everything else is a plain request/response
//! bounded by the configured request timeout.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use sentinel_core::ServerConfig;
use sentinel_runtime::{ByteStream, ChatApi, CollaboratorError};

use crate::error::ClientError;

pub const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Deserialize)]
struct PrepareResponse {
    command_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

#[derive(Clone)]
pub struct HttpChatApi {
    /// Bounded by the request timeout.
    client: Client,
    /// No overall timeout; chat answers stream for as long as they take.
    streaming: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl std::fmt::Debug for HttpChatApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpChatApi")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl HttpChatApi {
    pub fn new(config: &ServerConfig) -> Result<Self, ClientError> {
        let base_url = parse_base_url(&config.base_url)?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|source| ClientError::Network { source })?;
        let streaming = Client::builder()
            .connect_timeout(config.request_timeout())
            .build()
            .map_err(|source| ClientError::Network { source })?;
        Ok(Self {
            client,
            streaming,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|source| ClientError::InvalidUrl {
                url: path.to_string(),
                source,
            })
    }

    fn request(&self, client: &Client, method: Method, url: Url) -> RequestBuilder {
        let builder = client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key.as_str()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ClientError> {
        let response = builder
            .send()
            .await
            .map_err(|source| ClientError::Network { source })?;
        ensure_success(response).await
    }

    pub async fn post_chat(&self, message: &str) -> Result<Response, ClientError> {
        let url = self.endpoint("api/chat")?;
        debug!(%url, "sending chat message");
        let builder = self
            .request(&self.streaming, Method::POST, url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&serde_json::json!({ "message": message }));
        self.send(builder).await
    }

    pub async fn delete_history(&self) -> Result<(), ClientError> {
        let url = self.endpoint("api/chat/history")?;
        self.send(self.request(&self.client, Method::DELETE, url)).await?;
        Ok(())
    }

    pub async fn prepare(&self, command: &str) -> Result<String, ClientError> {
        let url = self.endpoint("api/terminal/prepare")?;
        let builder = self
            .request(&self.client, Method::POST, url)
            .json(&serde_json::json!({ "command": command }));
        let response = self.send(builder).await?;
        let body: PrepareResponse = response.json().await.map_err(|e| ClientError::Protocol {
            message: format!("prepare response: {}", e),
        })?;
        if body.command_id.trim().is_empty() {
            return Err(ClientError::Protocol {
                message: "prepare response has an empty command_id".to_string(),
            });
        }
        Ok(body.command_id)
    }

    pub async fn dismiss(&self, flag_id: &str) -> Result<(), ClientError> {
        let mut url = self.endpoint("api/flags/")?;
        url.path_segments_mut()
            .map_err(|_| ClientError::UnsupportedScheme {
                scheme: self.base_url.scheme().to_string(),
            })?
            .pop_if_empty()
            .extend([flag_id, "dismiss"]);
        self.send(self.request(&self.client, Method::POST, url)).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn send_chat(&self, message: &str) -> Result<ByteStream, CollaboratorError> {
        let response = self.post_chat(message).await?;
        let body = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| CollaboratorError::transport(e.to_string()))
        });
        Ok(body.boxed())
    }

    async fn clear_history(&self) -> Result<(), CollaboratorError> {
        Ok(self.delete_history().await?)
    }

    async fn prepare_terminal(&self, command: &str) -> Result<String, CollaboratorError> {
        Ok(self.prepare(command).await?)
    }

    async fn dismiss_flag(&self, flag_id: &str) -> Result<(), CollaboratorError> {
        Ok(self.dismiss(flag_id).await?)
    }
}

/// Parse the configured base URL so relative endpoint paths join under it.
pub fn parse_base_url(raw: &str) -> Result<Url, ClientError> {
    let mut url = Url::parse(raw.trim()).map_err(|source| ClientError::InvalidUrl {
        url: raw.to_string(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ClientError::UnsupportedScheme {
                scheme: other.to_string(),
            });
        }
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let fallback = status.canonical_reason().unwrap_or("request failed").to_string();
    let text = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        message: error_message(&text).unwrap_or(fallback),
    })
}

/// `{"detail": "..."}` bodies carry the useful part of a server error.
fn error_message(body: &str) -> Option<String> {
    if body.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(detail),
        }) => Some(detail),
        Ok(ErrorBody { detail }) => Some(detail.to_string()),
        Err(_) => Some(body.trim().to_string()),
    }
}
