//! Wire messages
//!
//! - `ChatEvent`: payloads carried by the `/api/chat` SSE stream
//! - `TerminalMessage`: inbound JSON on `/ws/terminal/{command_id}`
//! - `TerminalOutbound`: JSON the client sends on the same socket

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sse::SseFrame;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame payload is not a JSON object")]
    NotAnObject,

    #[error("malformed frame: {source}")]
    Malformed { source: serde_json::Error },
}

/// One event of a chat response stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChatEvent {
    Status {
        #[serde(default)]
        text: String,
    },
    Text {
        #[serde(default)]
        content: String,
    },
    Proposal {
        command: String,
        #[serde(default)]
        reason: String,
    },
    Error {
        #[serde(default)]
        message: String,
    },
    Done,
    #[serde(other)]
    Unknown,
}

impl ChatEvent {
    /// Interpret a decoded frame. The payload's own `event` field wins; the
    /// SSE event type fills in when the payload omits it.
    pub fn from_frame(frame: &SseFrame) -> Result<Self, FrameError> {
        let mut payload = frame.payload.clone();
        let object = payload.as_object_mut().ok_or(FrameError::NotAnObject)?;
        if !object.contains_key("event") {
            object.insert(
                "event".to_string(),
                serde_json::Value::String(frame.event_type.clone()),
            );
        }
        serde_json::from_value(payload).map_err(|source| FrameError::Malformed { source })
    }
}

/// Inbound terminal socket message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TerminalMessage {
    SessionCreated {
        #[serde(default)]
        session_id: Option<String>,
    },
    Output {
        #[serde(default)]
        data: String,
        #[serde(default)]
        prompt_hint: Option<String>,
    },
    Done {
        #[serde(default)]
        exit_code: Option<i32>,
    },
    Error {
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Unknown,
}

impl TerminalMessage {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        serde_json::from_str(text).map_err(|source| FrameError::Malformed { source })
    }
}

/// Outbound terminal socket message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerminalOutbound {
    Input { data: String },
    Signal { signal: String },
    Close,
}

impl TerminalOutbound {
    /// Operator text as the remote process reads it: one line.
    pub fn input(text: &str) -> Self {
        TerminalOutbound::Input {
            data: format!("{}\n", text),
        }
    }

    pub fn interrupt() -> Self {
        TerminalOutbound::Signal {
            signal: "SIGINT".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(event_type: &str, payload: serde_json::Value) -> SseFrame {
        SseFrame {
            event_type: event_type.to_string(),
            payload,
        }
    }

    #[test]
    fn test_chat_event_from_payload_tag() {
        let event = ChatEvent::from_frame(&frame(
            "message",
            json!({"event": "proposal", "command": "rm -rf /tmp/x", "reason": "cleanup", "action": "run"}),
        ))
        .unwrap();
        assert_eq!(
            event,
            ChatEvent::Proposal {
                command: "rm -rf /tmp/x".to_string(),
                reason: "cleanup".to_string()
            }
        );
    }

    #[test]
    fn test_chat_event_falls_back_to_frame_type() {
        let event = ChatEvent::from_frame(&frame("text", json!({"content": "hi"}))).unwrap();
        assert_eq!(
            event,
            ChatEvent::Text {
                content: "hi".to_string()
            }
        );
    }

    #[test]
    fn test_chat_event_unknown_and_done() {
        let done = ChatEvent::from_frame(&frame("done", json!({"event": "done"}))).unwrap();
        assert_eq!(done, ChatEvent::Done);
        let other =
            ChatEvent::from_frame(&frame("message", json!({"event": "flags", "flags": []})))
                .unwrap();
        assert_eq!(other, ChatEvent::Unknown);
    }

    #[test]
    fn test_chat_event_rejects_non_object() {
        assert!(matches!(
            ChatEvent::from_frame(&frame("text", json!("plain"))),
            Err(FrameError::NotAnObject)
        ));
    }

    #[test]
    fn test_terminal_message_shapes() {
        let output = TerminalMessage::parse(
            r#"{"event":"output","data":"Password:","prompt_hint":"password"}"#,
        )
        .unwrap();
        assert_eq!(
            output,
            TerminalMessage::Output {
                data: "Password:".to_string(),
                prompt_hint: Some("password".to_string())
            }
        );

        let done = TerminalMessage::parse(r#"{"event":"done","session_id":"s","exit_code":null}"#)
            .unwrap();
        assert_eq!(done, TerminalMessage::Done { exit_code: None });

        assert!(TerminalMessage::parse("not json").is_err());
    }

    #[test]
    fn test_outbound_input_serialization() {
        let json = serde_json::to_value(TerminalOutbound::input("secret")).unwrap();
        assert_eq!(json, json!({"type": "input", "data": "secret\n"}));

        let close = serde_json::to_value(TerminalOutbound::Close).unwrap();
        assert_eq!(close, json!({"type": "close"}));

        let signal = serde_json::to_value(TerminalOutbound::interrupt()).unwrap();
        assert_eq!(signal, json!({"type": "signal", "signal": "SIGINT"}));
    }
}
