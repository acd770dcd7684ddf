//! Chat Event Payloads
//!
//! The remote agent does not encode chat content uniformly: the same field can
//! hold a plain string, a list of content blocks, or a nested message object
//! with its own `content`. [`ChatContent`] captures all three shapes and
//! [`ChatEvent::from_payload`] normalizes an event payload into a typed
//! [`ChatEvent`] before anything downstream sees it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{ProtocolError, ProtocolResult};

/// Event name carrying chat stream updates
pub const CHAT_EVENT: &str = "chat";

/// Event name carrying presence updates
pub const PRESENCE_EVENT: &str = "presence";

/// Chat content in any of the shapes the remote side emits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Message(Box<MessageContent>),
}

impl ChatContent {
    /// Extract the plain text, joining text blocks with newlines
    pub fn plain_text(&self) -> String {
        match self {
            ChatContent::Text(text) => text.clone(),
            ChatContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(ContentBlock::text)
                .collect::<Vec<_>>()
                .join("\n"),
            ChatContent::Message(message) => message.plain_text(),
        }
    }
}

/// One element of a block list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentBlock {
    Text(String),
    Typed {
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
}

impl ContentBlock {
    /// Text of a text block; non-text blocks (images, tool calls) yield nothing
    pub fn text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text(text) => Some(text),
            ContentBlock::Typed { kind, text } => match kind.as_deref() {
                None | Some("text") => text.as_deref(),
                Some(_) => None,
            },
        }
    }
}

/// Nested message object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ChatContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl MessageContent {
    fn plain_text(&self) -> String {
        match (&self.content, &self.text) {
            (Some(content), _) => content.plain_text(),
            (None, Some(text)) => text.clone(),
            (None, None) => String::new(),
        }
    }
}

/// Chat payload as it arrives on the wire
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChatPayload {
    #[serde(alias = "kind", alias = "type")]
    state: String,
    #[serde(default)]
    run_id: Option<String>,
    #[serde(default)]
    session_key: Option<String>,
    #[serde(default)]
    content: Option<ChatContent>,
    #[serde(default)]
    message: Option<ChatContent>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    tool_name: Option<String>,
    #[serde(default)]
    tool_args: Option<Value>,
    #[serde(default)]
    tool_result: Option<Value>,
    #[serde(default, alias = "errorMessage")]
    error: Option<String>,
}

impl RawChatPayload {
    fn body_text(&self) -> Option<String> {
        self.content
            .as_ref()
            .or(self.message.as_ref())
            .map(ChatContent::plain_text)
            .or_else(|| self.text.clone())
    }
}

/// A normalized chat stream event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    pub kind: ChatEventKind,
}

/// What happened in the run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChatEventKind {
    /// Streamed text fragment
    Delta { text: String },
    /// Run finished; `text` is the terminal summary if the sender included one
    Final { text: Option<String> },
    /// Run failed
    Error { message: String },
    ToolStart { tool: String, args: Option<Value> },
    ToolEnd { tool: String, result: Option<Value> },
    /// Run cancelled
    Aborted,
}

impl ChatEvent {
    pub fn new(run_id: Option<&str>, kind: ChatEventKind) -> Self {
        Self {
            run_id: run_id.map(str::to_string),
            session_key: None,
            kind,
        }
    }

    pub fn with_session(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = Some(session_key.into());
        self
    }

    /// Normalize a `chat` event payload
    pub fn from_payload(payload: &Value) -> ProtocolResult<Self> {
        let raw = RawChatPayload::deserialize(payload)?;

        let kind = match raw.state.as_str() {
            "delta" => ChatEventKind::Delta {
                text: raw.body_text().unwrap_or_default(),
            },
            "final" => ChatEventKind::Final {
                text: raw.body_text().filter(|t| !t.is_empty()),
            },
            "error" => ChatEventKind::Error {
                message: raw
                    .error
                    .clone()
                    .or_else(|| raw.body_text())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "unknown error".to_string()),
            },
            "tool_start" => ChatEventKind::ToolStart {
                tool: raw.tool_name.clone().ok_or_else(|| {
                    ProtocolError::InvalidPayload("tool_start without toolName".to_string())
                })?,
                args: raw.tool_args.clone(),
            },
            "tool_end" => ChatEventKind::ToolEnd {
                tool: raw.tool_name.clone().ok_or_else(|| {
                    ProtocolError::InvalidPayload("tool_end without toolName".to_string())
                })?,
                result: raw.tool_result.clone(),
            },
            "aborted" => ChatEventKind::Aborted,
            other => return Err(ProtocolError::UnknownChatState(other.to_string())),
        };

        Ok(Self {
            run_id: raw.run_id,
            session_key: raw.session_key,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_string_content() {
        let event = ChatEvent::from_payload(&json!({
            "state": "delta", "runId": "r1", "content": "Hel"
        }))
        .unwrap();
        assert_eq!(event.run_id.as_deref(), Some("r1"));
        assert_eq!(
            event.kind,
            ChatEventKind::Delta {
                text: "Hel".to_string()
            }
        );
    }

    #[test]
    fn test_block_list_content() {
        let event = ChatEvent::from_payload(&json!({
            "state": "final",
            "content": [
                {"type": "text", "text": "first"},
                {"type": "image", "source": {"data": "..."}},
                "second"
            ]
        }))
        .unwrap();
        assert_eq!(
            event.kind,
            ChatEventKind::Final {
                text: Some("first\nsecond".to_string())
            }
        );
    }

    #[test]
    fn test_nested_message_content() {
        let event = ChatEvent::from_payload(&json!({
            "state": "final",
            "runId": "r2",
            "sessionKey": "main",
            "message": {
                "role": "assistant",
                "content": [{"type": "text", "text": "done"}]
            }
        }))
        .unwrap();
        assert_eq!(event.session_key.as_deref(), Some("main"));
        assert_eq!(
            event.kind,
            ChatEventKind::Final {
                text: Some("done".to_string())
            }
        );
    }

    #[test]
    fn test_text_field_fallback() {
        let event = ChatEvent::from_payload(&json!({"kind": "delta", "text": "x"})).unwrap();
        assert_eq!(
            event.kind,
            ChatEventKind::Delta {
                text: "x".to_string()
            }
        );
    }

    #[test]
    fn test_final_without_content() {
        let event = ChatEvent::from_payload(&json!({"state": "final", "runId": "r"})).unwrap();
        assert_eq!(event.kind, ChatEventKind::Final { text: None });
    }

    #[test]
    fn test_error_message_aliases() {
        let a = ChatEvent::from_payload(&json!({"state": "error", "error": "boom"})).unwrap();
        let b =
            ChatEvent::from_payload(&json!({"state": "error", "errorMessage": "boom"})).unwrap();
        let c = ChatEvent::from_payload(&json!({"state": "error"})).unwrap();
        let boom = ChatEventKind::Error {
            message: "boom".to_string(),
        };
        assert_eq!(a.kind, boom);
        assert_eq!(b.kind, boom);
        assert_eq!(
            c.kind,
            ChatEventKind::Error {
                message: "unknown error".to_string()
            }
        );
    }

    #[test]
    fn test_tool_events() {
        let start = ChatEvent::from_payload(&json!({
            "type": "tool_start", "runId": "r", "toolName": "exec", "toolArgs": {"cmd": "ls"}
        }))
        .unwrap();
        assert_eq!(
            start.kind,
            ChatEventKind::ToolStart {
                tool: "exec".to_string(),
                args: Some(json!({"cmd": "ls"}))
            }
        );

        assert!(ChatEvent::from_payload(&json!({"state": "tool_end"})).is_err());
    }

    #[test]
    fn test_unknown_state() {
        let err = ChatEvent::from_payload(&json!({"state": "typing"})).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownChatState(s) if s == "typing"));
    }

    #[test]
    fn test_missing_state_is_malformed() {
        assert!(matches!(
            ChatEvent::from_payload(&json!({"runId": "r"})),
            Err(ProtocolError::Json(_))
        ));
    }
}
