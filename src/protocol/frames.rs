//! Gateway Wire Frames
//!
//! Every message on a gateway connection is one JSON object tagged by `type`:
//!
//! - `req`: `{ "type": "req", "id", "method", "params" }`
//! - `res`: `{ "type": "res", "id", "ok", "payload" | "error" }`
//! - `event`: `{ "type": "event", "event", "payload", "seq"? }`

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::ProtocolResult;

/// A single frame on a gateway connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Outbound RPC request
    Req(RequestFrame),
    /// Reply to a request, matched by `id`
    Res(ResponseFrame),
    /// Unsolicited event
    Event(EventFrame),
}

impl Frame {
    /// Parse a text frame
    pub fn parse(text: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode as a text frame
    pub fn to_text(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// RPC request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Correlation identifier, echoed back in the response
    pub id: String,
    /// Method name (e.g. `chat.send`)
    pub method: String,
    /// Method parameters
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl RequestFrame {
    /// Create a request with a freshly generated correlation id
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            method: method.into(),
            params,
        }
    }
}

/// RPC response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Id of the request this answers
    pub id: String,
    /// Whether the call succeeded
    pub ok: bool,
    /// Result payload on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Error details on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ResponseFrame {
    /// Successful response
    pub fn ok(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    /// Failed response
    pub fn err(id: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(ErrorShape {
                code: Some(code.into()),
                message: message.into(),
                details: None,
            }),
        }
    }

    /// Split into the payload or the error shape.
    ///
    /// A response with `ok: false` and no error body still fails, with a
    /// generic message.
    pub fn into_result(self) -> Result<Value, ErrorShape> {
        if self.ok {
            Ok(self.payload.unwrap_or(Value::Null))
        } else {
            Err(self.error.unwrap_or_else(|| ErrorShape {
                code: None,
                message: "request failed".to_string(),
                details: None,
            }))
        }
    }
}

/// Error body of a failed response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorShape {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Event frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    /// Event name (e.g. `chat`, `presence`, `connect.challenge`)
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    /// Sender-side sequence number, when the sender numbers its events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
            seq: None,
        }
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }
}
