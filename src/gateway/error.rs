//! Gateway Error Types

use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::protocol::{ErrorShape, ProtocolError};

/// Errors returned by the gateway client
#[derive(Error, Debug)]
pub enum GatewayError {
    /// No acknowledged connection to send on
    #[error("gateway not connected")]
    NotConnected,

    /// The connection dropped before the response arrived
    #[error("gateway connection closed")]
    ConnectionClosed,

    /// The gateway answered `ok: false`
    #[error("gateway error{}: {message}", code_suffix(.code))]
    Rpc {
        code: Option<String>,
        message: String,
    },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),
}

impl From<ErrorShape> for GatewayError {
    fn from(shape: ErrorShape) -> Self {
        GatewayError::Rpc {
            code: shape.code,
            message: shape.message,
        }
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|c| format!(" [{c}]"))
        .unwrap_or_default()
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_display() {
        let err = GatewayError::Rpc {
            code: Some("NOT_FOUND".to_string()),
            message: "no such session".to_string(),
        };
        assert_eq!(err.to_string(), "gateway error [NOT_FOUND]: no such session");

        let err = GatewayError::Rpc {
            code: None,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "gateway error: boom");
    }
}
