//! Protocol error types

use thiserror::Error;

/// Errors raised while decoding or encoding gateway frames
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame was not valid JSON or did not match any frame shape
    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// Chat payload carried a state this layer does not understand
    #[error("Unknown chat state: {0}")]
    UnknownChatState(String),

    /// Payload was structurally valid JSON but missing required data
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
