//! Handshake Payloads
//!
//! A connection is usable only after the client's `connect` request has been
//! acknowledged. The remote side may first send a `connect.challenge` event
//! carrying a nonce, which the client echoes in its `connect` params.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version spoken by this crate
pub const PROTOCOL_VERSION: u32 = 3;

/// Method name of the handshake request
pub const CONNECT_METHOD: &str = "connect";

/// Event carrying the optional handshake challenge
pub const CHALLENGE_EVENT: &str = "connect.challenge";

/// Close code used when the remote side rejects the handshake
pub const CLOSE_CONNECT_FAILED: u16 = 4008;

/// Parameters of the `connect` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub min_protocol: u32,
    pub max_protocol: u32,
    pub client: ClientIdentity,
    pub role: String,
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthToken>,
    pub user_agent: String,
    pub locale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Identity block of the connecting client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientIdentity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub version: String,
    pub platform: String,
    pub mode: String,
    pub instance_id: String,
}

/// Opaque bearer credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthToken {
    pub token: String,
}

/// Payload of `connect.challenge`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengePayload {
    pub nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

/// Acknowledgement payload of a successful `connect`.
///
/// Only `protocol` is interpreted; the rest is handed to consumers as-is so
/// they can bootstrap node and session listings from the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloOk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<u32>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub server: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub features: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub snapshot: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub policy: Value,
}

impl HelloOk {
    /// Build from a response payload, tolerating shapes we don't recognize
    pub fn from_payload(payload: Value) -> Self {
        match serde_json::from_value(payload) {
            Ok(hello) => hello,
            Err(e) => {
                tracing::debug!(error = %e, "Unrecognized hello payload");
                Self::default()
            }
        }
    }
}
