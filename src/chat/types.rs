//! Chat state types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Synthetic turns produced locally (errors, failed sends)
    System,
}

/// A finalized conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_error: bool,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            run_id: None,
            timestamp: Utc::now(),
            is_error: false,
        }
    }

    pub fn assistant(text: impl Into<String>, run_id: Option<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            run_id,
            timestamp: Utc::now(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>, run_id: Option<String>) -> Self {
        Self {
            role: Role::System,
            text: text.into(),
            run_id,
            timestamp: Utc::now(),
            is_error: true,
        }
    }
}

/// Coarse agent activity derived from the event stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityState {
    #[default]
    Idle,
    Thinking,
    Executing,
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActivityState::Idle => "idle",
            ActivityState::Thinking => "thinking",
            ActivityState::Executing => "executing",
        };
        f.write_str(label)
    }
}
