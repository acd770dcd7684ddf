//! Chat Stream Reducer
//!
//! Folds an unreliable sequence of [`ChatEvent`]s into a live streaming buffer,
//! a deduplicated history of finalized turns and a coarse activity state.
//!
//! Duplicate delivery is expected: a reconnect can replay events, a hub can
//! rebroadcast them, and some agent runtimes stream deltas and then also send
//! a terminal summary. The committed-run set is what keeps each run to a
//! single visible turn. Finals without a run id fall back to a time-window
//! heuristic, which can both miss duplicates and drop legitimate turns that
//! arrive closer together than the window.

use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use std::time::{Duration, Instant};

use super::committed::CommittedRuns;
use super::types::{ActivityState, ChatMessage};
use crate::protocol::{ChatEvent, ChatEventKind};

/// Reducer tuning
#[derive(Debug, Clone)]
pub struct ReducerConfig {
    /// How many committed run ids to remember
    pub committed_capacity: usize,
    /// Window within which a second id-less final counts as a duplicate
    pub dedup_window: Duration,
    /// Most turns kept in history; the oldest are dropped first
    pub history_limit: usize,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            committed_capacity: 256,
            dedup_window: Duration::from_millis(1500),
            history_limit: 500,
        }
    }
}

/// Result of applying one event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Dropped as a duplicate of something already committed
    Discarded,
    /// Live state changed (buffer, tools or activity)
    Updated,
    /// A turn was appended to the history
    Appended,
    /// The run ended without producing a turn
    Closed,
}

/// Live, not-yet-committed view of the conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub activity: ActivityState,
    pub active_tools: Vec<String>,
}

/// State machine turning chat events into conversation state
#[derive(Debug)]
pub struct ChatStreamReducer {
    config: ReducerConfig,
    committed: CommittedRuns,
    stream: String,
    stream_run_id: Option<String>,
    received_delta: bool,
    history: VecDeque<ChatMessage>,
    activity: ActivityState,
    active_tools: BTreeSet<String>,
    last_anonymous_final: Option<Instant>,
}

impl Default for ChatStreamReducer {
    fn default() -> Self {
        Self::new(ReducerConfig::default())
    }
}

impl ChatStreamReducer {
    pub fn new(config: ReducerConfig) -> Self {
        Self {
            committed: CommittedRuns::new(config.committed_capacity),
            config,
            stream: String::new(),
            stream_run_id: None,
            received_delta: false,
            history: VecDeque::new(),
            activity: ActivityState::Idle,
            active_tools: BTreeSet::new(),
            last_anonymous_final: None,
        }
    }

    /// Apply an event received now
    pub fn apply(&mut self, event: ChatEvent) -> Outcome {
        self.apply_at(event, Instant::now())
    }

    /// Apply an event as if received at `now`
    pub fn apply_at(&mut self, event: ChatEvent, now: Instant) -> Outcome {
        if let Some(run_id) = event.run_id.as_deref() {
            if self.committed.contains(run_id) {
                tracing::debug!(run_id = %run_id, "Dropping event for committed run");
                return Outcome::Discarded;
            }
        }

        let ChatEvent { run_id, kind, .. } = event;
        match kind {
            ChatEventKind::Delta { text } => {
                self.on_delta(run_id, &text);
                Outcome::Updated
            }
            ChatEventKind::Final { text } => self.on_final(run_id, text, now),
            ChatEventKind::Error { message } => {
                if let Some(id) = run_id.as_deref() {
                    self.committed.insert(id);
                }
                self.end_run();
                self.push_turn(ChatMessage::error(message, run_id));
                Outcome::Appended
            }
            ChatEventKind::ToolStart { tool, .. } => {
                self.active_tools.insert(tool);
                self.activity = ActivityState::Executing;
                Outcome::Updated
            }
            ChatEventKind::ToolEnd { tool, .. } => {
                self.active_tools.remove(&tool);
                if self.active_tools.is_empty() {
                    // The run itself is still open
                    self.activity = ActivityState::Thinking;
                }
                Outcome::Updated
            }
            ChatEventKind::Aborted => {
                if let Some(id) = run_id.as_deref() {
                    self.committed.insert(id);
                }
                self.end_run();
                Outcome::Closed
            }
        }
    }

    fn on_delta(&mut self, run_id: Option<String>, text: &str) {
        // A delta for a different run supersedes whatever was buffered
        if let (Some(current), Some(incoming)) = (&self.stream_run_id, &run_id) {
            if current != incoming {
                tracing::debug!(
                    buffered_run = %current,
                    run_id = %incoming,
                    "New run started before previous run finished"
                );
                self.stream.clear();
            }
        }
        if run_id.is_some() {
            self.stream_run_id = run_id;
        }
        self.stream.push_str(text);
        self.received_delta = true;
        self.activity = ActivityState::Thinking;
    }

    fn on_final(&mut self, run_id: Option<String>, text: Option<String>, now: Instant) -> Outcome {
        if run_id.is_none() {
            if let Some(last) = self.last_anonymous_final {
                if now.saturating_duration_since(last) < self.config.dedup_window {
                    tracing::debug!("Dropping id-less final inside dedup window");
                    return Outcome::Discarded;
                }
            }
            self.last_anonymous_final = Some(now);
        }

        // An id-less final closes whichever run owns the live buffer
        let run_id = match run_id {
            Some(id) => Some(id),
            None if self.received_delta => self.stream_run_id.clone(),
            None => None,
        };
        if let Some(id) = run_id.as_deref() {
            self.committed.insert(id);
        }

        let buffered = std::mem::take(&mut self.stream);
        let streamed_this_run = self.received_delta
            && match (&self.stream_run_id, &run_id) {
                (Some(current), Some(incoming)) => current == incoming,
                _ => true,
            };
        let text = if streamed_this_run {
            buffered
        } else {
            text.unwrap_or_default()
        };

        self.end_run();
        if text.is_empty() {
            return Outcome::Closed;
        }
        self.push_turn(ChatMessage::assistant(text, run_id));
        Outcome::Appended
    }

    fn push_turn(&mut self, message: ChatMessage) {
        let limit = self.config.history_limit.max(1);
        while self.history.len() >= limit {
            self.history.pop_front();
        }
        self.history.push_back(message);
    }

    fn end_run(&mut self) {
        self.stream.clear();
        self.stream_run_id = None;
        self.received_delta = false;
        self.active_tools.clear();
        self.activity = ActivityState::Idle;
    }

    /// Record a message the local user sent
    pub fn push_user_message(&mut self, text: impl Into<String>) {
        self.push_turn(ChatMessage::user(text));
    }

    /// Record a send that failed before reaching the agent
    pub fn record_send_failure(&mut self, error: impl std::fmt::Display) {
        self.push_turn(ChatMessage::error(format!("Failed to send: {}", error), None));
        self.activity = ActivityState::Idle;
    }

    /// Forget history and live state. Committed runs are kept so a replay
    /// after reset still cannot duplicate a turn.
    pub fn reset(&mut self) {
        self.history.clear();
        self.end_run();
    }

    /// Text streamed so far for the in-progress run
    pub fn stream_text(&self) -> Option<&str> {
        if self.received_delta {
            Some(&self.stream)
        } else {
            None
        }
    }

    /// Finished turns, oldest first
    pub fn history(&self) -> &VecDeque<ChatMessage> {
        &self.history
    }

    /// The most recent turn
    pub fn last_turn(&self) -> Option<&ChatMessage> {
        self.history.back()
    }

    pub fn activity(&self) -> ActivityState {
        self.activity
    }

    pub fn active_tools(&self) -> impl Iterator<Item = &str> {
        self.active_tools.iter().map(String::as_str)
    }

    pub fn is_committed(&self, run_id: &str) -> bool {
        self.committed.contains(run_id)
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            stream: self.stream_text().map(str::to_string),
            run_id: self.stream_run_id.clone(),
            activity: self.activity,
            active_tools: self.active_tools.iter().cloned().collect(),
        }
    }
}
