//! Chat Stream State
//!
//! Turns the gateway's chat events into conversation state a UI can render:
//!
//! - **ChatStreamReducer**: applies `delta`/`final`/`error`/`tool_*`/`aborted`
//!   events, never committing the same run twice
//! - **CommittedRuns**: bounded memory of which runs are already committed
//! - **ChatMessage / ActivityState**: the output types

mod committed;
mod reducer;
mod types;

pub use committed::CommittedRuns;
pub use reducer::{ChatSnapshot, ChatStreamReducer, Outcome, ReducerConfig};
pub use types::{ActivityState, ChatMessage, Role};
