//! Events emitted while a turn runs.
//!
//! The gateway forwards `Fragment` and `Error` text to SSE clients and closes
//! the stream with [`DONE_SENTINEL`]. Tool events are for local consumers
//! such as the CLI.

use serde::{Deserialize, Serialize};

/// Final SSE payload of every turn stream.
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Reply text, in the order the model produced it.
    Fragment { text: String },

    /// A tool call is about to run.
    ToolStarted { id: String, name: String },

    /// A tool call finished; failures were reported to the model as text.
    ToolFinished {
        id: String,
        name: String,
        success: bool,
        duration_ms: u64,
    },

    /// The turn completed. `persisted` is false if storing the reply failed.
    Done {
        conversation_id: String,
        rounds: u32,
        tool_calls: usize,
        persisted: bool,
    },

    /// The turn was abandoned; nothing was stored.
    Error { message: String },
}

impl TurnEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Fragment { .. } => "fragment",
            Self::ToolStarted { .. } => "tool_started",
            Self::ToolFinished { .. } => "tool_finished",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Text meant for the user, if any.
    pub fn user_text(&self) -> Option<&str> {
        match self {
            Self::Fragment { text } => Some(text),
            Self::Error { message } => Some(message),
            _ => None,
        }
    }
}
