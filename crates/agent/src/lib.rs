//! The conversation loop: one user turn in, a stream of text out.
//!
//! For each turn the loop:
//!
//! 1. Loads the conversation history (the boundary layer has already stored
//!    the new user message)
//! 2. Renders the system prompt for the turn's phase
//! 3. Streams a model round, forwarding text as it arrives
//! 4. If the round asked for tools, runs them in order, appends their
//!    results, and goes back to step 3
//! 5. Otherwise persists the reply once and finishes
//!
//! Rounds are capped; when the cap is hit the model gets one last call with
//! tools disabled.

pub mod executor;
pub mod loop_runner;
pub mod prompt;
pub mod stream_event;

pub use loop_runner::{AgentLoop, AgentSettings};
pub use prompt::SystemPrompt;
pub use stream_event::{DONE_SENTINEL, TurnEvent};
