//! Runs one tool call and turns any outcome into a tool-result message.
//!
//! Nothing here fails the turn: a missing tool or a tool error becomes text
//! the model can read and react to. There are no retries at this layer.

use settlr_core::error::ToolError;
use settlr_core::message::{Message, ToolCallRecord};
use settlr_core::tool::ToolRegistry;
use settlr_core::turn::TurnContext;
use std::time::Instant;
use tracing::{debug, warn};

/// The outcome of one tool call.
#[derive(Debug, Clone)]
pub struct ToolExecution {
    /// Result message carrying the call's id
    pub message: Message,
    pub success: bool,
    pub duration_ms: u64,
}

pub async fn execute_call(
    registry: &ToolRegistry,
    ctx: &TurnContext,
    call: &ToolCallRecord,
) -> ToolExecution {
    let start = Instant::now();

    let (text, success) = match registry.execute(ctx, call).await {
        Ok(output) => (output.text, true),
        Err(e @ ToolError::NotFound(_)) => {
            warn!(
                conversation_id = %ctx.conversation_id(),
                tool = %call.name,
                offered = ?registry.names(),
                "Model called a tool outside this turn's registry"
            );
            (e.to_string(), false)
        }
        Err(e) => {
            warn!(
                conversation_id = %ctx.conversation_id(),
                tool = %call.name,
                error = %e,
                "Tool execution failed"
            );
            (format!("Error executing tool: {e}"), false)
        }
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    debug!(tool = %call.name, success, duration_ms, "Tool call finished");

    ToolExecution {
        message: Message::tool_result(&call.id, text),
        success,
        duration_ms,
    }
}
