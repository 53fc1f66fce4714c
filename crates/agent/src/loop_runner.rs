//! The agent loop implementation.

use crate::executor::execute_call;
use crate::prompt::SystemPrompt;
use crate::stream_event::TurnEvent;
use settlr_config::AppConfig;
use settlr_core::error::ProviderError;
use settlr_core::message::{Message, Role, ToolCallRecord};
use settlr_core::provider::{Provider, ProviderRequest, ToolChoice};
use settlr_core::store::HistoryStore;
use settlr_core::tool::{ToolRegistry, ToolSet};
use settlr_core::turn::TurnContext;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Stored and shown when the model returns neither text nor tool calls.
pub const FALLBACK_REPLY: &str =
    "Sorry, I couldn't put an answer together just now. Could you try asking again?";

const FORCED_FINAL_NOTE: &str = "You have used every tool call available for this turn. \
Do not call any more tools. Answer the user now using the information you already have.";

/// Separates text from consecutive rounds in the streamed reply.
const ROUND_SEPARATOR: &str = "\n\n";

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Tool rounds allowed before the forced final call
    pub max_rounds: u32,
    /// Wall-clock budget for one model call, stream included
    pub round_timeout: Duration,
}

impl AgentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_rounds: config.agent.max_rounds,
            round_timeout: Duration::from_secs(config.agent.round_timeout_secs),
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// What one model round produced.
struct Round {
    text: String,
    tool_calls: Vec<ToolCallRecord>,
}

impl Round {
    fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Runs conversation turns. Cheap to clone; each turn runs on its own task.
#[derive(Clone)]
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    history: Arc<dyn HistoryStore>,
    tools: ToolSet,
    prompt: Arc<SystemPrompt>,
    settings: AgentSettings,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        history: Arc<dyn HistoryStore>,
        tools: ToolSet,
        prompt: SystemPrompt,
        settings: AgentSettings,
    ) -> Self {
        Self {
            provider,
            history,
            tools,
            prompt: Arc::new(prompt),
            settings,
        }
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Start a turn and return its event stream.
    ///
    /// The turn runs on a spawned task, so it finishes (and persists) even
    /// if the receiver is dropped part way through.
    pub fn run_stream(&self, ctx: TurnContext) -> mpsc::Receiver<TurnEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let agent = self.clone();
        tokio::spawn(async move { agent.run(ctx, tx).await });
        rx
    }

    /// Run a turn to completion and return the text the user would have seen.
    pub async fn respond(&self, ctx: TurnContext) -> String {
        let mut rx = self.run_stream(ctx);
        let mut reply = String::new();
        while let Some(event) = rx.recv().await {
            if let Some(text) = event.user_text() {
                reply.push_str(text);
            }
        }
        reply
    }

    async fn run(&self, ctx: TurnContext, tx: mpsc::Sender<TurnEvent>) {
        let conversation_id = ctx.conversation_id().clone();
        let start = Instant::now();
        info!(
            conversation_id = %conversation_id,
            phase = ?ctx.phase(),
            region_id = ctx.region_id(),
            "Starting turn"
        );

        let registry = self.tools.registry_for(ctx.phase());
        let system = self.prompt.render(&ctx);
        let mut messages = vec![Message::system(&system)];
        messages.extend(self.load_history(&ctx).await);

        let mut reply = String::new();
        let mut audit: Vec<ToolCallRecord> = Vec::new();
        let mut rounds: u32 = 0;

        loop {
            let forced = rounds >= self.settings.max_rounds;
            let request = if forced {
                warn!(
                    conversation_id = %conversation_id,
                    rounds,
                    "Round cap reached, forcing a final answer"
                );
                messages[0] = Message::system(format!("{system}\n\n{FORCED_FINAL_NOTE}"));
                self.request(&messages, &registry)
                    .with_tool_choice(ToolChoice::None)
            } else {
                self.request(&messages, &registry)
            };
            rounds += 1;
            debug!(conversation_id = %conversation_id, round = rounds, forced, "Model round");

            let separate = !reply.is_empty();
            let round = match self.stream_round(request, separate, &tx).await {
                Ok(round) => round,
                Err(e) => {
                    error!(
                        conversation_id = %conversation_id,
                        round = rounds,
                        error = %e,
                        "Model call failed, abandoning turn"
                    );
                    send(&tx, TurnEvent::Error {
                        message: format!("Agent error: {e}"),
                    })
                    .await;
                    return;
                }
            };
            if round.has_text() {
                if separate {
                    reply.push_str(ROUND_SEPARATOR);
                }
                reply.push_str(&round.text);
            }

            if round.tool_calls.is_empty() || forced {
                if forced && !round.tool_calls.is_empty() {
                    warn!(
                        conversation_id = %conversation_id,
                        ignored = round.tool_calls.len(),
                        "Ignoring tool calls in forced final answer"
                    );
                }
                break;
            }

            let said = if round.has_text() { round.text.as_str() } else { "" };
            messages.push(Message::assistant(said).with_tool_calls(round.tool_calls.clone()));
            for call in &round.tool_calls {
                send(&tx, TurnEvent::ToolStarted {
                    id: call.id.clone(),
                    name: call.name.clone(),
                })
                .await;
                let execution = execute_call(&registry, &ctx, call).await;
                send(&tx, TurnEvent::ToolFinished {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    success: execution.success,
                    duration_ms: execution.duration_ms,
                })
                .await;
                messages.push(execution.message);
            }
            audit.extend(round.tool_calls);
        }

        if reply.is_empty() {
            warn!(conversation_id = %conversation_id, "Model produced no text, using fallback");
            reply = FALLBACK_REPLY.to_string();
            send(&tx, TurnEvent::Fragment {
                text: reply.clone(),
            })
            .await;
        }

        let tool_calls = audit.len();
        let stored = Message::assistant(&reply).with_tool_calls(audit);
        let persisted = match self.history.append_message(&conversation_id, &stored).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "Failed to persist assistant reply"
                );
                false
            }
        };

        info!(
            conversation_id = %conversation_id,
            rounds,
            tool_calls,
            persisted,
            duration_ms = start.elapsed().as_millis() as u64,
            "Turn complete"
        );
        send(&tx, TurnEvent::Done {
            conversation_id: conversation_id.to_string(),
            rounds,
            tool_calls,
            persisted,
        })
        .await;
    }

    fn request(&self, messages: &[Message], registry: &ToolRegistry) -> ProviderRequest {
        ProviderRequest::new(self.settings.model.clone(), messages.to_vec())
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens)
            .with_tools(registry.definitions())
    }

    /// Prior messages in model-ready form.
    ///
    /// Tool calls on stored replies are an audit trail whose results were
    /// never stored, so they are dropped. If history cannot be read the turn
    /// continues with just the user's message.
    async fn load_history(&self, ctx: &TurnContext) -> Vec<Message> {
        match self.history.messages(ctx.conversation_id()).await {
            Ok(history) => history
                .into_iter()
                .filter(|m| matches!(m.role, Role::User | Role::Assistant))
                .filter(|m| !m.content.is_empty())
                .map(Message::without_tool_calls)
                .collect(),
            Err(e) => {
                warn!(
                    conversation_id = %ctx.conversation_id(),
                    error = %e,
                    "Could not load history, continuing with the current message only"
                );
                vec![Message::user(ctx.user_text())]
            }
        }
    }

    /// Stream one model call under the round timeout, forwarding text.
    async fn stream_round(
        &self,
        request: ProviderRequest,
        separate: bool,
        tx: &mpsc::Sender<TurnEvent>,
    ) -> Result<Round, ProviderError> {
        let budget = self.settings.round_timeout;
        let consume = async {
            let mut chunks = self.provider.stream(request).await?;
            let mut round = Round {
                text: String::new(),
                tool_calls: Vec::new(),
            };
            while let Some(chunk) = chunks.recv().await {
                let chunk = chunk?;
                if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
                    let visible = round.has_text();
                    round.text.push_str(&text);
                    if visible {
                        send(tx, TurnEvent::Fragment { text }).await;
                    } else if round.has_text() {
                        // Leading whitespace is held until real text follows.
                        if separate {
                            send(tx, TurnEvent::Fragment {
                                text: ROUND_SEPARATOR.to_string(),
                            })
                            .await;
                        }
                        send(tx, TurnEvent::Fragment {
                            text: round.text.clone(),
                        })
                        .await;
                    }
                }
                round.tool_calls.extend(chunk.tool_calls);
                if chunk.done {
                    break;
                }
            }
            Ok::<Round, ProviderError>(round)
        };

        tokio::time::timeout(budget, consume)
            .await
            .map_err(|_| {
                ProviderError::Timeout(format!("model round exceeded {}s", budget.as_secs()))
            })?
    }
}

/// Deliver an event; a departed receiver is not an error.
async fn send(tx: &mpsc::Sender<TurnEvent>, event: TurnEvent) {
    let _ = tx.send(event).await;
}
