//! A provider that plays back a fixed script.

use async_trait::async_trait;
use settlr_core::error::ProviderError;
use settlr_core::message::Message;
use settlr_core::provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// One scripted model call.
#[derive(Debug)]
pub enum Step {
    /// A whole message, streamed as a single chunk.
    Reply(Message),
    /// Streamed chunk by chunk; a final `done` chunk is appended.
    Chunks(Vec<StreamChunk>),
    Fail(ProviderError),
    /// Never answers.
    Hang,
}

/// Serves `complete` and `stream` calls from one queue, in call order, and
/// records every request. Fails with a network error once the script runs out.
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Reply with each message in turn.
    pub fn replies(messages: Vec<Message>) -> Arc<Self> {
        Self::new(messages.into_iter().map(Step::Reply).collect())
    }

    /// Reply once with plain assistant text.
    pub fn replying(text: &str) -> Arc<Self> {
        Self::replies(vec![Message::assistant(text)])
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request(&self, index: usize) -> ProviderRequest {
        self.requests.lock().unwrap()[index].clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next(&self, request: ProviderRequest) -> Option<Step> {
        self.requests.lock().unwrap().push(request);
        self.steps.lock().unwrap().pop_front()
    }
}

fn exhausted() -> ProviderError {
    ProviderError::Network("script exhausted".into())
}

async fn hang() -> ProviderError {
    tokio::time::sleep(Duration::from_secs(3600)).await;
    ProviderError::Network("unreachable".into())
}

fn response(message: Message) -> ProviderResponse {
    ProviderResponse {
        message,
        usage: None,
        model: "scripted".into(),
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        match self.next(request) {
            Some(Step::Reply(message)) => Ok(response(message)),
            Some(Step::Chunks(chunks)) => {
                let text: String = chunks.iter().filter_map(|c| c.content.as_deref()).collect();
                let calls = chunks.into_iter().flat_map(|c| c.tool_calls).collect();
                Ok(response(Message::assistant(text).with_tool_calls(calls)))
            }
            Some(Step::Fail(e)) => Err(e),
            Some(Step::Hang) => Err(hang().await),
            None => Err(exhausted()),
        }
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        let chunks = match self.next(request) {
            Some(Step::Reply(message)) => vec![StreamChunk {
                content: Some(message.content),
                tool_calls: message.tool_calls,
                ..StreamChunk::default()
            }],
            Some(Step::Chunks(chunks)) => chunks,
            Some(Step::Fail(e)) => return Err(e),
            Some(Step::Hang) => return Err(hang().await),
            None => return Err(exhausted()),
        };

        let (tx, rx) = mpsc::channel(chunks.len() + 1);
        for chunk in chunks {
            let _ = tx.send(Ok(chunk)).await;
        }
        let _ = tx
            .send(Ok(StreamChunk {
                done: true,
                ..StreamChunk::default()
            }))
            .await;
        Ok(rx)
    }
}
