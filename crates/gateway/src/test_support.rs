//! Request helpers and a scripted app for the handler tests.

use crate::{AppState, build_router, build_state};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use http_body_util::BodyExt;
use settlr_agent::SystemPrompt;
use settlr_config::AppConfig;
use settlr_core::message::{Message, ToolCallRecord};
use settlr_core::notify::MapEvent;
use settlr_store::InMemoryStore;
use settlr_test_utils::ScriptedProvider;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    events: Mutex<Option<mpsc::UnboundedReceiver<MapEvent>>>,
}

impl TestApp {
    pub fn new(replies: Vec<Message>) -> Self {
        let provider = ScriptedProvider::replies(replies);
        let store = Arc::new(InMemoryStore::new());
        let (state, events) = build_state(
            &AppConfig::default(),
            provider,
            store.clone(),
            SystemPrompt::builtin(),
        );
        Self {
            state,
            store,
            events: Mutex::new(Some(events)),
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone(), &AppConfig::default().gateway.cors_origins)
    }

    /// Drain tool notifications into the hub, as the server does.
    pub fn start_notifier(&self) {
        if let Some(events) = self.events.lock().unwrap().take() {
            tokio::spawn(self.state.hub.clone().run(events));
        }
    }
}

pub fn assistant_calling(tool: &str, input: serde_json::Value) -> Message {
    Message::assistant("").with_tool_calls(vec![ToolCallRecord {
        id: format!("call_{tool}"),
        name: tool.into(),
        input,
    }])
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}
