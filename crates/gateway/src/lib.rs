//! HTTP gateway for Settlr.
//!
//! Serves turn submission over SSE, conversation and map reads, and a
//! WebSocket map channel. [`start`] wires the whole process: provider,
//! SQLite store, tool set, agent loop, and the map notification task.
//!
//! Built on Axum.

pub mod api;
pub mod error;
pub mod map;

#[cfg(test)]
mod test_support;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Method, header};
use settlr_agent::{AgentLoop, AgentSettings, SystemPrompt};
use settlr_config::AppConfig;
use settlr_core::notify::{MapEvent, QueuedNotifier};
use settlr_core::provider::Provider;
use settlr_core::store::{GeoStore, HistoryStore};
use settlr_store::SqliteStore;
use settlr_tools::{ToolDeps, ToolSettings, default_toolset};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use map::{MapHub, MapPayload};

/// Request bodies larger than this are rejected.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Map payloads buffered per viewer before it is considered lagging.
const MAP_CHANNEL_CAPACITY: usize = 256;

/// Shared handler state. Cloned per request; everything inside is shared.
#[derive(Clone)]
pub struct AppState {
    pub agent: AgentLoop,
    pub history: Arc<dyn HistoryStore>,
    pub geo: Arc<dyn GeoStore>,
    pub hub: MapHub,
}

/// Wire the agent, tools, and map hub around one store.
///
/// Returns the state and the receiving end of the tools' notification queue,
/// which the caller drains with [`MapHub::run`].
pub fn build_state<S>(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
    store: Arc<S>,
    prompt: SystemPrompt,
) -> (AppState, mpsc::UnboundedReceiver<MapEvent>)
where
    S: HistoryStore + GeoStore + 'static,
{
    let (notifier, events) = QueuedNotifier::new();
    let tools = default_toolset(ToolDeps {
        provider: provider.clone(),
        store: store.clone(),
        notifier: Arc::new(notifier),
        settings: ToolSettings::from_config(config),
    });
    let agent = AgentLoop::new(
        provider,
        store.clone(),
        tools,
        prompt,
        AgentSettings::from_config(config),
    );
    let state = AppState {
        agent,
        history: store.clone(),
        geo: store.clone(),
        hub: MapHub::new(store, MAP_CHANNEL_CAPACITY),
    };
    (state, events)
}

/// Build the router with CORS, the body limit, and request tracing.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    api::routes()
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .expose_headers([HeaderName::from_static(api::CONVERSATION_HEADER)])
        .max_age(Duration::from_secs(3600));

    if origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// Start the gateway and serve until Ctrl-C.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let provider = settlr_providers::build_from_config(&config)?;
    let store = Arc::new(SqliteStore::new(&config.database.url).await?);
    let prompt = SystemPrompt::load(config.agent.system_prompt_path.as_deref())?;

    let (state, events) = build_state(&config, provider, store, prompt);
    tokio::spawn(state.hub.clone().run(events));

    let app = build_router(state, &config.gateway.cors_origins);
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, model = %config.model, "Gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down gateway"),
        Err(e) => {
            warn!(error = %e, "Could not listen for Ctrl-C, serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
