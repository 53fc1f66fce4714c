//! Routes and handlers.
//!
//! - `GET  /health`
//! - `POST /chat/stream` runs a turn and streams its text as SSE, ending with `[DONE]`
//! - `POST /chat` runs a turn and returns the whole reply
//! - `GET  /conversations/{id}` returns the map snapshot and re-publishes it
//! - `GET  /conversations/{id}/regions/{region_id}` returns one region and re-publishes the snapshot
//! - `GET  /conversations/{id}/messages` returns the stored history
//! - `GET  /ws?conversation_id=` subscribes to map payloads

use crate::AppState;
use crate::error::ApiError;
use crate::map::{MapHub, MapPayload, RegionView};
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use settlr_agent::DONE_SENTINEL;
use settlr_core::message::{Conversation, ConversationId, Message};
use settlr_core::turn::TurnContext;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// Response header carrying the conversation a turn ran in.
pub const CONVERSATION_HEADER: &str = "x-conversation-id";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/chat/stream", post(chat_stream))
        .route("/conversations/{id}", get(conversation_map))
        .route("/conversations/{id}/messages", get(conversation_messages))
        .route("/conversations/{id}/regions/{region_id}", get(conversation_region))
        .route("/ws", get(map_socket))
}

// ── Health ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ── Turns ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Omitted or empty starts a new conversation
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// The region the user is looking at, if any
    #[serde(default)]
    pub region_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub conversation_id: String,
    pub response: String,
}

/// Validate a turn request, store its user message, and build the turn context.
async fn begin_turn(state: &AppState, request: ChatRequest) -> Result<TurnContext, ApiError> {
    if request.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".into()));
    }

    let conversation_id = request
        .conversation_id
        .filter(|id| !id.trim().is_empty())
        .map(ConversationId)
        .unwrap_or_default();

    if let Some(region_id) = request.region_id {
        let owned = state
            .geo
            .get_region(region_id)
            .await?
            .is_some_and(|r| r.conversation_id == conversation_id);
        if !owned {
            return Err(ApiError::NotFound(format!(
                "region {region_id} not found in conversation {conversation_id}"
            )));
        }
    }

    state
        .history
        .record_user_message(&conversation_id, &request.message)
        .await?;

    info!(
        conversation_id = %conversation_id,
        region_id = request.region_id,
        message_len = request.message.len(),
        "Turn accepted"
    );
    Ok(TurnContext::new(conversation_id, request.message).with_region(request.region_id))
}

/// `POST /chat/stream`: one `data:` event per text fragment, then `data: [DONE]`.
///
/// Agent failures arrive as an ordinary fragment so the stream always ends
/// the same way.
async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = begin_turn(&state, request).await?;
    let conversation_id = ctx.conversation_id().to_string();

    let fragments = ReceiverStream::new(state.agent.run_stream(ctx)).filter_map(|event| async move {
        event
            .user_text()
            .map(|text| Ok::<_, Infallible>(Event::default().data(text.replace('\r', ""))))
    });
    let done = stream::once(async { Ok::<_, Infallible>(Event::default().data(DONE_SENTINEL)) });

    Ok((
        [(CONVERSATION_HEADER, conversation_id)],
        Sse::new(fragments.chain(done)).keep_alive(KeepAlive::default()),
    ))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let ctx = begin_turn(&state, request).await?;
    let conversation_id = ctx.conversation_id().to_string();
    let response = state.agent.respond(ctx).await;
    Ok(Json(ChatResponse {
        conversation_id,
        response,
    }))
}

// ── Conversation reads ────────────────────────────────────────────────────

async fn existing_conversation(state: &AppState, id: &ConversationId) -> Result<Conversation, ApiError> {
    state
        .history
        .get_conversation(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("conversation {id} not found")))
}

/// `GET /conversations/{id}`: the map snapshot, also pushed to viewers so a
/// reconnecting client can resync.
async fn conversation_map(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MapPayload>, ApiError> {
    let id = ConversationId(id);
    existing_conversation(&state, &id).await?;
    Ok(Json(state.hub.refresh(&id).await?))
}

async fn conversation_region(
    State(state): State<AppState>,
    Path((id, region_id)): Path<(String, i64)>,
) -> Result<Json<RegionView>, ApiError> {
    let id = ConversationId(id);
    let region = state
        .geo
        .get_region(region_id)
        .await?
        .filter(|r| r.conversation_id == id)
        .ok_or_else(|| ApiError::NotFound(format!("region {region_id} not found in conversation {id}")))?;

    let view = state.hub.region_view(&region).await?;
    state.hub.refresh(&id).await?;
    Ok(Json(view))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

async fn conversation_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let id = ConversationId(id);
    let conversation = existing_conversation(&state, &id).await?;
    let messages = state.history.messages(&id).await?;
    Ok(Json(MessagesResponse {
        conversation,
        messages,
    }))
}

// ── Map WebSocket ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MapSocketParams {
    #[serde(default)]
    conversation_id: Option<String>,
}

/// A frame sent by a map viewer.
#[derive(Deserialize)]
struct ViewerFrame {
    #[serde(rename = "type")]
    kind: String,
}

/// `GET /ws`: with `?conversation_id=` the viewer gets that conversation's
/// snapshot immediately and only its payloads afterwards; without it, every
/// payload.
async fn map_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<MapSocketParams>,
) -> impl IntoResponse {
    let conversation_id = params
        .conversation_id
        .filter(|id| !id.is_empty())
        .map(ConversationId);
    ws.on_upgrade(move |socket| serve_viewer(socket, state.hub, conversation_id))
}

async fn serve_viewer(mut socket: WebSocket, hub: MapHub, conversation_id: Option<ConversationId>) {
    let mut updates = hub.subscribe();
    info!(conversation_id = ?conversation_id.as_ref().map(ConversationId::as_str), "Map viewer connected");

    if let Some(id) = &conversation_id {
        if !send_snapshot(&mut socket, &hub, id).await {
            return;
        }
    }

    loop {
        let open = tokio::select! {
            frame = socket.recv() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    answer_frame(&mut socket, &hub, conversation_id.as_ref(), text.as_str()).await
                }
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => false,
                Some(Ok(_)) => true,
            },
            update = updates.recv() => match update {
                Ok(payload) => {
                    let wanted = conversation_id
                        .as_ref()
                        .is_none_or(|id| id == payload.conversation_id());
                    !wanted || send_json(&mut socket, &payload).await
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Map viewer fell behind");
                    match &conversation_id {
                        Some(id) => send_snapshot(&mut socket, &hub, id).await,
                        None => true,
                    }
                }
                Err(RecvError::Closed) => false,
            },
        };
        if !open {
            break;
        }
    }

    info!("Map viewer disconnected");
}

/// Reply to one viewer frame. Returns false once the socket is gone.
async fn answer_frame(
    socket: &mut WebSocket,
    hub: &MapHub,
    conversation_id: Option<&ConversationId>,
    text: &str,
) -> bool {
    let frame: ViewerFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => return send_error(socket, &format!("Invalid message: {e}")).await,
    };
    match (frame.kind.as_str(), conversation_id) {
        ("get_map_state", Some(id)) => send_snapshot(socket, hub, id).await,
        ("get_map_state", None) => {
            send_error(socket, "connect with ?conversation_id= to request map state").await
        }
        (other, _) => send_error(socket, &format!("Unknown message type: '{other}'")).await,
    }
}

async fn send_snapshot(socket: &mut WebSocket, hub: &MapHub, id: &ConversationId) -> bool {
    match hub.snapshot(id).await {
        Ok(payload) => send_json(socket, &payload).await,
        Err(e) => {
            warn!(conversation_id = %id, error = %e, "Could not build map snapshot");
            send_error(socket, "map state is unavailable").await
        }
    }
}

async fn send_error(socket: &mut WebSocket, message: &str) -> bool {
    send_json(socket, &serde_json::json!({"type": "error", "message": message})).await
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(json) => socket.send(WsMessage::Text(json.into())).await.is_ok(),
        Err(e) => {
            debug!(error = %e, "Skipping unserializable map payload");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{TestApp, assistant_calling, body_json, body_text, get, post_json};
    use crate::map::MapPayload;
    use axum::http::StatusCode;
    use settlr_core::geo::{Coordinate, Ring};
    use settlr_core::message::{ConversationId, Message, Role};
    use settlr_core::region::AreaBoundary;
    use settlr_core::store::{GeoStore, HistoryStore};
    use tower::ServiceExt;

    fn hackney() -> Ring {
        Ring::new(vec![
            Coordinate::new(-0.08, 51.53),
            Coordinate::new(-0.03, 51.53),
            Coordinate::new(-0.03, 51.56),
            Coordinate::new(-0.08, 51.56),
        ])
        .unwrap()
    }

    fn strip_timestamp(mut value: serde_json::Value) -> serde_json::Value {
        value.as_object_mut().unwrap().remove("timestamp");
        value
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = TestApp::new(vec![]);
        let response = app.router().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn stream_sends_fragments_then_done() {
        let app = TestApp::new(vec![Message::assistant("Shoreditch is lively.")]);
        let response = app
            .router()
            .oneshot(post_json(
                "/chat/stream",
                serde_json::json!({"message": "Tell me about Shoreditch", "conversation_id": "c1"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[super::CONVERSATION_HEADER], "c1");
        let body = body_text(response).await;
        assert!(body.contains("data: Shoreditch is lively.\n\n"), "body: {body}");
        assert!(body.ends_with("data: [DONE]\n\n"), "body: {body}");

        let conv = ConversationId::from("c1");
        let stored = app.store.messages(&conv).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].role, Role::User);
        assert_eq!(stored[1].content, "Shoreditch is lively.");
        let conversation = app.store.get_conversation(&conv).await.unwrap().unwrap();
        assert_eq!(conversation.title, "Tell me about Shoreditch");
    }

    #[tokio::test]
    async fn agent_failure_still_ends_with_done() {
        let app = TestApp::new(vec![]);
        let response = app
            .router()
            .oneshot(post_json(
                "/chat/stream",
                serde_json::json!({"message": "hello", "conversation_id": "c1"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("data: Agent error:"), "body: {body}");
        assert!(body.ends_with("data: [DONE]\n\n"));

        let stored = app.store.messages(&ConversationId::from("c1")).await.unwrap();
        assert_eq!(stored.len(), 1, "only the user message is stored");
    }

    #[tokio::test]
    async fn blank_message_is_rejected() {
        let app = TestApp::new(vec![]);
        let response = app
            .router()
            .oneshot(post_json("/chat/stream", serde_json::json!({"message": "   "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "message must not be empty");
    }

    #[tokio::test]
    async fn chat_without_id_starts_a_conversation() {
        let app = TestApp::new(vec![Message::assistant("Hi! Which area?")]);
        let response = app
            .router()
            .oneshot(post_json("/chat", serde_json::json!({"message": "Hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["response"], "Hi! Which area?");
        let id = body["conversation_id"].as_str().unwrap();
        assert!(!id.is_empty());
        let stored = app.store.messages(&ConversationId::from(id)).await.unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn foreign_region_is_refused_before_storing() {
        let app = TestApp::new(vec![Message::assistant("unused")]);
        let owner = ConversationId::from("owner");
        app.store.create_conversation(&owner, "Hackney").await.unwrap();
        let region = app.store.insert_region(&owner, "Hackney", &hackney()).await.unwrap();

        let response = app
            .router()
            .oneshot(post_json(
                "/chat",
                serde_json::json!({"message": "flats?", "conversation_id": "other", "region_id": region.id}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(
            app.store
                .get_conversation(&ConversationId::from("other"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn resolved_area_reaches_map_viewers() {
        let app = TestApp::new(vec![
            assistant_calling(
                "resolve_area",
                serde_json::json!({"area_name": "Hackney", "conversation_id": "c1"}),
            ),
            Message::assistant("Hackney is on your map."),
        ]);
        app.store
            .upsert_boundary(&AreaBoundary {
                name: "Hackney".into(),
                aliases: vec![],
                ring: hackney(),
            })
            .await
            .unwrap();
        let mut viewer = app.state.hub.subscribe();
        app.start_notifier();

        let response = app
            .router()
            .oneshot(post_json(
                "/chat",
                serde_json::json!({"message": "Tell me about Hackney", "conversation_id": "c1"}),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["response"], "Hackney is on your map.");

        match viewer.recv().await.unwrap() {
            MapPayload::MapData {
                conversation_id,
                regions,
                ..
            } => {
                assert_eq!(conversation_id.as_str(), "c1");
                assert_eq!(regions.len(), 1);
                assert_eq!(regions[0].region_name, "Hackney");
            }
            other => panic!("expected map data, got {other:?}"),
        }

        let stored = app.store.messages(&ConversationId::from("c1")).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].tool_calls.len(), 1);
    }

    #[tokio::test]
    async fn conversation_read_is_repeatable_and_republished() {
        let app = TestApp::new(vec![]);
        let conv = ConversationId::from("c1");
        app.store.create_conversation(&conv, "Hackney").await.unwrap();
        app.store.insert_region(&conv, "Hackney", &hackney()).await.unwrap();
        let mut viewer = app.state.hub.subscribe();

        let first = body_json(app.router().oneshot(get("/conversations/c1")).await.unwrap()).await;
        let second = body_json(app.router().oneshot(get("/conversations/c1")).await.unwrap()).await;

        assert_eq!(first["type"], "map_data");
        assert_eq!(first["regions"][0]["region_name"], "Hackney");
        assert_eq!(strip_timestamp(first), strip_timestamp(second));
        assert!(matches!(viewer.recv().await.unwrap(), MapPayload::MapData { .. }));
        assert!(matches!(viewer.recv().await.unwrap(), MapPayload::MapData { .. }));
    }

    #[tokio::test]
    async fn unknown_conversation_is_404() {
        let app = TestApp::new(vec![]);
        let response = app.router().oneshot(get("/conversations/missing")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = app
            .router()
            .oneshot(get("/conversations/missing/messages"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn region_read_checks_ownership() {
        let app = TestApp::new(vec![]);
        let conv = ConversationId::from("c1");
        app.store.create_conversation(&conv, "Hackney").await.unwrap();
        let region = app.store.insert_region(&conv, "Hackney", &hackney()).await.unwrap();

        let ok = app
            .router()
            .oneshot(get(&format!("/conversations/c1/regions/{}", region.id)))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        let body = body_json(ok).await;
        assert_eq!(body["region_id"], region.id);
        assert_eq!(body["coordinates"].as_array().unwrap().len(), 5);

        let foreign = app
            .router()
            .oneshot(get(&format!("/conversations/c2/regions/{}", region.id)))
            .await
            .unwrap();
        assert_eq!(foreign.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn messages_endpoint_lists_history() {
        let app = TestApp::new(vec![]);
        let conv = ConversationId::from("c1");
        app.store.create_conversation(&conv, "Somewhere quiet near a park").await.unwrap();
        app.store
            .append_message(&conv, &Message::assistant("Try Dulwich."))
            .await
            .unwrap();

        let body = body_json(app.router().oneshot(get("/conversations/c1/messages")).await.unwrap()).await;
        assert_eq!(body["conversation"]["title"], "Somewhere quiet near a park");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["content"], "Try Dulwich.");
    }
}
