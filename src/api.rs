//! HTTP surface for the consultant.
//!
//! This module exposes a compact Axum router:
//!
//! - `POST /api/chat` – Answer a single `message` or a full `messages` conversation. Returns
//!   `{ answer, conversationId?, sources?, followups?, error? }`; `error` carries a code such as
//!   `retrieval_timeout` when the answer is a fallback.
//! - `GET /api/health` – Liveness probe with version, backend name, and timestamp.
//! - `GET /api/metrics` – Answer counters of the active backend.
//!
//! Every route delegates to the shared [`AnswerBackend`], so the surface is identical whichever
//! backend `CHAT_BACKEND` selects.

use crate::backend::AnswerBackend;
use crate::metrics::MetricsSnapshot;
use crate::pipeline::{ChatInput, ConversationTurn, PipelineResult, Role};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

type SharedBackend = Arc<dyn AnswerBackend>;

/// Build the HTTP router around the selected answer backend.
pub fn create_router(backend: SharedBackend) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/health", get(health))
        .route("/api/metrics", get(metrics))
        .with_state(backend)
}

/// Request body for `POST /api/chat`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    /// Single question; treated as a one-turn conversation.
    #[serde(default)]
    message: Option<String>,
    /// Full conversation, oldest first, ending with the latest user turn.
    #[serde(default)]
    messages: Option<Vec<TurnPayload>>,
    /// Caller's conversation identifier, echoed back.
    #[serde(default)]
    conversation_id: Option<String>,
}

/// One conversation turn as sent by the chat UI.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TurnPayload {
    #[serde(default)]
    id: Option<String>,
    role: Role,
    content: String,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    followups: Vec<String>,
}

impl From<TurnPayload> for ConversationTurn {
    fn from(payload: TurnPayload) -> Self {
        let mut turn = ConversationTurn::new(payload.role, payload.content);
        if let Some(id) = payload.id {
            turn.id = id;
        }
        turn.created_at = payload
            .created_at
            .and_then(|value| OffsetDateTime::parse(&value, &Rfc3339).ok());
        turn.sources = payload.sources;
        turn.followups = payload.followups;
        turn
    }
}

impl ChatRequest {
    fn into_input(self) -> Result<(ChatInput, Option<String>), AppError> {
        let input = match (self.messages, self.message) {
            (Some(turns), _) if !turns.is_empty() => {
                ChatInput::Turns(turns.into_iter().map(ConversationTurn::from).collect())
            }
            (_, Some(message)) if !message.trim().is_empty() => ChatInput::Message(message),
            _ => return Err(AppError::MissingMessage),
        };
        Ok((input, self.conversation_id))
    }
}

/// Response body for `POST /api/chat`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatResponse {
    answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sources: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    followups: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<PipelineResult> for ChatResponse {
    fn from(result: PipelineResult) -> Self {
        let error = result.outcome.error_code();
        Self {
            answer: result.answer,
            conversation_id: result.conversation_id,
            sources: result.sources,
            followups: result.followups,
            error,
        }
    }
}

/// Answer a question through the active backend.
async fn chat(
    State(backend): State<SharedBackend>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let (input, conversation_id) = request.into_input()?;
    let result = backend.answer(input, conversation_id).await;
    tracing::info!(
        backend = backend.name(),
        sources = result.sources.len(),
        error = ?result.outcome.error_code(),
        "Chat request completed"
    );
    Ok(Json(result.into()))
}

/// Response body for `GET /api/health`.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    backend: &'static str,
    timestamp: String,
}

async fn health(State(backend): State<SharedBackend>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        backend: backend.name(),
        timestamp: OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default(),
    })
}

async fn metrics(State(backend): State<SharedBackend>) -> Json<MetricsSnapshot> {
    Json(backend.metrics_snapshot())
}

enum AppError {
    MissingMessage,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::MissingMessage => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Message is required" })),
            )
                .into_response(),
        }
    }
}
