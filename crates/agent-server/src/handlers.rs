//! HTTP Handlers

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use agent_core::{AgentError, ToolDescriptor};

use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub model: String,
    pub api: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub model: String,
    pub tool_calls: usize,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub current: String,
    pub models: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetModelRequest {
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct SetModelResponse {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ToolQuery {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, error) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Agent(e @ AgentError::UnknownTool(_)) => {
                (StatusCode::NOT_FOUND, "UNKNOWN_TOOL", e.to_string())
            }
            ApiError::Agent(e) if e.is_backend_failure() => (
                StatusCode::BAD_GATEWAY,
                "BACKEND_ERROR",
                format!("Error processing your query: {}", e.user_message()),
            ),
            ApiError::Agent(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AGENT_ERROR",
                format!("Error processing your query: {}", e.user_message()),
            ),
        };

        (
            status,
            Json(ErrorResponse {
                error,
                code: code.into(),
            }),
        )
            .into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        model: state.orchestrator.model().await,
        api: state.orchestrator.family().await.to_string(),
    })
}

/// Run one query through the orchestrator
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if payload.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".into()));
    }

    let record = state.orchestrator.run(&payload.message).await.map_err(|e| {
        tracing::error!("Agent error: {}", e);
        e
    })?;

    Ok(Json(ChatResponse {
        message: record.format_reply(),
        model: record.model.clone(),
        tool_calls: record.tool_exchanges(),
    }))
}

/// Models offered by the active backend family
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        current: state.orchestrator.model().await,
        models: state.orchestrator.list_models().await,
    })
}

/// Switch the active model
pub async fn set_model(
    State(state): State<AppState>,
    Json(payload): Json<SetModelRequest>,
) -> Result<Json<SetModelResponse>, ApiError> {
    let model = payload.model.trim();
    if model.is_empty() {
        return Err(ApiError::BadRequest("model must not be empty".into()));
    }

    let status = state.orchestrator.set_model(model).await?;
    Ok(Json(SetModelResponse { status }))
}

/// Cached tool descriptors, optionally a single one via `?name=`
pub async fn list_tools(
    State(state): State<AppState>,
    axum::extract::Query(query): axum::extract::Query<ToolQuery>,
) -> Result<Json<Vec<ToolDescriptor>>, ApiError> {
    Ok(Json(state.orchestrator.tool_details(query.name.as_deref()).await?))
}
