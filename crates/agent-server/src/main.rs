//! Tool agent HTTP Server
//!
//! Axum-based server exposing the orchestrator over a small REST API.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{EmptyToolSession, Orchestrator, OrchestratorConfig, ToolSession};
use agent_runtime::{McpConfig, McpSession, OllamaAdapter, OllamaConfig, RuntimeAdapterFactory};

use crate::handlers::{chat_handler, health_check, list_models, list_tools, set_model};
use crate::state::AppState;

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/chat", post(chat_handler))
        .route("/api/models", get(list_models))
        .route("/api/model", post(set_model))
        .route("/api/tools", get(list_tools))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = OrchestratorConfig::from_env()?;

    // Local daemon is the default family; warn early when it is down
    let ollama = OllamaAdapter::new(OllamaConfig::from_env(), config.model.clone())?;
    if ollama.health_check().await {
        tracing::info!("✓ Connected to Ollama");
    } else {
        tracing::warn!("⚠ Ollama not available - local models will fail");
        tracing::warn!("  Make sure Ollama is running: ollama serve");
    }

    // Tool server
    let mcp = match McpConfig::from_env() {
        Some(mcp_config) => Some(Arc::new(McpSession::spawn(&mcp_config).await?)),
        None => {
            tracing::warn!("⚠ MCP_SERVER_SCRIPT not set - running without tools");
            None
        }
    };
    let session: Arc<dyn ToolSession> = match &mcp {
        Some(mcp) => mcp.clone(),
        None => Arc::new(EmptyToolSession),
    };

    let factory = Arc::new(RuntimeAdapterFactory::from_env(&config)?);
    let orchestrator = Orchestrator::connect(config, factory, session).await?;

    for tool in orchestrator.tool_details(None).await? {
        tracing::info!("  • {}", tool.name);
    }

    let app = build_router(AppState::new(orchestrator));

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Tool agent server running on http://{}", addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health      - Health check");
    tracing::info!("  POST /api/chat    - Send message");
    tracing::info!("  GET  /api/models  - List available models");
    tracing::info!("  POST /api/model   - Switch model");
    tracing::info!("  GET  /api/tools   - List tools");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    if let Some(mcp) = mcp {
        mcp.shutdown().await;
    }
    tracing::info!("Server stopped");

    Ok(())
}
