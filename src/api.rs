//! REST API server for the loan conversation orchestrator
//!
//! Exposes the per-turn entry point and the decision audit trail over HTTP.
//! This is the transport shell; all conversation logic lives behind
//! `Orchestrator::handle_turn`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::models::{TurnReply, TurnRequest};
use crate::orchestrator::Orchestrator;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub session_id: Option<String>,
    pub message: String,
    pub phone: Option<String>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatMessage>,
) -> (StatusCode, Json<ApiResponse>) {
    info!(session_id = ?req.session_id, "Received chat turn");

    let request = TurnRequest {
        session_id: req.session_id,
        message: req.message,
        phone: req.phone,
    };

    match state.orchestrator.handle_turn(&request).await {
        Ok(reply) => (StatusCode::OK, Json(ApiResponse::success(reply_json(reply)))),
        Err(e) if e.is_invariant_error() => {
            // Operator bug class: the session is preserved for safe retry
            error!(error = %e, "Turn failed on an internal invariant");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(
                    "Technical difficulty; please retry".to_string(),
                )),
            )
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(format!("Turn failed: {}", e))),
        ),
    }
}

fn reply_json(reply: TurnReply) -> serde_json::Value {
    serde_json::json!({
        "session_id": reply.session_id,
        "stage": reply.stage,
        "message": reply.message,
        "options": reply.options,
        "final": reply.final_reply,
        "metadata": reply.metadata,
    })
}

/// =============================
/// Audit Endpoint
/// =============================

async fn audit_handler(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    match state
        .orchestrator
        .audit()
        .list_for_session(&session_id)
        .await
    {
        Ok(records) => (StatusCode::OK, Json(ApiResponse::success(records))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(format!("Audit lookup failed: {}", e))),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/audit/:session_id", get(audit_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
