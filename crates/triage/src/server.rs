//! HTTP API for alert submission and triage review.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

use crate::alert::AlertEvent;
use crate::error::TriageError;
use crate::state::TriageResult;
use crate::store::TriageStore;
use crate::synthetic::SyntheticAlertGenerator;
use crate::worker::Ingestor;

/// Shared state handed to every handler.
pub struct AppState {
    /// Alert admission front door
    pub ingestor: Ingestor,
    /// Result store for queries and review actions
    pub store: Arc<dyn TriageStore>,
    /// Demo alert generator
    pub generator: SyntheticAlertGenerator,
}

/// Build the API router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/alerts/triage", post(submit_alert).get(list_triages))
        .route("/api/alerts/pending", get(list_pending))
        .route("/api/alerts/triage/{id}", get(get_triage))
        .route("/api/alerts/triage/{id}/approve", post(approve_triage))
        .route("/api/alerts/triage/{id}/reject", post(reject_triage))
        .route("/api/alerts/generate", post(generate_alert))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_response(err: &TriageError) -> Response {
    let status = match err {
        TriageError::Validation(_) | TriageError::InvalidAction(_) => StatusCode::BAD_REQUEST,
        TriageError::NotFound(_) => StatusCode::NOT_FOUND,
        TriageError::InvalidState { .. } | TriageError::ConcurrentModification(_) => {
            StatusCode::CONFLICT
        }
        TriageError::Backpressure { .. } => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!("request failed: {err}");
    }
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

/// Response for an accepted submission.
#[derive(Debug, Serialize)]
struct SubmitResponse {
    triage_id: Uuid,
    status: &'static str,
}

async fn submit_alert(
    State(state): State<Arc<AppState>>,
    Json(alert): Json<AlertEvent>,
) -> Response {
    match state.ingestor.submit(alert).await {
        Ok(triage_id) => (
            StatusCode::ACCEPTED,
            Json(SubmitResponse {
                triage_id,
                status: "queued",
            }),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

async fn list_triages(State(state): State<Arc<AppState>>) -> Response {
    match state.store.list().await {
        Ok(mut results) => {
            results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Json(results).into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn get_triage(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    match state.store.get(id).await {
        Ok(versioned) => Json(versioned.result).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Review request body. `feedback` is required on reject only.
#[derive(Debug, Deserialize)]
struct ReviewRequest {
    actor: String,
    #[serde(default)]
    feedback: Option<String>,
}

async fn approve_triage(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReviewRequest>,
) -> Response {
    match state.store.approve(id, &request.actor).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn reject_triage(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReviewRequest>,
) -> Response {
    let feedback = request.feedback.unwrap_or_default();
    match state.store.reject(id, &request.actor, &feedback).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Generation request body. Both fields optional.
#[derive(Debug, Default, Deserialize)]
struct GenerateRequest {
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    alert_type: Option<String>,
}

async fn generate_alert(
    State(state): State<Arc<AppState>>,
    body: Option<Json<GenerateRequest>>,
) -> Response {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let alert = state
        .generator
        .generate_with(request.service.as_deref(), request.alert_type.as_deref());
    let generated = alert.clone();
    match state.ingestor.submit(alert).await {
        Ok(triage_id) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "triage_id": triage_id,
                "status": "queued",
                "alert": generated,
            })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

async fn list_pending(State(state): State<Arc<AppState>>) -> Response {
    match state.store.list().await {
        Ok(results) => {
            let mut pending: Vec<TriageResult> = results
                .into_iter()
                .filter(TriageResult::awaiting_review)
                .collect();
            pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Json(pending).into_response()
        }
        Err(e) => error_response(&e),
    }
}
