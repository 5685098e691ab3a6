//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that round-trips the configured bucket

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

/// `GET /healthz`
///
/// Very small liveness probe: always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
            error: None,
        }),
    )
}

/// `GET /readyz`
///
/// Runs the bucket connection test. HTTP 200 when it passes, HTTP 503 with
/// the failure message otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match state.files.test_connection().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".into(),
                error: None,
            }),
        ),
        Err(err) => {
            tracing::warn!("readiness check failed: {}", err);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "error".into(),
                    error: Some(err.to_string()),
                }),
            )
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}
