//! Shared-secret check for the private routes.

use crate::{errors::AppError, state::AppState};
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

/// Reject the request with 401 unless `Authorization` carries the
/// configured token.
pub async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| state.token_matches(v));

    if !authorized {
        tracing::debug!(path = %request.uri().path(), "rejected request without valid token");
        return Err(AppError::unauthorized());
    }
    Ok(next.run(request).await)
}
