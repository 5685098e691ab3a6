//! Public, unauthenticated access to stored objects.
//!
//! - `GET     /public/{*key}` -> object bytes, CORS enabled
//! - `OPTIONS /public/{*key}` -> CORS preflight

use crate::{errors::AppError, handlers::file_handlers::download_response, state::AppState};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

fn apply_cors(request_headers: &HeaderMap, response: &mut Response) {
    let origin = request_headers
        .get(header::ORIGIN)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("*"));
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
}

/// Serve an object inline so browsers can render it directly. Failures carry
/// the CORS headers too, so cross-origin callers can read the error.
pub async fn public_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Response {
    let mut response = match state.files.download(&key).await {
        Ok(payload) => download_response(&key, payload, false),
        Err(err) => AppError::from(err).into_response(),
    };
    apply_cors(&headers, &mut response);
    response
}

pub async fn public_preflight(headers: HeaderMap) -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    apply_cors(&headers, &mut response);
    response
}
