//! Defines routes for the file manager API.
//!
//! ## Structure
//! - **Private endpoints** (shared token in `Authorization`)
//!   - `GET    /files?prefix=P&mode=list|download`: list a folder or download a file
//!   - `POST   /files?key=K&mode=file|folder`: upload a file or create a folder
//!   - `DELETE /files?key=K&mode=file|folder`: delete a file or a folder subtree
//!   - `POST   /files/batch?prefix=P`: multipart multi-file upload
//!   - `GET    /files/size?prefix=P`: folder size
//!   - `GET    /browse?path=P&sort=name|date|size`: sorted listing with breadcrumbs
//!   - `GET    /share?key=K`: public URL of an object
//!
//! - **Open endpoints**
//!   - `GET    /public/{*key}`: serve an object publicly
//!   - `GET    /healthz`, `GET /readyz`
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`.

use crate::{
    handlers::{
        auth::require_token,
        file_handlers::{
            browse, delete_files, folder_size, get_files, post_files, share, upload_batch,
        },
        health_handlers::{healthz, readyz},
        share_handlers::{public_object, public_preflight},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};

/// Build the full router.
///
/// `max_body_bytes` caps upload request bodies. The returned router still
/// needs `.with_state(state)`.
pub fn routes(state: AppState, max_body_bytes: usize) -> Router<AppState> {
    let private = Router::new()
        .route(
            "/files",
            get(get_files).post(post_files).delete(delete_files),
        )
        .route("/files/batch", post(upload_batch))
        .route("/files/size", get(folder_size))
        .route("/browse", get(browse))
        .route("/share", get(share))
        .route_layer(middleware::from_fn_with_state(state, require_token));

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/public/{*key}", get(public_object).options(public_preflight))
        .merge(private)
        .layer(DefaultBodyLimit::max(max_body_bytes))
}
