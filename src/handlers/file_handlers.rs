//! HTTP handlers for the private file manager API.
//! Storage concerns live in `FileService`; these only shape requests and
//! responses.

use crate::{
    errors::AppError,
    models::entry::FilePayload,
    services::{
        file_service::{Mode, ReadOutcome, UploadItem},
        paths,
        session::{Breadcrumb, BrowseSession, Entry, SortBy, format_size},
    },
    state::AppState,
};
use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Multipart, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Query accepted by `/files`. Reads use `prefix`, writes use `key`; either
/// name is accepted for both.
#[derive(Debug, Deserialize)]
pub struct FilesQuery {
    pub prefix: Option<String>,
    pub key: Option<String>,
    pub mode: Option<Mode>,
}

impl FilesQuery {
    fn target(&self) -> &str {
        self.key
            .as_deref()
            .or(self.prefix.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub struct PrefixQuery {
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Deserialize)]
pub struct KeyQuery {
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub sort: SortBy,
}

#[derive(Debug, Serialize)]
pub struct BrowseResponse {
    pub path: String,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub entries: Vec<Entry>,
}

/// `GET /files?prefix=P&mode=list|download`
pub async fn get_files(
    State(state): State<AppState>,
    Query(q): Query<FilesQuery>,
) -> Result<Response, AppError> {
    match state.files.read(q.target(), q.mode).await? {
        ReadOutcome::Listing(listing) => Ok(Json(listing).into_response()),
        ReadOutcome::File { key, payload } => Ok(download_response(&key, payload, true)),
    }
}

/// `POST /files?key=K&mode=file|folder`: the body is the file content.
pub async fn post_files(
    State(state): State<AppState>,
    Query(q): Query<FilesQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let key = q.target();
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let message = match state.files.create(key, q.mode, body, content_type).await? {
        Mode::Folder => format!("Folder '{key}' created successfully."),
        Mode::File => format!("File '{key}' uploaded successfully."),
    };
    Ok((StatusCode::CREATED, Json(json!({ "message": message }))))
}

/// `DELETE /files?key=K&mode=file|folder`
pub async fn delete_files(
    State(state): State<AppState>,
    Query(q): Query<FilesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let key = q.target();
    let message = match state.files.remove(key, q.mode).await? {
        Mode::Folder => format!("Folder '{key}' and its contents deleted successfully."),
        Mode::File => format!("File '{key}' deleted successfully."),
    };
    Ok(Json(json!({ "message": message })))
}

/// `POST /files/batch?prefix=P`: multipart form, one part per file.
///
/// Parts without a filename are ignored.
pub async fn upload_batch(
    State(state): State<AppState>,
    Query(q): Query<PrefixQuery>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut items = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.body_text()))?
    {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let body = field
            .bytes()
            .await
            .map_err(|err| AppError::bad_request(err.body_text()))?;
        items.push(UploadItem {
            name,
            body,
            content_type,
        });
    }

    let uploaded = state.files.upload_many(&q.prefix, items).await?;
    Ok((StatusCode::CREATED, Json(json!({ "uploaded": uploaded }))))
}

/// `GET /files/size?prefix=P`: total size of the folder's direct files.
pub async fn folder_size(
    State(state): State<AppState>,
    Query(q): Query<PrefixQuery>,
) -> Result<impl IntoResponse, AppError> {
    let size = state.files.folder_size(&q.prefix).await?;
    Ok(Json(json!({
        "prefix": q.prefix,
        "size": size,
        "formatted": format_size(size),
    })))
}

/// `GET /browse?path=P&sort=name|date|size`: listing plus navigation
/// state, rebuilt for every request.
pub async fn browse(
    State(state): State<AppState>,
    Query(q): Query<BrowseQuery>,
) -> Result<Json<BrowseResponse>, AppError> {
    let mut session = BrowseSession::new();
    session.navigate(&q.path);
    session.sort_by = q.sort;

    let listing = state.files.list(session.current_path()).await?;
    Ok(Json(BrowseResponse {
        path: session.current_path().to_string(),
        breadcrumbs: session.breadcrumbs(),
        entries: session.sorted_entries(listing),
    }))
}

/// `GET /share?key=K`: the public URL of an object.
pub async fn share(
    State(state): State<AppState>,
    Query(q): Query<KeyQuery>,
) -> Result<impl IntoResponse, AppError> {
    let url = state.files.share_url(&q.key)?;
    Ok(Json(json!({ "key": q.key, "url": url })))
}

/// Build a raw-bytes response for a stored object.
///
/// `attachment` adds a `Content-Disposition` naming the last key segment.
pub(crate) fn download_response(key: &str, payload: FilePayload, attachment: bool) -> Response {
    let mut response = Response::new(Body::from(payload.body));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&payload.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    if attachment {
        let file_name = match paths::last_segment(key) {
            "" => "download",
            name => name,
        };
        let encoded = url::form_urlencoded::byte_serialize(file_name.as_bytes())
            .collect::<String>()
            .replace('+', "%20");
        if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{encoded}\"")) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
    }
    response
}
