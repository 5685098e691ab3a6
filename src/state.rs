//! Shared state handed to every handler.

use crate::services::file_service::FileService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub files: FileService,
    auth_token: Arc<str>,
}

impl AppState {
    pub fn new(files: FileService, auth_token: impl Into<Arc<str>>) -> Self {
        Self {
            files,
            auth_token: auth_token.into(),
        }
    }

    /// Exact match against the shared token; a `Bearer ` scheme prefix is
    /// accepted too.
    pub fn token_matches(&self, header_value: &str) -> bool {
        let presented = header_value
            .strip_prefix("Bearer ")
            .unwrap_or(header_value);
        !self.auth_token.is_empty() && presented == &*self.auth_token
    }
}
