use anyhow::Result;
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;
mod store;

use config::{AppConfig, Backend};
use services::{file_service::FileService, vfs::VirtualFs};
use store::{
    ObjectStore,
    cos::{CosSettings, CosStore},
    local::LocalStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting bucket-drive with config: {:?}", cfg);

    // --- Initialize the object store ---
    let store: Arc<dyn ObjectStore> = match cfg.backend {
        Backend::Local => {
            // Opening applies the schema, so --migrate only has to stop here.
            let local = LocalStore::open(&cfg.database_url, &cfg.storage_dir).await?;
            if migrate {
                tracing::info!("Database migration complete.");
                return Ok(());
            }
            Arc::new(local)
        }
        Backend::Cos => {
            if migrate {
                anyhow::bail!("--migrate only applies to the local backend");
            }
            Arc::new(CosStore::new(CosSettings {
                secret_id: cfg.secret_id.clone(),
                secret_key: cfg.secret_key.clone(),
                bucket: cfg.bucket.clone(),
                region: cfg.region.clone(),
                endpoint: cfg.endpoint.clone(),
            }))
        }
    };

    // --- Initialize core services ---
    let vfs = VirtualFs::new(store, cfg.bucket.clone(), cfg.public_host.clone());
    let files = FileService::new(vfs, cfg.routing);
    if let Err(err) = files.test_connection().await {
        tracing::warn!("Bucket connection test failed at startup: {}", err);
    }
    let app_state = state::AppState::new(files, cfg.auth_token.clone());

    // --- Build router ---
    let app: Router =
        routes::routes::routes(app_state.clone(), cfg.max_upload_bytes).with_state(app_state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
