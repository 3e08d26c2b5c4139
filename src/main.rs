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

use services::storage_service::S3ObjectStore;
use state::{AppState, StageTimeouts};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting imagx with config: {:?}", cfg);

    // --- Storage client, shared across requests ---
    let store = S3ObjectStore::connect(&cfg.region, cfg.s3_endpoint.as_deref()).await;
    tracing::debug!(
        region = %cfg.region,
        endpoint = cfg.s3_endpoint.as_deref().unwrap_or("default"),
        "S3 client ready"
    );

    let state = AppState::new(
        Arc::new(store),
        StageTimeouts {
            fetch: cfg.fetch_timeout,
            transform: cfg.transform_timeout,
        },
    );

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

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

    tracing::info!("Server imagx listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
