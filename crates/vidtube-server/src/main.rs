mod config;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use vidtube_api::staging::{self, Staging};
use vidtube_api::{AppState, AppStateInner};
use vidtube_db::Database;
use vidtube_media::Cloudinary;

use crate::config::Config;

/// Staged uploads older than this are assumed abandoned.
const STAGING_MAX_AGE: Duration = Duration::from_secs(3600);
const STAGING_SWEEP_INTERVAL_SECS: u64 = 600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vidtube_server=debug,vidtube_api=debug,vidtube_db=info,vidtube_media=info,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let db = Database::open(&config.db_path)?;
    let media = Arc::new(Cloudinary::new(config.cloudinary.clone())?);
    let staging = Staging::new(config.temp_dir.clone(), config.max_upload_bytes).await?;

    // Background sweep of abandoned staged files
    tokio::spawn(staging::run_sweep_loop(
        staging.clone(),
        STAGING_SWEEP_INTERVAL_SECS,
        STAGING_MAX_AGE,
    ));

    let state: AppState = Arc::new(AppStateInner {
        db,
        media,
        staging,
        tokens: config.tokens.clone(),
        secure_cookies: config.production,
    });

    // Cookie-based sessions need credentials, which rules out a wildcard origin.
    let cors = match &config.cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(HeaderValue::from_str(origin)?))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true),
        None => CorsLayer::permissive(),
    };

    let app = vidtube_api::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    info!("VidTube server listening on {}", config.addr);
    info!(
        "Environment: {}",
        if config.production { "production" } else { "development" }
    );

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
