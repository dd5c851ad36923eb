pub mod auth;
pub mod error;
pub mod middleware;
pub mod password;
pub mod register;
pub mod staging;
pub mod tokens;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use serde_json::json;

use vidtube_db::Database;
use vidtube_media::MediaStore;

use crate::middleware::require_auth;
use crate::staging::Staging;
use crate::tokens::TokenConfig;

pub use error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub media: Arc<dyn MediaStore>,
    pub staging: Staging,
    pub tokens: TokenConfig,
    /// Set the `Secure` flag on session cookies (production only).
    pub secure_cookies: bool,
}

/// Run a blocking DB closure off the async runtime.
pub(crate) async fn db_call<F, T>(state: &AppState, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db)).await?
}

/// All HTTP routes, with state attached.
pub fn router(state: AppState) -> Router {
    // Two files plus the text fields.
    let register_limit = state.staging.max_file_bytes() * 2 + 64 * 1024;

    let public_routes = Router::new()
        .route(
            "/register",
            post(register::register).layer(DefaultBodyLimit::max(register_limit)),
        )
        .route("/login", post(auth::login))
        .route("/refresh-token", post(auth::refresh_token));

    let protected_routes = Router::new()
        .route("/logout", post(auth::logout))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .nest("/api/v1/users", public_routes.merge(protected_routes))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
