use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use docshare_tokens::TokenService;

pub mod accounts;
pub mod blobs;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod notify;
pub mod store;

use crate::blobs::BlobStore;
use crate::config::GatewayConfig;
use crate::notify::Notifier;
use crate::store::DataStore;

pub struct AppState {
    pub config: GatewayConfig,
    pub tokens: TokenService,
    pub store: Arc<dyn DataStore>,
    pub blobs: BlobStore,
    pub notifier: Arc<dyn Notifier>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    let client: Router<Arc<AppState>> = Router::new()
        .route("/signup", post(handlers::auth::signup))
        .route("/verify-email", get(handlers::auth::verify_email))
        .route("/login", post(handlers::auth::client_login))
        .route("/list-files", get(handlers::files::list_files))
        .route("/download-file/:file_id", get(handlers::files::download_link))
        .route("/download-by-token", get(handlers::download::download_by_token));

    let operation: Router<Arc<AppState>> = Router::new()
        .route("/login", post(handlers::auth::operation_login))
        .route("/upload-file", post(handlers::files::upload_file));

    Router::new()
        .route("/", get(root))
        .route("/readyz", get(health_check))
        .nest("/client", client)
        .nest("/operation", operation)
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Welcome to Secure File Sharing API"
    }))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "docshare-gateway",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
