//! Router configuration for the web server.

use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use super::handlers;
use super::AppState;

/// Upload size cap: past this the request is rejected before spooling.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Request logging applied to every route by composition, not per-handler.
async fn log_request(req: Request, next: Next) -> Response {
    info!("API {} is called by url: {}", req.method(), req.uri());
    next.run(req).await
}

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Ingestion
        .route("/api/upload", post(handlers::upload))
        .route("/api/delete", post(handlers::delete_document))
        // Retrieval
        .route("/api/search", post(handlers::search))
        // Document info (chat session init)
        .route("/api/documents/:doc_id", get(handlers::document_info))
        // Listings
        .route("/api/files", get(handlers::file_list))
        .route("/api/categories", get(handlers::category_list))
        .route("/api/tags", get(handlers::tag_list))
        // Health check for container orchestration
        .route("/api/health", get(handlers::health))
        .layer(middleware::from_fn(log_request))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
