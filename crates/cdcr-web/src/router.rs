use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

use crate::handlers;
use crate::state::AppState;

/// API routes plus the single-page front end from `static_dir`. Paths that
/// match no route and no static file get `index.html`.
pub fn build_router(state: Arc<AppState>, static_dir: &Path, max_upload_bytes: usize) -> Router {
    let spa = ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        .route("/upload", post(handlers::upload::upload))
        .route("/filter", post(handlers::filter::filter))
        .route("/pdf/{filename}", get(handlers::pdf::pdf))
        .route("/pdf/{batch_id}/{filename}", get(handlers::pdf::scoped_pdf))
        .fallback_service(spa)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
