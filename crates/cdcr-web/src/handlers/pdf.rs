use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use cdcr_core::StorageError;

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /pdf/{filename}`: a file from the flat upload directory.
pub async fn pdf(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    serve_upload(&state, None, &filename).await
}

/// `GET /pdf/{batch_id}/{filename}`: a file from a request-scoped directory.
pub async fn scoped_pdf(
    State(state): State<Arc<AppState>>,
    Path((batch_id, filename)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    serve_upload(&state, Some(&batch_id), &filename).await
}

async fn serve_upload(
    state: &AppState,
    batch_id: Option<&str>,
    filename: &str,
) -> Result<Response, ApiError> {
    let path = state.store().resolve(batch_id, filename)?;
    let bytes = tokio::fs::read(&path).await.map_err(StorageError::Io)?;
    Ok(([(header::CONTENT_TYPE, "application/pdf")], bytes).into_response())
}
