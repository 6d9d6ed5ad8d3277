use std::sync::Arc;

use axum::Json;
use axum::extract::{Multipart, State};

use crate::error::ApiError;
use crate::models::UploadResponse;
use crate::state::AppState;
use crate::upload;

/// `POST /upload`: save, extract, detect and link one batch of documents.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let docs = upload::parse_multipart(multipart)
        .await
        .map_err(ApiError::bad_request)?;
    let outcome = state.pipeline.process_batch(docs).await?;
    Ok(Json(UploadResponse::from(outcome)))
}
