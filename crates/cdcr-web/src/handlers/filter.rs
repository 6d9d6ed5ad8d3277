use axum::Json;
use axum::extract::rejection::JsonRejection;

use cdcr_core::{FilterOutcome, filter_mentions};

use crate::error::ApiError;
use crate::models::FilterRequest;

/// `POST /filter`: substring search over a previous upload result.
pub async fn filter(
    payload: Result<Json<FilterRequest>, JsonRejection>,
) -> Result<Json<FilterOutcome>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let value = request
        .filter_value
        .ok_or_else(|| ApiError::bad_request("filterValue is required"))?;

    tracing::debug!(
        value = %value,
        option = ?request.filter_option,
        clusters = request.clusters.len(),
        files = request.file_mentions.len(),
        "filtering mentions"
    );
    let outcome = filter_mentions(&value, &request.clusters, &request.file_mentions)?;
    Ok(Json(outcome))
}
