use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use cdcr_core::{CoreError, FileFailure, FilterError, StorageError};

/// JSON error returned by every API route:
/// `{"error": {"code": ..., "message": ...}}`, plus `failures` when
/// individual files were rejected.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    failures: Vec<FileFailure>,
}

impl ApiError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: status_for(code),
            code,
            message: message.into(),
            failures: Vec::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("bad_request", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

fn status_for(code: &str) -> StatusCode {
    match code {
        "bad_request" => StatusCode::BAD_REQUEST,
        "not_found" => StatusCode::NOT_FOUND,
        "document_read_error" | "clustering_error" => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let mut api = Self::new(err.code(), err.to_string());
        if let CoreError::NoDocumentsProcessed { failures } = err {
            api.failures = failures;
        }
        api
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl From<FilterError> for ApiError {
    fn from(err: FilterError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status().is_server_error() {
            tracing::error!(code = self.code, message = %self.message, "request failed");
        } else {
            tracing::info!(code = self.code, message = %self.message, "request rejected");
        }

        let mut body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        });
        if !self.failures.is_empty() {
            body["failures"] = json!(self.failures);
        }
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdcr_core::LinkError;

    #[test]
    fn core_errors_map_to_statuses() {
        assert_eq!(ApiError::from(CoreError::NoFiles).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(CoreError::Linking(LinkError::EmptyVocabulary)).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(CoreError::Task("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(StorageError::NotFound("a.pdf".into())).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn failures_are_carried_over() {
        let failures = vec![FileFailure {
            filename: "a.pdf".into(),
            code: "document_read_error".into(),
            message: "bad".into(),
        }];
        let api = ApiError::from(CoreError::NoDocumentsProcessed { failures });
        assert_eq!(api.failures.len(), 1);
        assert_eq!(api.code, "document_read_error");
    }
}
