use serde::{Deserialize, Serialize};

use cdcr_core::{BatchOutcome, ClusterMap, FileFailure, FileMentions};

// ── Upload ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub file_mentions: FileMentions,
    pub clusters: ClusterMap,
    /// Processed filenames in submission order.
    pub file_paths: Vec<String>,
    pub failures: Vec<FileFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
}

impl From<BatchOutcome> for UploadResponse {
    fn from(outcome: BatchOutcome) -> Self {
        UploadResponse {
            file_mentions: outcome.file_mentions,
            clusters: outcome.clusters,
            file_paths: outcome.processed,
            failures: outcome.failures,
            batch_id: outcome.batch_id.map(|id| id.to_string()),
        }
    }
}

// ── Filter ──────────────────────────────────────────────────────────────

/// Body of `POST /filter`. Field names follow the front end's camelCase.
#[derive(Debug, Clone, Deserialize)]
pub struct FilterRequest {
    /// Accepted for compatibility; has no effect on matching.
    #[serde(rename = "filterOption", default)]
    pub filter_option: Option<String>,
    #[serde(rename = "filterValue", default)]
    pub filter_value: Option<String>,
    #[serde(default)]
    pub clusters: ClusterMap,
    #[serde(default)]
    pub file_mentions: FileMentions,
}
