//! Upload batch orchestration.
//!
//! Every file in a batch is saved, extracted and scanned for mentions on its
//! own worker task. Mentions from the files that succeeded are then pooled
//! in submission order and linked once.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::backend::{BackendError, PdfBackend};
use crate::detector::{DetectError, MentionDetector};
use crate::linker::{LinkerConfig, link_mentions};
use crate::storage::{BatchDir, StorageError, UploadStore};
use crate::{ClusterMap, Config, CoreError, FileMentions};

/// A file received in an upload request.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub filename: String,
    pub data: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }
}

/// Why a single document dropped out of its batch.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("could not save upload: {0}")]
    Storage(#[from] StorageError),
    #[error("could not read document: {0}")]
    Read(#[from] BackendError),
    #[error("mention detection failed: {0}")]
    Detect(#[from] DetectError),
    #[error("worker task failed: {0}")]
    Task(String),
}

impl DocumentError {
    pub fn code(&self) -> &'static str {
        match self {
            DocumentError::Storage(e) => e.code(),
            DocumentError::Read(_) => "document_read_error",
            DocumentError::Detect(_) | DocumentError::Task(_) => "internal_error",
        }
    }
}

/// Per-file failure as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub filename: String,
    pub code: String,
    pub message: String,
}

impl FileFailure {
    fn new(filename: String, error: &DocumentError) -> Self {
        Self {
            filename,
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Result of one upload batch.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Present when the batch was stored in its own subdirectory.
    pub batch_id: Option<Uuid>,
    pub file_mentions: FileMentions,
    pub clusters: ClusterMap,
    /// Filenames that were processed, in submission order.
    pub processed: Vec<String>,
    pub failures: Vec<FileFailure>,
}

impl BatchOutcome {
    pub fn mention_count(&self) -> usize {
        self.file_mentions.values().map(Vec::len).sum()
    }
}

/// Extraction, detection and linking wired together.
#[derive(Clone)]
pub struct Pipeline {
    backend: Arc<dyn PdfBackend>,
    detector: Arc<dyn MentionDetector>,
    linker: LinkerConfig,
    store: UploadStore,
    num_workers: usize,
}

impl Pipeline {
    pub fn new(
        backend: Arc<dyn PdfBackend>,
        detector: Arc<dyn MentionDetector>,
        store: UploadStore,
    ) -> Self {
        Self {
            backend,
            detector,
            linker: LinkerConfig::default(),
            store,
            num_workers: 1,
        }
    }

    /// Pipeline with the storage, linking and worker settings in `config`.
    pub fn from_config(
        config: &Config,
        backend: Arc<dyn PdfBackend>,
        detector: Arc<dyn MentionDetector>,
    ) -> Self {
        Self::new(backend, detector, config.upload_store())
            .with_linker(config.linker())
            .with_num_workers(config.num_workers)
    }

    pub fn with_linker(mut self, linker: LinkerConfig) -> Self {
        self.linker = linker;
        self
    }

    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers.max(1);
        self
    }

    pub fn store(&self) -> &UploadStore {
        &self.store
    }

    /// Process one upload batch end to end.
    ///
    /// Files sharing a name are collapsed first; the last one wins but keeps
    /// the position of the first. A file that cannot be saved or read is
    /// reported in [`BatchOutcome::failures`] and contributes no mentions.
    /// The batch fails only when no files were given, when every file
    /// failed, or when linking fails.
    pub async fn process_batch(
        &self,
        docs: Vec<UploadedDocument>,
    ) -> Result<BatchOutcome, CoreError> {
        if docs.is_empty() {
            return Err(CoreError::NoFiles);
        }
        let docs = dedupe_by_filename(docs);
        let batch = self.store.begin_batch()?;
        tracing::info!(
            files = docs.len(),
            workers = self.num_workers,
            batch_id = ?batch.batch_id,
            detector = self.detector.detector_id(),
            "processing upload batch"
        );

        let semaphore = Arc::new(Semaphore::new(self.num_workers));
        let tasks: Vec<_> = docs
            .into_iter()
            .map(|doc| {
                let filename = doc.filename.clone();
                let semaphore = Arc::clone(&semaphore);
                let backend = Arc::clone(&self.backend);
                let detector = Arc::clone(&self.detector);
                let batch = batch.clone();
                let handle = tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| DocumentError::Task(e.to_string()))?;
                    tokio::task::spawn_blocking(move || {
                        process_document(&batch, backend.as_ref(), detector.as_ref(), doc)
                    })
                    .await
                    .map_err(|e| DocumentError::Task(e.to_string()))?
                });
                (filename, handle)
            })
            .collect();

        // Await in submission order so pooling is deterministic.
        let mut outcome = BatchOutcome {
            batch_id: batch.batch_id,
            ..Default::default()
        };
        let mut pooled: Vec<String> = Vec::new();
        for (filename, handle) in tasks {
            let result = handle
                .await
                .unwrap_or_else(|e| Err(DocumentError::Task(e.to_string())));
            match result {
                Ok(mentions) => {
                    tracing::debug!(file = %filename, mentions = mentions.len(), "document processed");
                    pooled.extend(mentions.iter().cloned());
                    outcome.processed.push(filename.clone());
                    outcome.file_mentions.insert(filename, mentions);
                }
                Err(e) => {
                    tracing::warn!(file = %filename, code = e.code(), error = %e, "document failed");
                    outcome.failures.push(FileFailure::new(filename, &e));
                }
            }
        }

        if outcome.processed.is_empty() {
            return Err(CoreError::NoDocumentsProcessed {
                failures: outcome.failures,
            });
        }

        let linker = self.linker.clone();
        let mention_total = pooled.len();
        outcome.clusters = tokio::task::spawn_blocking(move || link_mentions(&pooled, &linker))
            .await
            .map_err(|e| CoreError::Task(e.to_string()))??;

        tracing::info!(
            files = outcome.processed.len(),
            failed = outcome.failures.len(),
            mentions = mention_total,
            clusters = outcome.clusters.len(),
            "batch linked"
        );
        Ok(outcome)
    }
}

/// Save, extract and detect for a single document. Runs on a blocking thread.
fn process_document(
    batch: &BatchDir,
    backend: &dyn PdfBackend,
    detector: &dyn MentionDetector,
    doc: UploadedDocument,
) -> Result<Vec<String>, DocumentError> {
    let path = batch.save(&doc.filename, &doc.data)?;
    let text = backend.extract_text(&path)?;
    Ok(detector.detect(&text)?)
}

fn dedupe_by_filename(docs: Vec<UploadedDocument>) -> Vec<UploadedDocument> {
    let mut unique: Vec<UploadedDocument> = Vec::with_capacity(docs.len());
    for doc in docs {
        match unique.iter_mut().find(|d| d.filename == doc.filename) {
            Some(existing) => {
                tracing::debug!(file = %doc.filename, "duplicate filename in batch, keeping the later upload");
                *existing = doc;
            }
            None => unique.push(doc),
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_keeps_last_data_at_first_position() {
        let docs = vec![
            UploadedDocument::new("a.pdf", "first"),
            UploadedDocument::new("b.pdf", "b"),
            UploadedDocument::new("a.pdf", "second"),
        ];
        let unique = dedupe_by_filename(docs);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].filename, "a.pdf");
        assert_eq!(unique[0].data, b"second");
        assert_eq!(unique[1].filename, "b.pdf");
    }

    #[test]
    fn document_error_codes() {
        let read = DocumentError::Read(BackendError::OpenError("bad".into()));
        assert_eq!(read.code(), "document_read_error");
        let name = DocumentError::Storage(StorageError::InvalidFilename("..".into()));
        assert_eq!(name.code(), "bad_request");
        let failure = FileFailure::new("x.pdf".into(), &read);
        assert_eq!(failure.code, "document_read_error");
        assert!(failure.message.contains("bad"));
        let detect = DocumentError::Detect(DetectError::Inference("shape".into()));
        assert_eq!(detect.code(), "internal_error");
    }
}
