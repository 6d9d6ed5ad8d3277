use std::path::PathBuf;

use indexmap::IndexMap;
use thiserror::Error;

pub mod backend;
pub mod batch;
pub mod config_file;
pub mod detector;
pub mod filter;
pub mod linker;
pub mod storage;

// Re-export for convenience
pub use backend::{BackendError, PdfBackend, PlainTextBackend};
pub use batch::{BatchOutcome, DocumentError, FileFailure, Pipeline, UploadedDocument};
pub use detector::{DetectError, DetectorConfig, DetectorEngine, MentionDetector, PatternDetector};
pub use filter::{FilterError, FilterOutcome, filter_mentions};
pub use linker::{DEFAULT_DISTANCE_THRESHOLD, LinkError, LinkerConfig, link_mentions};
pub use storage::{StorageError, UploadStore, sanitize_filename};

/// Cluster label (`"0"`, `"1"`, ...) to the mentions assigned to it.
/// Iterates in insertion order, so labels stay in numeric order and a map
/// read back from JSON keeps the caller's order.
pub type ClusterMap = IndexMap<String, Vec<String>>;

/// Original filename to the mentions detected in that file, in document
/// order. Files iterate in submission order.
pub type FileMentions = IndexMap<String, Vec<String>>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("no files were uploaded")]
    NoFiles,
    #[error("none of the {} uploaded files could be processed", .failures.len())]
    NoDocumentsProcessed { failures: Vec<FileFailure> },
    #[error("clustering failed: {0}")]
    Linking(#[from] LinkError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("worker task failed: {0}")]
    Task(String),
}

impl CoreError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NoFiles | CoreError::Filter(_) => "bad_request",
            CoreError::NoDocumentsProcessed { .. } => "document_read_error",
            CoreError::Linking(_) => "clustering_error",
            CoreError::Storage(e) => e.code(),
            CoreError::Task(_) => "internal_error",
        }
    }
}

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 500;
/// Minimum span score accepted from the entity model.
pub const DEFAULT_NER_MIN_SCORE: f32 = 0.5;

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
    pub debug: bool,
    /// Request body limit for uploads, in megabytes.
    pub max_upload_mb: usize,
    pub upload_dir: PathBuf,
    /// Give every upload batch its own UUID subdirectory.
    pub scope_per_request: bool,
    pub num_workers: usize,
    pub distance_threshold: f64,
    pub include_numeric: bool,
    pub detector_engine: DetectorEngine,
    /// ONNX entity model file.
    pub ner_model: Option<PathBuf>,
    /// `tokenizer.json` for the model. Looked up next to the model when unset.
    pub ner_tokenizer: Option<PathBuf>,
    /// Entity labels to ask the model for. Empty means the built-in set.
    pub ner_labels: Vec<String>,
    pub ner_min_score: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            static_dir: PathBuf::from("static"),
            debug: false,
            max_upload_mb: DEFAULT_MAX_UPLOAD_MB,
            upload_dir: PathBuf::from("uploads"),
            scope_per_request: false,
            num_workers: default_num_workers(),
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            include_numeric: true,
            detector_engine: DetectorEngine::default(),
            ner_model: None,
            ner_tokenizer: None,
            ner_labels: Vec::new(),
            ner_min_score: DEFAULT_NER_MIN_SCORE,
        }
    }
}

impl Config {
    /// Defaults overridden by whatever the config file sets.
    pub fn from_file(file: &config_file::ConfigFile) -> Self {
        let mut config = Self::default();
        if let Some(server) = &file.server {
            if let Some(host) = &server.host {
                config.host = host.clone();
            }
            if let Some(port) = server.port {
                config.port = port;
            }
            if let Some(dir) = &server.static_dir {
                config.static_dir = PathBuf::from(dir);
            }
            if let Some(debug) = server.debug {
                config.debug = debug;
            }
            if let Some(mb) = server.max_upload_mb {
                config.max_upload_mb = mb;
            }
        }
        if let Some(storage) = &file.storage {
            if let Some(dir) = &storage.upload_dir {
                config.upload_dir = PathBuf::from(dir);
            }
            if let Some(scoped) = storage.scope_per_request {
                config.scope_per_request = scoped;
            }
        }
        if let Some(n) = file.processing.as_ref().and_then(|p| p.num_workers) {
            config.num_workers = n.max(1);
        }
        if let Some(t) = file.linking.as_ref().and_then(|l| l.distance_threshold) {
            config.distance_threshold = t;
        }
        if let Some(detection) = &file.detection {
            if let Some(numeric) = detection.include_numeric {
                config.include_numeric = numeric;
            }
            if let Some(engine) = detection.engine {
                config.detector_engine = engine;
            }
            if let Some(path) = &detection.model_path {
                config.ner_model = Some(PathBuf::from(path));
            }
            if let Some(path) = &detection.tokenizer_path {
                config.ner_tokenizer = Some(PathBuf::from(path));
            }
            if let Some(labels) = &detection.labels {
                config.ner_labels = labels.clone();
            }
            if let Some(score) = detection.min_score {
                config.ner_min_score = score;
            }
        }
        config
    }

    pub fn linker(&self) -> LinkerConfig {
        LinkerConfig {
            distance_threshold: self.distance_threshold,
        }
    }

    pub fn detector(&self) -> DetectorConfig {
        DetectorConfig {
            include_numeric: self.include_numeric,
        }
    }

    pub fn upload_store(&self) -> UploadStore {
        UploadStore::new(&self.upload_dir, self.scope_per_request)
    }
}

fn default_num_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_file::{
        ConfigFile, DetectionConfig, LinkingConfig, ProcessingConfig, ServerConfig,
    };

    #[test]
    fn defaults_match_service_conventions() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.distance_threshold, 1.5);
        assert_eq!(config.max_upload_mb, 500);
        assert!(!config.scope_per_request);
        assert!(config.include_numeric);
        assert!(config.num_workers >= 1);
        assert_eq!(config.detector_engine, DetectorEngine::Model);
        assert!(config.ner_model.is_none());
        assert_eq!(config.ner_min_score, 0.5);
    }

    #[test]
    fn detection_section_selects_model() {
        let file = ConfigFile {
            detection: Some(DetectionConfig {
                engine: Some(DetectorEngine::Model),
                model_path: Some("/models/gliner/onnx/model.onnx".into()),
                labels: Some(vec!["person".into(), "city".into()]),
                min_score: Some(0.35),
                ..Default::default()
            }),
            ..Default::default()
        };
        let config = Config::from_file(&file);
        assert_eq!(
            config.ner_model,
            Some(PathBuf::from("/models/gliner/onnx/model.onnx"))
        );
        assert!(config.ner_tokenizer.is_none());
        assert_eq!(config.ner_labels, vec!["person", "city"]);
        assert_eq!(config.ner_min_score, 0.35);
    }

    #[test]
    fn file_values_override_defaults() {
        let file = ConfigFile {
            server: Some(ServerConfig {
                port: Some(8080),
                debug: Some(true),
                ..Default::default()
            }),
            processing: Some(ProcessingConfig {
                num_workers: Some(0),
            }),
            linking: Some(LinkingConfig {
                distance_threshold: Some(0.8),
            }),
            ..Default::default()
        };
        let config = Config::from_file(&file);
        assert_eq!(config.port, 8080);
        assert!(config.debug);
        assert_eq!(config.num_workers, 1);
        assert_eq!(config.linker().distance_threshold, 0.8);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn error_codes() {
        assert_eq!(CoreError::NoFiles.code(), "bad_request");
        assert_eq!(
            CoreError::Linking(LinkError::EmptyVocabulary).code(),
            "clustering_error"
        );
        assert_eq!(
            CoreError::NoDocumentsProcessed { failures: vec![] }.code(),
            "document_read_error"
        );
        assert_eq!(
            CoreError::Storage(StorageError::NotFound("x".into())).code(),
            "not_found"
        );
    }
}
