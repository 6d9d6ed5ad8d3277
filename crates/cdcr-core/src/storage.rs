//! On-disk upload directory.
//!
//! Files are saved under their original name, either flat in the upload
//! root or inside a per-batch UUID subdirectory when request scoping is on.

use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("invalid filename: {0:?}")]
    InvalidFilename(String),
    #[error("invalid batch id: {0:?}")]
    InvalidBatchId(String),
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::InvalidFilename(_) | StorageError::InvalidBatchId(_) => "bad_request",
            StorageError::NotFound(_) => "not_found",
            StorageError::Io(_) => "storage_error",
        }
    }
}

/// Accept a client-supplied filename only if it names a single entry
/// directly inside a directory.
pub fn sanitize_filename(name: &str) -> Result<&str, StorageError> {
    let rejected = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if rejected {
        return Err(StorageError::InvalidFilename(name.to_string()));
    }
    Ok(name)
}

/// Upload root plus the layout policy.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
    scope_per_request: bool,
}

/// Directory receiving one batch's files.
#[derive(Debug, Clone)]
pub struct BatchDir {
    pub dir: PathBuf,
    /// Set only when the batch has its own subdirectory.
    pub batch_id: Option<Uuid>,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>, scope_per_request: bool) -> Self {
        Self {
            root: root.into(),
            scope_per_request,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scope_per_request(&self) -> bool {
        self.scope_per_request
    }

    /// Create (if needed) the directory for a new batch.
    pub fn begin_batch(&self) -> Result<BatchDir, StorageError> {
        let (dir, batch_id) = if self.scope_per_request {
            let id = Uuid::new_v4();
            (self.root.join(id.to_string()), Some(id))
        } else {
            (self.root.clone(), None)
        };
        std::fs::create_dir_all(&dir)?;
        Ok(BatchDir { dir, batch_id })
    }

    /// Locate a previously uploaded file. `batch_id` selects a scoped
    /// subdirectory; `None` reads from the flat root.
    pub fn resolve(&self, batch_id: Option<&str>, filename: &str) -> Result<PathBuf, StorageError> {
        let filename = sanitize_filename(filename)?;
        let dir = match batch_id {
            Some(raw) => {
                let id = Uuid::parse_str(raw)
                    .map_err(|_| StorageError::InvalidBatchId(raw.to_string()))?;
                self.root.join(id.to_string())
            }
            None => self.root.clone(),
        };
        let path = dir.join(filename);
        if !path.is_file() {
            return Err(StorageError::NotFound(filename.to_string()));
        }
        Ok(path)
    }
}

impl BatchDir {
    /// Write `data` as `filename` inside this batch directory.
    pub fn save(&self, filename: &str, data: &[u8]) -> Result<PathBuf, StorageError> {
        let path = self.dir.join(sanitize_filename(filename)?);
        std::fs::write(&path, data)?;
        Ok(path)
    }
}
