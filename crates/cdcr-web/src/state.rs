use cdcr_core::{Pipeline, UploadStore};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub pipeline: Pipeline,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    pub fn store(&self) -> &UploadStore {
        self.pipeline.store()
    }
}
