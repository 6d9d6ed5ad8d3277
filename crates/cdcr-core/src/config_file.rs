use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::detector::DetectorEngine;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub server: Option<ServerConfig>,
    pub storage: Option<StorageConfig>,
    pub processing: Option<ProcessingConfig>,
    pub linking: Option<LinkingConfig>,
    pub detection: Option<DetectionConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub static_dir: Option<String>,
    pub debug: Option<bool>,
    pub max_upload_mb: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    pub upload_dir: Option<String>,
    pub scope_per_request: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub num_workers: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkingConfig {
    pub distance_threshold: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub include_numeric: Option<bool>,
    /// `"model"` or `"pattern"`.
    pub engine: Option<DetectorEngine>,
    pub model_path: Option<String>,
    pub tokenizer_path: Option<String>,
    pub labels: Option<Vec<String>>,
    pub min_score: Option<f32>,
}

/// Platform config directory path: `<config_dir>/cdcr/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cdcr").join("config.toml"))
}

/// Load config by cascading CWD `.cdcr.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".cdcr.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// Pick `field` from `overlay`, falling back to `base`.
fn pick<S, T>(
    base: &Option<S>,
    overlay: &Option<S>,
    field: impl Fn(&S) -> Option<T>,
) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&field)
        .or_else(|| base.as_ref().and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        server: Some(ServerConfig {
            host: pick(&base.server, &overlay.server, |s| s.host.clone()),
            port: pick(&base.server, &overlay.server, |s| s.port),
            static_dir: pick(&base.server, &overlay.server, |s| s.static_dir.clone()),
            debug: pick(&base.server, &overlay.server, |s| s.debug),
            max_upload_mb: pick(&base.server, &overlay.server, |s| s.max_upload_mb),
        }),
        storage: Some(StorageConfig {
            upload_dir: pick(&base.storage, &overlay.storage, |s| s.upload_dir.clone()),
            scope_per_request: pick(&base.storage, &overlay.storage, |s| s.scope_per_request),
        }),
        processing: Some(ProcessingConfig {
            num_workers: pick(&base.processing, &overlay.processing, |p| p.num_workers),
        }),
        linking: Some(LinkingConfig {
            distance_threshold: pick(&base.linking, &overlay.linking, |l| l.distance_threshold),
        }),
        detection: Some(DetectionConfig {
            include_numeric: pick(&base.detection, &overlay.detection, |d| d.include_numeric),
            engine: pick(&base.detection, &overlay.detection, |d| d.engine),
            model_path: pick(&base.detection, &overlay.detection, |d| d.model_path.clone()),
            tokenizer_path: pick(&base.detection, &overlay.detection, |d| {
                d.tokenizer_path.clone()
            }),
            labels: pick(&base.detection, &overlay.detection, |d| d.labels.clone()),
            min_score: pick(&base.detection, &overlay.detection, |d| d.min_score),
        }),
    }
}
