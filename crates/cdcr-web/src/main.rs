use std::sync::Arc;

use anyhow::Context;

use cdcr_core::config_file::load_config;
use cdcr_core::{Config, Pipeline};
use cdcr_ner_onnx::detector_from_config;
use cdcr_pdf_mupdf::MupdfBackend;

mod error;
mod handlers;
mod logging;
mod models;
mod router;
mod state;
mod upload;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut config = Config::from_file(&load_config());
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    logging::init_tracing(config.debug);

    anyhow::ensure!(
        config.distance_threshold.is_finite() && config.distance_threshold > 0.0,
        "linking.distance_threshold must be a positive number, got {}",
        config.distance_threshold
    );
    std::fs::create_dir_all(&config.upload_dir).with_context(|| {
        format!(
            "Failed to create upload directory {}",
            config.upload_dir.display()
        )
    })?;
    if !config.static_dir.join("index.html").is_file() {
        tracing::warn!(
            static_dir = %config.static_dir.display(),
            "index.html not found; the front end will return 404"
        );
    }

    let detector = detector_from_config(&config).context("Failed to set up mention detection")?;
    let pipeline = Pipeline::from_config(&config, Arc::new(MupdfBackend::new()), detector);
    let state = Arc::new(AppState::new(pipeline));
    let app = router::build_router(
        state,
        &config.static_dir,
        config.max_upload_mb.saturating_mul(1024 * 1024),
    );

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    tracing::info!(
        addr = %listener.local_addr()?,
        upload_dir = %config.upload_dir.display(),
        scoped = config.scope_per_request,
        workers = config.num_workers,
        detector = ?config.detector_engine,
        threshold = config.distance_threshold,
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Environment knobs layered over the config files.
fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(port) = var("PORT").and_then(|p| p.trim().parse().ok()) {
        config.port = port;
    }
    if let Some(debug) = var("CDCR_DEBUG") {
        config.debug = matches!(debug.trim().to_lowercase().as_str(), "1" | "true" | "yes");
    }
    if let Some(dir) = var("CDCR_UPLOAD_DIR").filter(|d| !d.is_empty()) {
        config.upload_dir = dir.into();
    }
    if let Some(dir) = var("CDCR_STATIC_DIR").filter(|d| !d.is_empty()) {
        config.static_dir = dir.into();
    }
    if let Some(engine) = var("CDCR_DETECTOR") {
        match engine.parse() {
            Ok(engine) => config.detector_engine = engine,
            Err(e) => tracing::warn!(error = %e, "ignoring CDCR_DETECTOR"),
        }
    }
    if let Some(path) = var("CDCR_NER_MODEL").filter(|p| !p.is_empty()) {
        config.ner_model = Some(path.into());
    }
    if let Some(path) = var("CDCR_NER_TOKENIZER").filter(|p| !p.is_empty()) {
        config.ner_tokenizer = Some(path.into());
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutting down");
}
