//! Wiring shared by the `govqa` and `govqa-indexer` binaries.

use std::sync::Arc;

use govqa_core::config::{Config, LoggingConfig, Settings};
use govqa_core::ChatModel;
use govqa_embed::HashingEmbedder;
use govqa_hybrid::{Orchestrator, TermOverlapReranker};
use govqa_vector::FlatIndexer;
use tracing_subscriber::EnvFilter;

/// Reads `config.toml`, `config.<env>.toml` and `APP_*`, with paths resolved
/// against the working directory.
pub fn load_settings() -> anyhow::Result<Settings> {
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let mut settings = config.settings()?;
    settings.resolve_paths(&std::env::current_dir()?);
    Ok(settings)
}

/// `RUST_LOG` wins over `logging.level`. Logs go to stderr so answers on
/// stdout stay clean.
pub fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

pub fn build_orchestrator(settings: Settings, chat: Arc<dyn ChatModel>) -> anyhow::Result<Orchestrator> {
    let dim = settings.embedding.dim;
    let embedder = Arc::new(HashingEmbedder::new(dim)?);
    let indexer = Arc::new(FlatIndexer::new(dim));
    Ok(Orchestrator::new(settings, embedder, indexer, chat).with_reranker(Arc::new(TermOverlapReranker)))
}
