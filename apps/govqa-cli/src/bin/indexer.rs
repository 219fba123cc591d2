use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use govqa_cli::{build_orchestrator, init_logging, load_settings};
use govqa_core::{ChatMessage, ChatModel, Error, Result};
use govqa_hybrid::{indexes_present, Progress};

#[derive(Parser)]
#[command(name = "govqa-indexer", about = "Build the vector and BM25 indexes from the corpus")]
struct Cli {
    /// Rebuild even when both index files exist
    #[arg(long)]
    force: bool,
    /// Only report which index files exist
    #[arg(long)]
    check_only: bool,
    /// Texts per embedding call (overrides embedding.batch_size)
    #[arg(long)]
    batch_size: Option<usize>,
}

/// The indexer never answers questions, so it needs no API key.
struct NoChat;

#[async_trait]
impl ChatModel for NoChat {
    async fn generate(&self, _messages: &[ChatMessage]) -> Result<String> {
        Err(Error::Generation("the indexer does not generate answers".to_string()))
    }
}

fn presence(label: &str, path: &Path) {
    let mark = if path.exists() { "✅" } else { "❌" };
    println!("{} {}: {}", mark, label, path.display());
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings()?;
    init_logging(&settings.logging);
    if let Some(batch_size) = cli.batch_size {
        settings.embedding.batch_size = batch_size.max(1);
    }

    println!("GovQA Indexer\n=============");
    presence("Data directory", &settings.paths.data_dir);
    presence("Vector index", &settings.paths.vector_index);
    presence("BM25 index", &settings.paths.sparse_index);

    let ready = indexes_present(&settings);
    if cli.check_only {
        println!("\nReady: {}", if ready { "yes" } else { "no" });
        return Ok(());
    }
    if ready && !cli.force {
        println!("\nIndexes already present; use --force to rebuild.");
        return Ok(());
    }
    if !settings.paths.data_dir.is_dir() {
        anyhow::bail!("data directory not found: {}", settings.paths.data_dir.display());
    }

    let orch = build_orchestrator(settings, Arc::new(NoChat))?;
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} embedded ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let report: Progress<'_> = &|done: usize, total: usize| {
        bar.set_length(total as u64);
        bar.set_position(done as u64);
    };
    let snapshot = orch.rebuild_with_progress(Some(report)).await?;
    bar.finish_and_clear();

    println!("\n✅ Indexing completed: {} documents (generation {})", snapshot.vector.len(), snapshot.generation);
    println!("💡 Ask a question with: cargo run --bin govqa -- ask \"<câu hỏi>\"");
    Ok(())
}
