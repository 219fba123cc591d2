use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};

use govqa_cli::{build_orchestrator, init_logging, load_settings};
use govqa_core::config::Settings;
use govqa_core::ChatMessage;
use govqa_hybrid::{indexes_present, Orchestrator, Source};
use govqa_llm::OpenAiCompatClient;

#[derive(Parser)]
#[command(name = "govqa", about = "Hỏi đáp thủ tục hành chính và dịch vụ công")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer one question
    Ask {
        query: String,
        /// JSON array of prior turns: [{"role": "user", "content": "..."}]
        #[arg(long)]
        history_file: Option<PathBuf>,
        /// Wait for the full answer instead of streaming it
        #[arg(long)]
        no_stream: bool,
        /// Print the answer, contexts and sources as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive session that keeps conversation history
    Chat {
        #[arg(long)]
        no_stream: bool,
    },
    /// Show index files and configuration problems
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings()?;
    init_logging(&settings.logging);

    match cli.command {
        Command::Status => status(&settings),
        Command::Ask { query, history_file, no_stream, json } => {
            let history: Vec<ChatMessage> = match history_file {
                Some(path) => serde_json::from_str(&fs::read_to_string(&path)?)?,
                None => Vec::new(),
            };
            let stream = settings.llm.stream && !no_stream && !json;
            let orch = serve(settings)?;
            if json {
                let answer = orch.answer(&query, &history).await?;
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                ask(&orch, &query, &history, stream).await?;
            }
            Ok(())
        }
        Command::Chat { no_stream } => {
            let stream = settings.llm.stream && !no_stream;
            let orch = serve(settings)?;
            chat(&orch, stream).await
        }
    }
}

/// Refuses to start while the configuration is invalid.
fn serve(settings: Settings) -> anyhow::Result<Orchestrator> {
    settings.validate()?;
    let client = OpenAiCompatClient::new(settings.llm.clone())?;
    build_orchestrator(settings, Arc::new(client))
}

fn status(settings: &Settings) -> anyhow::Result<()> {
    let paths = &settings.paths;
    let problems = match settings.validate() {
        Ok(()) => Vec::new(),
        Err(e) => vec![e.to_string()],
    };
    let report = serde_json::json!({
        "data_dir": { "path": paths.data_dir, "present": paths.data_dir.is_dir() },
        "vector_index": { "path": paths.vector_index, "present": paths.vector_index.exists() },
        "sparse_index": { "path": paths.sparse_index, "present": paths.sparse_index.exists() },
        "hybrid_enabled": settings.hybrid.enabled,
        "fusion": settings.hybrid.fusion,
        "rerank_enabled": settings.rerank.enabled,
        "ready": indexes_present(settings),
        "model": settings.llm.model,
        "config_problems": problems,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Prints the answer and returns its text.
async fn ask(orch: &Orchestrator, query: &str, history: &[ChatMessage], stream: bool) -> anyhow::Result<String> {
    if !stream {
        let answer = orch.answer(query, history).await?;
        println!("{}", answer.answer);
        print_sources(&answer.sources);
        return Ok(answer.answer);
    }

    let mut streamed = orch.answer_stream(query, history).await?;
    let mut text = String::new();
    let mut stdout = std::io::stdout();
    while let Some(chunk) = streamed.chunks.next().await {
        let chunk = chunk?;
        write!(stdout, "{}", chunk)?;
        stdout.flush()?;
        text.push_str(&chunk);
    }
    println!();
    print_sources(&streamed.sources);
    Ok(text)
}

fn print_sources(sources: &[Source]) {
    if sources.is_empty() {
        return;
    }
    println!("\nNguồn tham khảo:");
    for source in sources {
        match &source.href {
            Some(href) => println!("  {} [{}] {} - {}", source.label, source.kind.as_str(), source.title, href),
            None => println!("  {} [{}] {}", source.label, source.kind.as_str(), source.title),
        }
    }
}

async fn chat(orch: &Orchestrator, stream: bool) -> anyhow::Result<()> {
    println!("Trợ lý Dịch vụ công. Lệnh: /status, /rebuild, /reset, /exit");
    let max_history = orch.settings().chat.max_history;
    let mut history: Vec<ChatMessage> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\nBạn: ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/exit" | "/quit" => break,
            "/reset" => {
                history.clear();
                println!("Đã xóa lịch sử trò chuyện.");
                continue;
            }
            "/status" => {
                println!("{}", serde_json::to_string_pretty(&orch.status())?);
                continue;
            }
            "/rebuild" => {
                let snapshot = orch.rebuild().await?;
                println!("Đã xây dựng lại chỉ mục: {} tài liệu (thế hệ {}).", snapshot.vector.len(), snapshot.generation);
                continue;
            }
            _ => {}
        }

        print!("Trợ lý: ");
        match ask(orch, line, &history, stream).await {
            Ok(reply) => {
                history.push(ChatMessage::user(line));
                history.push(ChatMessage::assistant(reply));
                let excess = history.len().saturating_sub(max_history);
                history.drain(..excess);
            }
            Err(e) => {
                tracing::error!(error = %e, "question failed");
                println!("\nLỗi: {}", e);
            }
        }
    }
    Ok(())
}
