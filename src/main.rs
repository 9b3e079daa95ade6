use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use sift::config::Config;
use sift::fingerprint::Content;
use sift::jobs::{JobQueue, JobStatus};
use sift::pipeline::{parse_batch, BatchItem, ModerateOptions, Moderator};
use sift::verdict::Verdict;

/// sift: content moderation with memoized verdicts.
///
/// Scores text and images for toxicity, spam, profanity, sentiment and
/// NSFW content. Identical content is only ever analyzed once.
#[derive(Parser)]
#[command(name = "sift", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Moderate a piece of text (use "-" to read stdin)
    Text {
        text: String,

        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,

        /// Fail instead of returning a verdict with missing signals
        #[arg(long)]
        require_all_signals: bool,
    },

    /// Moderate an image file (jpeg, png, gif or webp)
    Image {
        path: PathBuf,

        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,

        /// Fail instead of returning a verdict with missing signals
        #[arg(long)]
        require_all_signals: bool,
    },

    /// Moderate a JSON file of `{"type", "content"}` items through the job queue
    Batch {
        file: PathBuf,

        /// Print one JSON line per item instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Show system status (stored verdicts, signal adapter readiness)
    Status,

    /// Download the ONNX content-safety model (~126 MB)
    DownloadModel,

    /// Start the HTTP API
    #[cfg(feature = "web")]
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sift=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            info!("Initializing sift database...");
            let config = Config::load()?;
            let db = sift::db::connect(&config, true).await?;
            let table_count = db.table_count().await?;
            match &config.database_url {
                Some(_) => println!("Database initialized (PostgreSQL)"),
                None => println!("Database initialized at: {}", config.db_path),
            }
            println!("Tables: {table_count}");

            if let Err(e) = config.require_safety_backend() {
                println!("\n{} {}", "Note:".yellow().bold(), e);
            }
            println!("\nsift is ready. Try: sift text \"hello world\"");
        }

        Commands::Text {
            text,
            json,
            require_all_signals,
        } => {
            let text = if text == "-" {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("Failed to read text from stdin")?;
                buf
            } else {
                text
            };

            let config = Config::load()?;
            let moderator = build_moderator(&config).await?;
            let content = Content::Text(text);
            let verdict = moderator
                .moderate(content.clone(), &cli_options(require_all_signals))
                .await?;
            print_verdict(&verdict, &content, json)?;
        }

        Commands::Image {
            path,
            json,
            require_all_signals,
        } => {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to read image {}", path.display()))?;

            let config = Config::load()?;
            let moderator = build_moderator(&config).await?;
            let content = Content::Image(bytes);
            let verdict = moderator
                .moderate(content.clone(), &cli_options(require_all_signals))
                .await?;
            print_verdict(&verdict, &content, json)?;
        }

        Commands::Batch { file, json } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let items: Vec<BatchItem> = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a JSON array of items", file.display()))?;
            let items = parse_batch(items)?;
            if items.is_empty() {
                println!("Nothing to moderate.");
                return Ok(());
            }

            let config = Config::load()?;
            let moderator = build_moderator(&config).await?;
            let queue = JobQueue::start(moderator, config.job_workers, config.job_max_attempts);
            run_batch(&queue, items, json).await?;
            queue.shutdown().await;
        }

        Commands::Status => {
            let config = Config::load()?;
            let db = sift::db::connect(&config, false).await?;
            let backends = sift::signals::SignalBackends::from_config(&config);
            sift::status::show(&config, &db, &backends).await?;
        }

        Commands::DownloadModel => {
            let config = Config::load()?;
            let model_dir = &config.model_dir;

            println!("Downloading ONNX content-safety model...");
            println!("  Destination: {}", model_dir.display());

            sift::signals::download::download_model(model_dir).await?;

            println!("\n{}", "Model downloaded successfully.".bold());
            println!("Local content-safety scoring is now available.");
        }

        #[cfg(feature = "web")]
        Commands::Serve { port, bind } => {
            let config = Config::load()?;
            let moderator = build_moderator(&config).await?;
            let jobs = Arc::new(
                JobQueue::start(
                    Arc::clone(&moderator),
                    config.job_workers,
                    config.job_max_attempts,
                )
                .with_retention(config.job_retention),
            );
            let state = sift::web::AppState::new(moderator, jobs, config.api_keys.clone());
            sift::web::run_server(state, port, &bind).await?;
        }
    }

    Ok(())
}

async fn build_moderator(config: &Config) -> Result<Arc<Moderator>> {
    let db = sift::db::connect(config, true).await?;
    let moderator = Moderator::from_config(config, db)?;
    if !moderator.backends().all_ready() {
        warn!("Some signal adapters are unavailable; verdicts will list them as missing");
    }
    Ok(Arc::new(moderator))
}

fn cli_options(require_all_signals: bool) -> ModerateOptions {
    ModerateOptions {
        // Only override the configured default when the flag is given
        require_all_signals: require_all_signals.then_some(true),
        metadata: [("source".to_string(), "cli".to_string())].into(),
    }
}

fn print_verdict(verdict: &Verdict, content: &Content, json: bool) -> Result<()> {
    let fingerprint = content.fingerprint().to_hex();
    if json {
        let out = serde_json::json!({
            "contentType": verdict.content_type(),
            "fingerprint": fingerprint,
            "result": verdict,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        if let Content::Text(text) = content {
            println!("{}", sift::output::truncate_chars(text, 120).dimmed());
        }
        sift::output::terminal::display_verdict(verdict, &fingerprint);
    }
    Ok(())
}

async fn run_batch(queue: &JobQueue, items: Vec<Content>, json: bool) -> Result<()> {
    let fingerprints: Vec<String> = items.iter().map(|c| c.fingerprint().to_hex()).collect();
    let options = cli_options(false);
    let ids = queue.submit_batch(items, options).await?;

    let pb = ProgressBar::new(ids.len() as u64);
    pb.set_style(ProgressStyle::default_bar().template("  Moderating [{bar:30}] {pos}/{len} ({eta})")?);

    let mut completed = 0usize;
    let mut failed = 0usize;
    let mut degraded = 0usize;

    for (id, fingerprint) in ids.iter().zip(&fingerprints) {
        let status = queue.wait(id).await;
        pb.inc(1);

        match &status {
            Some(JobStatus::Completed { verdict }) => {
                completed += 1;
                if verdict.is_degraded() {
                    degraded += 1;
                }
            }
            _ => failed += 1,
        }

        if json {
            pb.suspend(|| {
                println!(
                    "{}",
                    serde_json::json!({ "fingerprint": fingerprint, "status": status })
                );
            });
        }
    }
    pb.finish_and_clear();

    if !json {
        println!(
            "{} {} completed ({} degraded), {} failed",
            "Batch finished:".bold(),
            completed,
            degraded,
            failed
        );
    }
    Ok(())
}
