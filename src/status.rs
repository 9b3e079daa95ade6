// System status display: durable-tier stats and signal adapter readiness.

use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::output::terminal;
use crate::signals::SignalBackends;

/// Display system status to the terminal.
pub async fn show(config: &Config, db: &Arc<dyn Database>, backends: &SignalBackends) -> Result<()> {
    if config.database_url.is_some() {
        println!("Database: PostgreSQL");
    } else {
        let file_size = std::fs::metadata(Path::new(&config.db_path))
            .map(|m| format_bytes(m.len()))
            .unwrap_or_else(|_| "unknown".to_string());
        println!("Database: {} ({})", config.db_path, file_size);
    }

    let counts = db.classification_counts().await?;
    println!(
        "Stored verdicts: {} total ({} text, {} image)",
        counts.total(),
        counts.text,
        counts.image
    );
    println!("Cache TTL: {}s", config.cache_ttl.as_secs());

    println!("\nSignal adapters:");
    for (name, readiness) in &backends.readiness {
        let state = if readiness.is_ready() {
            readiness.to_string().green()
        } else {
            readiness.to_string().yellow()
        };
        println!("  {:<16} {}", name, state);
    }

    println!();
    terminal::display_recent(&db.recent_classifications(5).await?);

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
