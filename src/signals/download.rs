// Model download helper for the local content-safety classifier.
//
// Fetches the quantized unbiased-toxic-roberta model and its tokenizer from
// HuggingFace into a platform data directory
// (~/.local/share/sift/models/ on Linux) so they persist across runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

const MODEL_HF_URL: &str = "https://huggingface.co/protectai/unbiased-toxic-roberta-onnx/resolve/main";

pub const MODEL_FILE: &str = "model_quantized.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Platform data directory for model files.
pub fn default_model_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sift")
        .join("models")
}

/// Both the model and the tokenizer are on disk.
pub fn model_files_present(dir: &Path) -> bool {
    dir.join(MODEL_FILE).exists() && dir.join(TOKENIZER_FILE).exists()
}

/// Download any missing model files into `dir`.
pub async fn download_model(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create model directory: {}", dir.display()))?;

    for (file, large) in [(TOKENIZER_FILE, false), (MODEL_FILE, true)] {
        let dest = dir.join(file);
        if dest.exists() {
            info!(file, "Model file already exists, skipping");
            println!("  {} (already exists)", file);
            continue;
        }
        println!("  Downloading {}...", file);
        download_file(&format!("{MODEL_HF_URL}/{file}"), &dest, large).await?;
    }

    Ok(())
}

async fn download_file(url: &str, dest: &Path, show_progress: bool) -> Result<()> {
    let response = reqwest::Client::new()
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to download {}", url))?;

    if !response.status().is_success() {
        anyhow::bail!("Download failed with status {}: {}", response.status(), url);
    }

    let pb = match (show_progress, response.content_length()) {
        (true, Some(size)) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("    [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                    .context("invalid progress template")?
                    .progress_chars("=> "),
            );
            Some(pb)
        }
        (true, None) => Some(ProgressBar::new_spinner()),
        (false, _) => None,
    };

    let bytes = response
        .bytes()
        .await
        .context("Failed to read response body")?;

    if let Some(pb) = pb {
        pb.set_position(bytes.len() as u64);
        pb.finish_and_clear();
    }

    std::fs::write(dest, &bytes).with_context(|| format!("Failed to write {}", dest.display()))?;
    info!("Downloaded {} to {}", url, dest.display());
    Ok(())
}
