// Local content-safety classifier using Detoxify's unbiased-toxic-roberta.
//
// Runs on the local CPU with no network dependency, so the content-safety
// signal stays available when cloud credentials are absent. The model emits
// seven toxicity attributes; we report each one as a label and alias the
// headline `toxicity` attribute as `negative`, which is the label the verdict
// aggregator derives hate / harassment / threat from.
//
// Model: protectai/unbiased-toxic-roberta-onnx (quantized)

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::debug;

use super::download::{MODEL_FILE, TOKENIZER_FILE};
use super::traits::{ContentSafetyClassifier, SafetyScores};

/// Attribute labels in the order the model returns them.
const LABEL_ORDER: [&str; 7] = [
    "toxicity",
    "severe_toxicity",
    "obscene",
    "identity_attack",
    "insult",
    "threat",
    "sexual_explicit",
];

/// RoBERTa caps sequences at 512 tokens.
const MAX_TOKENS: usize = 512;

pub struct OnnxSafetyClassifier {
    // ort::Session::run takes &mut self and spawn_blocking needs 'static,
    // hence Arc<Mutex<_>>.
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
}

impl OnnxSafetyClassifier {
    /// Load the model and tokenizer from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join(MODEL_FILE);
        let tokenizer_path = model_dir.join(TOKENIZER_FILE);

        if !model_path.exists() {
            anyhow::bail!(
                "Model file not found: {}\nRun `sift download-model` to download it.",
                model_path.display()
            );
        }
        if !tokenizer_path.exists() {
            anyhow::bail!(
                "Tokenizer file not found: {}\nRun `sift download-model` to download it.",
                tokenizer_path.display()
            );
        }

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(&model_path)
            .with_context(|| format!("Failed to load ONNX model from {}", model_path.display()))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;

        debug!("Loaded ONNX content-safety model from {}", model_dir.display());

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
        })
    }
}

#[async_trait]
impl ContentSafetyClassifier for OnnxSafetyClassifier {
    async fn classify(&self, text: &str) -> Result<SafetyScores> {
        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let text = text.to_string();

        // Tokenization and inference are CPU-bound; keep them off the runtime.
        tokio::task::spawn_blocking(move || {
            let encoding = tokenizer
                .encode(text.as_str(), true)
                .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

            let len = encoding.get_ids().len().min(MAX_TOKENS);
            let input_ids: Vec<i64> = encoding.get_ids()[..len].iter().map(|&id| id as i64).collect();
            let attention_mask: Vec<i64> = encoding.get_attention_mask()[..len]
                .iter()
                .map(|&m| m as i64)
                .collect();

            let shape = [1_i64, len as i64];
            let input_ids_tensor = Tensor::from_array((shape, input_ids))
                .context("Failed to create input_ids tensor")?;
            let attention_mask_tensor = Tensor::from_array((shape, attention_mask))
                .context("Failed to create attention_mask tensor")?;

            let logits = {
                let mut session = session
                    .lock()
                    .map_err(|e| anyhow::anyhow!("Session lock poisoned: {}", e))?;

                let outputs = session
                    .run(ort::inputs! {
                        "input_ids" => input_ids_tensor,
                        "attention_mask" => attention_mask_tensor
                    })
                    .context("ONNX inference failed")?;

                // Output shape: [1, 7] raw logits
                let (_shape, data) = outputs[0]
                    .try_extract_tensor::<f32>()
                    .context("Failed to extract output tensor")?;
                data.to_vec()
            };

            if logits.len() < LABEL_ORDER.len() {
                anyhow::bail!(
                    "Model returned {} outputs, expected {}",
                    logits.len(),
                    LABEL_ORDER.len()
                );
            }

            let probabilities: Vec<f64> = logits[..LABEL_ORDER.len()]
                .iter()
                .map(|&logit| sigmoid(logit as f64))
                .collect();

            Ok(scores_to_labels(&probabilities))
        })
        .await
        .context("spawn_blocking panicked")?
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Map model probabilities to safety labels, aliasing toxicity as `negative`.
fn scores_to_labels(probabilities: &[f64]) -> SafetyScores {
    let mut scores: SafetyScores = LABEL_ORDER
        .iter()
        .zip(probabilities)
        .map(|(label, p)| (label.to_string(), *p))
        .collect();
    scores.insert("negative".to_string(), probabilities[0]);
    scores
}
