use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::analysis::spam::{SpamConfig, SpamThresholds, SpamWeights};

/// Which content-safety backend to use.
#[derive(Debug, Clone, PartialEq)]
pub enum SafetyBackend {
    /// Local ONNX model (default), no API key needed
    Onnx,
    /// Azure Text Analytics, requires AZURE_ENDPOINT and AZURE_API_KEY
    Azure,
}

/// Central configuration loaded from environment variables.
///
/// All secrets come from env vars. The .env file is loaded automatically
/// at startup via dotenvy.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    /// PostgreSQL connection URL (when set and starts with postgres://, uses Postgres backend)
    pub database_url: Option<String>,
    /// TTL for entries in the ephemeral cache tier
    pub cache_ttl: Duration,
    pub spam: SpamConfig,
    /// Object and face detections below this confidence are dropped
    pub detection_floor: f64,
    /// JSON rule table for the profanity analyzer (built-in table when unset)
    pub profanity_rules: Option<PathBuf>,
    /// JSON keyword pattern lists for the spam analyzer (built-in lists when unset)
    pub spam_patterns: Option<PathBuf>,
    /// Independent timeout applied to every remote adapter call
    pub adapter_timeout: Duration,
    /// How long a duplicate request waits on an in-flight computation
    pub dedup_wait: Duration,
    /// Fail the request when any signal is missing instead of degrading
    pub require_all_signals: bool,
    /// Skip caching verdicts whose missing signals may come back on retry
    pub defer_transient_failures: bool,
    pub safety_backend: SafetyBackend,
    /// Directory containing the ONNX model files
    pub model_dir: PathBuf,
    pub google_api_key: String,
    pub google_nl_url: String,
    pub azure_endpoint: String,
    pub azure_api_key: String,
    /// Base URL of the image inference server (/nsfw, /objects, /faces)
    pub image_endpoint: String,
    /// Shared request rate across HTTP adapters; 0 disables pacing
    pub adapter_qps: f64,
    pub job_workers: usize,
    pub job_max_attempts: u32,
    /// How long a finished job stays queryable
    pub job_retention: Duration,
    /// Accepted X-API-Key values; empty disables key checking
    pub api_keys: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Everything has a default; malformed numbers are an error naming
    /// the offending variable.
    pub fn load() -> Result<Self> {
        let safety_backend = match env::var("SIFT_CONTENT_SAFETY").as_deref() {
            Ok("azure") => SafetyBackend::Azure,
            Ok("onnx") | Err(_) => SafetyBackend::Onnx,
            Ok(other) => anyhow::bail!(
                "SIFT_CONTENT_SAFETY must be \"azure\" or \"onnx\", got \"{}\"",
                other
            ),
        };

        let model_dir = env::var("SIFT_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| crate::signals::download::default_model_dir());

        let defaults = SpamThresholds::default();
        let thresholds = SpamThresholds {
            spam: parse_env("SIFT_SPAM_THRESHOLD", defaults.spam)?,
            repetition: parse_env("SIFT_REPETITION_THRESHOLD", defaults.repetition)?,
            link_density: parse_env("SIFT_LINK_DENSITY_THRESHOLD", defaults.link_density)?,
            monetization: parse_env("SIFT_MONETIZATION_THRESHOLD", defaults.monetization)?,
            urgency: parse_env("SIFT_URGENCY_THRESHOLD", defaults.urgency)?,
            deception: parse_env("SIFT_DECEPTION_THRESHOLD", defaults.deception)?,
        };

        let default_weights = SpamWeights::default();
        let weights = SpamWeights {
            repetition: parse_env("SIFT_SPAM_WEIGHT_REPETITION", default_weights.repetition)?,
            formatting: parse_env("SIFT_SPAM_WEIGHT_FORMATTING", default_weights.formatting)?,
            links: parse_env("SIFT_SPAM_WEIGHT_LINKS", default_weights.links)?,
            patterns: parse_env("SIFT_SPAM_WEIGHT_PATTERNS", default_weights.patterns)?,
        };

        Ok(Self {
            db_path: env::var("SIFT_DB_PATH").unwrap_or_else(|_| "./sift.db".to_string()),
            database_url: env::var("DATABASE_URL").ok(),
            cache_ttl: Duration::from_secs(parse_env("SIFT_CACHE_TTL_SECS", 3600)?),
            spam: SpamConfig::new(thresholds, weights),
            detection_floor: parse_env("SIFT_DETECTION_FLOOR", 0.5)?,
            profanity_rules: env::var("SIFT_PROFANITY_RULES").ok().map(PathBuf::from),
            spam_patterns: env::var("SIFT_SPAM_PATTERNS").ok().map(PathBuf::from),
            adapter_timeout: Duration::from_millis(parse_env("SIFT_ADAPTER_TIMEOUT_MS", 5000)?),
            dedup_wait: Duration::from_millis(parse_env("SIFT_DEDUP_WAIT_MS", 30_000)?),
            require_all_signals: parse_flag("SIFT_REQUIRE_ALL_SIGNALS")?,
            defer_transient_failures: parse_flag("SIFT_DEFER_TRANSIENT_FAILURES")?,
            safety_backend,
            model_dir,
            google_api_key: env::var("GOOGLE_API_KEY").unwrap_or_default(),
            google_nl_url: env::var("GOOGLE_NL_URL")
                .unwrap_or_else(|_| crate::signals::google::DEFAULT_GOOGLE_NL_URL.to_string()),
            azure_endpoint: env::var("AZURE_ENDPOINT").unwrap_or_default(),
            azure_api_key: env::var("AZURE_API_KEY").unwrap_or_default(),
            image_endpoint: env::var("SIFT_IMAGE_ENDPOINT").unwrap_or_default(),
            adapter_qps: parse_env("SIFT_ADAPTER_QPS", 10.0)?,
            job_workers: parse_env("SIFT_JOB_WORKERS", 4)?,
            job_max_attempts: parse_env("SIFT_JOB_MAX_ATTEMPTS", 3)?,
            job_retention: Duration::from_secs(parse_env("SIFT_JOB_RETENTION_SECS", 3600)?),
            api_keys: parse_list(&env::var("SIFT_API_KEYS").unwrap_or_default()),
        })
    }

    /// Check that the chosen content-safety backend has what it needs.
    pub fn require_safety_backend(&self) -> Result<()> {
        match self.safety_backend {
            SafetyBackend::Onnx => {
                if !crate::signals::download::model_files_present(&self.model_dir) {
                    anyhow::bail!(
                        "ONNX model files not found in {}\n\
                         Run `sift download-model` to download them.\n\
                         Or set SIFT_CONTENT_SAFETY=azure to use Azure Text Analytics instead.",
                        self.model_dir.display()
                    );
                }
                Ok(())
            }
            SafetyBackend::Azure => self.require_azure(),
        }
    }

    /// Check that Azure credentials are configured.
    pub fn require_azure(&self) -> Result<()> {
        if self.azure_endpoint.is_empty() || self.azure_api_key.is_empty() {
            anyhow::bail!(
                "AZURE_ENDPOINT and AZURE_API_KEY must both be set. Add them to your .env file."
            );
        }
        Ok(())
    }
}

/// Parse an env var, falling back to `default` when unset or empty.
fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => parse_value(name, &raw),
        _ => Ok(default),
    }
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("Invalid value for {name}: \"{raw}\""))
}

fn parse_flag(name: &str) -> Result<bool> {
    match env::var(name) {
        Ok(raw) => parse_bool(name, &raw),
        Err(_) => Ok(false),
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("Invalid value for {name}: \"{raw}\" (expected true or false)"),
    }
}

/// Split a comma-separated list, dropping blanks.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_names_variable() {
        let err = parse_value::<u64>("SIFT_CACHE_TTL_SECS", "soon").unwrap_err();
        assert!(format!("{err:#}").contains("SIFT_CACHE_TTL_SECS"));
    }

    #[test]
    fn test_parse_value_trims() {
        let v: f64 = parse_value("X", " 0.25 ").unwrap();
        assert!((v - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_parse_bool_variants() {
        assert!(parse_bool("F", "true").unwrap());
        assert!(parse_bool("F", "YES").unwrap());
        assert!(parse_bool("F", "1").unwrap());
        assert!(!parse_bool("F", "off").unwrap());
        assert!(!parse_bool("F", "").unwrap());
        assert!(parse_bool("F", "maybe").is_err());
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list("a, b,,c "), vec!["a", "b", "c"]);
        assert!(parse_list("").is_empty());
        assert!(parse_list(" , ").is_empty());
    }
}
