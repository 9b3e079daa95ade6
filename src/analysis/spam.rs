// Spam heuristics: repetition, formatting, links and keyword patterns.
//
// Each indicator group is computed independently from the raw text. The
// groups are then normalized to [0, 1] and combined with configurable
// weights:
//
//   repetition = min(1, (characters + words + punctuation) / 3)
//   formatting = min(1, 0.5*all_caps + 0.25*excessive_spacing + 0.25*long_lines)
//   links      = max(min(1, density / (2 * link_density_threshold)), suspicious)
//   patterns   = min(1, monetization + urgency + deception)
//
//   combined   = clamp(sum(weight_g * group_g), 0, 1)
//
// `is_spam` is `combined > thresholds.spam`. Categories are tagged from the
// raw indicators against their own thresholds, not from the combined score.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::signals::traits::UrlReputation;

/// Per-indicator thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpamThresholds {
    pub spam: f64,
    /// Compared against the total repetition count
    pub repetition: f64,
    pub link_density: f64,
    pub monetization: f64,
    pub urgency: f64,
    pub deception: f64,
}

impl Default for SpamThresholds {
    fn default() -> Self {
        Self {
            spam: 0.7,
            repetition: 0.3,
            link_density: 0.1,
            monetization: 0.4,
            urgency: 0.3,
            deception: 0.3,
        }
    }
}

/// Weights of the four indicator groups in the combined score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpamWeights {
    pub repetition: f64,
    pub formatting: f64,
    pub links: f64,
    pub patterns: f64,
}

impl Default for SpamWeights {
    fn default() -> Self {
        Self {
            repetition: 0.25,
            formatting: 0.15,
            links: 0.30,
            patterns: 0.30,
        }
    }
}

/// Keyword pattern lists per category.
#[derive(Debug, Clone)]
pub struct SpamPatterns {
    pub monetization: Vec<Regex>,
    pub urgency: Vec<Regex>,
    pub deception: Vec<Regex>,
}

impl Default for SpamPatterns {
    fn default() -> Self {
        Self {
            monetization: compile(&[
                r"(?i)\b(free|discount|save|offer|deal|limited[- ]time)\b",
                r"(?i)\b(\d+%|percent)\s+off\b",
            ]),
            urgency: compile(&[
                r"(?i)\b(urgent|hurry|limited|expires?|ending)\b",
                r"(?i)\b(today|now|soon)\s+only\b",
            ]),
            deception: compile(&[
                r"(?i)\b(guarantee|promise|risk[- ]free)\b",
                r"(?i)\b(no\s+risk|100%|absolutely)\b",
            ]),
        }
    }
}

/// Pattern lists as stored on disk. A missing category keeps the built-in list.
#[derive(Debug, Deserialize)]
struct PatternFile {
    monetization: Option<Vec<String>>,
    urgency: Option<Vec<String>>,
    deception: Option<Vec<String>>,
}

impl SpamPatterns {
    /// Load `{"monetization": [...], "urgency": [...], "deception": [...]}`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read spam patterns at {}", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("Failed to load spam patterns from {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: PatternFile = serde_json::from_str(raw).context("Malformed spam pattern file")?;
        let builtin = Self::default();
        Ok(Self {
            monetization: compile_or(file.monetization, builtin.monetization)?,
            urgency: compile_or(file.urgency, builtin.urgency)?,
            deception: compile_or(file.deception, builtin.deception)?,
        })
    }

    /// Load from `path` when given, otherwise the built-in lists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

fn compile_or(patterns: Option<Vec<String>>, fallback: Vec<Regex>) -> Result<Vec<Regex>> {
    let Some(patterns) = patterns else {
        return Ok(fallback);
    };
    patterns
        .iter()
        .map(|p| Regex::new(p).with_context(|| format!("Invalid spam pattern: {p}")))
        .collect()
}

/// Complete spam detector configuration.
#[derive(Debug, Clone, Default)]
pub struct SpamConfig {
    pub thresholds: SpamThresholds,
    pub weights: SpamWeights,
    pub patterns: SpamPatterns,
}

impl SpamConfig {
    pub fn new(thresholds: SpamThresholds, weights: SpamWeights) -> Self {
        Self {
            thresholds,
            weights,
            patterns: SpamPatterns::default(),
        }
    }

    pub fn with_patterns(mut self, patterns: SpamPatterns) -> Self {
        self.patterns = patterns;
        self
    }
}

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("URL pattern is valid"));

static WORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+").expect("word pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpamCategory {
    ExcessiveRepetition,
    ExcessiveLinks,
    Promotional,
    ArtificialUrgency,
    PotentialScam,
}

impl SpamCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpamCategory::ExcessiveRepetition => "excessive_repetition",
            SpamCategory::ExcessiveLinks => "excessive_links",
            SpamCategory::Promotional => "promotional",
            SpamCategory::ArtificialUrgency => "artificial_urgency",
            SpamCategory::PotentialScam => "potential_scam",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RepetitionIndicators {
    /// Runs of 5+ identical characters
    pub characters: u32,
    /// Immediately repeated words ("buy buy buy" counts once)
    pub words: u32,
    /// Runs of 3+ of `!`, `?`, `.`
    pub punctuation: u32,
}

impl RepetitionIndicators {
    pub fn total(&self) -> u32 {
        self.characters + self.words + self.punctuation
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattingIndicators {
    pub all_caps: bool,
    /// Whitespace runs of 3+
    pub excessive_spacing: u32,
    /// Lines over 200 characters
    pub long_lines: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkIndicators {
    pub count: u32,
    /// URLs per character
    pub density: f64,
    /// Best-effort reputation score in [0, 1]
    pub suspicious: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternIndicators {
    pub monetization: f64,
    pub urgency: f64,
    pub deception: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpamIndicators {
    pub repetition: RepetitionIndicators,
    pub formatting: FormattingIndicators,
    pub links: LinkIndicators,
    pub patterns: PatternIndicators,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpamAnalysisResult {
    pub is_spam: bool,
    pub confidence: f64,
    pub categories: Vec<SpamCategory>,
    pub indicators: SpamIndicators,
}

/// Analyze `text`, consulting `reputation` for any URLs found.
///
/// Reputation lookups are best-effort: a failure scores 0.
pub async fn analyze(
    config: &SpamConfig,
    text: &str,
    reputation: &dyn UrlReputation,
) -> SpamAnalysisResult {
    let urls = extract_urls(text);
    let suspicious = if urls.is_empty() {
        0.0
    } else {
        match reputation.suspicious_score(&urls).await {
            Ok(score) => score.clamp(0.0, 1.0),
            Err(e) => {
                debug!(error = %e, "URL reputation lookup failed, scoring 0");
                0.0
            }
        }
    };
    analyze_with_reputation(config, text, suspicious)
}

/// Pure analysis with a precomputed URL suspicion score.
pub fn analyze_with_reputation(
    config: &SpamConfig,
    text: &str,
    suspicious: f64,
) -> SpamAnalysisResult {
    let indicators = SpamIndicators {
        repetition: repetition(text),
        formatting: formatting(text),
        links: links(text, suspicious),
        patterns: patterns(config, text),
    };

    let confidence = combined_score(&indicators, &config.weights, &config.thresholds);

    SpamAnalysisResult {
        is_spam: confidence > config.thresholds.spam,
        confidence,
        categories: categorize(&indicators, &config.thresholds),
        indicators,
    }
}

/// Weighted sum of the normalized indicator groups, clamped to [0, 1].
pub fn combined_score(
    indicators: &SpamIndicators,
    weights: &SpamWeights,
    thresholds: &SpamThresholds,
) -> f64 {
    let repetition = (indicators.repetition.total() as f64 / 3.0).min(1.0);

    let fmt = &indicators.formatting;
    let formatting = (0.5 * f64::from(u8::from(fmt.all_caps))
        + 0.25 * fmt.excessive_spacing as f64
        + 0.25 * fmt.long_lines as f64)
        .min(1.0);

    let density_score = if thresholds.link_density > 0.0 {
        (indicators.links.density / (2.0 * thresholds.link_density)).min(1.0)
    } else if indicators.links.count > 0 {
        1.0
    } else {
        0.0
    };
    let links = density_score.max(indicators.links.suspicious);

    let p = &indicators.patterns;
    let patterns = (p.monetization + p.urgency + p.deception).min(1.0);

    (weights.repetition * repetition
        + weights.formatting * formatting
        + weights.links * links
        + weights.patterns * patterns)
        .clamp(0.0, 1.0)
}

fn categorize(indicators: &SpamIndicators, thresholds: &SpamThresholds) -> Vec<SpamCategory> {
    let mut categories = Vec::new();
    if indicators.repetition.total() as f64 > thresholds.repetition {
        categories.push(SpamCategory::ExcessiveRepetition);
    }
    if indicators.links.density > thresholds.link_density {
        categories.push(SpamCategory::ExcessiveLinks);
    }
    if indicators.patterns.monetization > thresholds.monetization {
        categories.push(SpamCategory::Promotional);
    }
    if indicators.patterns.urgency > thresholds.urgency {
        categories.push(SpamCategory::ArtificialUrgency);
    }
    if indicators.patterns.deception > thresholds.deception {
        categories.push(SpamCategory::PotentialScam);
    }
    categories
}

fn repetition(text: &str) -> RepetitionIndicators {
    RepetitionIndicators {
        characters: count_runs(text, 5, |prev, c| prev == Some(c) && c != '\n'),
        words: repeated_words(text),
        punctuation: count_runs(text, 3, |prev, c| {
            prev.is_some_and(is_spam_punct) && is_spam_punct(c)
        }),
    }
}

fn is_spam_punct(c: char) -> bool {
    matches!(c, '!' | '?' | '.')
}

/// Count maximal runs of at least `min_len` characters, where `continues`
/// decides whether `c` extends the run ending in `prev`. A run may only
/// start on a character that could continue itself.
fn count_runs(text: &str, min_len: usize, continues: impl Fn(Option<char>, char) -> bool) -> u32 {
    let mut runs = 0;
    let mut len = 0;
    let mut prev: Option<char> = None;

    for c in text.chars() {
        if continues(prev, c) {
            len += 1;
        } else {
            if len >= min_len {
                runs += 1;
            }
            len = if continues(Some(c), c) { 1 } else { 0 };
        }
        prev = Some(c);
    }
    if len >= min_len {
        runs += 1;
    }
    runs
}

/// Groups of a word immediately followed (across whitespace) by itself.
fn repeated_words(text: &str) -> u32 {
    let mut groups = 0;
    let mut in_group = false;
    let mut prev: Option<regex_lite::Match<'_>> = None;

    for word in WORD_PATTERN.find_iter(text) {
        let repeats = prev.is_some_and(|p| {
            let gap = &text[p.end()..word.start()];
            p.as_str() == word.as_str()
                && !gap.is_empty()
                && gap.chars().all(char::is_whitespace)
        });
        if repeats && !in_group {
            groups += 1;
        }
        in_group = repeats;
        prev = Some(word);
    }
    groups
}

fn formatting(text: &str) -> FormattingIndicators {
    let has_letters = text.chars().any(char::is_alphabetic);
    FormattingIndicators {
        all_caps: text.chars().count() > 10 && has_letters && text == text.to_uppercase(),
        excessive_spacing: count_runs(text, 3, |prev, c| {
            prev.is_some_and(char::is_whitespace) && c.is_whitespace()
        }),
        long_lines: text
            .split('\n')
            .filter(|line| line.chars().count() > 200)
            .count() as u32,
    }
}

fn extract_urls(text: &str) -> Vec<String> {
    URL_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn links(text: &str, suspicious: f64) -> LinkIndicators {
    let count = URL_PATTERN.find_iter(text).count();
    let chars = text.chars().count();
    LinkIndicators {
        count: count as u32,
        density: if chars == 0 {
            0.0
        } else {
            count as f64 / chars as f64
        },
        suspicious,
    }
}

fn patterns(config: &SpamConfig, text: &str) -> PatternIndicators {
    let words = text.split_whitespace().count().max(1) as f64;
    let density = |list: &[Regex]| -> f64 {
        let hits: usize = list.iter().map(|re| re.find_iter(text).count()).sum();
        hits as f64 / words
    };
    PatternIndicators {
        monetization: density(&config.patterns.monetization),
        urgency: density(&config.patterns.urgency),
        deception: density(&config.patterns.deception),
    }
}
