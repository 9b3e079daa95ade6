// Profanity matcher: word list with per-word severity plus regex patterns.
//
// The score is a heuristic normalization, not a probability:
//
//   score = severity_sum / (token_count * 3), clamped to 1.0
//
// where severity_sum adds each matched word's severity (1 when the word has
// no entry in the severity map). Pattern hits never add severity, but they
// count toward the raw match count, so they dilute the average severity:
//
//   severity = severity_sum / match_count,  match_count = word hits + pattern hits
//
// Tokens are runs of alphanumerics; single-character tokens are ignored, so
// "this is a damn mess damn" is five tokens.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// Per-word severities run 1 (mild) to 3 (severe); the normalizer divides by 3.
const MAX_SEVERITY: f64 = 3.0;

/// Rule table as stored on disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuleFile {
    #[serde(default)]
    words: Vec<String>,
    #[serde(default)]
    patterns: Vec<String>,
    #[serde(default)]
    severity_levels: HashMap<String, u32>,
}

/// Compiled profanity rules.
#[derive(Debug, Clone)]
pub struct ProfanityRules {
    words: HashSet<String>,
    severity: HashMap<String, u32>,
    patterns: Vec<Regex>,
}

/// Result of a profanity scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfanityReport {
    pub score: f64,
    /// Matched vocabulary word -> occurrence count
    pub matches: BTreeMap<String, u32>,
    /// Word hits plus pattern hits
    pub match_count: u32,
    /// Severity sum over `match_count`, 0 without matches
    pub severity: f64,
    pub contains_profanity: bool,
}

impl ProfanityRules {
    /// Compile a rule table. Words are lowercased; patterns must be valid regexes.
    pub fn new<W, P>(words: W, severity: HashMap<String, u32>, patterns: P) -> Result<Self>
    where
        W: IntoIterator,
        W::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                Regex::new(p).with_context(|| format!("Invalid profanity pattern: {p}"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            words: words
                .into_iter()
                .map(|w| w.as_ref().to_lowercase())
                .collect(),
            severity: severity
                .into_iter()
                .map(|(w, s)| (w.to_lowercase(), s))
                .collect(),
            patterns,
        })
    }

    /// Load a JSON rule table: `{"words": [...], "patterns": [...], "severityLevels": {...}}`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read profanity rules at {}", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("Failed to load profanity rules from {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: RuleFile = serde_json::from_str(raw).context("Malformed profanity rule table")?;
        Self::new(file.words, file.severity_levels, file.patterns)
    }

    /// Load from `path` when given, otherwise the built-in table.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::builtin()),
        }
    }

    /// Small built-in table used when no rule file is configured.
    pub fn builtin() -> Self {
        let severity = BUILTIN_WORDS
            .iter()
            .map(|(w, s)| (w.to_string(), *s))
            .collect();
        Self {
            words: BUILTIN_WORDS.iter().map(|(w, _)| w.to_string()).collect(),
            severity,
            patterns: BUILTIN_PATTERNS
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
        }
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Scan `text` and score it.
    pub fn analyze(&self, text: &str) -> ProfanityReport {
        let lower = text.to_lowercase();
        let tokens = tokenize(&lower);

        let mut matches: BTreeMap<String, u32> = BTreeMap::new();
        let mut severity_sum: u32 = 0;
        let mut word_hits: u32 = 0;

        for token in &tokens {
            if self.words.contains(*token) {
                *matches.entry(token.to_string()).or_insert(0) += 1;
                severity_sum += self.severity.get(*token).copied().unwrap_or(1);
                word_hits += 1;
            }
        }

        let pattern_hits: u32 = self
            .patterns
            .iter()
            .map(|re| re.find_iter(&lower).count() as u32)
            .sum();
        let match_count = word_hits + pattern_hits;

        let score = if tokens.is_empty() || severity_sum == 0 {
            0.0
        } else {
            (severity_sum as f64 / (tokens.len() as f64 * MAX_SEVERITY)).min(1.0)
        };

        let severity = if match_count == 0 {
            0.0
        } else {
            severity_sum as f64 / match_count as f64
        };

        ProfanityReport {
            score,
            matches,
            match_count,
            severity,
            contains_profanity: match_count > 0,
        }
    }
}

fn tokenize(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .collect()
}

const BUILTIN_WORDS: &[(&str, u32)] = &[
    ("damn", 1),
    ("hell", 1),
    ("crap", 1),
    ("piss", 2),
    ("bastard", 2),
    ("bitch", 2),
    ("shit", 2),
    ("asshole", 3),
    ("fuck", 3),
    ("fucking", 3),
    ("motherfucker", 3),
];

const BUILTIN_PATTERNS: &[&str] = &[r"f+[u\*@]+c+k+", r"sh[i1!\*]+t+", r"b[i1!\*]+t?ch"];

#[cfg(test)]
mod tests {
    use super::*;

    fn damn_rules() -> ProfanityRules {
        let severity = HashMap::from([("damn".to_string(), 2)]);
        ProfanityRules::new(["damn"], severity, Vec::<String>::new()).unwrap()
    }

    #[test]
    fn test_tokenize_ignores_single_chars() {
        assert_eq!(
            tokenize("this is a damn mess damn"),
            vec!["this", "is", "damn", "mess", "damn"]
        );
    }

    #[test]
    fn test_unknown_severity_defaults_to_one() {
        let rules = ProfanityRules::new(["heck"], HashMap::new(), Vec::<String>::new()).unwrap();
        let report = rules.analyze("oh heck no");
        // "oh" "heck" "no" = 3 tokens, severity 1
        assert!((report.score - 1.0 / 9.0).abs() < 1e-12);
        assert_eq!(report.severity, 1.0);
    }

    #[test]
    fn test_clean_text_scores_zero() {
        let report = damn_rules().analyze("a perfectly pleasant sentence");
        assert_eq!(report.score, 0.0);
        assert!(!report.contains_profanity);
        assert!(report.matches.is_empty());
    }

    #[test]
    fn test_case_insensitive() {
        let report = damn_rules().analyze("DAMN it");
        assert_eq!(report.matches.get("damn"), Some(&1));
    }

    #[test]
    fn test_pattern_hit_does_not_add_severity() {
        let rules =
            ProfanityRules::new(Vec::<String>::new(), HashMap::new(), [r"f+u+d+g+e+"]).unwrap();
        let report = rules.analyze("oh fuuudge");
        assert!(report.contains_profanity);
        assert_eq!(report.score, 0.0);
        assert!(report.matches.is_empty());
    }

    #[test]
    fn test_pattern_hits_count_toward_severity() {
        let severity = HashMap::from([("darn".to_string(), 3)]);
        let rules = ProfanityRules::new(["darn"], severity, [r"f+u+d+g+e+"]).unwrap();
        let report = rules.analyze("darn this fuuudge");
        assert_eq!(report.match_count, 2);
        // one word at 3, one pattern at 0
        assert_eq!(report.severity, 1.5);
        // "darn" "this" "fuuudge" = 3 tokens
        assert!((report.score - 3.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_score_clamped_to_one() {
        let severity = HashMap::from([("x1".to_string(), 50)]);
        let rules = ProfanityRules::new(["x1"], severity, Vec::<String>::new()).unwrap();
        assert_eq!(rules.analyze("x1").score, 1.0);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let result = ProfanityRules::new(["a"], HashMap::new(), ["(unclosed"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_json() {
        let rules = ProfanityRules::from_json(
            r#"{"words": ["Darn"], "patterns": [], "severityLevels": {"darn": 3}}"#,
        )
        .unwrap();
        let report = rules.analyze("darn darn");
        assert_eq!(report.matches.get("darn"), Some(&2));
        assert_eq!(report.severity, 3.0);
        assert_eq!(report.score, 1.0);
    }

    #[test]
    fn test_builtin_patterns_compile() {
        let rules = ProfanityRules::builtin();
        assert_eq!(rules.patterns.len(), BUILTIN_PATTERNS.len());
        assert!(rules.word_count() > 0);
        assert!(rules.analyze("sh1t happens").contains_profanity);
    }
}
