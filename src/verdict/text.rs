// Text verdict aggregation.
//
// Toxicity sub-scores are a fixed linear mapping of the content-safety
// `negative` confidence. Changing a coefficient changes every stored verdict's
// meaning, so treat it as a behavioral change that needs re-validation.

use crate::analysis::profanity::ProfanityReport;
use crate::analysis::spam::SpamAnalysisResult;
use crate::signals::traits::{LanguageGuess, SafetyScores, SentimentScore};

use super::types::{
    Classification, Language, Sentiment, SentimentLabel, Signal, TextModerationResult, Toxicity,
    ToxicityCategories,
};

pub const HATE_COEFFICIENT: f64 = 0.8;
pub const HARASSMENT_COEFFICIENT: f64 = 0.6;
pub const THREAT_COEFFICIENT: f64 = 0.7;

/// Sentiment beyond ±0.2 (strictly) is labeled positive / negative.
pub const SENTIMENT_LABEL_THRESHOLD: f64 = 0.2;

/// Content-safety label the toxicity scores are derived from.
pub const NEGATIVE_LABEL: &str = "negative";

/// Language reported when detection failed.
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Everything the text aggregator consumes. `None` marks a failed remote signal.
#[derive(Debug, Clone)]
pub struct TextSignals {
    pub sentiment: Option<SentimentScore>,
    pub content_safety: Option<SafetyScores>,
    pub language: Option<LanguageGuess>,
    pub profanity: ProfanityReport,
    pub spam: SpamAnalysisResult,
}

pub fn sentiment_label(score: f64) -> SentimentLabel {
    if score > SENTIMENT_LABEL_THRESHOLD {
        SentimentLabel::Positive
    } else if score < -SENTIMENT_LABEL_THRESHOLD {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    }
}

/// Combine text signals into a verdict. Missing signals fall back to
/// neutral values and are listed in `missing_signals`.
pub fn aggregate_text(signals: TextSignals) -> TextModerationResult {
    let mut missing = Vec::new();

    let sentiment = match signals.sentiment {
        Some(s) => Sentiment {
            score: s.score,
            magnitude: s.magnitude,
            label: sentiment_label(s.score),
        },
        None => {
            missing.push(Signal::Sentiment);
            Sentiment {
                score: 0.0,
                magnitude: 0.0,
                label: SentimentLabel::Neutral,
            }
        }
    };

    let (classifications, negative) = match signals.content_safety {
        Some(scores) => {
            let negative = scores.get(NEGATIVE_LABEL).copied().unwrap_or(0.0);
            // BTreeMap iteration is already sorted by label
            let classifications = scores
                .into_iter()
                .map(|(category, confidence)| Classification {
                    category,
                    confidence,
                })
                .collect();
            (classifications, negative)
        }
        None => {
            missing.push(Signal::ContentSafety);
            (Vec::new(), 0.0)
        }
    };

    let language = match signals.language {
        Some(guess) => Language {
            detected: guess.code,
            confidence: guess.confidence,
        },
        None => {
            missing.push(Signal::Language);
            Language {
                detected: UNKNOWN_LANGUAGE.to_string(),
                confidence: 0.0,
            }
        }
    };

    TextModerationResult {
        classifications,
        toxicity: Toxicity {
            score: negative,
            categories: ToxicityCategories {
                hate: negative * HATE_COEFFICIENT,
                harassment: negative * HARASSMENT_COEFFICIENT,
                profanity: signals.profanity.score,
                threat: negative * THREAT_COEFFICIENT,
            },
        },
        sentiment,
        spam: signals.spam,
        language,
        missing_signals: missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::spam::{analyze_with_reputation, SpamConfig};
    use std::collections::BTreeMap;

    fn signals(content_safety: Option<SafetyScores>) -> TextSignals {
        TextSignals {
            sentiment: Some(SentimentScore {
                score: -0.5,
                magnitude: 1.2,
            }),
            content_safety,
            language: Some(LanguageGuess {
                code: "en".into(),
                confidence: 0.99,
            }),
            profanity: ProfanityReport {
                score: 0.25,
                matches: BTreeMap::new(),
                match_count: 1,
                severity: 1.0,
                contains_profanity: true,
            },
            spam: analyze_with_reputation(&SpamConfig::default(), "hi", 0.0),
        }
    }

    #[test]
    fn test_toxicity_coefficients() {
        let scores = BTreeMap::from([("negative".to_string(), 0.5)]);
        let result = aggregate_text(signals(Some(scores)));
        assert_eq!(result.toxicity.score, 0.5);
        assert!((result.toxicity.categories.hate - 0.4).abs() < 1e-12);
        assert!((result.toxicity.categories.harassment - 0.3).abs() < 1e-12);
        assert!((result.toxicity.categories.threat - 0.35).abs() < 1e-12);
        assert_eq!(result.toxicity.categories.profanity, 0.25);
        assert!(result.missing_signals.is_empty());
    }

    #[test]
    fn test_classifications_sorted_by_label() {
        let scores = BTreeMap::from([
            ("positive".to_string(), 0.1),
            ("negative".to_string(), 0.7),
            ("neutral".to_string(), 0.2),
        ]);
        let result = aggregate_text(signals(Some(scores)));
        let labels: Vec<&str> = result
            .classifications
            .iter()
            .map(|c| c.category.as_str())
            .collect();
        assert_eq!(labels, vec!["negative", "neutral", "positive"]);
    }

    #[test]
    fn test_missing_content_safety_zeroes_toxicity() {
        let result = aggregate_text(signals(None));
        assert!(result.classifications.is_empty());
        assert_eq!(result.toxicity.score, 0.0);
        assert_eq!(result.toxicity.categories.hate, 0.0);
        // Profanity is local and still reported
        assert_eq!(result.toxicity.categories.profanity, 0.25);
        assert_eq!(result.missing_signals, vec![Signal::ContentSafety]);
    }

    #[test]
    fn test_label_thresholds() {
        assert_eq!(sentiment_label(0.5), SentimentLabel::Positive);
        assert_eq!(sentiment_label(-0.5), SentimentLabel::Negative);
        assert_eq!(sentiment_label(0.0), SentimentLabel::Neutral);
        assert_eq!(sentiment_label(-0.2), SentimentLabel::Neutral);
        assert_eq!(sentiment_label(-0.2001), SentimentLabel::Negative);
    }
}
