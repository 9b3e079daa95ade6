// Unit tests for the in-process text and image analyzers.
//
// Tests isolated pure functions: profanity scoring against a known rule
// table, spam categorization and the combined-score formula, fingerprint
// determinism, and image container sniffing.

use std::collections::HashMap;

use sift::analysis::image_meta::{detect_format, dimensions, Dimensions, ImageFormat};
use sift::analysis::profanity::ProfanityRules;
use sift::analysis::spam::{
    analyze_with_reputation, combined_score, SpamCategory, SpamConfig, SpamThresholds,
    SpamWeights,
};
use sift::fingerprint::{cache_key, fingerprint, Content, ContentType};

// ============================================================
// Profanity
// ============================================================

fn damn_at_severity_two() -> ProfanityRules {
    ProfanityRules::new(
        ["damn"],
        HashMap::from([("damn".to_string(), 2)]),
        Vec::<String>::new(),
    )
    .unwrap()
}

#[test]
fn profanity_reference_example() {
    let report = damn_at_severity_two().analyze("this is a damn mess damn");

    // severity sum 4 over 5 tokens: 4 / (5 * 3)
    assert!((report.score - 4.0 / 15.0).abs() < 1e-9, "got {}", report.score);
    assert!(report.contains_profanity);
    assert_eq!(report.matches.len(), 1);
    assert_eq!(report.matches["damn"], 2);
    assert_eq!(report.match_count, 2);
    assert_eq!(report.severity, 2.0);
}

#[test]
fn profanity_severity_averages_over_word_and_pattern_hits() {
    let rules = ProfanityRules::new(
        ["damn"],
        HashMap::from([("damn".to_string(), 2)]),
        [r"sh[i1!\*]+t+"],
    )
    .unwrap();
    let report = rules.analyze("damn, sh1t happens");

    assert_eq!(report.match_count, 2);
    assert_eq!(report.severity, 1.0);
    // only the word adds severity: 2 / (3 * 3)
    assert!((report.score - 2.0 / 9.0).abs() < 1e-9);
}

#[test]
fn profanity_is_case_insensitive() {
    let report = damn_at_severity_two().analyze("DAMN it");
    assert_eq!(report.matches["damn"], 1);
}

#[test]
fn profanity_unlisted_severity_defaults_to_one() {
    let rules = ProfanityRules::new(["heck"], HashMap::new(), Vec::<String>::new()).unwrap();
    let report = rules.analyze("heck heck heck");
    // 3 / (3 * 3)
    assert!((report.score - 1.0 / 3.0).abs() < 1e-9);
    assert_eq!(report.severity, 1.0);
}

#[test]
fn profanity_patterns_flag_without_scoring() {
    let rules = ProfanityRules::new(Vec::<String>::new(), HashMap::new(), [r"f+u+d+g+e+"]).unwrap();
    let report = rules.analyze("oh fuuudge");
    assert!(report.contains_profanity);
    assert_eq!(report.score, 0.0);
    assert!(report.matches.is_empty());
}

#[test]
fn profanity_clean_text_scores_zero() {
    let report = ProfanityRules::builtin().analyze("a perfectly pleasant sentence");
    assert_eq!(report.score, 0.0);
    assert!(!report.contains_profanity);
}

#[test]
fn profanity_invalid_pattern_is_load_error() {
    let err = ProfanityRules::from_json(r#"{"words": ["x"], "patterns": ["("]}"#).unwrap_err();
    assert!(format!("{err:#}").contains("Invalid profanity pattern"));
}

#[test]
fn profanity_rule_file_format() {
    let rules = ProfanityRules::from_json(
        r#"{"words": ["blast"], "patterns": [], "severityLevels": {"blast": 3}}"#,
    )
    .unwrap();
    let report = rules.analyze("blast");
    assert_eq!(report.score, 1.0);
    assert_eq!(report.severity, 3.0);
}

// ============================================================
// Spam
// ============================================================

#[test]
fn spam_repetition_and_links_categorized() {
    let config = SpamConfig::new(
        SpamThresholds {
            link_density: 0.02,
            ..SpamThresholds::default()
        },
        SpamWeights::default(),
    );
    let text = "Wow!!!!!! see http://spam.example";
    let result = analyze_with_reputation(&config, text, 0.0);

    assert!(result.categories.contains(&SpamCategory::ExcessiveRepetition));
    assert!(result.categories.contains(&SpamCategory::ExcessiveLinks));
    assert_eq!(result.indicators.links.count, 1);
    assert!(result.indicators.repetition.punctuation >= 1);
}

#[test]
fn spam_plain_text_is_clean() {
    let result = analyze_with_reputation(
        &SpamConfig::default(),
        "Meeting moved to Thursday afternoon, see you there.",
        0.0,
    );
    assert!(!result.is_spam);
    assert!(result.categories.is_empty());
    assert_eq!(result.confidence, 0.0);
}

#[test]
fn spam_category_serializes_snake_case() {
    let json = serde_json::to_string(&SpamCategory::ArtificialUrgency).unwrap();
    assert_eq!(json, "\"artificial_urgency\"");
}

#[test]
fn spam_suspicious_urls_raise_link_score() {
    let config = SpamConfig::default();
    let text = "details at https://example.org/some/long/path/for/the/article";
    let calm = analyze_with_reputation(&config, text, 0.0);
    let flagged = analyze_with_reputation(&config, text, 1.0);

    // links group saturates at 1.0 with a fully suspicious URL
    assert!(flagged.confidence > calm.confidence);
    assert!((flagged.confidence - calm.confidence) <= SpamWeights::default().links + 1e-9);
}

#[test]
fn spam_combined_score_respects_weights() {
    let config = SpamConfig::default();
    let result = analyze_with_reputation(&config, "free free free", 0.0);

    let no_patterns = SpamWeights {
        patterns: 0.0,
        ..SpamWeights::default()
    };
    let reweighted = combined_score(&result.indicators, &no_patterns, &config.thresholds);
    assert!(reweighted < result.confidence);
}

// ============================================================
// Fingerprints
// ============================================================

#[test]
fn fingerprint_distinguishes_near_identical_content() {
    let corpus = ["hello", "hello ", "Hello", "hello\n", "hellp"];
    let mut seen = std::collections::HashSet::new();
    for text in corpus {
        assert!(seen.insert(fingerprint(text.as_bytes())), "collision on {text:?}");
    }
}

#[test]
fn image_fingerprint_uses_base64_form() {
    let bytes = vec![0x89, b'P', b'N', b'G'];
    let image = Content::Image(bytes.clone());
    assert_eq!(image.canonical_bytes(), b"iVBORw==".to_vec());
    assert_ne!(image.fingerprint(), fingerprint(&bytes));
}

#[test]
fn cache_key_layout() {
    let fp = fingerprint(b"abc");
    let key = cache_key(ContentType::Text, &fp);
    assert_eq!(key, format!("moderation:text:{}", fp.to_hex()));
    assert_eq!(fp.to_hex().len(), 64);
}

// ============================================================
// Image metadata
// ============================================================

fn png_header(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
    bytes
}

#[test]
fn png_format_and_dimensions() {
    let bytes = png_header(640, 480);
    assert_eq!(detect_format(&bytes), Some(ImageFormat::Png));
    assert_eq!(
        dimensions(ImageFormat::Png, &bytes),
        Some(Dimensions {
            width: 640,
            height: 480
        })
    );
}

#[test]
fn unknown_container_not_detected() {
    assert_eq!(detect_format(b"%PDF-1.7"), None);
}
