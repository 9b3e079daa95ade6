// Colored terminal output for verdicts.
//
// This module handles all terminal-specific formatting. The main.rs command
// handlers delegate here.

use colored::Colorize;

use crate::analysis::spam::SpamAnalysisResult;
use crate::db::models::ClassificationRecord;
use crate::verdict::types::{ImageAnalysisResult, SentimentLabel, TextModerationResult};
use crate::verdict::Verdict;

/// Display a verdict in the terminal.
pub fn display_verdict(verdict: &Verdict, fingerprint: &str) {
    match verdict {
        Verdict::Text(result) => display_text_result(result, fingerprint),
        Verdict::Image(result) => display_image_result(result, fingerprint),
    }

    let missing = verdict.missing_signals();
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|s| s.as_str()).collect();
        println!(
            "\n  {} missing signals (neutral defaults used): {}",
            "!".yellow().bold(),
            names.join(", ")
        );
    }
}

fn display_text_result(result: &TextModerationResult, fingerprint: &str) {
    println!("\n{}", "=== Text Moderation ===".bold());
    println!("  Fingerprint: {}", fingerprint.dimmed());

    let tox = &result.toxicity;
    println!("\n  Toxicity: {}", colorize_score(tox.score));
    println!(
        "    hate {:.2}  harassment {:.2}  profanity {:.2}  threat {:.2}",
        tox.categories.hate, tox.categories.harassment, tox.categories.profanity, tox.categories.threat,
    );

    let label = match result.sentiment.label {
        SentimentLabel::Positive => "positive".green(),
        SentimentLabel::Neutral => "neutral".normal(),
        SentimentLabel::Negative => "negative".red(),
    };
    println!(
        "  Sentiment: {} (score {:.2}, magnitude {:.2})",
        label, result.sentiment.score, result.sentiment.magnitude
    );
    println!(
        "  Language: {} ({:.2})",
        result.language.detected, result.language.confidence
    );

    display_spam(&result.spam);

    if !result.classifications.is_empty() {
        println!("\n  Classifications:");
        for c in &result.classifications {
            println!("    {:<20} {:.3}", c.category, c.confidence);
        }
    }
}

fn display_spam(spam: &SpamAnalysisResult) {
    let verdict = if spam.is_spam {
        "SPAM".red().bold()
    } else {
        "not spam".green()
    };
    println!(
        "  Spam: {} (confidence {})",
        verdict,
        colorize_score(spam.confidence)
    );
    if !spam.categories.is_empty() {
        let names: Vec<&str> = spam.categories.iter().map(|c| c.as_str()).collect();
        println!("    categories: {}", names.join(", "));
    }
    let i = &spam.indicators;
    println!(
        "    repetition {}/{}/{}  links {} (density {:.3})  patterns {:.2}/{:.2}/{:.2}",
        i.repetition.characters,
        i.repetition.words,
        i.repetition.punctuation,
        i.links.count,
        i.links.density,
        i.patterns.monetization,
        i.patterns.urgency,
        i.patterns.deception,
    );
}

fn display_image_result(result: &ImageAnalysisResult, fingerprint: &str) {
    println!("\n{}", "=== Image Moderation ===".bold());
    println!("  Fingerprint: {}", fingerprint.dimmed());

    let meta = &result.metadata;
    println!(
        "  {} {}x{}, {} bytes",
        meta.format, meta.dimensions.width, meta.dimensions.height, meta.size
    );

    let nsfw = &result.nsfw;
    println!("\n  NSFW: {}", colorize_score(nsfw.score));
    println!(
        "    adult {:.2}  suggestive {:.2}  violence {:.2}  hate {:.2}",
        nsfw.categories.adult,
        nsfw.categories.suggestive,
        nsfw.categories.violence,
        nsfw.categories.hate,
    );

    if result.objects.is_empty() {
        println!("  Objects: none");
    } else {
        println!("  Objects:");
        for o in &result.objects {
            println!(
                "    {:<16} {:.2}  at ({:.0}, {:.0}) {:.0}x{:.0}",
                o.class, o.confidence, o.bbox.x, o.bbox.y, o.bbox.width, o.bbox.height
            );
        }
    }
    println!("  Faces: {}", result.faces.count);
}

/// Display recently stored records (used by `sift status`).
pub fn display_recent(records: &[ClassificationRecord]) {
    if records.is_empty() {
        println!("Recent classifications: none yet");
        return;
    }
    println!("Recent classifications:");
    for r in records {
        println!(
            "  {:<5} {}  {}",
            r.content_type.as_str(),
            &r.fingerprint[..r.fingerprint.len().min(16)],
            r.created_at.dimmed()
        );
    }
}

/// Green under 0.3, yellow under 0.7, red above.
fn colorize_score(score: f64) -> colored::ColoredString {
    let text = format!("{score:.2}");
    if score >= 0.7 {
        text.red().bold()
    } else if score >= 0.3 {
        text.yellow()
    } else {
        text.green()
    }
}
