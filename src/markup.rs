//! Markup stripping for oracle replies
//!
//! Replies are broadcast as plain chat text, so markdown decoration and
//! reasoning blocks are removed before anything else sees them.

use once_cell::sync::Lazy;
use regex::Regex;

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

fn rule(pattern: &str, replacement: &'static str) -> Rule {
    Rule {
        pattern: Regex::new(pattern).expect("static markup pattern"),
        replacement,
    }
}

// Order matters: fences before inline code, images before links.
static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(r"(?s)<think>.*?</think>", ""),
        rule(r"(?s)```.*?```", ""),
        rule(r"`([^`]+)`", "$1"),
        rule(r"#{1,6}\s?", ""),
        rule(r"\*\*([^*]+)\*\*", "$1"),
        rule(r"_([^_]+)_", "$1"),
        rule(r"\*([^*]+)\*", "$1"),
        rule(r"(?m)^\s*[-*+]\s+", ""),
        rule(r"(?m)^\s*\d+\.\s+", ""),
        rule(r"!\[([^\]]*)\]\([^)]+\)", ""),
        rule(r"\[([^\]]+)\]\([^)]+\)", "$1"),
        rule(r"(?m)^\s*>\s+", ""),
        rule(r"(?m)^\s*[-*_]{3,}\s*$", ""),
        rule(r"\n{3,}", "\n\n"),
    ]
});

/// Strip markdown decoration, returning trimmed plain text
pub fn strip_markup(text: &str) -> String {
    let mut out = text.to_string();
    for rule in RULES.iter() {
        out = rule.pattern.replace_all(&out, rule.replacement).into_owned();
    }
    out.trim().to_string()
}
