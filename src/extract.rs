//! Structured-output extraction
//!
//! Oracle replies are free text that usually embed a JSON object somewhere.
//! Extraction is strict: the first balanced `{...}` substring that
//! deserialises into the target type wins, otherwise the caller's default is
//! used and the outcome is tagged as such.

use serde::de::DeserializeOwned;
use tracing::debug;

/// Outcome of a parse-with-fallback step
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction<T> {
    /// Parsed from the oracle reply
    Parsed(T),
    /// Oracle reply unusable; conservative default substituted
    Default(T),
}

impl<T> Extraction<T> {
    pub fn into_inner(self) -> T {
        match self {
            Extraction::Parsed(v) | Extraction::Default(v) => v,
        }
    }

    pub fn get(&self) -> &T {
        match self {
            Extraction::Parsed(v) | Extraction::Default(v) => v,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Extraction::Default(_))
    }
}

/// Parse the first well-formed object in `text`, or fall back to `default()`
pub fn extract_or_default<T, F>(text: &str, default: F) -> Extraction<T>
where
    T: DeserializeOwned,
    F: FnOnce() -> T,
{
    match extract_object(text) {
        Some(value) => Extraction::Parsed(value),
        None => {
            debug!("No structured object in oracle reply ({} chars), using default", text.len());
            Extraction::Default(default())
        }
    }
}

/// First balanced `{...}` substring of `text` that deserialises into `T`
pub fn extract_object<T: DeserializeOwned>(text: &str) -> Option<T> {
    for (start, _) in text.match_indices('{') {
        if let Some(end) = balanced_end(&text[start..]) {
            let candidate = &text[start..start + end];
            if let Ok(value) = serde_json::from_str::<T>(candidate) {
                return Some(value);
            }
        }
    }
    None
}

/// Byte length of the balanced object starting at `s[0] == '{'`
fn balanced_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        kind: String,
    }

    #[test]
    fn test_extracts_embedded_object() {
        let text = "Sure! Here it is:\n{\"kind\": \"task\"}\nAnything else?";
        let sample: Sample = extract_object(text).unwrap();
        assert_eq!(sample.kind, "task");
    }

    #[test]
    fn test_skips_malformed_prefix() {
        let text = "{not json} then {\"kind\": \"chat\"}";
        let sample: Sample = extract_object(text).unwrap();
        assert_eq!(sample.kind, "chat");
    }

    #[test]
    fn test_braces_inside_strings() {
        let text = "{\"kind\": \"a } b {\"}";
        let sample: Sample = extract_object(text).unwrap();
        assert_eq!(sample.kind, "a } b {");
    }

    #[test]
    fn test_nested_object_is_returned_whole() {
        let text = "x {\"kind\": \"outer\", \"inner\": {\"kind\": \"inner\"}} y";
        let sample: Sample = extract_object(text).unwrap();
        assert_eq!(sample.kind, "outer");
    }

    #[test]
    fn test_fallback_is_tagged() {
        let out = extract_or_default("no structure here", || Sample { kind: "default".into() });
        assert!(out.is_default());
        assert_eq!(out.into_inner().kind, "default");

        let out = extract_or_default("{\"kind\":\"x\"}", || Sample { kind: "default".into() });
        assert_eq!(out, Extraction::Parsed(Sample { kind: "x".into() }));
    }

    #[test]
    fn test_unbalanced_returns_none() {
        assert!(extract_object::<Sample>("{\"kind\": \"x\"").is_none());
    }
}
