//! Structured-response decoding for vision-model output.
//!
//! Models wrap JSON in prose or code fences more often than not. Decoding
//! tries three strategies in order: direct decode, fenced-code-block
//! extraction, then the first brace-balanced object substring. Only when
//! all three fail does the caller see a `ParseFailure`.

use serde::de::DeserializeOwned;

use crate::errors::{ProbeError, ProbeResult};

/// Pulls a JSON object out of raw model text, or `None` if no candidate
/// substring exists.
pub fn extract_json_object(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed.to_string());
    }

    let fence = "```";
    if let Some(start) = raw.find(fence) {
        let after_fence = &raw[start + fence.len()..];
        let after_lang = after_fence.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
        if let Some(end) = after_lang.find(fence) {
            let block = after_lang[..end].trim();
            if block.starts_with('{') {
                return Some(block.to_string());
            }
        }
    }

    // First brace-balanced object substring.
    let start = raw.find('{')?;
    let mut depth = 0i32;
    for (offset, ch) in raw[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(raw[start..start + offset + ch.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Decodes model text into `T` via the three-tier strategy.
pub fn decode<T: DeserializeOwned>(raw: &str) -> ProbeResult<T> {
    if let Ok(value) = serde_json::from_str::<T>(raw.trim()) {
        return Ok(value);
    }
    let candidate = extract_json_object(raw)
        .ok_or_else(|| ProbeError::ParseFailure(format!("no JSON object in: {}", preview(raw))))?;
    serde_json::from_str(&candidate)
        .map_err(|e| ProbeError::ParseFailure(format!("{e} in: {}", preview(raw))))
}

fn preview(raw: &str) -> String {
    let mut s: String = raw.chars().take(120).collect();
    if raw.chars().count() > 120 {
        s.push('…');
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Probe {
        found: bool,
    }

    #[test]
    fn decodes_direct_json() {
        let p: Probe = decode(r#"{"found": true}"#).expect("direct");
        assert!(p.found);
    }

    #[test]
    fn decodes_fenced_block() {
        let raw = "Here you go:\n```json\n{\"found\": false}\n```\nanything else?";
        let p: Probe = decode(raw).expect("fenced");
        assert!(!p.found);
    }

    #[test]
    fn decodes_embedded_object() {
        let raw = "The element was located. {\"found\": true} Confidence is high.";
        let p: Probe = decode(raw).expect("embedded");
        assert!(p.found);
    }

    #[test]
    fn balanced_extraction_handles_nesting() {
        let raw = "result {\"outer\": {\"inner\": 1}} trailing";
        assert_eq!(
            extract_json_object(raw).as_deref(),
            Some("{\"outer\": {\"inner\": 1}}")
        );
    }

    #[test]
    fn exhausting_all_tiers_is_a_parse_failure() {
        let err = decode::<Probe>("the model refused to answer").unwrap_err();
        assert!(matches!(err, ProbeError::ParseFailure(_)));
    }
}
