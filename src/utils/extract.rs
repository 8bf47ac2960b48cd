//! Structured payload extraction from free-form completion text.
//!
//! Models wrap JSON in prose or markdown fences more often than not. Callers
//! hand the raw text to [`extract_json_payload`] and apply their own fallback
//! when it returns `None`.
//!
//! Extraction order:
//! 1. the whole trimmed text parses as JSON
//! 2. the body of a ```` ```json ```` fence
//! 3. the body of any other fence
//! 4. the outermost `[...]` or `{...}` slice, whichever opens first

use serde::de::DeserializeOwned;
use serde_json::Value;

pub fn extract_json_payload(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    for body in fenced_blocks(trimmed) {
        if let Ok(value) = serde_json::from_str(body.trim()) {
            return Some(value);
        }
    }

    bracket_slice(trimmed).and_then(|slice| serde_json::from_str(slice).ok())
}

/// Extract and deserialize in one step.
pub fn extract_payload<T: DeserializeOwned>(text: &str) -> Option<T> {
    extract_json_payload(text).and_then(|value| serde_json::from_value(value).ok())
}

/// Fence bodies, `json`-tagged ones first.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut tagged = Vec::new();
    let mut untagged = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("```") {
        let after = &rest[start + 3..];
        let Some(end) = after.find("```") else {
            break;
        };
        let block = &after[..end];
        let (tag, body) = match block.find('\n') {
            Some(newline) => (block[..newline].trim(), &block[newline + 1..]),
            None => ("", block),
        };

        if tag.eq_ignore_ascii_case("json") {
            tagged.push(body);
        } else if tag.is_empty() {
            untagged.push(body);
        } else {
            untagged.push(block.trim_start_matches(tag));
        }

        rest = &after[end + 3..];
    }

    tagged.extend(untagged);
    tagged
}

fn bracket_slice(text: &str) -> Option<&str> {
    let open = text.find(['[', '{'])?;
    let close_char = if text[open..].starts_with('[') { ']' } else { '}' };
    let close = text.rfind(close_char)?;
    (close > open).then(|| &text[open..=close])
}
