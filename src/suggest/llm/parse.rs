//! Recovery of a single JSON object from raw model output.
//!
//! Completions are not guaranteed to be well-formed JSON. They arrive wrapped
//! in markdown fences, followed by commentary, cut off mid-array, or carrying
//! trailing commas. [`recover`] turns such text into the best JSON candidate it
//! can find; [`parse_recovered`] turns that candidate into a value and reports
//! an [`CodingError::UnparsableResponse`] when nothing usable is left.

use super::client::truncate_str;
use crate::suggest::error::CodingError;
use regex::Regex;
use std::sync::OnceLock;

/// Keys that identify a confident-codes payload worth salvaging after truncation.
const TRUNCATION_SALVAGE_MARKERS: [&str; 2] = ["\"suggestedIcd\"", "\"suggestedCpt\""];

fn fenced_json_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").expect("fenced json regex"))
}

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([}\]])").expect("trailing comma regex"))
}

fn bare_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([{,])\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*:").expect("bare key regex")
    })
}

/// Extract the most plausible JSON object text from a model response.
///
/// Never fails. In priority order:
/// 1. the contents of the first ```` ```json ```` fenced block;
/// 2. the longest balanced `{...}` span (braces counted naively, string
///    literals are not lexed);
/// 3. a textual repair of the tail starting at the first `{`: unclosed
///    brackets/braces are closed, trailing commas dropped and bare keys quoted.
///
/// Text without any `{` comes back trimmed so the caller's parse step fails
/// with a readable error.
pub fn recover(text: &str) -> String {
    if let Some(captures) = fenced_json_re().captures(text) {
        if let Some(body) = captures.get(1) {
            return body.as_str().to_string();
        }
    }

    let Some(first_brace) = text.find('{') else {
        return text.trim().to_string();
    };

    if let Some(object) = longest_balanced_object(text, first_brace) {
        return object.to_string();
    }

    repair_truncated(&text[first_brace..])
}

/// Walk `text` from `from`, recording every span where the brace stack
/// returns to empty, and return the longest (first wins on ties).
fn longest_balanced_object(text: &str, from: usize) -> Option<&str> {
    let mut stack: Vec<usize> = Vec::new();
    let mut best: Option<(&str, usize)> = None;

    for (offset, ch) in text[from..].char_indices() {
        let idx = from + offset;
        match ch {
            '{' => stack.push(idx),
            '}' => {
                let Some(start) = stack.pop() else {
                    continue;
                };
                if stack.is_empty() {
                    let candidate = &text[start..=idx];
                    let len = candidate.chars().count();
                    if best.is_none_or(|(_, best_len)| len > best_len) {
                        best = Some((candidate, len));
                    }
                }
            }
            _ => {}
        }
    }

    best.map(|(candidate, _)| candidate)
}

/// Best-effort repair of an object that never closed.
fn repair_truncated(tail: &str) -> String {
    let mut repaired = tail.trim().to_string();

    // Close whatever is still open, innermost first. A closer only counts
    // when it matches the innermost open bracket; stray closers are ignored.
    let mut open: Vec<char> = Vec::new();
    for ch in repaired.chars() {
        match ch {
            '{' => open.push('}'),
            '[' => open.push(']'),
            '}' | ']' => {
                if open.last() == Some(&ch) {
                    open.pop();
                }
            }
            _ => {}
        }
    }
    repaired.extend(open.iter().rev());

    let repaired = trailing_comma_re().replace_all(&repaired, "${1}");
    let repaired = bare_key_re().replace_all(&repaired, "${1}\"${2}\":");
    repaired.into_owned()
}

/// Cut a truncated confident-codes payload back to its last complete array
/// element and close the containers.
///
/// Only applies to text carrying both `suggestedIcd` and `suggestedCpt`; any
/// other shape returns `None`.
pub(crate) fn salvage_truncated(cleaned: &str) -> Option<String> {
    if !TRUNCATION_SALVAGE_MARKERS
        .iter()
        .all(|marker| cleaned.contains(marker))
    {
        return None;
    }
    let last_complete = cleaned.rfind("},")?;
    Some(format!("{}]}}", &cleaned[..=last_complete]))
}

/// Parse recovered text as JSON, falling back to truncation salvage.
pub(crate) fn parse_recovered(cleaned: &str) -> Result<serde_json::Value, CodingError> {
    if cleaned.trim().is_empty() {
        return Err(CodingError::UnparsableResponse(
            "model returned an empty response".to_string(),
        ));
    }

    match serde_json::from_str::<serde_json::Value>(cleaned) {
        Ok(value) => Ok(value),
        Err(err) => {
            tracing::debug!("JSON decode error: {}", err);
            if let Some(salvaged) = salvage_truncated(cleaned) {
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(&salvaged) {
                    tracing::warn!("Recovered partial result from truncated response");
                    return Ok(value);
                }
            }
            Err(CodingError::UnparsableResponse(format!(
                "{} (response preview: {})",
                err,
                truncate_str(cleaned, 200)
            )))
        }
    }
}
