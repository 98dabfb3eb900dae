// src/response.rs

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// How much of an unusable response is kept for diagnostics.
const SNIPPET_CHARS: usize = 200;

static FENCED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").expect("valid fenced-block regex")
});

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("No valid JSON found in response: {0}")]
    NoJsonFound(String),
    #[error("Malformed JSON in response: {0}")]
    MalformedJson(String),
}

/// Pull a JSON object out of free-form model output.
///
/// A fenced block wins over bare braces; a located span that does not parse
/// is an error rather than a reason to keep searching.
pub fn extract_json(text: &str) -> Result<Map<String, Value>, ExtractError> {
    if let Some(cap) = FENCED.captures(text) {
        return parse_object(&cap[1]);
    }
    let span = text
        .find('{')
        .zip(text.rfind('}'))
        .filter(|(start, end)| start < end)
        .map(|(start, end)| &text[start..=end]);
    match span {
        Some(span) => parse_object(span),
        None => Err(ExtractError::NoJsonFound(
            text.chars().take(SNIPPET_CHARS).collect(),
        )),
    }
}

fn parse_object(span: &str) -> Result<Map<String, Value>, ExtractError> {
    match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ExtractError::MalformedJson(format!(
            "expected an object, got {other}"
        ))),
        Err(e) => Err(ExtractError::MalformedJson(e.to_string())),
    }
}
