//! Reading structured data out of free-text completion content.
//!
//! The completion service is asked for JSON but answers in prose-shaped text:
//! sometimes bare JSON, sometimes wrapped in a fenced code block. Everything
//! here turns that text into typed values or a [`AppError::MalformedResponse`].

use serde_json::Value;

use crate::batch::Indexed;
use crate::error::AppError;

const RAW_PREVIEW_CHARS: usize = 200;

fn preview(content: &str) -> String {
    let mut out: String = content.chars().take(RAW_PREVIEW_CHARS).collect();
    if content.chars().count() > RAW_PREVIEW_CHARS {
        out.push('…');
    }
    out
}

/// Strip an optional fenced code block (```` ```json ... ``` ````) around the payload.
pub fn strip_code_fence(content: &str) -> &str {
    if let Some((_, rest)) = content.split_once("```json") {
        return rest.split("```").next().unwrap_or(rest).trim();
    }

    let trimmed = content.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        // Skip a language tag on the opening fence line, if any.
        let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
        return body.split("```").next().unwrap_or(body).trim();
    }

    trimmed
}

/// Parse completion content as a JSON value.
pub fn extract_json(content: &str) -> Result<Value, AppError> {
    let payload = strip_code_fence(content);
    serde_json::from_str(payload).map_err(|e| {
        AppError::MalformedResponse(format!(
            "LLM returned invalid JSON: {e}. Raw: {}",
            preview(content)
        ))
    })
}

/// Re-key a JSON object of per-item records back to original indices.
///
/// `key_for(n)` names the record for the `n`-th item of the batch (1-based),
/// e.g. `resume1` or `candidate_1`. Items without a record are skipped.
pub fn split_keyed<T>(
    value: Value,
    items: &[Indexed<T>],
    key_for: impl Fn(usize) -> String,
) -> Result<Vec<Indexed<Value>>, AppError> {
    let Value::Object(mut records) = value else {
        return Err(AppError::MalformedResponse(format!(
            "Expected a JSON object keyed by item, got {}",
            json_kind(&value)
        )));
    };

    let mut out = Vec::with_capacity(items.len());
    for (position, item) in items.iter().enumerate() {
        let key = key_for(position + 1);
        match records.remove(&key) {
            Some(record) => out.push(Indexed::new(item.index, record)),
            None => {
                tracing::warn!(%key, index = item.index, "Record missing from batch response");
            }
        }
    }
    Ok(out)
}

/// Read a score from a JSON number or numeric string, clamped to [0, 100].
pub fn clamp_score(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    Some(raw.clamp(0.0, 100.0).round() as u8)
}

/// Parse a reply of the form `"<score> <score>"`, each clamped to [0, 100].
pub fn parse_score_pair(content: &str) -> Result<(u8, u8), AppError> {
    let mut parts = content.split_whitespace().map(|part| {
        part.trim_matches(|c: char| !c.is_ascii_digit() && c != '.' && c != '-')
            .parse::<f64>()
            .ok()
            .map(|n| n.clamp(0.0, 100.0).round() as u8)
    });

    match (parts.next().flatten(), parts.next().flatten()) {
        (Some(first), Some(second)) => Ok((first, second)),
        _ => Err(AppError::MalformedResponse(format!(
            "Expected two scores, got: {}",
            preview(content)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
