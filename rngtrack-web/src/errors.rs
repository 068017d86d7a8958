//! Mapping of HTTP failures onto [`TrackerError`].
use rngtrack_core::TrackerError;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<Value>,
}

/// Backend `detail` text: a plain string, or the `msg` fields of a list of
/// field errors joined with `"; "`.
#[must_use]
pub fn detail_message(body: &str) -> Option<String> {
    let detail = serde_json::from_str::<ErrorBody>(body).ok()?.detail?;
    match detail {
        Value::String(text) => Some(text),
        Value::Array(items) => {
            let messages: Vec<String> = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(text) => Some(text.clone()),
                    Value::Object(fields) => fields
                        .get("msg")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                })
                .collect();
            (!messages.is_empty()).then(|| messages.join("; "))
        }
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Classify a non-2xx response.
#[must_use]
pub fn error_for_status(status: u16, body: &str) -> TrackerError {
    let detail = detail_message(body);
    match status {
        400 | 409 | 422 => TrackerError::Validation(
            detail.unwrap_or_else(|| format!("request rejected (HTTP {status})")),
        ),
        404 => TrackerError::NotFound(detail.unwrap_or_else(|| "resource not found".to_string())),
        _ => TrackerError::Network(match detail {
            Some(detail) => format!("HTTP {status}: {detail}"),
            None => format!("HTTP {status}"),
        }),
    }
}
