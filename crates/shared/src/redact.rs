//! Field redaction for structured payloads
//!
//! Masks values addressed by dotted paths (e.g. `owner.phone` or
//! `payment.accounts.0.number`) before a payload is written to logs.
//! Paths are walked segment by segment; a value is only replaced when every
//! intermediate segment exists.

use serde_json::Value;

/// Replacement written over redacted values
pub const REDACTED: &str = "[REDACTED]";

/// Redact every path in `paths` inside `value`
pub fn redact_paths<S: AsRef<str>>(value: &mut Value, paths: &[S]) {
    for path in paths {
        redact_path(value, path.as_ref());
    }
}

/// Redact a single dotted path. Returns true if a value was replaced.
pub fn redact_path(value: &mut Value, path: &str) -> bool {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return false;
    }
    walk(value, &segments)
}

fn walk(value: &mut Value, segments: &[&str]) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        return false;
    };

    let child = match value {
        Value::Object(map) => map.get_mut(*head),
        Value::Array(items) => head.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        _ => None,
    };

    match child {
        Some(target) if rest.is_empty() => {
            *target = Value::String(REDACTED.to_string());
            true
        }
        Some(next) => walk(next, rest),
        None => false,
    }
}
