//! Payload sanitation for opaque Grafana documents.
//!
//! Declared specs are forwarded to Grafana mostly untouched, but a few
//! fields would fight the server's own bookkeeping: a stale `id` or
//! `version` makes Grafana reject the write, and some endpoints need
//! `overwrite` set to ignore version checks.

use crate::error::{GrafanaError, Result, SyncError};

/// Returns a copy of the spec with `id` and `version` stripped.
///
/// Set `add_overwrite` for endpoints that require `"overwrite": true` to
/// ignore object versions.
///
/// # Errors
///
/// Returns an invalid-payload error if the spec is not a JSON object;
/// retrying cannot fix that, the manifest has to change.
pub fn sanitize(spec: &serde_json::Value, add_overwrite: bool) -> Result<serde_json::Value> {
    let Some(object) = spec.as_object() else {
        return Err(SyncError::Grafana(GrafanaError::invalid_payload(format!(
            "expected a JSON object, got {}",
            type_name(spec)
        ))));
    };

    let mut sanitized = object.clone();
    sanitized.remove("id");
    sanitized.remove("version");

    if add_overwrite {
        sanitized.insert("overwrite".into(), serde_json::Value::Bool(true));
    }

    Ok(serde_json::Value::Object(sanitized))
}

/// Sets an id field on the document, re-typing numeric ids.
///
/// Grafana returns some ids as integers but the controller carries them as
/// strings; values that parse as integers are written back as numbers.
pub fn set_id(
    spec: &mut serde_json::Value,
    field: &str,
    id: &str,
) -> Result<()> {
    let Some(object) = spec.as_object_mut() else {
        return Err(SyncError::Grafana(GrafanaError::invalid_payload(
            "cannot set id on a non-object payload",
        )));
    };

    let value = id.parse::<i64>().map_or_else(
        |_| serde_json::Value::String(id.to_string()),
        serde_json::Value::from,
    );
    object.insert(field.into(), value);
    Ok(())
}

/// Extracts a field from a response document as a string.
///
/// Numeric values are stringified, matching how the controller carries all
/// Grafana ids.
pub fn field_string(response: &serde_json::Value, field: &str) -> Result<String> {
    let value = response.get(field).ok_or_else(|| {
        SyncError::Grafana(GrafanaError::invalid_response(format!(
            "response is missing field {field}"
        )))
    })?;

    match value {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(SyncError::Grafana(GrafanaError::invalid_response(format!(
            "field {field} has unexpected type {}",
            type_name(other)
        )))),
    }
}

const fn type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
