//! Decoding of a service's `scale_to_zero` spec block into scale rules.

use serde_json::Value;

use crate::duration::parse_duration;
use crate::error::{RecordError, RecordResult};
use crate::types::ScaleResource;

/// Decode the scale rules of one service spec.
///
/// A missing `scale_to_zero` block, or one whose `mode` is not
/// `"enabled"`, yields no rules. When enabled, every entry must be
/// complete; a single malformed entry fails the whole call so callers
/// never act on a partial rule set.
pub fn decode_scale_resources(service_spec: &Value) -> RecordResult<Vec<ScaleResource>> {
    let spec = service_spec
        .as_object()
        .ok_or_else(|| RecordError::decode("service spec is not an object"))?;

    let Some(scale_to_zero) = spec.get("scale_to_zero").and_then(Value::as_object) else {
        return Ok(Vec::new());
    };

    let mode = scale_to_zero
        .get("mode")
        .and_then(Value::as_str)
        .ok_or_else(|| RecordError::decode("scale to zero spec does not have mode"))?;
    if mode != "enabled" {
        return Ok(Vec::new());
    }

    let entries = scale_to_zero
        .get("scale_resources")
        .and_then(Value::as_array)
        .ok_or_else(|| RecordError::decode("scale to zero spec does not have scale resources"))?;

    entries.iter().map(decode_entry).collect()
}

fn decode_entry(entry: &Value) -> RecordResult<ScaleResource> {
    let entry = entry
        .as_object()
        .ok_or_else(|| RecordError::decode("scale resource is not an object"))?;

    let metric_name = entry
        .get("metric_name")
        .and_then(Value::as_str)
        .ok_or_else(|| RecordError::decode("scale resource does not have metric name"))?;

    let threshold = entry
        .get("threshold")
        .and_then(Value::as_f64)
        .ok_or_else(|| RecordError::decode("scale resource does not have threshold"))?;

    let window_size = entry
        .get("window_size")
        .and_then(Value::as_str)
        .ok_or_else(|| RecordError::decode("scale resource does not have metric window size"))?;

    Ok(ScaleResource {
        metric_name: metric_name.to_string(),
        threshold: threshold.trunc() as i64,
        window_size: parse_duration(window_size)?,
    })
}
