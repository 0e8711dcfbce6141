//! Extraction of per-service spec and status from the raw record.
//!
//! The record is untyped JSON. Every step checks the shape it expects
//! before descending. Spec-side mismatches are logged and yield an empty
//! service map; status-side mismatches that hide the global provisioning
//! state are `RecordError::Shape`.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{RecordError, RecordResult};
use crate::types::{LastScaleEvent, ProvisioningState, ScaleEvent};

/// Services and provisioning state recovered from one read of the record.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    /// `spec.spec.tenants[0].spec.services`, keyed by service name.
    pub spec_services: Map<String, Value>,
    /// `status.services`, keyed by service name.
    pub status_services: Map<String, Value>,
    /// `status.state`.
    pub state: ProvisioningState,
}

/// Parse a full record.
///
/// Fails only when the status side is unusable; a broken spec side
/// leaves `spec_services` empty.
pub fn parse_record(record: &Value) -> RecordResult<ParsedRecord> {
    let (status_services, state) = parse_status(record)?;
    let spec_services = parse_spec_services(record);
    Ok(ParsedRecord {
        spec_services,
        status_services,
        state,
    })
}

fn parse_spec_services(record: &Value) -> Map<String, Value> {
    let Some(spec) = record.get("spec").and_then(Value::as_object) else {
        warn!("service set does not have spec");
        return Map::new();
    };

    let Some(internal_spec) = spec.get("spec").and_then(Value::as_object) else {
        warn!("spec does not have internal spec");
        return Map::new();
    };

    let tenants = match internal_spec.get("tenants").and_then(Value::as_array) {
        Some(tenants) if tenants.len() == 1 => tenants,
        Some(tenants) => {
            warn!(count = tenants.len(), "expected exactly one tenant");
            return Map::new();
        }
        None => {
            warn!("internal spec does not have tenants");
            return Map::new();
        }
    };

    let Some(tenant) = tenants[0].as_object() else {
        warn!("tenant is not an object");
        return Map::new();
    };

    let Some(tenant_spec) = tenant.get("spec").and_then(Value::as_object) else {
        warn!("tenant does not have spec");
        return Map::new();
    };

    match tenant_spec.get("services").and_then(Value::as_object) {
        Some(services) => services.clone(),
        None => {
            warn!("tenant spec does not have services");
            Map::new()
        }
    }
}

fn parse_status(record: &Value) -> RecordResult<(Map<String, Value>, ProvisioningState)> {
    let status = record
        .get("status")
        .and_then(Value::as_object)
        .ok_or_else(|| RecordError::shape("status", "service set does not have status"))?;

    let state = status
        .get("state")
        .and_then(Value::as_str)
        .ok_or_else(|| RecordError::shape("status.state", "status does not have state"))?;

    let services = match status.get("services").and_then(Value::as_object) {
        Some(services) => services.clone(),
        None => {
            warn!("status does not have services");
            Map::new()
        }
    };

    Ok((services, ProvisioningState::parse(state)))
}

/// The `state` string of one entry of `status.services`.
pub fn parse_service_state(service_status: &Value) -> RecordResult<String> {
    let status = service_status
        .as_object()
        .ok_or_else(|| RecordError::shape("service status", "not an object"))?;

    status
        .get("state")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RecordError::shape("service status.state", "service status does not have state"))
}

/// The last scale event recorded in a service status.
///
/// A missing `scale_to_zero` block is not an error and yields `None`.
/// A present block must carry a known `last_scale_event` and an RFC 3339
/// `last_scale_event_time`.
pub fn parse_last_scale_event(service_status: &Value) -> RecordResult<Option<LastScaleEvent>> {
    let status = service_status
        .as_object()
        .ok_or_else(|| RecordError::shape("service status", "not an object"))?;

    let Some(scale_to_zero) = status.get("scale_to_zero").and_then(Value::as_object) else {
        return Ok(None);
    };

    let event: ScaleEvent = scale_to_zero
        .get("last_scale_event")
        .and_then(Value::as_str)
        .ok_or_else(|| RecordError::decode("scale to zero status does not have last scale event"))?
        .parse()?;

    let time_str = scale_to_zero
        .get("last_scale_event_time")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            RecordError::decode("scale to zero status does not have last scale event time")
        })?;
    let time = DateTime::parse_from_rfc3339(time_str)
        .map_err(|e| RecordError::decode(format!("invalid last scale event time {time_str:?}: {e}")))?
        .with_timezone(&Utc);

    Ok(Some(LastScaleEvent { event, time }))
}
