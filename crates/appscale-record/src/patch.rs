//! Scale intents expressed as ordered JSON Patch operations.
//!
//! Per-service operations always come first and the global provisioning
//! marker last, so a reader that observes the "waiting" marker also
//! observes every per-service intent it covers. `PatchBuilder` only
//! produces a `JsonPatch` through `finish`, which appends the global
//! operations.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{RecordError, RecordResult};
use crate::types::{ProvisioningState, ScaleEvent, service_state};

const SPEC_SERVICES_PATH: &str = "/spec/spec/tenants/0/spec/services";
const STATUS_SERVICES_PATH: &str = "/status/services";
const STATUS_STATE_PATH: &str = "/status/state";
const FORCE_APPLY_ALL_PATH: &str = "/spec/spec/tenants/0/spec/force_apply_all_mode";

/// JSON Patch operation kind. Only `add` is ever emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOpKind {
    Add,
}

/// One `{ "op", "path", "value" }` triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    pub op: PatchOpKind,
    pub path: String,
    pub value: Value,
}

impl PatchOp {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOpKind::Add,
            path: path.into(),
            value,
        }
    }
}

/// An ordered list of operations applied atomically by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonPatch(Vec<PatchOp>);

impl JsonPatch {
    pub fn ops(&self) -> &[PatchOp] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serialized request body.
    pub fn to_body(&self) -> RecordResult<Vec<u8>> {
        serde_json::to_vec(&self.0).map_err(|e| RecordError::Serialize(e.to_string()))
    }
}

/// Which way a set of services should move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDirection {
    ToZero,
    FromZero,
}

impl ScaleDirection {
    /// Direction for a requested replica count.
    pub fn for_scale(scale: u32) -> Self {
        if scale == 0 { Self::ToZero } else { Self::FromZero }
    }

    /// Per-service `desired_state` written by the intent, and the state
    /// convergence waits for.
    pub fn desired_state(&self) -> &'static str {
        match self {
            Self::ToZero => service_state::SCALED_TO_ZERO,
            Self::FromZero => service_state::READY,
        }
    }

    pub fn scale_event(&self) -> ScaleEvent {
        match self {
            Self::ToZero => ScaleEvent::ScaleToZeroStarted,
            Self::FromZero => ScaleEvent::ScaleFromZeroStarted,
        }
    }

    /// Global marker written after the per-service operations.
    pub fn provisioning_state(&self) -> ProvisioningState {
        match self {
            Self::ToZero => ProvisioningState::WaitingForScalingToZero,
            Self::FromZero => ProvisioningState::WaitingForScalingFromZero,
        }
    }
}

/// Accumulates per-service transitions, then seals them with the global
/// provisioning transition.
#[derive(Debug)]
pub struct PatchBuilder {
    ops: Vec<PatchOp>,
    timestamp: String,
}

impl PatchBuilder {
    /// Every transition in this patch is stamped with `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            ops: Vec::new(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }
    }

    /// Append the six operations that move one service to `desired_state`.
    pub fn service_transition(mut self, service: &str, desired_state: &str, event: ScaleEvent) -> Self {
        let name = escape_pointer_token(service);
        let spec = format!("{SPEC_SERVICES_PATH}/{name}");
        let scale_status = format!("{STATUS_SERVICES_PATH}/{name}/scale_to_zero");

        self.ops.push(PatchOp::add(format!("{spec}/desired_state"), json!(desired_state)));
        self.ops.push(PatchOp::add(format!("{spec}/mark_for_restart"), json!(false)));
        // The record's controller only acts on services flagged as changed.
        self.ops.push(PatchOp::add(format!("{spec}/mark_as_changed"), json!(true)));
        self.ops.push(PatchOp::add(scale_status.clone(), json!({})));
        self.ops.push(PatchOp::add(
            format!("{scale_status}/last_scale_event"),
            json!(event.as_str()),
        ));
        self.ops.push(PatchOp::add(
            format!("{scale_status}/last_scale_event_time"),
            json!(self.timestamp),
        ));
        self
    }

    /// Append the global provisioning transition and return the patch.
    ///
    /// With `disable_force_apply_all`, the tenant's apply-all override is
    /// forced off so a full reconciliation pass does not race this one.
    pub fn finish(mut self, state: &ProvisioningState, disable_force_apply_all: bool) -> JsonPatch {
        self.ops.push(PatchOp::add(STATUS_STATE_PATH, json!(state.as_str())));
        if disable_force_apply_all {
            self.ops.push(PatchOp::add(FORCE_APPLY_ALL_PATH, json!("disabled")));
        }
        JsonPatch(self.ops)
    }
}

/// Build the patch that moves every named service in `direction`.
pub fn build_scale_intent(
    services: &[String],
    direction: ScaleDirection,
    now: DateTime<Utc>,
    disable_force_apply_all: bool,
) -> JsonPatch {
    services
        .iter()
        .fold(PatchBuilder::new(now), |builder, service| {
            builder.service_transition(service, direction.desired_state(), direction.scale_event())
        })
        .finish(&direction.provisioning_state(), disable_force_apply_all)
}

/// Escape a JSON Pointer reference token (`~` → `~0`, `/` → `~1`).
pub fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}
