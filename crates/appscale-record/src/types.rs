//! Domain types recovered from the service-set record.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// Name of the service that scales its own workloads. Its scale-to-zero
/// block configures its functions, not itself, so it is never enumerated.
pub const SELF_SCALING_SERVICE: &str = "nuclio";

/// Per-service states the engine waits for. Any other value means the
/// service is still transitioning.
pub mod service_state {
    pub const READY: &str = "ready";
    pub const SCALED_TO_ZERO: &str = "scaledToZero";
}

// ── Scale rules ───────────────────────────────────────────────────

/// A single metric-based scaling rule of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleResource {
    pub metric_name: String,
    pub threshold: i64,
    /// Window over which the metric is evaluated (e.g. "30s").
    #[serde(with = "crate::duration::serde_go")]
    pub window_size: Duration,
}

// ── Scale events ──────────────────────────────────────────────────

/// The last scaling transition recorded in a service's status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScaleEvent {
    ResourceUpdated,
    ScaleFromZeroStarted,
    ScaleFromZeroCompleted,
    ScaleToZeroStarted,
    ScaleToZeroCompleted,
    #[default]
    NonScaleEvent,
}

impl ScaleEvent {
    /// Wire representation stored in the record.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResourceUpdated => "resourceUpdated",
            Self::ScaleFromZeroStarted => "scaleFromZeroStarted",
            Self::ScaleFromZeroCompleted => "scaleFromZeroCompleted",
            Self::ScaleToZeroStarted => "scaleToZeroStarted",
            Self::ScaleToZeroCompleted => "scaleToZeroCompleted",
            Self::NonScaleEvent => "nonScaleEvent",
        }
    }
}

impl fmt::Display for ScaleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScaleEvent {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resourceUpdated" => Ok(Self::ResourceUpdated),
            "scaleFromZeroStarted" => Ok(Self::ScaleFromZeroStarted),
            "scaleFromZeroCompleted" => Ok(Self::ScaleFromZeroCompleted),
            "scaleToZeroStarted" => Ok(Self::ScaleToZeroStarted),
            "scaleToZeroCompleted" => Ok(Self::ScaleToZeroCompleted),
            "nonScaleEvent" => Ok(Self::NonScaleEvent),
            other => Err(RecordError::decode(format!("unknown scale event {other:?}"))),
        }
    }
}

/// Last scale event of a service together with when it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastScaleEvent {
    pub event: ScaleEvent,
    pub time: DateTime<Utc>,
}

// ── Provisioning state ────────────────────────────────────────────

/// Global provisioning state of the record (`status.state`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningState {
    Ready,
    Error,
    WaitingForScalingFromZero,
    WaitingForScalingToZero,
    WaitingForProvisioning,
    /// A state this engine does not know; treated as in flight.
    Other(String),
}

impl ProvisioningState {
    pub fn parse(s: &str) -> Self {
        match s {
            "ready" => Self::Ready,
            "error" => Self::Error,
            "waitingForScalingFromZero" => Self::WaitingForScalingFromZero,
            "waitingForScalingToZero" => Self::WaitingForScalingToZero,
            "waitingForProvisioning" => Self::WaitingForProvisioning,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Ready => "ready",
            Self::Error => "error",
            Self::WaitingForScalingFromZero => "waitingForScalingFromZero",
            Self::WaitingForScalingToZero => "waitingForScalingToZero",
            Self::WaitingForProvisioning => "waitingForProvisioning",
            Self::Other(s) => s,
        }
    }

    /// Whether no reconciliation pass is in flight, so a new patch is safe.
    pub fn is_quiescent(&self) -> bool {
        matches!(self, Self::Ready | Self::Error)
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Resource ──────────────────────────────────────────────────────

/// A scalable service as seen by the autoscaler and the request buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub name: String,
    #[serde(default)]
    pub scale_resources: Vec<ScaleResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scale_event: Option<ScaleEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scale_event_time: Option<DateTime<Utc>>,
}

impl Resource {
    /// A resource identified only by name, as passed to scale calls.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scale_resources: Vec::new(),
            last_scale_event: None,
            last_scale_event_time: None,
        }
    }
}
