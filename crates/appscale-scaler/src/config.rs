//! Engine configuration and the overrides the engine can hand to the
//! autoscaler and request-buffer processes.
//!
//! Configuration is read from TOML; every field is optional.
//!
//! ```toml
//! [poll]
//! quiescence_timeout = "5m"
//! quiescence_interval = "10s"
//! convergence_timeout = "10m"
//! convergence_interval = "5s"
//!
//! [record]
//! group = "iguazio.com"
//! version = "v1beta1"
//! plural = "iguaziotenantappservicesets"
//!
//! [patch]
//! disable_force_apply_all = true
//! ```

use std::path::Path;
use std::time::Duration;

use appscale_record::duration::serde_go;
use appscale_record::store::{DEFAULT_GROUP, DEFAULT_PLURAL, DEFAULT_VERSION};
use appscale_record::RecordKey;
use serde::{Deserialize, Serialize};

use crate::error::{ScalerError, ScalerResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalerConfig {
    pub poll: PollConfig,
    pub record: RecordConfig,
    pub patch: PatchConfig,
}

/// Deadlines and tick intervals of the two polling loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    #[serde(with = "serde_go")]
    pub quiescence_timeout: Duration,
    #[serde(with = "serde_go")]
    pub quiescence_interval: Duration,
    #[serde(with = "serde_go")]
    pub convergence_timeout: Duration,
    #[serde(with = "serde_go")]
    pub convergence_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            quiescence_timeout: Duration::from_secs(5 * 60),
            quiescence_interval: Duration::from_secs(10),
            convergence_timeout: Duration::from_secs(10 * 60),
            convergence_interval: Duration::from_secs(5),
        }
    }
}

/// Resource type of the shared record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    pub group: String,
    pub version: String,
    pub plural: String,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP.to_string(),
            version: DEFAULT_VERSION.to_string(),
            plural: DEFAULT_PLURAL.to_string(),
        }
    }
}

impl RecordConfig {
    pub fn key(&self, namespace: &str) -> RecordKey {
        RecordKey::new(&self.group, &self.version, &self.plural, namespace)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    /// Force the tenant's apply-all override off with every scale intent.
    pub disable_force_apply_all: bool,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            disable_force_apply_all: true,
        }
    }
}

impl ScalerConfig {
    pub fn from_file(path: &Path) -> ScalerResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ScalerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ScalerResult<Self> {
        let config: ScalerConfig =
            toml::from_str(content).map_err(|e| ScalerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Zero tick intervals would spin on the store.
    pub fn validate(&self) -> ScalerResult<()> {
        if self.poll.quiescence_interval.is_zero() || self.poll.convergence_interval.is_zero() {
            return Err(ScalerError::Config("poll intervals must be positive".to_string()));
        }
        Ok(())
    }
}

// ── Overrides for the consuming processes ─────────────────────────

/// Settings the engine may impose on the autoscaler and request buffer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceScalerConfig {
    pub auto_scaler: AutoScalerOptions,
    pub dlx: DlxOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

/// Options of the metric-driven autoscaler loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoScalerOptions {
    pub namespace: String,
    #[serde(with = "serde_go")]
    pub scale_interval: Duration,
    /// Kind and group of the resource the custom metrics are attached to.
    pub group_kind: GroupKind,
}

/// How the request buffer picks a target when a request names several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultiTargetStrategy {
    #[default]
    Random,
    Primary,
    Canary,
}

/// Options of the request-buffering proxy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DlxOptions {
    pub namespace: String,
    pub target_name_header: String,
    pub target_path_header: String,
    pub target_port: u16,
    pub listen_address: String,
    #[serde(with = "serde_go")]
    pub resource_readiness_timeout: Duration,
    pub multi_target_strategy: MultiTargetStrategy,
}
