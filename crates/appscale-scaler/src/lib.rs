//! appscale-scaler: drives scale-to-zero transitions through the shared
//! service-set record.
//!
//! # Protocol
//!
//! ```text
//! set_scale(resources, scale)
//!   ├── build_scale_intent()          per-service ops, then global "waiting" marker
//!   ├── QuiescenceGuard
//!   │   ├── await_quiescent()         poll status.state until ready | error (5m / 10s)
//!   │   └── apply(patch)              one atomic multi-op patch
//!   └── ConvergencePoller
//!       └── wait_for_states()         poll status.services until all reach the
//!                                     desired state (10m / 5s)
//!
//! get_resources()
//!   └── parse_record() → decode_scale_resources() per ready service
//! ```
//!
//! The record has no per-field locking. Every patch is gated on observing
//! quiescence first, which serializes mutations as long as a single
//! owner issues scale intents.
//!
//! All waits stop on a `CancelSignal` and report `ScalerError::Cancelled`,
//! distinct from `ScalerError::Timeout`. A cancelled call never leaves a
//! patch half issued: the patch is a single store call made only after
//! the guard passes.

pub mod cancel;
pub mod config;
pub mod error;
pub mod guard;
pub mod poller;
pub mod scaler;

pub use cancel::CancelSignal;
pub use config::{
    AutoScalerOptions, DlxOptions, GroupKind, MultiTargetStrategy, PatchConfig, PollConfig,
    RecordConfig, ResourceScalerConfig, ScalerConfig,
};
pub use error::{ScalerError, ScalerResult};
pub use guard::{MutationGuard, QuiescenceGuard};
pub use poller::ConvergencePoller;
pub use scaler::{AppResourceScaler, ResourceScaler};
