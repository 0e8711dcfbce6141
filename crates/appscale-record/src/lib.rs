//! appscale-record: the shared service-set record and everything that
//! can be computed from it without talking to a cluster.
//!
//! One record per namespace carries every tenant application service:
//! the desired configuration under `spec.spec.tenants[0].spec.services`
//! and the observed state under `status.services`, plus a global
//! provisioning `status.state` owned by the record's controller.
//!
//! # Architecture
//!
//! ```text
//! RecordStore (read record / apply ordered patch)
//!   ├── parse   → ParsedRecord { spec services, status services, state }
//!   ├── decode  → Vec<ScaleResource> per service spec
//!   └── patch   → JsonPatch for a scale intent (per-service ops, then global ops)
//! ```
//!
//! Parsing is defensive: the spec side degrades to an empty service map
//! with a warning, while the status side (needed to sequence patches
//! safely) fails with `RecordError::Shape`.

pub mod decode;
pub mod duration;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod parse;
pub mod patch;
pub mod store;
pub mod types;

pub use decode::decode_scale_resources;
pub use error::{RecordError, RecordResult};
pub use parse::{ParsedRecord, parse_last_scale_event, parse_record, parse_service_state};
pub use patch::{JsonPatch, PatchOp, ScaleDirection, build_scale_intent};
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryRecordStore;
pub use store::{RecordKey, RecordStore};
pub use types::*;
