//! appscale-kube: cluster access for the scale-to-zero engine.
//!
//! `KubeRecordStore` implements `RecordStore` against the cluster REST
//! API over plain HTTP, e.g. through `kubectl proxy` or a sidecar that
//! handles authentication. Reads are `GET` on the record path; patches
//! are `PATCH` with `application/json-patch+json`.
//!
//! Warning headers returned by the API server are logged, with
//! deprecation notices called out separately.

pub mod client;
pub mod namespace;
pub mod warnings;

pub use client::KubeRecordStore;
pub use namespace::resolve_namespace;
