//! Access to the shared record: the `RecordStore` capability and the
//! record's key.
//!
//! A store is bound to one record key. It can read the whole record and
//! apply an ordered patch atomically; everything else in the engine is
//! built on those two calls.

use std::future::Future;

use serde_json::Value;

use crate::error::RecordResult;
use crate::patch::JsonPatch;

pub const DEFAULT_GROUP: &str = "iguazio.com";
pub const DEFAULT_VERSION: &str = "v1beta1";
pub const DEFAULT_PLURAL: &str = "iguaziotenantappservicesets";

/// Location of the record: `(group, version, plural, namespace, name)`.
///
/// There is one record per namespace and it is named after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKey {
    pub group: String,
    pub version: String,
    pub plural: String,
    pub namespace: String,
    pub name: String,
}

impl RecordKey {
    /// Key of the record in `namespace`, using the default resource type.
    pub fn for_namespace(namespace: &str) -> Self {
        Self::new(DEFAULT_GROUP, DEFAULT_VERSION, DEFAULT_PLURAL, namespace)
    }

    pub fn new(group: &str, version: &str, plural: &str, namespace: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            plural: plural.to_string(),
            namespace: namespace.to_string(),
            name: namespace.to_string(),
        }
    }

    /// REST path of the record, e.g.
    /// `/apis/iguazio.com/v1beta1/namespaces/ns/iguaziotenantappservicesets/ns`.
    pub fn abs_path(&self) -> String {
        format!(
            "/apis/{}/{}/namespaces/{}/{}/{}",
            self.group, self.version, self.namespace, self.plural, self.name
        )
    }
}

/// Read and patch access to the record.
pub trait RecordStore: Send + Sync {
    fn key(&self) -> &RecordKey;

    /// Fetch the full record as untyped JSON.
    fn read_record(&self) -> impl Future<Output = RecordResult<Value>> + Send;

    /// Apply all operations of `patch`, in order, as one atomic update.
    fn apply_patch(&self, patch: &JsonPatch) -> impl Future<Output = RecordResult<()>> + Send;
}
