//! In-memory `RecordStore` for tests. Enabled by the `test-util` feature.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{RecordError, RecordResult};
use crate::patch::{JsonPatch, PatchOp, PatchOpKind};
use crate::store::{RecordKey, RecordStore};

struct MemoryState {
    record: Value,
    applied: Vec<JsonPatch>,
    reads: u64,
    fail_reads: bool,
    fail_patches: bool,
}

/// A record held in memory, for tests of code built on `RecordStore`.
///
/// Cloning shares the same record, so a test can play the record's
/// controller while the engine drives it. Reads and patches can be made
/// to fail on demand.
#[derive(Clone)]
pub struct MemoryRecordStore {
    key: RecordKey,
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryRecordStore {
    pub fn new(namespace: &str, record: Value) -> Self {
        Self {
            key: RecordKey::for_namespace(namespace),
            inner: Arc::new(Mutex::new(MemoryState {
                record,
                applied: Vec::new(),
                reads: 0,
                fail_reads: false,
                fail_patches: false,
            })),
        }
    }

    /// Current contents of the record.
    pub async fn snapshot(&self) -> Value {
        self.inner.lock().await.record.clone()
    }

    /// Mutate the record in place, as the record's controller would.
    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Value),
    {
        f(&mut self.inner.lock().await.record);
    }

    /// Every patch applied so far, oldest first.
    pub async fn applied_patches(&self) -> Vec<JsonPatch> {
        self.inner.lock().await.applied.clone()
    }

    /// Number of successful reads so far.
    pub async fn read_count(&self) -> u64 {
        self.inner.lock().await.reads
    }

    /// Make subsequent reads fail with a transport error.
    pub async fn fail_reads(&self, fail: bool) {
        self.inner.lock().await.fail_reads = fail;
    }

    /// Make subsequent patches fail with a transport error.
    pub async fn fail_patches(&self, fail: bool) {
        self.inner.lock().await.fail_patches = fail;
    }
}

impl RecordStore for MemoryRecordStore {
    fn key(&self) -> &RecordKey {
        &self.key
    }

    async fn read_record(&self) -> RecordResult<Value> {
        let mut state = self.inner.lock().await;
        if state.fail_reads {
            return Err(RecordError::Transport("injected read failure".to_string()));
        }
        state.reads += 1;
        Ok(state.record.clone())
    }

    async fn apply_patch(&self, patch: &JsonPatch) -> RecordResult<()> {
        let mut state = self.inner.lock().await;
        if state.fail_patches {
            return Err(RecordError::Transport("injected patch failure".to_string()));
        }

        let mut next = state.record.clone();
        for op in patch.ops() {
            apply_op(&mut next, op)?;
        }
        state.record = next;
        state.applied.push(patch.clone());
        debug!(ops = patch.len(), "patch applied to in-memory record");
        Ok(())
    }
}

fn apply_op(doc: &mut Value, op: &PatchOp) -> RecordResult<()> {
    match op.op {
        PatchOpKind::Add => add_at(doc, &op.path, op.value.clone()),
    }
}

/// JSON Patch `add`: the parent must exist; the last token is inserted
/// or replaced.
fn add_at(doc: &mut Value, path: &str, value: Value) -> RecordResult<()> {
    if path.is_empty() {
        *doc = value;
        return Ok(());
    }

    let missing = |why: &str| RecordError::Transport(format!("cannot add at {path}: {why}"));

    let tokens: Vec<String> = path
        .strip_prefix('/')
        .ok_or_else(|| missing("path must start with '/'"))?
        .split('/')
        .map(|t| t.replace("~1", "/").replace("~0", "~"))
        .collect();
    let Some((last, parents)) = tokens.split_last() else {
        return Err(missing("empty path"));
    };

    let mut target = doc;
    for token in parents {
        target = match target {
            Value::Object(map) => map.get_mut(token).ok_or_else(|| missing("parent does not exist"))?,
            Value::Array(items) => {
                let index: usize = token.parse().map_err(|_| missing("bad array index"))?;
                items.get_mut(index).ok_or_else(|| missing("array index out of range"))?
            }
            _ => return Err(missing("parent is not a container")),
        };
    }

    match target {
        Value::Object(map) => {
            map.insert(last.clone(), value);
        }
        Value::Array(items) if last == "-" => items.push(value),
        Value::Array(items) => {
            let index: usize = last.parse().map_err(|_| missing("bad array index"))?;
            if index > items.len() {
                return Err(missing("array index out of range"));
            }
            items.insert(index, value);
        }
        _ => return Err(missing("parent is not a container")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn add_creates_and_replaces_members() {
        let store = MemoryRecordStore::new("ns", json!({ "status": { "state": "ready" } }));
        let patch = serde_json::from_value::<JsonPatch>(json!([
            { "op": "add", "path": "/status/services", "value": {} },
            { "op": "add", "path": "/status/services/a~1b", "value": { "state": "ready" } },
            { "op": "add", "path": "/status/state", "value": "waitingForProvisioning" },
        ]))
        .unwrap();

        store.apply_patch(&patch).await.unwrap();

        let record = store.read_record().await.unwrap();
        assert_eq!(record["status"]["state"], json!("waitingForProvisioning"));
        assert_eq!(record["status"]["services"]["a/b"]["state"], json!("ready"));
        assert_eq!(store.applied_patches().await.len(), 1);
        assert_eq!(store.read_count().await, 1);
    }

    #[tokio::test]
    async fn failing_op_leaves_record_untouched() {
        let original = json!({ "status": { "state": "ready" } });
        let store = MemoryRecordStore::new("ns", original.clone());
        let patch = serde_json::from_value::<JsonPatch>(json!([
            { "op": "add", "path": "/status/state", "value": "waitingForScalingToZero" },
            { "op": "add", "path": "/status/services/a/state", "value": "ready" },
        ]))
        .unwrap();

        assert!(matches!(
            store.apply_patch(&patch).await,
            Err(RecordError::Transport(_))
        ));
        assert_eq!(store.snapshot().await, original);
        assert!(store.applied_patches().await.is_empty());
    }

    #[tokio::test]
    async fn array_targets() {
        let store = MemoryRecordStore::new("ns", json!({ "items": [1, 3] }));
        let patch = serde_json::from_value::<JsonPatch>(json!([
            { "op": "add", "path": "/items/1", "value": 2 },
            { "op": "add", "path": "/items/-", "value": 4 },
        ]))
        .unwrap();
        store.apply_patch(&patch).await.unwrap();
        assert_eq!(store.snapshot().await, json!({ "items": [1, 2, 3, 4] }));
    }

    #[tokio::test]
    async fn injected_failures_are_transport_errors() {
        let store = MemoryRecordStore::new("ns", json!({}));
        store.fail_reads(true).await;
        assert!(matches!(store.read_record().await, Err(RecordError::Transport(_))));

        store.fail_patches(true).await;
        assert!(matches!(
            store.apply_patch(&JsonPatch::default()).await,
            Err(RecordError::Transport(_))
        ));
    }
}
