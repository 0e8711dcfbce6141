//! Quiescence-then-apply: the only way the scaler mutates the record.
//!
//! The record is one shared object without per-field locking. A patch
//! issued while the record's controller is mid-pass could be overwritten
//! or interleaved, so every patch waits until the global provisioning
//! state is `ready` or `error` first.

use std::future::Future;
use std::time::Duration;

use appscale_record::{JsonPatch, RecordStore, parse_record};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::config::PollConfig;
use crate::error::{ScalerError, ScalerResult};

const OPERATION: &str = "record to finish provisioning";

/// Serializes mutations of the shared record.
///
/// Callers must `await_quiescent` and then `apply`. An implementation
/// backed by a real lock can replace `QuiescenceGuard` without changing
/// callers.
pub trait MutationGuard: Send + Sync {
    fn await_quiescent(
        &self,
        cancel: &mut CancelSignal,
    ) -> impl Future<Output = ScalerResult<()>> + Send;

    fn apply(&self, patch: &JsonPatch) -> impl Future<Output = ScalerResult<()>> + Send;
}

/// Guard that polls the record's provisioning state.
pub struct QuiescenceGuard<'a, S> {
    store: &'a S,
    timeout: Duration,
    interval: Duration,
}

impl<'a, S: RecordStore> QuiescenceGuard<'a, S> {
    pub fn new(store: &'a S, poll: &PollConfig) -> Self {
        Self {
            store,
            timeout: poll.quiescence_timeout,
            interval: poll.quiescence_interval,
        }
    }
}

impl<S: RecordStore> MutationGuard for QuiescenceGuard<'_, S> {
    async fn await_quiescent(&self, cancel: &mut CancelSignal) -> ScalerResult<()> {
        debug!(timeout = ?self.timeout, "waiting for record to finish provisioning");
        let deadline = Instant::now() + self.timeout;

        loop {
            if cancel.is_cancelled() {
                return Err(ScalerError::Cancelled { operation: OPERATION });
            }

            let record = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(ScalerError::Cancelled { operation: OPERATION });
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!("record read did not return before the provisioning deadline");
                    return Err(ScalerError::Timeout {
                        operation: OPERATION,
                        waited: self.timeout,
                    });
                }
                record = self.store.read_record() => record?,
            };
            let state = parse_record(&record)?.state;
            if state.is_quiescent() {
                debug!(%state, "record finished provisioning");
                return Ok(());
            }
            debug!(%state, "record is still provisioning");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(ScalerError::Cancelled { operation: OPERATION });
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(%state, "record did not finish provisioning in time");
                    return Err(ScalerError::Timeout {
                        operation: OPERATION,
                        waited: self.timeout,
                    });
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    async fn apply(&self, patch: &JsonPatch) -> ScalerResult<()> {
        let key = self.store.key();
        info!(
            namespace = %key.namespace,
            record = %key.name,
            ops = patch.len(),
            "patching service set"
        );
        self.store.apply_patch(patch).await?;
        Ok(())
    }
}
