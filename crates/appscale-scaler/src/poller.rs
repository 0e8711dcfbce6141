//! Convergence polling: wait until named services report a state.

use std::collections::BTreeSet;
use std::time::Duration;

use appscale_record::{RecordStore, parse_record, parse_service_state};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::config::PollConfig;
use crate::error::{ScalerError, ScalerResult};

const OPERATION: &str = "services to reach desired state";

/// Polls `status.services` on a fixed tick until every named service
/// reports the desired state, or the deadline passes.
///
/// Services that reached the state leave the working set and are not
/// checked again. Partial convergence is not reported: the caller sees
/// success or a single timeout.
pub struct ConvergencePoller<'a, S> {
    store: &'a S,
    timeout: Duration,
    interval: Duration,
}

impl<'a, S: RecordStore> ConvergencePoller<'a, S> {
    pub fn new(store: &'a S, poll: &PollConfig) -> Self {
        Self {
            store,
            timeout: poll.convergence_timeout,
            interval: poll.convergence_interval,
        }
    }

    pub async fn wait_for_state(
        &self,
        service: &str,
        desired_state: &str,
        cancel: &mut CancelSignal,
    ) -> ScalerResult<()> {
        self.wait_for_states(&[service.to_string()], desired_state, cancel)
            .await
    }

    pub async fn wait_for_states(
        &self,
        services: &[String],
        desired_state: &str,
        cancel: &mut CancelSignal,
    ) -> ScalerResult<()> {
        let mut pending: BTreeSet<&str> = services.iter().map(String::as_str).collect();
        if pending.is_empty() {
            return Ok(());
        }

        debug!(
            services = ?pending,
            desired_state,
            timeout = ?self.timeout,
            "waiting for services to reach desired state"
        );
        let deadline = Instant::now() + self.timeout;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(ScalerError::Cancelled { operation: OPERATION });
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(pending = ?pending, desired_state, "services did not reach desired state in time");
                    return Err(ScalerError::Timeout {
                        operation: OPERATION,
                        waited: self.timeout,
                    });
                }
                _ = tokio::time::sleep(self.interval) => {}
            }

            let record = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(ScalerError::Cancelled { operation: OPERATION });
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(pending = ?pending, desired_state, "record read did not return before the convergence deadline");
                    return Err(ScalerError::Timeout {
                        operation: OPERATION,
                        waited: self.timeout,
                    });
                }
                record = self.store.read_record() => record?,
            };
            let parsed = parse_record(&record)?;

            let mut reached = Vec::new();
            for &service in &pending {
                let Some(status) = parsed.status_services.get(service) else {
                    debug!(service, "service not present in status yet");
                    continue;
                };
                let current = parse_service_state(status)?;
                if current == desired_state {
                    debug!(service, desired_state, "service reached desired state");
                    reached.push(service);
                } else {
                    debug!(
                        service,
                        current_state = %current,
                        desired_state,
                        "service did not reach desired state yet"
                    );
                }
            }
            for service in reached {
                pending.remove(service);
            }

            if pending.is_empty() {
                info!(count = services.len(), desired_state, "services reached desired state");
                return Ok(());
            }
            debug!(pending = pending.len(), provisioning = %parsed.state, "still waiting");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appscale_record::{JsonPatch, MemoryRecordStore, RecordError, RecordKey, RecordResult};
    use serde_json::{Value, json};
    use tokio::sync::watch;

    /// Store whose reads never complete.
    struct StalledStore {
        key: RecordKey,
    }

    impl RecordStore for StalledStore {
        fn key(&self) -> &RecordKey {
            &self.key
        }

        async fn read_record(&self) -> RecordResult<Value> {
            std::future::pending().await
        }

        async fn apply_patch(&self, _patch: &JsonPatch) -> RecordResult<()> {
            Ok(())
        }
    }

    fn fast_poll(timeout_ms: u64) -> PollConfig {
        PollConfig {
            convergence_timeout: Duration::from_millis(timeout_ms),
            convergence_interval: Duration::from_millis(5),
            ..PollConfig::default()
        }
    }

    fn status_record(services: Value) -> Value {
        json!({ "status": { "state": "ready", "services": services } })
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn empty_set_converges_without_reading() {
        let store = MemoryRecordStore::new("ns", status_record(json!({})));
        let poller = ConvergencePoller::new(&store, &fast_poll(100));
        poller
            .wait_for_states(&[], "ready", &mut CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(store.read_count().await, 0);
    }

    #[tokio::test]
    async fn converges_when_all_services_match() {
        let store = MemoryRecordStore::new(
            "ns",
            status_record(json!({ "a": { "state": "scaledToZero" }, "b": { "state": "scaledToZero" } })),
        );
        let poller = ConvergencePoller::new(&store, &fast_poll(500));
        poller
            .wait_for_states(&names(&["a", "b"]), "scaledToZero", &mut CancelSignal::never())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn converged_services_leave_the_working_set() {
        let store = MemoryRecordStore::new(
            "ns",
            status_record(json!({ "a": { "state": "ready" }, "b": { "state": "provisioning" } })),
        );
        let controller = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            // `a` regresses after converging; it is not re-checked.
            controller
                .update(|r| {
                    r["status"]["services"]["a"]["state"] = json!("provisioning");
                    r["status"]["services"]["b"]["state"] = json!("ready");
                })
                .await;
        });

        let poller = ConvergencePoller::new(&store, &fast_poll(1_000));
        poller
            .wait_for_states(&names(&["a", "b"]), "ready", &mut CancelSignal::never())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn one_straggler_means_timeout() {
        let store = MemoryRecordStore::new(
            "ns",
            status_record(json!({ "a": { "state": "scaledToZero" }, "b": { "state": "ready" } })),
        );
        let poller = ConvergencePoller::new(&store, &fast_poll(60));
        let err = poller
            .wait_for_states(&names(&["a", "b"]), "scaledToZero", &mut CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, ScalerError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_service_stays_pending() {
        let store = MemoryRecordStore::new("ns", status_record(json!({})));
        let poller = ConvergencePoller::new(&store, &fast_poll(40));
        let err = poller
            .wait_for_state("ghost", "ready", &mut CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, ScalerError::Timeout { .. }));
    }

    #[tokio::test]
    async fn malformed_service_status_is_hard_error() {
        let store = MemoryRecordStore::new("ns", status_record(json!({ "a": { "phase": "ready" } })));
        let poller = ConvergencePoller::new(&store, &fast_poll(500));
        let err = poller
            .wait_for_state("a", "ready", &mut CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, ScalerError::Record(RecordError::Shape { .. })));
    }

    #[tokio::test]
    async fn cancellation_stops_the_wait() {
        let store = MemoryRecordStore::new("ns", status_record(json!({ "a": { "state": "ready" } })));
        let poller = ConvergencePoller::new(&store, &fast_poll(60_000));
        let (tx, rx) = watch::channel(false);
        let mut cancel = CancelSignal::from_watch(rx);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = tx.send(true);
        });

        let err = poller
            .wait_for_state("a", "scaledToZero", &mut cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ScalerError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn cancellation_interrupts_stalled_read() {
        let store = StalledStore { key: RecordKey::for_namespace("ns") };
        let poller = ConvergencePoller::new(&store, &fast_poll(60_000));
        let (tx, rx) = watch::channel(false);
        let mut cancel = CancelSignal::from_watch(rx);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = tx.send(true);
        });

        let err = tokio::time::timeout(
            Duration::from_secs(2),
            poller.wait_for_state("a", "ready", &mut cancel),
        )
        .await
        .expect("poller must stop while the read is stalled")
        .unwrap_err();
        assert!(matches!(err, ScalerError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn deadline_interrupts_stalled_read() {
        let store = StalledStore { key: RecordKey::for_namespace("ns") };
        let poller = ConvergencePoller::new(&store, &fast_poll(50));

        let err = tokio::time::timeout(
            Duration::from_secs(2),
            poller.wait_for_state("a", "ready", &mut CancelSignal::never()),
        )
        .await
        .expect("poller must stop while the read is stalled")
        .unwrap_err();
        assert!(matches!(err, ScalerError::Timeout { .. }));
    }
}
