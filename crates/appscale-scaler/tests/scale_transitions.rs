//! End-to-end scale transitions against an in-memory record with a
//! simulated record controller.

use std::collections::HashSet;
use std::time::Duration;

use appscale_record::{
    JsonPatch, LastScaleEvent, MemoryRecordStore, RecordError, RecordKey, RecordResult,
    RecordStore, Resource, ScaleEvent, parse_last_scale_event,
};
use appscale_scaler::*;
use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::task::JoinHandle;

fn test_record(state: &str) -> Value {
    let rule = json!({ "scale_to_zero": {
        "mode": "enabled",
        "scale_resources": [ { "metric_name": "num_requests", "threshold": 1, "window_size": "5m" } ],
    } });
    json!({
        "spec": { "spec": { "tenants": [ { "spec": {
            "services": { "svcA": rule.clone(), "svcB": rule },
        } } ] } },
        "status": {
            "state": state,
            "services": {
                "svcA": { "state": "ready" },
                "svcB": { "state": "ready" },
            },
        },
    })
}

fn fast_config() -> ScalerConfig {
    ScalerConfig {
        poll: PollConfig {
            quiescence_timeout: Duration::from_millis(500),
            quiescence_interval: Duration::from_millis(5),
            convergence_timeout: Duration::from_millis(300),
            convergence_interval: Duration::from_millis(5),
        },
        ..ScalerConfig::default()
    }
}

/// Plays the record's controller: applies flagged services' desired
/// state, except for `stuck` ones, and returns the record to `ready`.
fn spawn_controller(store: MemoryRecordStore, stuck: &[&str]) -> JoinHandle<()> {
    let stuck: HashSet<String> = stuck.iter().map(|s| s.to_string()).collect();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(3)).await;
            store
                .update(|record| {
                    let waiting = matches!(
                        record["status"]["state"].as_str(),
                        Some("waitingForScalingToZero" | "waitingForScalingFromZero")
                    );
                    if !waiting {
                        return;
                    }

                    let specs = record["spec"]["spec"]["tenants"][0]["spec"]["services"]
                        .as_object()
                        .cloned()
                        .unwrap_or_default();
                    for (name, spec) in specs {
                        if spec["mark_as_changed"] != json!(true) || stuck.contains(&name) {
                            continue;
                        }
                        record["status"]["services"][&name]["state"] = spec["desired_state"].clone();
                        record["spec"]["spec"]["tenants"][0]["spec"]["services"][&name]["mark_as_changed"] =
                            json!(false);
                    }
                    record["status"]["state"] = json!("ready");
                })
                .await;
        }
    })
}

fn last_event(record: &Value, service: &str) -> Option<LastScaleEvent> {
    parse_last_scale_event(&record["status"]["services"][service]).unwrap()
}

#[tokio::test]
async fn scale_to_zero_then_back_returns_to_ready() {
    let store = MemoryRecordStore::new("tenant", test_record("ready"));
    let controller = spawn_controller(store.clone(), &[]);
    let scaler = AppResourceScaler::new(store.clone(), fast_config());
    let svc = Resource::named("svcA");

    scaler.set_scale_one(&svc, 0).await.unwrap();
    let record = store.snapshot().await;
    assert_eq!(record["status"]["services"]["svcA"]["state"], "scaledToZero");
    assert_eq!(last_event(&record, "svcA").unwrap().event, ScaleEvent::ScaleToZeroStarted);

    // A scaled-to-zero service is not offered to the autoscaler.
    assert!(scaler.get_resources().await.unwrap().iter().all(|r| r.name != "svcA"));

    scaler.set_scale_one(&svc, 1).await.unwrap();
    let record = store.snapshot().await;
    assert_eq!(record["status"]["services"]["svcA"]["state"], "ready");
    assert_eq!(last_event(&record, "svcA").unwrap().event, ScaleEvent::ScaleFromZeroStarted);

    let service_spec = &record["spec"]["spec"]["tenants"][0]["spec"]["services"]["svcA"];
    assert_eq!(service_spec["desired_state"], "ready");
    assert_eq!(service_spec["mark_for_restart"], false);
    assert_eq!(
        record["spec"]["spec"]["tenants"][0]["spec"]["force_apply_all_mode"],
        "disabled"
    );

    let resources = scaler.get_resources().await.unwrap();
    let svc_a = resources.iter().find(|r| r.name == "svcA").unwrap();
    assert_eq!(svc_a.last_scale_event, Some(ScaleEvent::ScaleFromZeroStarted));
    assert!(svc_a.last_scale_event_time.is_some());

    assert_eq!(store.applied_patches().await.len(), 2);
    controller.abort();
}

#[tokio::test]
async fn batch_issues_one_patch_for_all_services() {
    let store = MemoryRecordStore::new("tenant", test_record("ready"));
    let controller = spawn_controller(store.clone(), &[]);
    let scaler = AppResourceScaler::new(store.clone(), fast_config());

    scaler
        .set_scale(
            &[Resource::named("svcA"), Resource::named("svcB"), Resource::named("svcA")],
            0,
        )
        .await
        .unwrap();

    let patches = store.applied_patches().await;
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].len(), 2 * 6 + 2);

    let record = store.snapshot().await;
    assert_eq!(record["status"]["services"]["svcA"]["state"], "scaledToZero");
    assert_eq!(record["status"]["services"]["svcB"]["state"], "scaledToZero");
    controller.abort();
}

#[tokio::test]
async fn straggler_fails_the_whole_batch() {
    let store = MemoryRecordStore::new("tenant", test_record("ready"));
    let controller = spawn_controller(store.clone(), &["svcB"]);
    let scaler = AppResourceScaler::new(store.clone(), fast_config());

    let err = scaler
        .set_scale(&[Resource::named("svcA"), Resource::named("svcB")], 0)
        .await
        .unwrap_err();
    assert!(matches!(err, ScalerError::Timeout { .. }));

    // svcA converged, but the caller only sees the timeout.
    let record = store.snapshot().await;
    assert_eq!(record["status"]["services"]["svcA"]["state"], "scaledToZero");
    assert_eq!(record["status"]["services"]["svcB"]["state"], "ready");
    controller.abort();
}

#[tokio::test]
async fn patch_waits_for_in_flight_provisioning() {
    let store = MemoryRecordStore::new("tenant", test_record("waitingForProvisioning"));
    let scaler = AppResourceScaler::new(store.clone(), fast_config());

    let observer = store.clone();
    let finish = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        let patched_early = !observer.applied_patches().await.is_empty();
        observer
            .update(|record| record["status"]["state"] = json!("ready"))
            .await;
        patched_early
    });
    let controller = spawn_controller(store.clone(), &[]);

    scaler.set_scale_one(&Resource::named("svcA"), 0).await.unwrap();
    assert!(!finish.await.unwrap(), "patch was applied while provisioning");
    assert_eq!(store.applied_patches().await.len(), 1);
    controller.abort();
}

#[tokio::test]
async fn quiescence_timeout_issues_no_patch() {
    let store = MemoryRecordStore::new("tenant", test_record("waitingForScalingFromZero"));
    let mut config = fast_config();
    config.poll.quiescence_timeout = Duration::from_millis(30);
    let scaler = AppResourceScaler::new(store.clone(), config);

    let err = scaler.set_scale_one(&Resource::named("svcA"), 0).await.unwrap_err();
    assert!(matches!(err, ScalerError::Timeout { .. }));
    assert!(store.applied_patches().await.is_empty());
}

#[tokio::test]
async fn shutdown_cancels_before_patching() {
    let store = MemoryRecordStore::new("tenant", test_record("waitingForProvisioning"));
    let mut config = fast_config();
    config.poll.quiescence_timeout = Duration::from_secs(60);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scaler = AppResourceScaler::new(store.clone(), config).with_shutdown(shutdown_rx);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = shutdown_tx.send(true);
    });

    let err = scaler.set_scale_one(&Resource::named("svcA"), 0).await.unwrap_err();
    assert!(matches!(err, ScalerError::Cancelled { .. }));
    assert!(store.applied_patches().await.is_empty());
}

#[tokio::test]
async fn explicit_cancel_signal_stops_convergence_wait() {
    let store = MemoryRecordStore::new("tenant", test_record("ready"));
    let mut config = fast_config();
    config.poll.convergence_timeout = Duration::from_secs(60);
    let scaler = AppResourceScaler::new(store.clone(), config);

    let (tx, rx) = watch::channel(false);
    let mut cancel = CancelSignal::from_watch(rx);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        let _ = tx.send(true);
    });

    // No controller: the patch lands but nothing converges.
    let err = scaler
        .set_scale_with_cancel(&[Resource::named("svcA")], 0, &mut cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ScalerError::Cancelled { .. }));
    assert_eq!(store.applied_patches().await.len(), 1);
}

#[tokio::test]
async fn patch_transport_failure_surfaces() {
    let store = MemoryRecordStore::new("tenant", test_record("ready"));
    store.fail_patches(true).await;
    let scaler = AppResourceScaler::new(store.clone(), fast_config());

    let err = scaler.set_scale_one(&Resource::named("svcA"), 0).await.unwrap_err();
    assert!(matches!(err, ScalerError::Record(RecordError::Transport(_))));
}

#[tokio::test]
async fn scale_event_time_is_stamped_after_provisioning_ends() {
    let store = MemoryRecordStore::new("tenant", test_record("waitingForProvisioning"));
    let scaler = AppResourceScaler::new(store.clone(), fast_config());

    let observer = store.clone();
    let release = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        let released_at = Utc::now();
        observer
            .update(|record| record["status"]["state"] = json!("ready"))
            .await;
        released_at
    });
    let controller = spawn_controller(store.clone(), &[]);

    scaler.set_scale_one(&Resource::named("svcA"), 0).await.unwrap();
    let released_at = release.await.unwrap();

    let stamped = last_event(&store.snapshot().await, "svcA").unwrap().time;
    assert!(stamped >= released_at, "{stamped} is older than {released_at}");
    controller.abort();
}

/// Record store whose reads never complete.
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

#[tokio::test]
async fn shutdown_interrupts_a_stalled_read() {
    let store = StalledStore { key: RecordKey::for_namespace("tenant") };
    let mut config = fast_config();
    config.poll.quiescence_timeout = Duration::from_secs(60);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scaler = AppResourceScaler::new(store, config).with_shutdown(shutdown_rx);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = shutdown_tx.send(true);
    });

    let err = tokio::time::timeout(
        Duration::from_secs(2),
        scaler.set_scale_one(&Resource::named("svcA"), 0),
    )
    .await
    .expect("scale request must stop while the read is stalled")
    .unwrap_err();
    assert!(matches!(err, ScalerError::Cancelled { .. }));
}
