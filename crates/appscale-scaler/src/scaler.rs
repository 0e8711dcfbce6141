//! The engine façade consumed by the autoscaler and the request buffer.

use std::future::Future;

use appscale_record::{
    RecordStore, Resource, SELF_SCALING_SERVICE, ScaleDirection, build_scale_intent,
    decode_scale_resources, parse_last_scale_event, parse_record, parse_service_state,
    service_state,
};
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::config::{ResourceScalerConfig, ScalerConfig};
use crate::error::ScalerResult;
use crate::guard::{MutationGuard, QuiescenceGuard};
use crate::poller::ConvergencePoller;

/// Contract between the engine and the processes that decide when to
/// scale.
pub trait ResourceScaler: Send + Sync {
    /// Scale every resource to zero (`scale == 0`) or back from zero,
    /// returning once all of them converged.
    fn set_scale(
        &self,
        resources: &[Resource],
        scale: u32,
    ) -> impl Future<Output = ScalerResult<()>> + Send;

    /// Ready services that carry at least one scale rule.
    fn get_resources(&self) -> impl Future<Output = ScalerResult<Vec<Resource>>> + Send;

    /// Overrides for the consumer's own options, if any.
    fn get_config(&self) -> ScalerResult<Option<ResourceScalerConfig>>;

    /// Name of the service that serves `resource`.
    fn resolve_service_name(&self, resource: &Resource) -> ScalerResult<String>;
}

/// Scales tenant application services through the shared record.
pub struct AppResourceScaler<S> {
    store: S,
    config: ScalerConfig,
    shutdown: CancelSignal,
}

impl<S: RecordStore> AppResourceScaler<S> {
    pub fn new(store: S, config: ScalerConfig) -> Self {
        Self {
            store,
            config,
            shutdown: CancelSignal::never(),
        }
    }

    /// Abort in-flight waits once `shutdown` turns true.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = CancelSignal::from_watch(shutdown);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ScalerConfig {
        &self.config
    }

    /// Scale a single resource.
    pub async fn set_scale_one(&self, resource: &Resource, scale: u32) -> ScalerResult<()> {
        self.set_scale(std::slice::from_ref(resource), scale).await
    }

    /// `set_scale` with a caller-owned cancellation signal.
    ///
    /// All resources go into one patch, so they transition together or
    /// the call fails as a whole.
    pub async fn set_scale_with_cancel(
        &self,
        resources: &[Resource],
        scale: u32,
        cancel: &mut CancelSignal,
    ) -> ScalerResult<()> {
        let mut services: Vec<String> = Vec::with_capacity(resources.len());
        for resource in resources {
            if !services.contains(&resource.name) {
                services.push(resource.name.clone());
            }
        }
        if services.is_empty() {
            debug!("no resources to scale");
            return Ok(());
        }

        let direction = ScaleDirection::for_scale(scale);
        info!(
            namespace = %self.store.key().namespace,
            services = ?services,
            desired_state = direction.desired_state(),
            "scaling services"
        );

        let guard = QuiescenceGuard::new(&self.store, &self.config.poll);
        guard.await_quiescent(cancel).await?;

        // Stamped once the record is quiescent, right before the patch.
        let patch = build_scale_intent(
            &services,
            direction,
            Utc::now(),
            self.config.patch.disable_force_apply_all,
        );
        guard.apply(&patch).await?;

        ConvergencePoller::new(&self.store, &self.config.poll)
            .wait_for_states(&services, direction.desired_state(), cancel)
            .await
    }
}

impl<S: RecordStore> ResourceScaler for AppResourceScaler<S> {
    async fn set_scale(&self, resources: &[Resource], scale: u32) -> ScalerResult<()> {
        let mut cancel = self.shutdown.clone();
        self.set_scale_with_cancel(resources, scale, &mut cancel).await
    }

    async fn get_resources(&self) -> ScalerResult<Vec<Resource>> {
        let record = self.store.read_record().await?;
        let parsed = parse_record(&record)?;
        let mut resources = Vec::new();

        for (name, status) in &parsed.status_services {
            if name == SELF_SCALING_SERVICE {
                continue;
            }

            let state = match parse_service_state(status) {
                Ok(state) => state,
                Err(e) => {
                    warn!(service = %name, error = %e, "failed parsing the service state, skipping");
                    continue;
                }
            };
            if state != service_state::READY {
                continue;
            }

            let Some(spec) = parsed.spec_services.get(name) else {
                continue;
            };

            let scale_resources = match decode_scale_resources(spec) {
                Ok(rules) => rules,
                Err(e) => {
                    warn!(service = %name, error = %e, "failed parsing the scale resources, skipping");
                    continue;
                }
            };
            if scale_resources.is_empty() {
                continue;
            }

            let last = match parse_last_scale_event(status) {
                Ok(last) => last,
                Err(e) => {
                    warn!(service = %name, error = %e, "failed parsing the last scale event, skipping");
                    continue;
                }
            };

            resources.push(Resource {
                name: name.clone(),
                scale_resources,
                last_scale_event: last.map(|l| l.event),
                last_scale_event_time: last.map(|l| l.time),
            });
        }

        if !resources.is_empty() {
            debug!(count = resources.len(), "found scalable services");
        }
        Ok(resources)
    }

    fn get_config(&self) -> ScalerResult<Option<ResourceScalerConfig>> {
        Ok(None)
    }

    fn resolve_service_name(&self, resource: &Resource) -> ScalerResult<String> {
        Ok(resource.name.clone())
    }
}
