//! Scale decisions, including the transition to and from zero replicas.
//!
//! The scaler takes the desired replica count proposed by the decider and
//! turns it into the effective count applied to the target workload. Most
//! invocations are a clamp and a patch; the interesting work is around
//! zero, where the decision depends on the autoscaler's activity state,
//! the routing mode, and whether the activator is confirmed in the data
//! path. Every branch that withholds a scale change either schedules a
//! re-enqueue or starts a probe campaign whose completion re-enqueues, so
//! no key ever goes quiet before converging.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use strato_api::{PaKey, PodAutoscaler, PodScalable, ServerlessService, ServingMode};

use crate::clock::Clock;
use crate::config::ScalingConfig;
use crate::probe::manager::{ProbeDone, ProbeManager};
use crate::probe::{probe_target, ActivatorProber};
use crate::queue::ReenqueueScheduler;
use crate::workload::{ScaleClient, WorkloadError, WorkloadStore};

/// Sentinel for "no decision yet": metrics are not warmed up, or an
/// activation is still in progress.
pub const SCALE_UNKNOWN: i32 = -1;

/// Period between attempts within one probe campaign.
pub const PROBE_PERIOD: Duration = Duration::from_secs(1);

/// Overall time limit for one probe campaign.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(45);

/// Delay before re-enqueueing a key after a probe campaign finishes.
/// Short, because the decision procedure re-enqueues for the configured
/// grace period on its own once the activator is confirmed.
pub const REENQUEUE_PERIOD: Duration = Duration::from_secs(1);

/// Grace on top of the progress deadline before a stuck activation is
/// abandoned. On deadline expiry the workload reconciler updates the
/// target's status to surface instance errors; scaling to zero at that
/// same instant would race it and destroy the diagnostic state.
const ACTIVATION_TIMEOUT_BUFFER: Duration = Duration::from_secs(10);

/// Safety re-enqueue after deciding to deactivate while routing already
/// proxies: the routing status may not change meaningfully, so nothing
/// else would wake this key.
const PROXY_MODE_HOLDOFF: Duration = Duration::from_secs(3);

/// Errors surfaced to the reconciler. Probe failures are not here: they
/// are recovered locally as an activator-absent signal.
#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("failed to get scale target {target}: {source}")]
    Target {
        target: String,
        source: WorkloadError,
    },

    #[error("failed to apply scale {desired} to scale target {target}: {source}")]
    Apply {
        desired: i32,
        target: String,
        source: WorkloadError,
    },
}

/// Clamp `x` into `[min, max]`, where `max == 0` disables the upper bound.
fn apply_bounds(min: i32, max: i32, x: i32) -> i32 {
    debug_assert!(0 <= min && 0 <= max && (max == 0 || min <= max));
    if x < min {
        return min;
    }
    if max != 0 && x > max {
        return max;
    }
    x
}

/// The terminal-outcome callback wired into the probe manager: re-enqueue
/// the key in every case, so a timed-out campaign retries and a confirmed
/// one proceeds to zero.
fn reenqueue_on_done(enqueue: Arc<dyn ReenqueueScheduler>) -> ProbeDone {
    Arc::new(move |key: PaKey, success: bool, err: Option<anyhow::Error>| {
        info!(
            pa = %key,
            success,
            error = err.as_ref().map(tracing::field::display),
            "Probe campaign done, re-enqueueing"
        );
        enqueue.schedule(key, REENQUEUE_PERIOD);
    })
}

/// Drives the replica count of autoscaled workloads.
pub struct Scaler {
    workloads: Arc<dyn WorkloadStore>,
    scale_client: Arc<dyn ScaleClient>,
    prober: Arc<dyn ActivatorProber>,
    probes: ProbeManager,
    enqueue: Arc<dyn ReenqueueScheduler>,
    clock: Arc<dyn Clock>,
}

impl Scaler {
    pub fn new(
        workloads: Arc<dyn WorkloadStore>,
        scale_client: Arc<dyn ScaleClient>,
        prober: Arc<dyn ActivatorProber>,
        enqueue: Arc<dyn ReenqueueScheduler>,
        clock: Arc<dyn Clock>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let probes = ProbeManager::new(
            Arc::clone(&prober),
            reenqueue_on_done(Arc::clone(&enqueue)),
            shutdown,
        );
        Self {
            workloads,
            scale_client,
            prober,
            probes,
            enqueue,
            clock,
        }
    }

    /// Probe-campaign state, exposed for tests and introspection.
    pub fn probes(&self) -> &ProbeManager {
        &self.probes
    }

    /// Scale the autoscaler's target to `desired_scale`, or to whatever
    /// the zero-transition rules decide instead. Returns the effective
    /// scale; `SCALE_UNKNOWN` means no decision was reached this pass.
    pub async fn scale(
        &self,
        config: &ScalingConfig,
        pa: &PodAutoscaler,
        sks: &ServerlessService,
        desired_scale: i32,
    ) -> Result<i32, ScaleError> {
        if desired_scale < 0 && !pa.status.is_activating() {
            debug!(pa = %pa.key(), "Metrics are not yet being collected");
            return Ok(desired_scale);
        }

        let (min, max) = pa.scale_bounds();
        let mut desired_scale = desired_scale;
        let clamped = apply_bounds(min, max, desired_scale);
        if clamped != desired_scale {
            debug!(
                pa = %pa.key(),
                from = desired_scale,
                to = clamped,
                "Adjusting desired scale to the configured bounds"
            );
            desired_scale = clamped;
        }

        let (desired_scale, should_apply) = self
            .handle_scale_to_zero(config, pa, sks, desired_scale)
            .await;
        if !should_apply {
            return Ok(desired_scale);
        }

        let target = &pa.spec.scale_target_ref;
        let ps = self
            .workloads
            .get(&pa.metadata.namespace, target)
            .await
            .map_err(|source| ScaleError::Target {
                target: target.name.clone(),
                source,
            })?;

        let current_scale = ps.replicas();
        if current_scale == desired_scale {
            return Ok(desired_scale);
        }

        info!(
            pa = %pa.key(),
            from = current_scale,
            to = desired_scale,
            "Scaling target"
        );
        self.apply_scale(pa, desired_scale, &ps).await?;
        Ok(desired_scale)
    }

    /// Decide the effective scale and whether to apply it.
    ///
    /// Zero replicas is only applied once (a) scale-to-zero is enabled,
    /// (b) the unit sat out its stable window and was marked Inactive, and
    /// (c) the activator has held its traffic for the grace period.
    /// Alternatively, an activation stuck past its deadline is abandoned
    /// straight to zero.
    async fn handle_scale_to_zero(
        &self,
        config: &ScalingConfig,
        pa: &PodAutoscaler,
        sks: &ServerlessService,
        desired_scale: i32,
    ) -> (i32, bool) {
        if desired_scale != 0 {
            return (desired_scale, true);
        }

        if !config.enable_scale_to_zero {
            return (1, true);
        }

        let activation_timeout = config.progress_deadline + ACTIVATION_TIMEOUT_BUFFER;
        let now = self.clock.now();

        if pa.status.is_activating() {
            if pa.status.can_fail_activation(now, activation_timeout) {
                info!(
                    pa = %pa.key(),
                    timeout_secs = activation_timeout.as_secs(),
                    "Activation timed out, abandoning"
                );
                return (desired_scale, true);
            }
            self.enqueue.schedule(pa.key(), activation_timeout);
            return (SCALE_UNKNOWN, false);
        }

        if pa.status.is_active() {
            // Never apply zero to an Active unit; returning `(0, false)`
            // signals the reconciler to mark it Inactive instead.
            let stable_window = pa.stable_window(config.stable_window);
            let active_for = pa.status.active_for(now).unwrap_or_default();
            if active_for >= stable_window {
                if sks.spec.mode == ServingMode::Proxy {
                    debug!(pa = %pa.key(), "Routing already proxies, scheduling safety re-enqueue");
                    self.enqueue.schedule(pa.key(), PROXY_MODE_HOLDOFF);
                }
                info!(
                    pa = %pa.key(),
                    active_for_secs = active_for.as_secs(),
                    "Stable window passed, can deactivate"
                );
                return (desired_scale, false);
            }

            let remaining = stable_window - active_for;
            debug!(
                pa = %pa.key(),
                remaining_secs = remaining.as_secs(),
                "Holding at one replica until the stable window passes"
            );
            self.enqueue.schedule(pa.key(), remaining);
            return (1, true);
        }

        // Inactive. Zero is only safe once the activator is confirmed in
        // the data path.
        let confirmed = match self.activator_probe(pa).await {
            Ok(confirmed) => confirmed,
            Err(e) => {
                warn!(pa = %pa.key(), error = %e, "Activator probe failed");
                false
            }
        };

        if confirmed {
            // Conservative check first: the unit's own inactivity time.
            if pa
                .status
                .can_scale_to_zero(now, config.scale_to_zero_grace_period)
            {
                return (desired_scale, true);
            }

            // Fast path: the routing layer's own time in Proxy mode,
            // usually longer than the unit's inactivity.
            let proxy_for = sks.status.proxy_for(now);
            let remaining = config.scale_to_zero_grace_period.saturating_sub(proxy_for);
            if remaining.is_zero() {
                info!(
                    pa = %pa.key(),
                    proxy_for_secs = proxy_for.as_secs(),
                    "Proxying past the grace period, scaling to zero"
                );
                return (desired_scale, true);
            }

            debug!(
                pa = %pa.key(),
                remaining_secs = remaining.as_secs(),
                "Waiting out the remaining grace period"
            );
            self.enqueue.schedule(pa.key(), remaining);
            return (desired_scale, false);
        }

        info!(pa = %pa.key(), "Not yet backed by the activator, cannot scale to zero");
        match probe_target(pa) {
            Some(target) => {
                if !self.probes.offer(target, pa.key(), PROBE_PERIOD, PROBE_TIMEOUT) {
                    debug!(pa = %pa.key(), "Probe campaign already in flight");
                }
            }
            // No public service to probe yet; poll until one appears.
            None => self.enqueue.schedule(pa.key(), REENQUEUE_PERIOD),
        }
        (desired_scale, false)
    }

    /// One synchronous probe. A unit without a published service cannot be
    /// backed by the activator, so that answers without a network call.
    async fn activator_probe(&self, pa: &PodAutoscaler) -> anyhow::Result<bool> {
        match probe_target(pa) {
            None => Ok(false),
            Some(target) => self.prober.probe(&target).await,
        }
    }

    /// Patch the target's replica count to `desired_scale`.
    async fn apply_scale(
        &self,
        pa: &PodAutoscaler,
        desired_scale: i32,
        ps: &PodScalable,
    ) -> Result<(), ScaleError> {
        let target = &pa.spec.scale_target_ref;

        let result = async {
            let gvr = target.group_version_resource()?;
            let updated = ps.with_replicas(desired_scale);
            let patch = json_patch::diff(
                &serde_json::to_value(ps)?,
                &serde_json::to_value(&updated)?,
            );
            self.scale_client
                .patch_scale(&pa.metadata.namespace, &gvr, &ps.metadata.name, &patch)
                .await
        }
        .await;

        result.map_err(|source: WorkloadError| ScaleError::Apply {
            desired: desired_scale,
            target: target.name.clone(),
            source,
        })?;

        debug!(pa = %pa.key(), replicas = desired_scale, "Scaled target");
        Ok(())
    }
}
