//! Scale decision scenarios.
//!
//! Drives the scaler end to end against fakes: a programmable activator
//! prober, a recording re-enqueue scheduler, an in-memory workload store,
//! and a recording scale client. The clock is manual, so every time-based
//! branch is exercised deterministically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::watch;

use strato_api::{
    ActivityState, GroupVersionResource, ObjectMeta, PaKey, PodAutoscaler, PodAutoscalerSpec,
    PodAutoscalerStatus, PodScalable, ProtocolType, ServerlessService, ServerlessServiceSpec,
    ServerlessServiceStatus, ServingMode, WorkloadRef,
};
use strato_autoscaler::clock::ManualClock;
use strato_autoscaler::config::ScalingConfig;
use strato_autoscaler::probe::{probe_target, ActivatorProber};
use strato_autoscaler::queue::ReenqueueScheduler;
use strato_autoscaler::scaler::{Scaler, SCALE_UNKNOWN};
use strato_autoscaler::workload::{ScaleClient, WorkloadError, WorkloadStore};

// =============================================================================
// Fakes
// =============================================================================

#[derive(Clone, Copy)]
enum ProbeOutcome {
    Confirmed,
    Denied,
    Unreachable,
}

struct FakeProber {
    outcome: ProbeOutcome,
    calls: AtomicUsize,
}

#[async_trait]
impl ActivatorProber for FakeProber {
    async fn probe(&self, _target: &str) -> anyhow::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.outcome {
            ProbeOutcome::Confirmed => Ok(true),
            ProbeOutcome::Denied => Ok(false),
            ProbeOutcome::Unreachable => anyhow::bail!("connection refused"),
        }
    }
}

struct RecordingScheduler {
    calls: Mutex<Vec<(PaKey, Duration)>>,
}

impl RecordingScheduler {
    fn delays(&self) -> Vec<Duration> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, delay)| *delay)
            .collect()
    }
}

impl ReenqueueScheduler for RecordingScheduler {
    fn schedule(&self, key: PaKey, delay: Duration) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((key, delay));
    }
}

struct FakeWorkloads {
    objects: Mutex<HashMap<String, PodScalable>>,
}

#[async_trait]
impl WorkloadStore for FakeWorkloads {
    async fn get(
        &self,
        _namespace: &str,
        target: &WorkloadRef,
    ) -> Result<PodScalable, WorkloadError> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&target.name)
            .cloned()
            .ok_or(WorkloadError::NotFound {
                target: target.name.clone(),
            })
    }
}

struct RecordingScaleClient {
    patches: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingScaleClient {
    fn patches(&self) -> Vec<(String, serde_json::Value)> {
        self.patches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ScaleClient for RecordingScaleClient {
    async fn patch_scale(
        &self,
        _namespace: &str,
        _gvr: &GroupVersionResource,
        name: &str,
        patch: &json_patch::Patch,
    ) -> Result<(), WorkloadError> {
        let value = serde_json::to_value(patch)?;
        self.patches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((name.to_string(), value));
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
}

fn test_config() -> ScalingConfig {
    ScalingConfig {
        enable_scale_to_zero: true,
        stable_window: Duration::from_secs(60),
        scale_to_zero_grace_period: Duration::from_secs(30),
        progress_deadline: Duration::from_secs(600),
    }
}

struct Harness {
    scaler: Scaler,
    clock: ManualClock,
    prober: Arc<FakeProber>,
    scheduler: Arc<RecordingScheduler>,
    scale_client: Arc<RecordingScaleClient>,
    _shutdown_tx: watch::Sender<bool>,
}

impl Harness {
    /// A harness whose workload store holds one `frontend` deployment at
    /// `current_replicas`.
    fn new(outcome: ProbeOutcome, current_replicas: i32) -> Self {
        let workload: PodScalable = serde_json::from_value(serde_json::json!({
            "metadata": {"namespace": "prod", "name": "frontend"},
            "spec": {"replicas": current_replicas, "selector": {"app": "frontend"}}
        }))
        .unwrap();

        let prober = Arc::new(FakeProber {
            outcome,
            calls: AtomicUsize::new(0),
        });
        let scheduler = Arc::new(RecordingScheduler {
            calls: Mutex::new(Vec::new()),
        });
        let scale_client = Arc::new(RecordingScaleClient {
            patches: Mutex::new(Vec::new()),
        });
        let workloads = Arc::new(FakeWorkloads {
            objects: Mutex::new(HashMap::from([("frontend".to_string(), workload)])),
        });
        let clock = ManualClock::new(base_time());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scaler = Scaler::new(
            workloads,
            Arc::clone(&scale_client) as Arc<dyn ScaleClient>,
            Arc::clone(&prober) as Arc<dyn ActivatorProber>,
            Arc::clone(&scheduler) as Arc<dyn ReenqueueScheduler>,
            Arc::new(clock.clone()),
            shutdown_rx,
        );

        Self {
            scaler,
            clock,
            prober,
            scheduler,
            scale_client,
            _shutdown_tx: shutdown_tx,
        }
    }

    fn probe_count(&self) -> usize {
        self.prober.calls.load(Ordering::SeqCst)
    }
}

/// A PodAutoscaler in `state` since `base_time()`, bounds `[min, max]`.
fn pa(state: ActivityState, min: Option<i32>, max: Option<i32>) -> PodAutoscaler {
    PodAutoscaler {
        metadata: ObjectMeta {
            namespace: "prod".to_string(),
            name: "frontend".to_string(),
        },
        spec: PodAutoscalerSpec {
            scale_target_ref: WorkloadRef {
                api_version: "apps/v1".to_string(),
                kind: "Deployment".to_string(),
                name: "frontend".to_string(),
            },
            min_scale: min,
            max_scale: max,
            protocol_type: ProtocolType::Http1,
            stable_window_seconds: None,
        },
        status: PodAutoscalerStatus {
            service_name: Some("frontend-pub".to_string()),
            state,
            last_transition_time: base_time(),
        },
    }
}

/// A ServerlessService in `mode` (spec and status) since `transitioned`.
fn sks(mode: ServingMode, transitioned: DateTime<Utc>) -> ServerlessService {
    ServerlessService {
        metadata: ObjectMeta {
            namespace: "prod".to_string(),
            name: "frontend".to_string(),
        },
        spec: ServerlessServiceSpec { mode },
        status: ServerlessServiceStatus {
            mode,
            last_transition_time: transitioned,
        },
    }
}

fn replace_replicas_patch(value: i32) -> serde_json::Value {
    serde_json::json!([
        {"op": "replace", "path": "/spec/replicas", "value": value}
    ])
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_steady_state_positive_scale() {
    let h = Harness::new(ProbeOutcome::Denied, 3);
    let pa = pa(ActivityState::Active, Some(1), Some(10));
    let sks = sks(ServingMode::Serve, base_time());

    let effective = h
        .scaler
        .scale(&test_config(), &pa, &sks, 5)
        .await
        .unwrap();

    assert_eq!(effective, 5);
    assert_eq!(
        h.scale_client.patches(),
        vec![("frontend".to_string(), replace_replicas_patch(5))]
    );
    assert_eq!(h.probe_count(), 0);
    assert!(h.scheduler.delays().is_empty());
}

#[tokio::test]
async fn test_hot_active_holds_at_one() {
    let h = Harness::new(ProbeOutcome::Denied, 1);
    let pa = pa(ActivityState::Active, None, None);
    let sks = sks(ServingMode::Serve, base_time());

    // Active for only 10s of the 60s stable window.
    h.clock.advance(Duration::from_secs(10));

    let effective = h
        .scaler
        .scale(&test_config(), &pa, &sks, 0)
        .await
        .unwrap();

    assert_eq!(effective, 1);
    // Already at one replica, nothing to patch.
    assert!(h.scale_client.patches().is_empty());
    assert_eq!(h.probe_count(), 0);
    assert_eq!(h.scheduler.delays(), vec![Duration::from_secs(50)]);
}

#[tokio::test]
async fn test_cool_active_deactivates_without_apply() {
    let h = Harness::new(ProbeOutcome::Denied, 1);
    let pa = pa(ActivityState::Active, None, None);
    let sks = sks(ServingMode::Proxy, base_time());

    h.clock.advance(Duration::from_secs(120));

    let effective = h
        .scaler
        .scale(&test_config(), &pa, &sks, 0)
        .await
        .unwrap();

    assert_eq!(effective, 0);
    assert!(h.scale_client.patches().is_empty());
    // Routing already proxies, so only the safety re-enqueue fires.
    assert_eq!(h.scheduler.delays(), vec![Duration::from_secs(3)]);
}

#[tokio::test]
async fn test_inactive_confirmed_waits_out_grace() {
    let h = Harness::new(ProbeOutcome::Confirmed, 1);
    let pa = pa(ActivityState::Inactive, None, None);
    // Proxying for 5s when the decision runs 10s after deactivation.
    let sks = sks(
        ServingMode::Proxy,
        base_time() + chrono::Duration::seconds(5),
    );

    h.clock.advance(Duration::from_secs(10));

    let effective = h
        .scaler
        .scale(&test_config(), &pa, &sks, 0)
        .await
        .unwrap();

    assert_eq!(effective, 0);
    assert!(h.scale_client.patches().is_empty());
    // grace (30s) - proxy_for (5s) = 25s.
    assert_eq!(h.scheduler.delays(), vec![Duration::from_secs(25)]);
}

#[tokio::test]
async fn test_inactive_confirmed_past_grace_via_proxy_time() {
    let h = Harness::new(ProbeOutcome::Confirmed, 2);
    let pa = pa(ActivityState::Inactive, None, None);
    // Proxying since 21s before deactivation: 31s by decision time.
    let sks = sks(
        ServingMode::Proxy,
        base_time() - chrono::Duration::seconds(21),
    );

    h.clock.advance(Duration::from_secs(10));

    let effective = h
        .scaler
        .scale(&test_config(), &pa, &sks, 0)
        .await
        .unwrap();

    assert_eq!(effective, 0);
    assert_eq!(
        h.scale_client.patches(),
        vec![("frontend".to_string(), replace_replicas_patch(0))]
    );
    assert!(h.scheduler.delays().is_empty());
}

#[tokio::test]
async fn test_inactive_past_grace_on_own_inactivity() {
    let h = Harness::new(ProbeOutcome::Confirmed, 2);
    let pa = pa(ActivityState::Inactive, None, None);
    let sks = sks(ServingMode::Proxy, base_time());

    h.clock.advance(Duration::from_secs(30));

    let effective = h
        .scaler
        .scale(&test_config(), &pa, &sks, 0)
        .await
        .unwrap();

    assert_eq!(effective, 0);
    assert_eq!(
        h.scale_client.patches(),
        vec![("frontend".to_string(), replace_replicas_patch(0))]
    );
}

#[tokio::test]
async fn test_inactive_activator_unreachable_starts_campaign() {
    let h = Harness::new(ProbeOutcome::Unreachable, 2);
    let pa = pa(ActivityState::Inactive, None, None);
    let sks = sks(ServingMode::Proxy, base_time());

    h.clock.advance(Duration::from_secs(60));

    let effective = h
        .scaler
        .scale(&test_config(), &pa, &sks, 0)
        .await
        .unwrap();

    assert_eq!(effective, 0);
    assert!(h.scale_client.patches().is_empty());
    // The key is handed to the probe manager, not the scheduler.
    assert!(h.scheduler.delays().is_empty());
    let target = probe_target(&pa).unwrap();
    assert!(h.scaler.probes().is_in_flight(&target));
}

#[tokio::test]
async fn test_activating_timed_out_abandons() {
    let h = Harness::new(ProbeOutcome::Denied, 2);
    let pa = pa(ActivityState::Activating, None, None);
    let sks = sks(ServingMode::Serve, base_time());

    // 620s activating against a 600s + 10s buffer deadline.
    h.clock.advance(Duration::from_secs(620));

    let effective = h
        .scaler
        .scale(&test_config(), &pa, &sks, 0)
        .await
        .unwrap();

    assert_eq!(effective, 0);
    assert_eq!(
        h.scale_client.patches(),
        vec![("frontend".to_string(), replace_replicas_patch(0))]
    );
    assert!(h.scheduler.delays().is_empty());
}

#[tokio::test]
async fn test_activating_within_deadline_waits() {
    let h = Harness::new(ProbeOutcome::Denied, 2);
    let pa = pa(ActivityState::Activating, None, None);
    let sks = sks(ServingMode::Serve, base_time());

    h.clock.advance(Duration::from_secs(100));

    let effective = h
        .scaler
        .scale(&test_config(), &pa, &sks, 0)
        .await
        .unwrap();

    assert_eq!(effective, SCALE_UNKNOWN);
    assert!(h.scale_client.patches().is_empty());
    assert_eq!(h.scheduler.delays(), vec![Duration::from_secs(610)]);
}

// =============================================================================
// Universal properties
// =============================================================================

#[tokio::test]
async fn test_zero_gated_when_scale_to_zero_disabled() {
    let h = Harness::new(ProbeOutcome::Confirmed, 3);
    let pa = pa(ActivityState::Inactive, None, None);
    let sks = sks(ServingMode::Proxy, base_time());

    h.clock.advance(Duration::from_secs(600));

    let mut config = test_config();
    config.enable_scale_to_zero = false;

    let effective = h.scaler.scale(&config, &pa, &sks, 0).await.unwrap();

    assert_eq!(effective, 1);
    assert_eq!(
        h.scale_client.patches(),
        vec![("frontend".to_string(), replace_replicas_patch(1))]
    );
    // Disabled scale-to-zero never consults the activator.
    assert_eq!(h.probe_count(), 0);
}

#[tokio::test]
async fn test_unknown_desired_scale_is_a_no_op() {
    let h = Harness::new(ProbeOutcome::Denied, 3);
    let pa = pa(ActivityState::Active, Some(1), Some(10));
    let sks = sks(ServingMode::Serve, base_time());

    let effective = h
        .scaler
        .scale(&test_config(), &pa, &sks, SCALE_UNKNOWN)
        .await
        .unwrap();

    assert_eq!(effective, SCALE_UNKNOWN);
    assert!(h.scale_client.patches().is_empty());
    assert!(h.scheduler.delays().is_empty());
    assert_eq!(h.probe_count(), 0);
}

#[tokio::test]
async fn test_unknown_desired_scale_while_activating_schedules_deadline() {
    let h = Harness::new(ProbeOutcome::Denied, 0);
    let pa = pa(ActivityState::Activating, None, None);
    let sks = sks(ServingMode::Serve, base_time());

    let effective = h
        .scaler
        .scale(&test_config(), &pa, &sks, SCALE_UNKNOWN)
        .await
        .unwrap();

    assert_eq!(effective, SCALE_UNKNOWN);
    assert!(h.scale_client.patches().is_empty());
    assert_eq!(h.scheduler.delays(), vec![Duration::from_secs(610)]);
}

#[tokio::test]
async fn test_desired_scale_clamped_to_bounds() {
    let h = Harness::new(ProbeOutcome::Denied, 3);
    let pa = pa(ActivityState::Active, Some(2), Some(4));
    let sks = sks(ServingMode::Serve, base_time());

    let effective = h
        .scaler
        .scale(&test_config(), &pa, &sks, 9)
        .await
        .unwrap();

    assert_eq!(effective, 4);
    assert_eq!(
        h.scale_client.patches(),
        vec![("frontend".to_string(), replace_replicas_patch(4))]
    );
}

#[tokio::test]
async fn test_apply_is_idempotent_at_current_scale() {
    let h = Harness::new(ProbeOutcome::Denied, 5);
    let pa = pa(ActivityState::Active, Some(1), Some(10));
    let sks = sks(ServingMode::Serve, base_time());

    for _ in 0..2 {
        let effective = h
            .scaler
            .scale(&test_config(), &pa, &sks, 5)
            .await
            .unwrap();
        assert_eq!(effective, 5);
    }

    assert!(h.scale_client.patches().is_empty());
}

#[tokio::test]
async fn test_missing_scale_target_surfaces() {
    let h = Harness::new(ProbeOutcome::Denied, 3);
    let mut pa = pa(ActivityState::Active, None, None);
    pa.spec.scale_target_ref.name = "vanished".to_string();
    let sks = sks(ServingMode::Serve, base_time());

    let err = h
        .scaler
        .scale(&test_config(), &pa, &sks, 5)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("vanished"));
    assert!(h.scale_client.patches().is_empty());
}

#[tokio::test]
async fn test_inactive_without_service_name_polls() {
    let h = Harness::new(ProbeOutcome::Confirmed, 2);
    let mut pa = pa(ActivityState::Inactive, None, None);
    pa.status.service_name = None;
    let sks = sks(ServingMode::Proxy, base_time());

    h.clock.advance(Duration::from_secs(600));

    let effective = h
        .scaler
        .scale(&test_config(), &pa, &sks, 0)
        .await
        .unwrap();

    // Without a published service the activator cannot be confirmed, and
    // there is no target to probe; the key polls instead of stalling.
    assert_eq!(effective, 0);
    assert!(h.scale_client.patches().is_empty());
    assert_eq!(h.probe_count(), 0);
    assert_eq!(h.scheduler.delays(), vec![Duration::from_secs(1)]);
}
