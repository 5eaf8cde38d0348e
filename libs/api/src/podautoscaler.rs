//! The PodAutoscaler control object.
//!
//! A PodAutoscaler represents one scalable unit: the workload it targets,
//! the replica bounds the operator configured, and the observed activity
//! state. The activity state is a three-way condition with a transition
//! timestamp; all time-based predicates used by the scaler derive from that
//! single timestamp.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::meta::{ObjectMeta, PaKey};
use crate::scalable::WorkloadRef;

/// One scalable unit and its desired/observed scaling state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodAutoscaler {
    pub metadata: ObjectMeta,
    pub spec: PodAutoscalerSpec,
    pub status: PodAutoscalerStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodAutoscalerSpec {
    /// The workload whose replica count this autoscaler drives.
    pub scale_target_ref: WorkloadRef,

    /// Lower replica bound. Missing means no lower bound.
    #[serde(default)]
    pub min_scale: Option<i32>,

    /// Upper replica bound. Missing or zero means unbounded.
    #[serde(default)]
    pub max_scale: Option<i32>,

    /// Application protocol, which selects the probe port.
    #[serde(default)]
    pub protocol_type: ProtocolType,

    /// Per-autoscaler override of the global stable window.
    #[serde(default)]
    pub stable_window_seconds: Option<u64>,
}

/// Application-level protocol spoken by the workload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolType {
    #[default]
    Http1,
    H2c,
}

impl ProtocolType {
    /// Port the public service exposes for this protocol.
    pub fn service_port(self) -> u16 {
        match self {
            ProtocolType::Http1 => 80,
            ProtocolType::H2c => 81,
        }
    }
}

/// Observed liveness of the scalable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    /// Instances are up and serving.
    Active,
    /// An activation is underway; instances are not yet serving.
    Activating,
    /// Scaled down; traffic is held by the activator.
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodAutoscalerStatus {
    /// Name of the public service fronting this unit. Missing or empty
    /// means there is nothing to probe yet.
    #[serde(default)]
    pub service_name: Option<String>,

    pub state: ActivityState,

    /// When `state` last changed.
    pub last_transition_time: DateTime<Utc>,
}

impl PodAutoscaler {
    /// Workqueue key for this autoscaler.
    pub fn key(&self) -> PaKey {
        PaKey::new(self.metadata.namespace.clone(), self.metadata.name.clone())
    }

    /// Configured replica bounds as `(min, max)`, where `max == 0` means
    /// unbounded. Negative values are treated as absent.
    pub fn scale_bounds(&self) -> (i32, i32) {
        let min = self.spec.min_scale.unwrap_or(0).max(0);
        let max = self.spec.max_scale.unwrap_or(0).max(0);
        (min, max)
    }

    /// The stable window for this autoscaler: the per-object override if
    /// set, the global default otherwise.
    pub fn stable_window(&self, default: Duration) -> Duration {
        self.spec
            .stable_window_seconds
            .map(Duration::from_secs)
            .unwrap_or(default)
    }
}

impl PodAutoscalerStatus {
    pub fn is_active(&self) -> bool {
        self.state == ActivityState::Active
    }

    pub fn is_activating(&self) -> bool {
        self.state == ActivityState::Activating
    }

    pub fn is_inactive(&self) -> bool {
        self.state == ActivityState::Inactive
    }

    /// Time spent in the current state as of `now`. Clock skew that would
    /// produce a negative duration clamps to zero.
    fn since_transition(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.last_transition_time)
            .to_std()
            .unwrap_or_default()
    }

    /// How long the unit has been Active, or `None` when it is not.
    pub fn active_for(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.is_active().then(|| self.since_transition(now))
    }

    /// True when an activation has been underway for at least `timeout`
    /// and may be abandoned.
    pub fn can_fail_activation(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.is_activating() && self.since_transition(now) >= timeout
    }

    /// True when the unit has been Inactive for at least `grace` and may
    /// safely reach zero replicas.
    pub fn can_scale_to_zero(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.is_inactive() && self.since_transition(now) >= grace
    }
}
