//! In-memory snapshots of autoscaler inputs.
//!
//! Each snapshot pairs a PodAutoscaler with its ServerlessService and the
//! desired scale the decider proposed for it. Snapshots are replaced
//! wholesale by the sync loop and cloned out for reconciliation, so
//! reconciles never mutate cached state.

use std::collections::HashMap;

use serde::Deserialize;
use tokio::sync::RwLock;

use strato_api::{PaKey, PodAutoscaler, ServerlessService};

/// One autoscaler's inputs as of the last sync.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaSnapshot {
    pub pa: PodAutoscaler,
    pub sks: ServerlessService,

    /// Decider output; negative means metrics are not warmed up yet.
    pub desired_scale: i32,
}

/// Shared snapshot cache keyed by autoscaler.
pub struct SnapshotStore {
    inner: RwLock<HashMap<PaKey, PaSnapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &PaKey) -> Option<PaSnapshot> {
        self.inner.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Replace the full snapshot set, returning the keys whose snapshot is
    /// new or changed. Keys absent from `snapshots` are dropped.
    pub async fn replace_all(&self, snapshots: Vec<PaSnapshot>) -> Vec<PaKey> {
        let mut next = HashMap::with_capacity(snapshots.len());
        for snapshot in snapshots {
            next.insert(snapshot.pa.key(), snapshot);
        }

        let mut inner = self.inner.write().await;
        let changed = next
            .iter()
            .filter(|(key, snapshot)| inner.get(key) != Some(snapshot))
            .map(|(key, _)| key.clone())
            .collect();
        *inner = next;
        changed
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
