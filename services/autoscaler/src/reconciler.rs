//! Workqueue consumer driving scale decisions.
//!
//! A single consumer drains the queue, which serialises reconciles per
//! key. Failed reconciles are logged and re-enqueued after a fixed delay;
//! everything else the scaler schedules for itself.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use strato_api::PaKey;

use crate::config::ScalingConfig;
use crate::queue::{ReenqueueScheduler, Workqueue};
use crate::scaler::Scaler;
use crate::store::SnapshotStore;

const RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct Reconciler {
    snapshots: Arc<SnapshotStore>,
    scaler: Arc<Scaler>,
    scaling: ScalingConfig,
    queue: Workqueue,
    rx: mpsc::UnboundedReceiver<PaKey>,
}

impl Reconciler {
    pub fn new(
        snapshots: Arc<SnapshotStore>,
        scaler: Arc<Scaler>,
        scaling: ScalingConfig,
        queue: Workqueue,
        rx: mpsc::UnboundedReceiver<PaKey>,
    ) -> Self {
        Self {
            snapshots,
            scaler,
            scaling,
            queue,
            rx,
        }
    }

    /// Drain the workqueue until shutdown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting reconciler");

        loop {
            tokio::select! {
                maybe_key = self.rx.recv() => {
                    match maybe_key {
                        Some(key) => self.process(key).await,
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Reconciler shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn process(&self, key: PaKey) {
        let Some(snapshot) = self.snapshots.get(&key).await else {
            debug!(pa = %key, "Snapshot gone, dropping key");
            return;
        };

        match self
            .scaler
            .scale(
                &self.scaling,
                &snapshot.pa,
                &snapshot.sks,
                snapshot.desired_scale,
            )
            .await
        {
            Ok(effective) => {
                debug!(pa = %key, desired = snapshot.desired_scale, effective, "Reconciled");
            }
            Err(e) => {
                warn!(pa = %key, error = %e, "Scale failed, will retry");
                self.queue.schedule(key, RETRY_DELAY);
            }
        }
    }
}
