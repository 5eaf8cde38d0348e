//! Workqueue for autoscaler keys.
//!
//! The reconciler drains a single channel of keys, which serialises all
//! processing for one autoscaler. Delayed deliveries run on spawned timer
//! tasks; a delivery whose delay spans shutdown is silently dropped.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::trace;

use strato_api::PaKey;

/// Capability to re-enqueue an autoscaler after a delay.
pub trait ReenqueueScheduler: Send + Sync {
    fn schedule(&self, key: PaKey, delay: Duration);
}

/// Producer half of the reconciler workqueue.
#[derive(Clone)]
pub struct Workqueue {
    tx: mpsc::UnboundedSender<PaKey>,
    shutdown: watch::Receiver<bool>,
}

impl Workqueue {
    pub fn new(shutdown: watch::Receiver<bool>) -> (Self, mpsc::UnboundedReceiver<PaKey>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, shutdown }, rx)
    }

    /// Enqueue `key` for immediate processing.
    pub fn enqueue(&self, key: PaKey) {
        // Send failure means the consumer is gone; nothing left to do.
        let _ = self.tx.send(key);
    }
}

impl ReenqueueScheduler for Workqueue {
    fn schedule(&self, key: PaKey, delay: Duration) {
        trace!(pa = %key, delay_secs = delay.as_secs_f64(), "Scheduling re-enqueue");
        let tx = self.tx.clone();
        let mut shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let deadline = tokio::time::Instant::now() + delay;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {
                        let _ = tx.send(key);
                        break;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }
}
