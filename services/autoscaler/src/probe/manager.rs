//! Background probe campaigns.
//!
//! A campaign retries one probe target on a fixed period until the
//! activator answers or an overall timeout expires, then reports the
//! terminal outcome through a single callback. At most one campaign runs
//! per target; duplicate offers are rejected while one is in flight.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use strato_api::PaKey;

use super::ActivatorProber;

/// Terminal-outcome callback: the offered key, whether the activator was
/// confirmed, and the last transport error seen (if any).
pub type ProbeDone = Arc<dyn Fn(PaKey, bool, Option<anyhow::Error>) + Send + Sync>;

pub struct ProbeManager {
    prober: Arc<dyn ActivatorProber>,
    on_done: ProbeDone,
    in_flight: Arc<Mutex<HashSet<String>>>,
    shutdown: watch::Receiver<bool>,
}

impl ProbeManager {
    pub fn new(
        prober: Arc<dyn ActivatorProber>,
        on_done: ProbeDone,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            prober,
            on_done,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            shutdown,
        }
    }

    /// True while a campaign for `target` is running.
    pub fn is_in_flight(&self, target: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(target)
    }

    /// Admit a probe campaign for `target` on behalf of `key`.
    ///
    /// Returns `false` without side effects when a campaign for the same
    /// target is already in flight. Otherwise the campaign probes every
    /// `period` until the first confirmation or until `timeout` elapses
    /// from admission, then fires the callback exactly once. Shutdown
    /// aborts campaigns without a callback.
    pub fn offer(&self, target: String, key: PaKey, period: Duration, timeout: Duration) -> bool {
        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if !in_flight.insert(target.clone()) {
                return false;
            }
        }

        let prober = Arc::clone(&self.prober);
        let on_done = Arc::clone(&self.on_done);
        let in_flight = Arc::clone(&self.in_flight);
        let mut shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let deadline = Instant::now() + timeout;
            let mut ticker = tokio::time::interval(period);
            let mut last_err = None;

            let success = loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        // A dropped sender means the process is tearing down.
                        if changed.is_err() || *shutdown.borrow() {
                            in_flight
                                .lock()
                                .unwrap_or_else(|e| e.into_inner())
                                .remove(&target);
                            debug!(target = %target, "Probe campaign cancelled");
                            return;
                        }
                    }
                    _ = ticker.tick() => {
                        match prober.probe(&target).await {
                            Ok(true) => break true,
                            Ok(false) => last_err = None,
                            Err(e) => {
                                warn!(target = %target, error = %e, "Probe attempt failed");
                                last_err = Some(e);
                            }
                        }
                        if Instant::now() >= deadline {
                            break false;
                        }
                    }
                }
            };

            in_flight
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&target);
            debug!(target = %target, pa = %key, success, "Probe campaign finished");
            (on_done)(key, success, last_err);
        });

        true
    }
}
