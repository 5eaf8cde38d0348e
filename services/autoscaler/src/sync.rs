//! Control plane snapshot synchronization.
//!
//! Periodically pulls the full set of autoscaler snapshots (object state
//! plus the decider's proposed scale) and enqueues every key whose inputs
//! changed. The reconciler does the rest.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::queue::Workqueue;
use crate::store::{PaSnapshot, SnapshotStore};

#[derive(Debug, Deserialize)]
struct SnapshotsResponse {
    items: Vec<PaSnapshot>,
}

pub struct SnapshotSyncer {
    http: reqwest::Client,
    url: String,
    interval: Duration,
    store: Arc<SnapshotStore>,
    queue: Workqueue,
}

impl SnapshotSyncer {
    pub fn new(config: &Config, store: Arc<SnapshotStore>, queue: Workqueue) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build control plane client");
        Self {
            http,
            url: format!("{}/v1/autoscaler/snapshots", config.control_plane_url),
            interval: config.sync_interval,
            store,
            queue,
        }
    }

    /// Run the sync loop until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            url = %self.url,
            interval_secs = self.interval.as_secs(),
            "Starting snapshot sync loop"
        );

        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sync_once().await {
                        warn!(error = %e, "Snapshot sync failed, will retry");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Snapshot sync shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn sync_once(&self) -> Result<()> {
        let response: SnapshotsResponse = self
            .http
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let total = response.items.len();
        let changed = self.store.replace_all(response.items).await;
        debug!(total, changed = changed.len(), "Snapshot sync pass complete");

        for key in changed {
            self.queue.enqueue(key);
        }
        Ok(())
    }
}
