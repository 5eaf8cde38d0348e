//! strato autoscaler service.
//!
//! Wires the scaler to its collaborators: snapshot sync from the control
//! plane, the reconciler workqueue, the activator prober, and the workload
//! API client.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use strato_autoscaler::clock::SystemClock;
use strato_autoscaler::config::Config;
use strato_autoscaler::probe::{ActivatorProber, HttpProber};
use strato_autoscaler::queue::{ReenqueueScheduler, Workqueue};
use strato_autoscaler::reconciler::Reconciler;
use strato_autoscaler::scaler::Scaler;
use strato_autoscaler::store::SnapshotStore;
use strato_autoscaler::sync::SnapshotSyncer;
use strato_autoscaler::workload::{ApiWorkloadClient, ScaleClient, WorkloadStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting strato autoscaler");

    let config = Config::from_env()?;
    info!(
        control_plane_url = %config.control_plane_url,
        api_url = %config.api_url,
        enable_scale_to_zero = config.scaling.enable_scale_to_zero,
        "Configuration loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (queue, queue_rx) = Workqueue::new(shutdown_rx.clone());

    let workloads = Arc::new(ApiWorkloadClient::new(config.api_url.clone()));
    let scaler = Arc::new(Scaler::new(
        Arc::clone(&workloads) as Arc<dyn WorkloadStore>,
        Arc::clone(&workloads) as Arc<dyn ScaleClient>,
        Arc::new(HttpProber::new()) as Arc<dyn ActivatorProber>,
        Arc::new(queue.clone()) as Arc<dyn ReenqueueScheduler>,
        Arc::new(SystemClock),
        shutdown_rx.clone(),
    ));

    let snapshots = Arc::new(SnapshotStore::new());
    let syncer = SnapshotSyncer::new(&config, Arc::clone(&snapshots), queue.clone());
    let reconciler = Reconciler::new(
        snapshots,
        scaler,
        config.scaling.clone(),
        queue,
        queue_rx,
    );

    let sync_handle = tokio::spawn(syncer.run(shutdown_rx.clone()));
    let reconcile_handle = tokio::spawn(reconciler.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(sync_handle, reconcile_handle);
    Ok(())
}
