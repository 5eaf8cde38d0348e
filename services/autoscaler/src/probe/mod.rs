//! Activator reachability probing.
//!
//! Before a workload may reach zero replicas its traffic must be held by
//! the activator. The probe asks the unit's public service for the
//! activator's well-known health response; only an exact match counts as
//! confirmation.

pub mod manager;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use strato_api::PodAutoscaler;

/// Path probed on the unit's public service.
pub const PROBE_PATH: &str = "/healthz";

/// Header that marks a request as a data-path probe.
pub const PROBE_HEADER: &str = "K-Network-Probe";

/// Identity the activator answers probes with.
pub const ACTIVATOR_NAME: &str = "activator";

/// User agent sent on probe requests.
pub const PROBE_USER_AGENT: &str = "strato-autoscaler-probe";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Capability to check whether the activator answers on a probe target.
#[async_trait]
pub trait ActivatorProber: Send + Sync {
    /// `Ok(true)` when the activator is confirmed on `target`, `Ok(false)`
    /// on a clean non-activator response, `Err` on transport failures.
    async fn probe(&self, target: &str) -> Result<bool>;
}

/// Probe URL for an autoscaler's public service, `None` when the service
/// has not been published yet.
pub fn probe_target(pa: &PodAutoscaler) -> Option<String> {
    let service = pa.status.service_name.as_deref().filter(|s| !s.is_empty())?;
    Some(format!(
        "http://{}.{}:{}{}",
        service,
        pa.metadata.namespace,
        pa.spec.protocol_type.service_port(),
        PROBE_PATH
    ))
}

/// HTTP prober with a dedicated small-pool, short-timeout transport.
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(2)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(PROBE_USER_AGENT)
            .build()
            .expect("Failed to build probe HTTP client");
        Self { client }
    }
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActivatorProber for HttpProber {
    async fn probe(&self, target: &str) -> Result<bool> {
        let response = self
            .client
            .get(target)
            .header(PROBE_HEADER, ACTIVATOR_NAME)
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::OK {
            return Ok(false);
        }

        let body = response.text().await?;
        Ok(body == ACTIVATOR_NAME)
    }
}
