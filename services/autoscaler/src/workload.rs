//! Target workload access.
//!
//! Reads go through a read-through cache so repeated reconciles of the
//! same key do not hammer the API; scale changes go out as JSON-Patch
//! requests against the workload's scale subresource. A successful patch
//! drops the cached entry so the next reconcile observes the new state.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use strato_api::{GroupVersionResource, PodScalable, RefError, WorkloadRef};

const API_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised by workload reads and scale patches.
#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("invalid scale target reference: {0}")]
    TargetResolution(#[from] RefError),

    #[error("scale target {target} not found")]
    NotFound { target: String },

    #[error("workload api error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("workload serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Capability to read the current state of a scale target.
#[async_trait]
pub trait WorkloadStore: Send + Sync {
    async fn get(
        &self,
        namespace: &str,
        target: &WorkloadRef,
    ) -> Result<PodScalable, WorkloadError>;
}

/// Capability to patch the replica count of a scale target.
#[async_trait]
pub trait ScaleClient: Send + Sync {
    async fn patch_scale(
        &self,
        namespace: &str,
        gvr: &GroupVersionResource,
        name: &str,
        patch: &json_patch::Patch,
    ) -> Result<(), WorkloadError>;
}

/// Workload API client with a read-through cache.
pub struct ApiWorkloadClient {
    http: reqwest::Client,
    base_url: String,
    cache: RwLock<HashMap<String, PodScalable>>,
}

impl ApiWorkloadClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .build()
            .expect("Failed to build workload API client");
        Self {
            http,
            base_url: base_url.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn resource_path(&self, gvr: &GroupVersionResource, namespace: &str, name: &str) -> String {
        if gvr.group.is_empty() {
            format!(
                "{}/api/{}/namespaces/{}/{}/{}",
                self.base_url, gvr.version, namespace, gvr.resource, name
            )
        } else {
            format!(
                "{}/apis/{}/{}/namespaces/{}/{}/{}",
                self.base_url, gvr.group, gvr.version, namespace, gvr.resource, name
            )
        }
    }
}

#[async_trait]
impl WorkloadStore for ApiWorkloadClient {
    async fn get(
        &self,
        namespace: &str,
        target: &WorkloadRef,
    ) -> Result<PodScalable, WorkloadError> {
        let gvr = target.group_version_resource()?;
        let path = self.resource_path(&gvr, namespace, &target.name);

        if let Some(cached) = self.cache.read().await.get(&path) {
            return Ok(cached.clone());
        }

        debug!(url = %path, "Fetching scale target");
        let response = self.http.get(&path).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(WorkloadError::NotFound {
                target: target.name.clone(),
            });
        }
        let ps: PodScalable = response.error_for_status()?.json().await?;

        self.cache.write().await.insert(path, ps.clone());
        Ok(ps)
    }
}

#[async_trait]
impl ScaleClient for ApiWorkloadClient {
    async fn patch_scale(
        &self,
        namespace: &str,
        gvr: &GroupVersionResource,
        name: &str,
        patch: &json_patch::Patch,
    ) -> Result<(), WorkloadError> {
        let path = self.resource_path(gvr, namespace, name);
        let body = serde_json::to_vec(patch)?;

        debug!(url = %path, "Patching scale subresource");
        self.http
            .patch(format!("{path}/scale"))
            .header(reqwest::header::CONTENT_TYPE, "application/json-patch+json")
            .body(body)
            .send()
            .await?
            .error_for_status()?;

        self.cache.write().await.remove(&path);
        Ok(())
    }
}
