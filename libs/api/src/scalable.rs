//! Duck-typed access to scalable workloads.
//!
//! The autoscaler does not know the concrete shape of the workloads it
//! scales; it only requires that they expose `spec.replicas`. `PodScalable`
//! models exactly that and passes every other field through untouched, so
//! a patch computed between two views only ever contains the replica
//! change.

use serde::{Deserialize, Serialize};

use crate::error::RefError;
use crate::meta::ObjectMeta;

/// Reference to the workload a PodAutoscaler drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadRef {
    /// `group/version`, or bare `version` for the core group.
    pub api_version: String,
    pub kind: String,
    pub name: String,
}

/// Fully resolved resource coordinates for API calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupVersionResource {
    pub group: String,
    pub version: String,
    /// Plural resource name, e.g. `deployments`.
    pub resource: String,
}

impl WorkloadRef {
    /// Resolves the reference into API resource coordinates. The resource
    /// name is the lowercased, pluralised kind.
    pub fn group_version_resource(&self) -> Result<GroupVersionResource, RefError> {
        if self.kind.is_empty() {
            return Err(RefError::EmptyKind);
        }
        if self.name.is_empty() {
            return Err(RefError::EmptyName);
        }

        let (group, version) = match self.api_version.split_once('/') {
            Some((group, version)) if !group.is_empty() && !version.is_empty() => {
                (group.to_string(), version.to_string())
            }
            Some(_) => return Err(RefError::InvalidApiVersion(self.api_version.clone())),
            None if !self.api_version.is_empty() => (String::new(), self.api_version.clone()),
            None => return Err(RefError::InvalidApiVersion(self.api_version.clone())),
        };

        Ok(GroupVersionResource {
            group,
            version,
            resource: format!("{}s", self.kind.to_lowercase()),
        })
    }
}

/// A workload viewed only through its replica count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodScalable {
    pub metadata: ObjectMeta,
    pub spec: PodScalableSpec,

    /// Fields outside the modelled shape, preserved verbatim.
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodScalableSpec {
    /// Desired replica count. Absent means one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

impl PodScalable {
    /// Current desired replica count, defaulting to one when unset.
    pub fn replicas(&self) -> i32 {
        self.spec.replicas.unwrap_or(1)
    }

    /// A copy of this view with the replica count set to `n`.
    pub fn with_replicas(&self, n: i32) -> Self {
        let mut updated = self.clone();
        updated.spec.replicas = Some(n);
        updated
    }
}
