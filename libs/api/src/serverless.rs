//! The ServerlessService routing object.
//!
//! A ServerlessService decides where traffic for one scalable unit lands:
//! at the real instances (`Serve`) or at the activator (`Proxy`). The
//! autoscaler reads its spec and status but never writes it; the routing
//! reconciler owns the object.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::meta::ObjectMeta;

/// Routing mode for a scalable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServingMode {
    /// Traffic goes directly to the instances.
    Serve,
    /// Traffic goes through the activator.
    Proxy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerlessService {
    pub metadata: ObjectMeta,
    pub spec: ServerlessServiceSpec,
    pub status: ServerlessServiceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerlessServiceSpec {
    /// Desired routing mode.
    pub mode: ServingMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerlessServiceStatus {
    /// Routing mode currently programmed into the data path.
    pub mode: ServingMode,

    /// When `mode` last changed.
    pub last_transition_time: DateTime<Utc>,
}

impl ServerlessServiceStatus {
    /// How long the data path has been in Proxy mode, zero when it is not.
    pub fn proxy_for(&self, now: DateTime<Utc>) -> Duration {
        if self.mode != ServingMode::Proxy {
            return Duration::ZERO;
        }
        now.signed_duration_since(self.last_transition_time)
            .to_std()
            .unwrap_or_default()
    }
}
