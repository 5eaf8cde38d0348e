//! # strato-api
//!
//! API model types shared between the strato control plane and the
//! autoscaler:
//!
//! - `PodAutoscaler`: the control object for one scalable unit, carrying
//!   scale bounds, the target workload reference, and the observed
//!   activity state with its transition timestamp.
//! - `ServerlessService`: the routing object that either points at real
//!   instances (`Serve`) or at the activator (`Proxy`).
//! - `PodScalable`: a duck-typed view of any workload that exposes
//!   `spec.replicas`.
//!
//! All types deserialize from the control plane's JSON representation and
//! round-trip cleanly; `PodScalable` preserves fields it does not model so
//! that patch computation only ever touches the replica count.

mod error;
mod meta;
mod podautoscaler;
mod scalable;
mod serverless;

pub use error::RefError;
pub use meta::{ObjectMeta, PaKey};
pub use podautoscaler::{
    ActivityState, PodAutoscaler, PodAutoscalerSpec, PodAutoscalerStatus, ProtocolType,
};
pub use scalable::{GroupVersionResource, PodScalable, PodScalableSpec, WorkloadRef};
pub use serverless::{
    ServerlessService, ServerlessServiceSpec, ServerlessServiceStatus, ServingMode,
};
