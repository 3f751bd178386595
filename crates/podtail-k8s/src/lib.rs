//! Kubernetes access for podtail
//!
//! `PodApi` is the narrow view of the cluster the tailing engine needs:
//! listing and watching pods, opening container log streams and resolving
//! the pod labels behind a workload resource. `KubeClient` implements it
//! against a real API server.

mod api;
mod client;
mod lines;
mod resource;

#[cfg(any(test, feature = "testing"))]
pub mod fake;

pub use api::{
    K8sError, K8sResult, LineStream, LogRequest, PodApi, PodEvent, PodEventStream, PodQuery,
};
pub use client::KubeClient;
pub use lines::{decode_line, split_lines};
pub use resource::{ResourceError, ResourceKind, ResourceRef};
