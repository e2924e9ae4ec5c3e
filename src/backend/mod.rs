//! The store fixtures are submitted to.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;

use crate::{
    error::BackendError,
    kind::{ResourceKind, WorkloadKind},
    object::Manifest,
};

mod cluster;
pub mod memory;

pub use self::cluster::KubeBackend;
pub use self::memory::MemoryBackend;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Observed replica counts of a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplicaStatus {
    pub desired: i32,
    /// Available replicas for a Deployment, ready replicas for a StatefulSet.
    pub ready: i32,
}

impl ReplicaStatus {
    pub const fn is_ready(&self) -> bool {
        self.ready == self.desired
    }
}

/// Namespaced create, status, delete and list operations.
///
/// Implementations are shared between a set's wait and independent observers
/// running concurrently, so every method takes `&self`.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn create(&self, namespace: &str, manifest: Manifest<'_>) -> BackendResult<()>;

    async fn replica_status(
        &self,
        namespace: &str,
        kind: WorkloadKind,
        name: &str,
    ) -> BackendResult<ReplicaStatus>;

    /// Must report absence as [`BackendError::NotFound`].
    ///
    /// Sets only delete the kinds they create. Deleting a
    /// [`ResourceKind::Pod`] is for callers that want a workload controller to
    /// replace a pod, e.g. one found stuck by a
    /// [`PodObserver`](crate::PodObserver).
    async fn delete(&self, namespace: &str, kind: ResourceKind, name: &str) -> BackendResult<()>;

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> BackendResult<Vec<Pod>>;
}

/// Reasons containers of `pods` are waiting, e.g. `ImagePullBackOff`.
pub fn waiting_reasons(pods: &[Pod]) -> Vec<String> {
    pods.iter()
        .filter_map(|pod| pod.status.as_ref())
        .flat_map(|status| {
            status
                .init_container_statuses
                .iter()
                .flatten()
                .chain(status.container_statuses.iter().flatten())
        })
        .filter_map(|container| container.state.as_ref()?.waiting.as_ref()?.reason.clone())
        .collect()
}
