//! [`Backend`] over a live cluster.

use async_trait::async_trait;
use k8s_openapi::{
    NamespaceResourceScope,
    api::{
        apps::v1::{Deployment, StatefulSet},
        core::v1::{ConfigMap, Pod, Secret},
    },
};
use kube::{
    Api, Client, Resource,
    api::{DeleteParams, ListParams, PostParams},
};
use serde::{Serialize, de::DeserializeOwned};
use snafu::ResultExt;
use tracing::debug;

use super::{Backend, BackendResult, ReplicaStatus};
use crate::{
    error::{ApiSnafu, BackendError},
    kind::{ResourceKind, WorkloadKind},
    object::Manifest,
};

/// Talks to the Kubernetes API through a [`kube::Client`].
#[derive(Clone)]
pub struct KubeBackend {
    client: Client,
}

impl KubeBackend {
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the local kubeconfig, or the in-cluster service account
    /// when running inside a pod.
    pub async fn try_default() -> BackendResult<Self> {
        let client = Client::try_default().await.context(ApiSnafu)?;
        Ok(Self::new(client))
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn create_object<K>(&self, namespace: &str, object: &K) -> BackendResult<()>
    where
        K: Resource<Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Serialize
            + std::fmt::Debug,
        <K as Resource>::DynamicType: Default,
    {
        let kind = kind_of::<K>();
        let name = object.meta().name.clone().unwrap_or_default();
        self.api::<K>(namespace)
            .create(&PostParams::default(), object)
            .await
            .map_err(|error| classify(error, kind, &name))?;
        Ok(())
    }

    async fn delete_object<K>(&self, namespace: &str, name: &str) -> BackendResult<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + std::fmt::Debug,
        <K as Resource>::DynamicType: Default,
    {
        let kind = kind_of::<K>();
        self.api::<K>(namespace)
            .delete(name, &DeleteParams::background())
            .await
            .map_err(|error| classify(error, kind, name))?;
        Ok(())
    }

    async fn get_object<K>(&self, namespace: &str, name: &str) -> BackendResult<K>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + std::fmt::Debug,
        <K as Resource>::DynamicType: Default,
    {
        let kind = kind_of::<K>();
        self.api::<K>(namespace)
            .get(name)
            .await
            .map_err(|error| classify(error, kind, name))
    }
}

impl std::fmt::Debug for KubeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeBackend").finish_non_exhaustive()
    }
}

#[async_trait]
impl Backend for KubeBackend {
    async fn create(&self, namespace: &str, manifest: Manifest<'_>) -> BackendResult<()> {
        debug!(message = "Submitting object.", kind = %manifest.kind(), name = manifest.name(), namespace);
        match manifest {
            Manifest::ConfigMap(object) => self.create_object(namespace, object).await,
            Manifest::Secret(object) => self.create_object(namespace, object).await,
            Manifest::Deployment(object) => self.create_object(namespace, object).await,
            Manifest::StatefulSet(object) => self.create_object(namespace, object).await,
        }
    }

    async fn replica_status(
        &self,
        namespace: &str,
        kind: WorkloadKind,
        name: &str,
    ) -> BackendResult<ReplicaStatus> {
        let status = match kind {
            WorkloadKind::Deployment => {
                let deployment = self.get_object::<Deployment>(namespace, name).await?;
                ReplicaStatus {
                    desired: deployment
                        .spec
                        .as_ref()
                        .and_then(|spec| spec.replicas)
                        .unwrap_or(1),
                    ready: deployment
                        .status
                        .as_ref()
                        .and_then(|status| status.available_replicas)
                        .unwrap_or(0),
                }
            }
            WorkloadKind::StatefulSet => {
                let stateful_set = self.get_object::<StatefulSet>(namespace, name).await?;
                ReplicaStatus {
                    desired: stateful_set
                        .spec
                        .as_ref()
                        .and_then(|spec| spec.replicas)
                        .unwrap_or(1),
                    ready: stateful_set
                        .status
                        .as_ref()
                        .and_then(|status| status.ready_replicas)
                        .unwrap_or(0),
                }
            }
        };
        Ok(status)
    }

    async fn delete(&self, namespace: &str, kind: ResourceKind, name: &str) -> BackendResult<()> {
        debug!(message = "Deleting object.", %kind, name, namespace);
        match kind {
            ResourceKind::ConfigMap => self.delete_object::<ConfigMap>(namespace, name).await,
            ResourceKind::Secret => self.delete_object::<Secret>(namespace, name).await,
            ResourceKind::Deployment => self.delete_object::<Deployment>(namespace, name).await,
            ResourceKind::StatefulSet => self.delete_object::<StatefulSet>(namespace, name).await,
            ResourceKind::Pod => self.delete_object::<Pod>(namespace, name).await,
        }
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> BackendResult<Vec<Pod>> {
        let pods = self
            .api::<Pod>(namespace)
            .list(&ListParams::default().labels(label_selector))
            .await
            .context(ApiSnafu)?;
        Ok(pods.items)
    }
}

fn kind_of<K>() -> ResourceKind
where
    K: Resource,
    <K as Resource>::DynamicType: Default,
{
    let dynamic_type = <K as Resource>::DynamicType::default();
    let kind = K::kind(&dynamic_type);
    match &*kind {
        "ConfigMap" => ResourceKind::ConfigMap,
        "Secret" => ResourceKind::Secret,
        "Deployment" => ResourceKind::Deployment,
        "StatefulSet" => ResourceKind::StatefulSet,
        _ => ResourceKind::Pod,
    }
}

/// Map the API server's 404 and 409 responses onto the variants callers
/// branch on.
fn classify(error: kube::Error, kind: ResourceKind, name: &str) -> BackendError {
    match error {
        kube::Error::Api(response) if response.code == 404 => BackendError::NotFound {
            kind,
            name: name.to_owned(),
        },
        kube::Error::Api(response) if response.code == 409 => BackendError::AlreadyExists {
            kind,
            name: name.to_owned(),
        },
        source => BackendError::Api { source },
    }
}
