//! The fixture aggregate.
//!
//! A [`ResourceSet`] accumulates objects through a fluent builder, then creates,
//! waits for and deletes all of them against a [`Backend`].
//!
//! The builder has two views. Methods on [`ResourceSet`] append objects and
//! return the set itself, or a [`WorkloadView`] for workloads. A
//! [`WorkloadView`] is bound to the workload just appended: its
//! `with_config_map` and `with_secret` append the data object *and* mount it
//! into that workload, while the same calls on the set only append the object.
//! [`WorkloadView::and`] returns to the set.
//!
//! ```no_run
//! # use std::{sync::Arc, time::Duration};
//! # use kube_fixtures::{Context, ResourceSet, backend::KubeBackend, mutator};
//! # async fn run() -> kube_fixtures::Result<()> {
//! # let backend = Arc::new(KubeBackend::try_default().await.unwrap());
//! let mut set = ResourceSet::new(backend, Context::background());
//! set.with_mutator(mutator::label("suite", "smoke"))
//!     .with_config_map("shared")
//!     .with_deployment("web")
//!     .with_config_map("web-config")
//!     .with_secret("web-creds")
//!     .and()
//!     .with_stateful_set("db")
//!     .and()
//!     .with_timeout(Duration::from_secs(60));
//!
//! set.create().await?;
//! let waited = set.wait().await;
//! set.delete().await?;
//! waited
//! # }
//! ```

use std::{fmt, sync::Arc, time::Duration};

use k8s_openapi::{
    api::{
        apps::v1::{Deployment, StatefulSet},
        core::v1::{ConfigMap, Secret},
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use snafu::ResultExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    Result,
    backend::{Backend, ReplicaStatus, waiting_reasons},
    config::Config,
    context::Context,
    error::{CreateSnafu, Error, QuerySnafu},
    factory::{self, ResourceFactory},
    kind::{ResourceKind, WorkloadKind},
    mutator::{Mutate, MutatorPipeline},
    object::{Manifest, Object},
    observe::PodObserver,
    wait::{DEFAULT_POLL_INTERVAL, Waiter, deadline_after},
};

mod view;

pub use self::view::WorkloadView;

/// Objects to create, wait for and delete together in one namespace.
pub struct ResourceSet {
    namespace: String,
    factory: ResourceFactory,
    config_maps: Vec<ConfigMap>,
    secrets: Vec<Secret>,
    deployments: Vec<Deployment>,
    stateful_sets: Vec<StatefulSet>,
    mutators: MutatorPipeline,
    timeout: Duration,
    poll_interval: Duration,
    backend: Arc<dyn Backend>,
    context: Context,
}

impl ResourceSet {
    /// An empty set in the `default` namespace with a 30 second wait timeout.
    pub fn new(backend: Arc<dyn Backend>, context: Context) -> Self {
        let Config { namespace, timeout } = Config::default();
        Self::with_namespace(backend, context, namespace, timeout)
    }

    /// An empty set using the namespace and timeout of `config`, which must
    /// hold a valid namespace.
    pub fn from_config(backend: Arc<dyn Backend>, context: Context, config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_namespace(
            backend,
            context,
            config.namespace.clone(),
            config.timeout,
        ))
    }

    fn with_namespace(
        backend: Arc<dyn Backend>,
        context: Context,
        namespace: String,
        timeout: Duration,
    ) -> Self {
        Self {
            factory: ResourceFactory::new(namespace.clone()),
            namespace,
            config_maps: Vec::new(),
            secrets: Vec::new(),
            deployments: Vec::new(),
            stateful_sets: Vec::new(),
            mutators: MutatorPipeline::default(),
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
            backend,
            context,
        }
    }

    pub fn with_config_map(&mut self, name: &str) -> &mut Self {
        let index = self.config_maps.len();
        self.config_maps.push(self.factory.config_map(name));
        self.mutators
            .apply(Object::ConfigMap(&mut self.config_maps[index]));
        debug!(message = "Appended object.", kind = %ResourceKind::ConfigMap, name);
        self
    }

    pub fn with_secret(&mut self, name: &str) -> &mut Self {
        let index = self.secrets.len();
        self.secrets.push(self.factory.secret(name));
        self.mutators.apply(Object::Secret(&mut self.secrets[index]));
        debug!(message = "Appended object.", kind = %ResourceKind::Secret, name);
        self
    }

    pub fn with_deployment(&mut self, name: &str) -> WorkloadView<'_> {
        let index = self.deployments.len();
        self.deployments.push(self.factory.deployment(name));
        self.mutators
            .apply(Object::Deployment(&mut self.deployments[index]));
        debug!(message = "Appended object.", kind = %ResourceKind::Deployment, name);
        WorkloadView::new(self, WorkloadKind::Deployment, index)
    }

    pub fn with_stateful_set(&mut self, name: &str) -> WorkloadView<'_> {
        let index = self.stateful_sets.len();
        self.stateful_sets.push(self.factory.stateful_set(name));
        self.mutators
            .apply(Object::StatefulSet(&mut self.stateful_sets[index]));
        debug!(message = "Appended object.", kind = %ResourceKind::StatefulSet, name);
        WorkloadView::new(self, WorkloadKind::StatefulSet, index)
    }

    /// Register a hook run on every object appended from now on. Objects
    /// already in the set are left untouched.
    pub fn with_mutator(&mut self, mutator: impl Mutate + 'static) -> &mut Self {
        self.mutators.push(mutator);
        self
    }

    /// Default budget for [`Self::wait`].
    pub fn with_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(&mut self, interval: Duration) -> &mut Self {
        self.poll_interval = interval;
        self
    }

    /// Base container image for workloads appended from now on.
    pub fn with_image(&mut self, image: &str) -> &mut Self {
        self.factory = self.factory.clone().with_image(image);
        self
    }

    /// The workload at `index` of its kind, as a mutable tagged object.
    fn workload_mut(&mut self, kind: WorkloadKind, index: usize) -> Option<Object<'_>> {
        match kind {
            WorkloadKind::Deployment => self.deployments.get_mut(index).map(Object::Deployment),
            WorkloadKind::StatefulSet => self
                .stateful_sets
                .get_mut(index)
                .map(Object::StatefulSet),
        }
    }

    /// Every object in creation order: ConfigMaps, Secrets, Deployments, then
    /// StatefulSets, each kind in insertion order.
    pub fn manifests(&self) -> impl Iterator<Item = Manifest<'_>> {
        self.config_maps
            .iter()
            .map(Manifest::ConfigMap)
            .chain(self.secrets.iter().map(Manifest::Secret))
            .chain(self.deployments.iter().map(Manifest::Deployment))
            .chain(self.stateful_sets.iter().map(Manifest::StatefulSet))
    }

    /// Every object in deletion order: StatefulSets, Deployments, Secrets,
    /// then ConfigMaps, each kind newest first.
    fn deletion_order(&self) -> Vec<(ResourceKind, &str)> {
        let mut order = Vec::with_capacity(
            self.stateful_sets.len()
                + self.deployments.len()
                + self.secrets.len()
                + self.config_maps.len(),
        );
        order.extend(
            self.stateful_sets
                .iter()
                .rev()
                .map(|object| (ResourceKind::StatefulSet, name_of(&object.metadata))),
        );
        order.extend(
            self.deployments
                .iter()
                .rev()
                .map(|object| (ResourceKind::Deployment, name_of(&object.metadata))),
        );
        order.extend(
            self.secrets
                .iter()
                .rev()
                .map(|object| (ResourceKind::Secret, name_of(&object.metadata))),
        );
        order.extend(
            self.config_maps
                .iter()
                .rev()
                .map(|object| (ResourceKind::ConfigMap, name_of(&object.metadata))),
        );
        order
    }

    /// Submit every object, data objects first.
    ///
    /// Stops at the first rejected object. Objects submitted before it stay in
    /// the backend; call [`Self::delete`] to remove them. Creating twice without
    /// deleting in between fails with the backend's conflict.
    pub async fn create(&self) -> Result<()> {
        info!(
            message = "Creating resource set.",
            namespace = %self.namespace,
            config_maps = self.config_maps.len(),
            secrets = self.secrets.len(),
            deployments = self.deployments.len(),
            stateful_sets = self.stateful_sets.len(),
        );

        for manifest in self.manifests() {
            self.backend
                .create(&self.namespace, manifest)
                .await
                .context(CreateSnafu {
                    kind: manifest.kind(),
                    name: manifest.name(),
                })?;
            debug!(message = "Created object.", kind = %manifest.kind(), name = manifest.name());
        }

        info!(message = "Created resource set.", namespace = %self.namespace);
        Ok(())
    }

    /// Remove every object, workloads before the data they mount.
    ///
    /// Objects the backend reports as absent count as removed, so deleting a
    /// set that was never created, or deleting twice, succeeds.
    pub async fn delete(&self) -> Result<()> {
        info!(message = "Deleting resource set.", namespace = %self.namespace);

        for (kind, name) in self.deletion_order() {
            match self.backend.delete(&self.namespace, kind, name).await {
                Ok(()) => debug!(message = "Deleted object.", %kind, name),
                Err(source) if source.is_not_found() => {
                    warn!(message = "Object already absent.", %kind, name);
                }
                Err(source) => {
                    return Err(Error::Delete {
                        kind,
                        name: name.to_owned(),
                        source,
                    });
                }
            }
        }

        info!(message = "Deleted resource set.", namespace = %self.namespace);
        Ok(())
    }

    /// Wait for every workload using the set's timeout.
    pub async fn wait(&self) -> Result<()> {
        self.wait_with_timeout(self.timeout).await
    }

    /// Wait for every Deployment to have all replicas available and every
    /// StatefulSet to have all replicas ready.
    ///
    /// `timeout` bounds the whole call: all workloads share one deadline, so
    /// time spent on earlier workloads shortens the budget of later ones.
    pub async fn wait_with_timeout(&self, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        let deadline = deadline_after(started, timeout);
        info!(
            message = "Waiting for resource set.",
            namespace = %self.namespace,
            ?timeout,
        );

        let waiter = Waiter::new(self.backend.as_ref(), &self.namespace, &self.context)
            .with_interval(self.poll_interval);
        for deployment in &self.deployments {
            waiter
                .until_ready(
                    WorkloadKind::Deployment,
                    name_of(&deployment.metadata),
                    deadline,
                    timeout,
                )
                .await?;
        }
        for stateful_set in &self.stateful_sets {
            waiter
                .until_ready(
                    WorkloadKind::StatefulSet,
                    name_of(&stateful_set.metadata),
                    deadline,
                    timeout,
                )
                .await?;
        }

        info!(
            message = "Resource set ready.",
            namespace = %self.namespace,
            elapsed = ?started.elapsed(),
        );
        Ok(())
    }

    /// Query a workload's replica counts directly, bypassing [`Self::wait`].
    pub async fn status(&self, kind: WorkloadKind, name: &str) -> Result<ReplicaStatus> {
        self.backend
            .replica_status(&self.namespace, kind, name)
            .await
            .context(QuerySnafu {
                kind: ResourceKind::from(kind),
                name,
            })
    }

    /// Waiting reasons reported by the containers of `workload`'s pods.
    pub async fn pod_waiting_reasons(&self, workload: &str) -> Result<Vec<String>> {
        let pods = self
            .backend
            .list_pods(&self.namespace, &factory::selector(workload))
            .await
            .context(QuerySnafu {
                kind: ResourceKind::Pod,
                name: workload,
            })?;
        Ok(waiting_reasons(&pods))
    }

    /// An independent observer of `workload`'s pods sharing this set's
    /// backend and context.
    pub fn observer(&self, workload: &str) -> PodObserver {
        PodObserver::new(
            Arc::clone(&self.backend),
            self.namespace.clone(),
            factory::selector(workload),
        )
        .with_context(self.context.clone())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn config_maps(&self) -> &[ConfigMap] {
        &self.config_maps
    }

    pub fn secrets(&self) -> &[Secret] {
        &self.secrets
    }

    pub fn deployments(&self) -> &[Deployment] {
        &self.deployments
    }

    pub fn stateful_sets(&self) -> &[StatefulSet] {
        &self.stateful_sets
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub const fn context(&self) -> &Context {
        &self.context
    }
}

impl fmt::Debug for ResourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceSet")
            .field("namespace", &self.namespace)
            .field("config_maps", &self.config_maps.len())
            .field("secrets", &self.secrets.len())
            .field("deployments", &self.deployments.len())
            .field("stateful_sets", &self.stateful_sets.len())
            .field("mutators", &self.mutators)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn name_of(meta: &ObjectMeta) -> &str {
    meta.name.as_deref().unwrap_or_default()
}

#[cfg(test)]
mod tests;
