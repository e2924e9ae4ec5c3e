use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{debug, warn};

use super::ResourceSet;
use crate::{
    factory::{data_volume, data_volume_mount},
    kind::{DataKind, WorkloadKind},
    mutator::Mutate,
};

/// Builder handle bound to the workload most recently appended to a
/// [`ResourceSet`].
///
/// `with_config_map` and `with_secret` here differ from the methods of the
/// same name on [`ResourceSet`]: besides appending the data object they mount
/// it into the bound workload's container, at `/etc/config` and `/etc/secret`
/// respectively. The remaining methods forward to the set.
#[derive(Debug)]
pub struct WorkloadView<'a> {
    set: &'a mut ResourceSet,
    kind: WorkloadKind,
    index: usize,
}

impl<'a> WorkloadView<'a> {
    pub(super) fn new(set: &'a mut ResourceSet, kind: WorkloadKind, index: usize) -> Self {
        Self { set, kind, index }
    }

    pub const fn kind(&self) -> WorkloadKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        let meta = match self.kind {
            WorkloadKind::Deployment => self.set.deployments.get(self.index).map(|o| &o.metadata),
            WorkloadKind::StatefulSet => {
                self.set.stateful_sets.get(self.index).map(|o| &o.metadata)
            }
        };
        meta.and_then(|meta| meta.name.as_deref()).unwrap_or_default()
    }

    /// Append ConfigMap `name` and mount it at `/etc/config`.
    ///
    /// The volume references the ConfigMap as it was appended, i.e. under the
    /// name left by the registered mutators.
    pub fn with_config_map(self, name: &str) -> Self {
        self.set.with_config_map(name);
        let appended = appended_name(self.set.config_maps.last().map(|o| &o.metadata), name);
        self.mount(DataKind::ConfigMap, &appended)
    }

    /// Append Secret `name` and mount it at `/etc/secret`.
    pub fn with_secret(self, name: &str) -> Self {
        self.set.with_secret(name);
        let appended = appended_name(self.set.secrets.last().map(|o| &o.metadata), name);
        self.mount(DataKind::Secret, &appended)
    }

    pub fn with_deployment(self, name: &str) -> WorkloadView<'a> {
        self.and().with_deployment(name)
    }

    pub fn with_stateful_set(self, name: &str) -> WorkloadView<'a> {
        self.and().with_stateful_set(name)
    }

    pub fn with_mutator(self, mutator: impl Mutate + 'static) -> Self {
        self.set.with_mutator(mutator);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.set.with_timeout(timeout);
        self
    }

    /// Back to the general view of the set.
    pub fn and(self) -> &'a mut ResourceSet {
        self.set
    }

    fn mount(self, kind: DataKind, name: &str) -> Self {
        let workload_kind = self.kind;
        let Some(mut workload) = self.set.workload_mut(self.kind, self.index) else {
            return self;
        };
        let workload_name = workload.name().to_owned();

        match workload.pod_spec_mut() {
            Some(pod_spec) if !pod_spec.containers.is_empty() => {
                pod_spec
                    .volumes
                    .get_or_insert_with(Vec::new)
                    .push(data_volume(kind, name));
                pod_spec.containers[0]
                    .volume_mounts
                    .get_or_insert_with(Vec::new)
                    .push(data_volume_mount(kind, name));
                debug!(
                    message = "Mounted data object.",
                    workload = %workload_name,
                    %workload_kind,
                    name,
                    path = kind.mount_path(),
                );
            }
            _ => warn!(
                message = "Workload has no container to mount into.",
                workload = %workload_name,
                %workload_kind,
                name,
            ),
        }
        self
    }
}

fn appended_name(meta: Option<&ObjectMeta>, requested: &str) -> String {
    meta.and_then(|meta| meta.name.clone())
        .unwrap_or_else(|| requested.to_owned())
}
