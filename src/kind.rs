use std::fmt;

/// Kinds of objects a [`crate::ResourceSet`] manages or observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    ConfigMap,
    Secret,
    Deployment,
    StatefulSet,
    /// Only ever queried, never created by a set.
    Pod,
}

impl ResourceKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Secret => "Secret",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::StatefulSet => "StatefulSet",
            ResourceKind::Pod => "Pod",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The subset of kinds that run pods and have a readiness condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
}

impl From<WorkloadKind> for ResourceKind {
    fn from(kind: WorkloadKind) -> Self {
        match kind {
            WorkloadKind::Deployment => ResourceKind::Deployment,
            WorkloadKind::StatefulSet => ResourceKind::StatefulSet,
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ResourceKind::from(*self).fmt(f)
    }
}

/// Kinds of data objects a workload can mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DataKind {
    ConfigMap,
    Secret,
}

impl DataKind {
    /// Where the object is mounted in a workload's container.
    pub(crate) const fn mount_path(self) -> &'static str {
        match self {
            DataKind::ConfigMap => "/etc/config",
            DataKind::Secret => "/etc/secret",
        }
    }
}
