//! An in-process [`Backend`].
//!
//! Keeps submitted objects in memory and records every call, so fixture
//! lifecycles can be exercised without a cluster. Readiness, failures and pod
//! states are scripted by the caller.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use k8s_openapi::{
    api::core::v1::{ContainerState, ContainerStateWaiting, ContainerStatus, Pod, PodStatus},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};

use super::{Backend, BackendResult, ReplicaStatus};
use crate::{
    error::BackendError,
    factory,
    kind::{ResourceKind, WorkloadKind},
    object::Manifest,
};

/// How a workload progresses once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Readiness {
    /// Ready on the first status query.
    #[default]
    Immediate,
    /// Ready once this many status queries have reported it unready.
    AfterPolls(u32),
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Create,
    Status,
    Delete,
    ListPods,
}

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub verb: Verb,
    pub kind: ResourceKind,
    pub name: String,
}

impl Operation {
    pub fn new(verb: Verb, kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            verb,
            kind,
            name: name.into(),
        }
    }
}

#[derive(Debug)]
struct Stored {
    desired: Option<i32>,
    polls: u32,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<(String, ResourceKind, String), Stored>,
    readiness: HashMap<(WorkloadKind, String), Readiness>,
    faults: HashMap<(Verb, ResourceKind, String), String>,
    pods: Vec<Pod>,
    operations: Vec<Operation>,
    latency: Duration,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Script how workload `name` becomes ready. Takes effect on the next
    /// status query, also for workloads already created.
    pub fn set_readiness(&self, kind: WorkloadKind, name: impl Into<String>, readiness: Readiness) {
        let name = name.into();
        let mut state = self.state();
        for ((_, stored_kind, stored_name), stored) in state.objects.iter_mut() {
            if *stored_kind == ResourceKind::from(kind) && *stored_name == name {
                stored.polls = 0;
            }
        }
        state.readiness.insert((kind, name), readiness);
    }

    /// Make every `verb` call on `kind`/`name` fail with `message` until
    /// [`Self::clear_faults`].
    pub fn fail(
        &self,
        verb: Verb,
        kind: ResourceKind,
        name: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.state()
            .faults
            .insert((verb, kind, name.into()), message.into());
    }

    pub fn clear_faults(&self) {
        self.state().faults.clear();
    }

    /// Delay every call by `latency` before it takes effect. A call dropped
    /// while delayed is neither applied nor recorded.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    async fn delay(&self) {
        let latency = self.state().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    /// Make `pod` visible to [`Backend::list_pods`] in `namespace`.
    pub fn add_pod(&self, namespace: &str, mut pod: Pod) {
        pod.metadata.namespace = Some(namespace.to_owned());
        self.state().pods.push(pod);
    }

    /// Add a pod of `workload` whose single container waits with `reason`.
    pub fn add_waiting_pod(&self, namespace: &str, workload: &str, reason: &str) {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some(format!("{workload}-0")),
                labels: Some(factory::labels(workload)),
                ..ObjectMeta::default()
            },
            status: Some(PodStatus {
                phase: Some("Pending".to_owned()),
                container_statuses: Some(vec![ContainerStatus {
                    name: factory::CONTAINER_NAME.to_owned(),
                    state: Some(ContainerState {
                        waiting: Some(ContainerStateWaiting {
                            reason: Some(reason.to_owned()),
                            ..ContainerStateWaiting::default()
                        }),
                        ..ContainerState::default()
                    }),
                    ..ContainerStatus::default()
                }]),
                ..PodStatus::default()
            }),
            ..Pod::default()
        };
        self.add_pod(namespace, pod);
    }

    /// Every call made so far, in order.
    pub fn operations(&self) -> Vec<Operation> {
        self.state().operations.clone()
    }

    /// Calls made so far with `verb`, in order.
    pub fn operations_of(&self, verb: Verb) -> Vec<Operation> {
        self.state()
            .operations
            .iter()
            .filter(|operation| operation.verb == verb)
            .cloned()
            .collect()
    }

    pub fn contains(&self, namespace: &str, kind: ResourceKind, name: &str) -> bool {
        self.state()
            .objects
            .contains_key(&(namespace.to_owned(), kind, name.to_owned()))
    }

    /// Number of objects currently stored, across namespaces and kinds.
    pub fn len(&self) -> usize {
        self.state().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().objects.is_empty()
    }
}

impl State {
    fn record(&mut self, verb: Verb, kind: ResourceKind, name: &str) -> BackendResult<()> {
        self.operations.push(Operation::new(verb, kind, name));
        match self.faults.get(&(verb, kind, name.to_owned())) {
            Some(message) => Err(BackendError::Injected {
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn create(&self, namespace: &str, manifest: Manifest<'_>) -> BackendResult<()> {
        self.delay().await;
        let (kind, name) = (manifest.kind(), manifest.name());
        let mut state = self.state();
        state.record(Verb::Create, kind, name)?;

        let key = (namespace.to_owned(), kind, name.to_owned());
        if state.objects.contains_key(&key) {
            return Err(BackendError::AlreadyExists {
                kind,
                name: name.to_owned(),
            });
        }
        state.objects.insert(
            key,
            Stored {
                desired: manifest.desired_replicas(),
                polls: 0,
            },
        );
        Ok(())
    }

    async fn replica_status(
        &self,
        namespace: &str,
        kind: WorkloadKind,
        name: &str,
    ) -> BackendResult<ReplicaStatus> {
        self.delay().await;
        let mut state = self.state();
        state.record(Verb::Status, kind.into(), name)?;

        let readiness = state
            .readiness
            .get(&(kind, name.to_owned()))
            .copied()
            .unwrap_or_default();
        let stored = state
            .objects
            .get_mut(&(namespace.to_owned(), kind.into(), name.to_owned()))
            .ok_or_else(|| BackendError::NotFound {
                kind: kind.into(),
                name: name.to_owned(),
            })?;

        let desired = stored.desired.unwrap_or(1);
        let ready = match readiness {
            Readiness::Immediate => true,
            Readiness::AfterPolls(polls) => stored.polls >= polls,
            Readiness::Never => false,
        };
        stored.polls = stored.polls.saturating_add(1);

        Ok(ReplicaStatus {
            desired,
            ready: if ready { desired } else { 0 },
        })
    }

    async fn delete(&self, namespace: &str, kind: ResourceKind, name: &str) -> BackendResult<()> {
        self.delay().await;
        let mut state = self.state();
        state.record(Verb::Delete, kind, name)?;

        if kind == ResourceKind::Pod {
            let before = state.pods.len();
            state.pods.retain(|pod| {
                pod.metadata.namespace.as_deref() != Some(namespace)
                    || pod.metadata.name.as_deref() != Some(name)
            });
            return if state.pods.len() < before {
                Ok(())
            } else {
                Err(BackendError::NotFound {
                    kind,
                    name: name.to_owned(),
                })
            };
        }

        match state
            .objects
            .remove(&(namespace.to_owned(), kind, name.to_owned()))
        {
            Some(_) => Ok(()),
            None => Err(BackendError::NotFound {
                kind,
                name: name.to_owned(),
            }),
        }
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> BackendResult<Vec<Pod>> {
        self.delay().await;
        let mut state = self.state();
        state.record(Verb::ListPods, ResourceKind::Pod, label_selector)?;

        let requirements = parse_selector(label_selector);
        Ok(state
            .pods
            .iter()
            .filter(|pod| pod.metadata.namespace.as_deref() == Some(namespace))
            .filter(|pod| {
                let labels = pod.metadata.labels.clone().unwrap_or_default();
                requirements
                    .iter()
                    .all(|requirement| requirement.matches(&labels))
            })
            .cloned()
            .collect())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Requirement<'a> {
    Equals(&'a str, &'a str),
    NotEquals(&'a str, &'a str),
    Exists(&'a str),
}

impl Requirement<'_> {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Equals(key, value) => labels.get(*key).map(String::as_str) == Some(*value),
            Requirement::NotEquals(key, value) => {
                labels.get(*key).map(String::as_str) != Some(*value)
            }
            Requirement::Exists(key) => labels.contains_key(*key),
        }
    }
}

/// Equality-based selectors: `a=b`, `a==b`, `a!=b` and bare `a`, joined by
/// commas.
fn parse_selector(selector: &str) -> Vec<Requirement<'_>> {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(|term| {
            if let Some((key, value)) = term.split_once("!=") {
                Requirement::NotEquals(key.trim(), value.trim())
            } else if let Some((key, value)) = term.split_once("==") {
                Requirement::Equals(key.trim(), value.trim())
            } else if let Some((key, value)) = term.split_once('=') {
                Requirement::Equals(key.trim(), value.trim())
            } else {
                Requirement::Exists(term)
            }
        })
        .collect()
}
