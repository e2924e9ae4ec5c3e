//! Hooks that edit objects as they are appended to a set.
//!
//! A mutator receives every object appended after its registration, tagged by
//! kind, and ignores the kinds it does not target. Closures taking an
//! [`Object`] are mutators; so is any [`Visitor`] wrapped with
//! [`from_visitor`].

use std::fmt;

use k8s_openapi::api::{
    apps::v1::{Deployment, StatefulSet},
    core::v1::PodSpec,
};

use crate::object::{Object, Visitor};

pub trait Mutate: Send + Sync {
    fn mutate(&self, object: Object<'_>);
}

impl<F> Mutate for F
where
    F: Fn(Object<'_>) + Send + Sync,
{
    fn mutate(&self, object: Object<'_>) {
        self(object)
    }
}

/// Adapts a [`Visitor`] into a [`Mutate`].
#[derive(Debug, Clone)]
pub struct VisitorMutator<V>(V);

impl<V> Mutate for VisitorMutator<V>
where
    V: Visitor + Send + Sync,
{
    fn mutate(&self, object: Object<'_>) {
        object.accept(&self.0)
    }
}

pub const fn from_visitor<V>(visitor: V) -> VisitorMutator<V>
where
    V: Visitor + Send + Sync,
{
    VisitorMutator(visitor)
}

/// Only touches Deployments.
pub fn deployments<F>(f: F) -> impl Mutate
where
    F: Fn(&mut Deployment) + Send + Sync,
{
    move |object: Object<'_>| {
        if let Object::Deployment(deployment) = object {
            f(deployment)
        }
    }
}

/// Only touches StatefulSets.
pub fn stateful_sets<F>(f: F) -> impl Mutate
where
    F: Fn(&mut StatefulSet) + Send + Sync,
{
    move |object: Object<'_>| {
        if let Object::StatefulSet(stateful_set) = object {
            f(stateful_set)
        }
    }
}

/// Touches the pod template of both workload kinds.
pub fn pod_specs<F>(f: F) -> impl Mutate
where
    F: Fn(&mut PodSpec) + Send + Sync,
{
    move |mut object: Object<'_>| {
        if let Some(pod_spec) = object.pod_spec_mut() {
            f(pod_spec)
        }
    }
}

/// Adds a label to the metadata of every kind.
pub fn label(key: impl Into<String>, value: impl Into<String>) -> Label {
    Label {
        key: key.into(),
        value: value.into(),
    }
}

#[derive(Debug, Clone)]
pub struct Label {
    key: String,
    value: String,
}

impl Mutate for Label {
    fn mutate(&self, mut object: Object<'_>) {
        object
            .metadata_mut()
            .labels
            .get_or_insert_with(Default::default)
            .insert(self.key.clone(), self.value.clone());
    }
}

/// Replaces the image of every container of both workload kinds.
pub fn image(image: impl Into<String>) -> Image {
    Image(image.into())
}

#[derive(Debug, Clone)]
pub struct Image(String);

impl Mutate for Image {
    fn mutate(&self, mut object: Object<'_>) {
        if let Some(pod_spec) = object.pod_spec_mut() {
            for container in &mut pod_spec.containers {
                container.image = Some(self.0.clone());
            }
        }
    }
}

/// Sets the desired replica count of both workload kinds.
pub const fn replicas(replicas: i32) -> Replicas {
    Replicas(replicas)
}

#[derive(Debug, Clone, Copy)]
pub struct Replicas(i32);

impl Mutate for Replicas {
    fn mutate(&self, object: Object<'_>) {
        match object {
            Object::Deployment(deployment) => {
                if let Some(spec) = deployment.spec.as_mut() {
                    spec.replicas = Some(self.0);
                }
            }
            Object::StatefulSet(stateful_set) => {
                if let Some(spec) = stateful_set.spec.as_mut() {
                    spec.replicas = Some(self.0);
                }
            }
            Object::ConfigMap(_) | Object::Secret(_) => {}
        }
    }
}

/// Registered mutators, in registration order.
#[derive(Default)]
pub struct MutatorPipeline {
    mutators: Vec<Box<dyn Mutate>>,
}

impl MutatorPipeline {
    pub fn push(&mut self, mutator: impl Mutate + 'static) {
        self.mutators.push(Box::new(mutator));
    }

    /// Run every mutator over `object`, each seeing the edits of the ones
    /// registered before it.
    pub fn apply(&self, mut object: Object<'_>) {
        for mutator in &self.mutators {
            mutator.mutate(object.reborrow());
        }
    }

    pub fn len(&self) -> usize {
        self.mutators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutators.is_empty()
    }
}

impl fmt::Debug for MutatorPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutatorPipeline")
            .field("mutators", &self.mutators.len())
            .finish()
    }
}
