//! Tagged views over the object kinds a set manages.

use k8s_openapi::{
    api::{
        apps::v1::{Deployment, StatefulSet},
        core::v1::{ConfigMap, PodSpec, Secret},
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};

use crate::kind::ResourceKind;

/// A mutable borrow of one freshly appended object, handed to mutators.
#[derive(Debug)]
pub enum Object<'a> {
    ConfigMap(&'a mut ConfigMap),
    Secret(&'a mut Secret),
    Deployment(&'a mut Deployment),
    StatefulSet(&'a mut StatefulSet),
}

impl Object<'_> {
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Object::ConfigMap(_) => ResourceKind::ConfigMap,
            Object::Secret(_) => ResourceKind::Secret,
            Object::Deployment(_) => ResourceKind::Deployment,
            Object::StatefulSet(_) => ResourceKind::StatefulSet,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Object::ConfigMap(object) => &object.metadata,
            Object::Secret(object) => &object.metadata,
            Object::Deployment(object) => &object.metadata,
            Object::StatefulSet(object) => &object.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Object::ConfigMap(object) => &mut object.metadata,
            Object::Secret(object) => &mut object.metadata,
            Object::Deployment(object) => &mut object.metadata,
            Object::StatefulSet(object) => &mut object.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// The pod spec of a workload's template; `None` for data objects.
    pub fn pod_spec_mut(&mut self) -> Option<&mut PodSpec> {
        match self {
            Object::Deployment(object) => object
                .spec
                .as_mut()
                .and_then(|spec| spec.template.spec.as_mut()),
            Object::StatefulSet(object) => object
                .spec
                .as_mut()
                .and_then(|spec| spec.template.spec.as_mut()),
            Object::ConfigMap(_) | Object::Secret(_) => None,
        }
    }

    /// Shorten the borrow so the object can be handed out again.
    pub fn reborrow(&mut self) -> Object<'_> {
        match self {
            Object::ConfigMap(object) => Object::ConfigMap(object),
            Object::Secret(object) => Object::Secret(object),
            Object::Deployment(object) => Object::Deployment(object),
            Object::StatefulSet(object) => Object::StatefulSet(object),
        }
    }

    /// Dispatch to the visitor method matching this object's kind.
    pub fn accept<V>(self, visitor: &V)
    where
        V: Visitor + ?Sized,
    {
        match self {
            Object::ConfigMap(object) => visitor.visit_config_map(object),
            Object::Secret(object) => visitor.visit_secret(object),
            Object::Deployment(object) => visitor.visit_deployment(object),
            Object::StatefulSet(object) => visitor.visit_stateful_set(object),
        }
    }
}

/// Per-kind hooks. Every method defaults to a no-op, so an implementation
/// targets a kind by overriding its method.
pub trait Visitor {
    fn visit_config_map(&self, _config_map: &mut ConfigMap) {}

    fn visit_secret(&self, _secret: &mut Secret) {}

    fn visit_deployment(&self, _deployment: &mut Deployment) {}

    fn visit_stateful_set(&self, _stateful_set: &mut StatefulSet) {}
}

/// A shared borrow of one object, handed to a backend for submission.
#[derive(Debug, Clone, Copy)]
pub enum Manifest<'a> {
    ConfigMap(&'a ConfigMap),
    Secret(&'a Secret),
    Deployment(&'a Deployment),
    StatefulSet(&'a StatefulSet),
}

impl Manifest<'_> {
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Manifest::ConfigMap(_) => ResourceKind::ConfigMap,
            Manifest::Secret(_) => ResourceKind::Secret,
            Manifest::Deployment(_) => ResourceKind::Deployment,
            Manifest::StatefulSet(_) => ResourceKind::StatefulSet,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Manifest::ConfigMap(object) => &object.metadata,
            Manifest::Secret(object) => &object.metadata,
            Manifest::Deployment(object) => &object.metadata,
            Manifest::StatefulSet(object) => &object.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// Desired replica count of a workload, defaulting to one like the API
    /// server does. `None` for data objects.
    pub fn desired_replicas(&self) -> Option<i32> {
        match self {
            Manifest::Deployment(object) => Some(
                object
                    .spec
                    .as_ref()
                    .and_then(|spec| spec.replicas)
                    .unwrap_or(1),
            ),
            Manifest::StatefulSet(object) => Some(
                object
                    .spec
                    .as_ref()
                    .and_then(|spec| spec.replicas)
                    .unwrap_or(1),
            ),
            Manifest::ConfigMap(_) | Manifest::Secret(_) => None,
        }
    }
}
