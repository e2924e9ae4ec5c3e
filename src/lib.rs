//! Kubernetes test fixtures.
//!
//! Declare a set of ConfigMaps, Secrets, Deployments and StatefulSets with a
//! fluent builder, create them, wait for the workloads to become ready and
//! tear everything down again. See [`ResourceSet`] for the lifecycle and
//! [`backend`] for the stores it runs against.

#![deny(missing_debug_implementations)]

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod factory;
pub mod kind;
pub mod mutator;
pub mod namespace;
pub mod object;
pub mod observe;
mod set;
#[cfg(test)]
mod test_util;
pub mod wait;

pub use self::{
    config::Config,
    context::Context,
    error::{BackendError, Error, Result},
    factory::ResourceFactory,
    kind::{ResourceKind, WorkloadKind},
    mutator::{Mutate, MutatorPipeline},
    object::{Manifest, Object, Visitor},
    observe::PodObserver,
    set::{ResourceSet, WorkloadView},
};
