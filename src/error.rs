use std::{fmt, time::Duration};

use snafu::Snafu;

use crate::{
    kind::{ResourceKind, WorkloadKind},
    namespace::NamespaceError,
};

/// Errors reported by a [`crate::backend::Backend`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum BackendError {
    #[snafu(display("{} {:?} not found", kind, name))]
    NotFound { kind: ResourceKind, name: String },

    #[snafu(display("{} {:?} already exists", kind, name))]
    AlreadyExists { kind: ResourceKind, name: String },

    #[snafu(display("Kubernetes API request failed: {}", source))]
    Api { source: kube::Error },

    #[snafu(display("Injected failure: {}", message))]
    Injected { message: String },
}

impl BackendError {
    /// Whether the backend reported the object as absent.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound { .. })
    }

    pub const fn is_already_exists(&self) -> bool {
        matches!(self, BackendError::AlreadyExists { .. })
    }
}

/// Why a wait stopped before reaching a verdict on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    /// The context's cancellation token fired.
    Cancelled,
    /// The context's deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for Interruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interruption::Cancelled => f.write_str("cancelled"),
            Interruption::DeadlineExceeded => f.write_str("context deadline exceeded"),
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Failed to create {} {:?}: {}", kind, name, source))]
    Create {
        kind: ResourceKind,
        name: String,
        source: BackendError,
    },

    #[snafu(display("Failed to delete {} {:?}: {}", kind, name, source))]
    Delete {
        kind: ResourceKind,
        name: String,
        source: BackendError,
    },

    #[snafu(display("{} {:?} not ready after {:?}", kind, name, timeout))]
    WaitTimeout {
        kind: WorkloadKind,
        name: String,
        timeout: Duration,
    },

    #[snafu(display("Failed to get status of {} {:?}: {}", kind, name, source))]
    WaitBackend {
        kind: WorkloadKind,
        name: String,
        source: BackendError,
    },

    #[snafu(display("Wait for {} {:?} interrupted: {}", kind, name, reason))]
    WaitInterrupted {
        kind: WorkloadKind,
        name: String,
        reason: Interruption,
    },

    #[snafu(display("Failed to query {} {:?}: {}", kind, name, source))]
    Query {
        kind: ResourceKind,
        name: String,
        source: BackendError,
    },

    #[snafu(display("Invalid namespace: {}", source))]
    InvalidNamespace { source: NamespaceError },

    #[snafu(display("Invalid value {:?} for {}: {}", value, variable, source))]
    InvalidEnv {
        variable: &'static str,
        value: String,
        source: std::num::ParseIntError,
    },
}

impl Error {
    /// The kind and name of the object the error refers to, if any.
    pub fn object(&self) -> Option<(ResourceKind, &str)> {
        match self {
            Error::Create { kind, name, .. }
            | Error::Delete { kind, name, .. }
            | Error::Query { kind, name, .. } => Some((*kind, name.as_str())),
            Error::WaitTimeout { kind, name, .. }
            | Error::WaitBackend { kind, name, .. }
            | Error::WaitInterrupted { kind, name, .. } => Some(((*kind).into(), name.as_str())),
            Error::InvalidNamespace { .. } | Error::InvalidEnv { .. } => None,
        }
    }

    pub const fn is_timeout(&self) -> bool {
        matches!(self, Error::WaitTimeout { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
