//! Namespace name checks.

use snafu::{Snafu, ensure};

pub const DEFAULT_NAMESPACE: &str = "default";

const FORMAT_PREFIX: &str = "k8s-namespace:";

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum NamespaceError {
    #[snafu(display("namespace cannot be empty"))]
    Empty,
    #[snafu(display("namespace cannot contain spaces"))]
    ContainsSpace,
}

/// Reject namespaces that are empty or contain spaces.
pub fn validate(namespace: &str) -> Result<(), NamespaceError> {
    ensure!(!namespace.is_empty(), EmptySnafu);
    ensure!(!namespace.contains(' '), ContainsSpaceSnafu);
    Ok(())
}

pub fn format(namespace: &str) -> String {
    format!("{FORMAT_PREFIX}{namespace}")
}
