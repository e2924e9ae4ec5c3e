//! Fixture defaults.

use std::{env, time::Duration};

use serde::Deserialize;
use snafu::ResultExt;

use crate::{
    Result,
    error::{InvalidEnvSnafu, InvalidNamespaceSnafu},
    namespace::{self, DEFAULT_NAMESPACE},
};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const NAMESPACE_ENV: &str = "KUBE_FIXTURES_NAMESPACE";
pub const TIMEOUT_ENV: &str = "KUBE_FIXTURES_TIMEOUT_SECS";

/// Namespace and default wait timeout for a [`crate::ResourceSet`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub namespace: String,
    #[serde(rename = "timeout_secs", with = "seconds")]
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Config {
    /// Defaults overridden by `KUBE_FIXTURES_NAMESPACE` and
    /// `KUBE_FIXTURES_TIMEOUT_SECS` when set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|variable| env::var(variable).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(namespace) = lookup(NAMESPACE_ENV) {
            config.namespace = namespace;
        }
        if let Some(value) = lookup(TIMEOUT_ENV) {
            let secs = value.trim().parse::<u64>().context(InvalidEnvSnafu {
                variable: TIMEOUT_ENV,
                value: value.clone(),
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        namespace::validate(&self.namespace).context(InvalidNamespaceSnafu)
    }

    pub fn formatted_namespace(&self) -> String {
        namespace::format(&self.namespace)
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
