//! Default object templates.
//!
//! Every template carries the label `app=<name>`; workloads select their pods
//! by that label and run a single container.

use std::collections::BTreeMap;

use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec},
        core::v1::{
            ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, PodSpec, PodTemplateSpec,
            Secret, SecretVolumeSource, Volume, VolumeMount,
        },
    },
    apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta},
};

use crate::kind::DataKind;

pub const APP_LABEL: &str = "app";
pub const CONTAINER_NAME: &str = "main";
pub const DEFAULT_IMAGE: &str = "nginx:1.27-alpine";
pub const DEFAULT_REPLICAS: i32 = 1;

/// `app=<name>`.
pub fn labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_owned(), name.to_owned())])
}

/// The label selector string matching the pods of workload `name`.
pub fn selector(name: &str) -> String {
    format!("{APP_LABEL}={name}")
}

pub fn metadata(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_owned()),
        namespace: Some(namespace.to_owned()),
        labels: Some(labels(name)),
        ..ObjectMeta::default()
    }
}

/// Produces default-populated objects for a single namespace.
#[derive(Debug, Clone)]
pub struct ResourceFactory {
    namespace: String,
    image: String,
}

impl ResourceFactory {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            image: DEFAULT_IMAGE.to_owned(),
        }
    }

    /// Use `image` for the base container of workloads built from now on.
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn config_map(&self, name: &str) -> ConfigMap {
        ConfigMap {
            metadata: metadata(name, &self.namespace),
            data: Some(BTreeMap::from([(
                "config".to_owned(),
                format!("name={name}\n"),
            )])),
            ..ConfigMap::default()
        }
    }

    pub fn secret(&self, name: &str) -> Secret {
        Secret {
            metadata: metadata(name, &self.namespace),
            type_: Some("Opaque".to_owned()),
            string_data: Some(BTreeMap::from([(
                "secret".to_owned(),
                format!("{name}-value"),
            )])),
            ..Secret::default()
        }
    }

    pub fn deployment(&self, name: &str) -> Deployment {
        Deployment {
            metadata: metadata(name, &self.namespace),
            spec: Some(DeploymentSpec {
                replicas: Some(DEFAULT_REPLICAS),
                selector: label_selector(name),
                template: self.pod_template(name),
                ..DeploymentSpec::default()
            }),
            ..Deployment::default()
        }
    }

    pub fn stateful_set(&self, name: &str) -> StatefulSet {
        StatefulSet {
            metadata: metadata(name, &self.namespace),
            spec: Some(StatefulSetSpec {
                replicas: Some(DEFAULT_REPLICAS),
                selector: label_selector(name),
                template: self.pod_template(name),
                ..StatefulSetSpec::default()
            }),
            ..StatefulSet::default()
        }
    }

    fn pod_template(&self, name: &str) -> PodTemplateSpec {
        PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(labels(name)),
                ..ObjectMeta::default()
            }),
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: CONTAINER_NAME.to_owned(),
                    image: Some(self.image.clone()),
                    ports: Some(vec![ContainerPort {
                        container_port: 80,
                        ..ContainerPort::default()
                    }]),
                    ..Container::default()
                }],
                ..PodSpec::default()
            }),
        }
    }
}

fn label_selector(name: &str) -> LabelSelector {
    LabelSelector {
        match_labels: Some(labels(name)),
        ..LabelSelector::default()
    }
}

/// A volume exposing the data object `name`, itself named `name`.
pub(crate) fn data_volume(kind: DataKind, name: &str) -> Volume {
    match kind {
        DataKind::ConfigMap => Volume {
            name: name.to_owned(),
            config_map: Some(ConfigMapVolumeSource {
                name: name.to_owned().into(),
                ..ConfigMapVolumeSource::default()
            }),
            ..Volume::default()
        },
        DataKind::Secret => Volume {
            name: name.to_owned(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(name.to_owned()),
                ..SecretVolumeSource::default()
            }),
            ..Volume::default()
        },
    }
}

pub(crate) fn data_volume_mount(kind: DataKind, name: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_owned(),
        mount_path: kind.mount_path().to_owned(),
        read_only: Some(true),
        ..VolumeMount::default()
    }
}
