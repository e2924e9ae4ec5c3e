use std::{sync::Arc, time::Duration};

use k8s_openapi::api::core::v1::PodSpec;
use tokio::time::Instant;

use super::*;
use crate::{
    backend::{
        MemoryBackend,
        memory::{Operation, Readiness, Verb},
    },
    error::{BackendError, Interruption},
    mutator,
    test_util::trace_init,
};

fn fixture() -> (Arc<MemoryBackend>, ResourceSet) {
    trace_init();
    let backend = Arc::new(MemoryBackend::new());
    let set = ResourceSet::new(backend.clone(), Context::background());
    (backend, set)
}

fn deployment_pod(set: &ResourceSet, index: usize) -> &PodSpec {
    set.deployments()[index]
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .unwrap()
}

fn names(operations: Vec<Operation>) -> Vec<(ResourceKind, String)> {
    operations
        .into_iter()
        .map(|operation| (operation.kind, operation.name))
        .collect()
}

#[test]
fn defaults() {
    let (_, set) = fixture();
    assert_eq!(set.namespace(), "default");
    assert_eq!(set.timeout(), Duration::from_secs(30));
    assert_eq!(set.manifests().count(), 0);
}

#[test]
fn from_config_rejects_invalid_namespace() {
    let backend = Arc::new(MemoryBackend::new());
    let config = Config {
        namespace: String::new(),
        ..Config::default()
    };
    let error = ResourceSet::from_config(backend.clone(), Context::background(), &config)
        .unwrap_err();
    assert!(matches!(error, Error::InvalidNamespace { .. }));

    let config = Config {
        namespace: "fixtures".into(),
        timeout: Duration::from_secs(5),
    };
    let set = ResourceSet::from_config(backend, Context::background(), &config).unwrap();
    assert_eq!(set.namespace(), "fixtures");
    assert_eq!(set.timeout(), Duration::from_secs(5));
}

#[test]
fn general_view_does_not_mount() {
    let (_, mut set) = fixture();
    set.with_deployment("d").and().with_config_map("c");

    assert_eq!(set.config_maps().len(), 1);
    let pod = deployment_pod(&set, 0);
    assert!(pod.volumes.is_none());
    assert!(pod.containers[0].volume_mounts.is_none());
}

#[test]
fn workload_view_mounts_config_map() {
    let (_, mut set) = fixture();
    set.with_deployment("d").with_config_map("c");

    assert_eq!(set.config_maps().len(), 1);
    assert_eq!(
        set.config_maps()[0].metadata.name.as_deref(),
        Some("c")
    );

    let pod = deployment_pod(&set, 0);
    assert_eq!(pod.containers.len(), 1);
    let volumes = pod.volumes.as_ref().unwrap();
    assert_eq!(volumes.len(), 1);
    assert_eq!(volumes[0].name, "c");
    assert!(volumes[0].config_map.is_some());

    let mounts = pod.containers[0].volume_mounts.as_ref().unwrap();
    assert_eq!(mounts.len(), 1);
    assert_eq!(mounts[0].name, "c");
    assert_eq!(mounts[0].mount_path, "/etc/config");
}

#[test]
fn workload_view_mounts_secret_into_bound_workload_only() {
    let (_, mut set) = fixture();
    set.with_deployment("first")
        .with_deployment("second")
        .with_secret("s");

    assert_eq!(set.secrets().len(), 1);
    assert!(deployment_pod(&set, 0).volumes.is_none());

    let pod = deployment_pod(&set, 1);
    let volume = &pod.volumes.as_ref().unwrap()[0];
    assert_eq!(
        volume.secret.as_ref().unwrap().secret_name.as_deref(),
        Some("s")
    );
    let mount = &pod.containers[0].volume_mounts.as_ref().unwrap()[0];
    assert_eq!(mount.mount_path, "/etc/secret");
}

#[test]
fn stateful_set_view() {
    let (_, mut set) = fixture();
    let view = set.with_stateful_set("db");
    assert_eq!(view.kind(), WorkloadKind::StatefulSet);
    assert_eq!(view.name(), "db");
    view.with_config_map("db-config")
        .with_timeout(Duration::from_secs(3));

    assert_eq!(set.timeout(), Duration::from_secs(3));
    let pod = set.stateful_sets()[0]
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .unwrap();
    assert_eq!(pod.volumes.as_ref().unwrap().len(), 1);
}

#[test]
fn workload_view_mounts_renamed_data_objects() {
    let (_, mut set) = fixture();
    set.with_mutator(|mut object: Object<'_>| {
        if matches!(object.kind(), ResourceKind::ConfigMap | ResourceKind::Secret) {
            let meta = object.metadata_mut();
            meta.name = meta.name.take().map(|name| format!("run1-{name}"));
        }
    })
    .with_deployment("d")
    .with_config_map("c")
    .with_secret("s");

    assert_eq!(set.config_maps()[0].metadata.name.as_deref(), Some("run1-c"));
    assert_eq!(set.deployments()[0].metadata.name.as_deref(), Some("d"));

    let pod = deployment_pod(&set, 0);
    let volumes = pod.volumes.as_ref().unwrap();
    assert_eq!(volumes[0].name, "run1-c");
    assert_eq!(volumes[1].name, "run1-s");
    assert_eq!(
        volumes[1].secret.as_ref().unwrap().secret_name.as_deref(),
        Some("run1-s")
    );

    let mounts = pod.containers[0].volume_mounts.as_ref().unwrap();
    assert_eq!(mounts[0].name, "run1-c");
    assert_eq!(mounts[1].name, "run1-s");
}

#[test]
fn mount_without_container_only_appends_data_object() {
    let (_, mut set) = fixture();
    set.with_mutator(mutator::pod_specs(|pod_spec| pod_spec.containers.clear()))
        .with_deployment("bare")
        .with_config_map("c");

    assert_eq!(set.config_maps().len(), 1);
    assert!(deployment_pod(&set, 0).volumes.is_none());
}

#[test]
fn mutators_compose_in_order() {
    let (_, mut set) = fixture();
    set.with_mutator(mutator::label("order", "m1"))
        .with_mutator(|mut object: Object<'_>| {
            let labels = object
                .metadata_mut()
                .labels
                .get_or_insert_with(Default::default);
            let previous = labels.get("order").cloned().unwrap_or_default();
            labels.insert("order".into(), format!("{previous}-m2"));
        })
        .with_deployment("x");

    let labels = set.deployments()[0].metadata.labels.as_ref().unwrap();
    assert_eq!(labels["order"], "m1-m2");
    assert_eq!(labels["app"], "x");
}

#[test]
fn mutators_are_not_retroactive() {
    let (_, mut set) = fixture();
    set.with_config_map("before")
        .with_mutator(mutator::label("late", "true"))
        .with_config_map("after");

    let labelled = |index: usize| {
        set.config_maps()[index]
            .metadata
            .labels
            .as_ref()
            .is_some_and(|labels| labels.contains_key("late"))
    };
    assert!(!labelled(0));
    assert!(labelled(1));
}

#[test]
fn mutator_registered_through_view_applies_to_later_objects() {
    let (_, mut set) = fixture();
    set.with_deployment("web")
        .with_mutator(mutator::replicas(3))
        .with_config_map("c")
        .and()
        .with_stateful_set("db");

    assert_eq!(set.deployments()[0].spec.as_ref().unwrap().replicas, Some(1));
    assert_eq!(set.stateful_sets()[0].spec.as_ref().unwrap().replicas, Some(3));
}

#[test]
fn with_image_applies_to_later_workloads() {
    let (_, mut set) = fixture();
    set.with_deployment("old").and().with_image("busybox:1.36").with_deployment("new");

    let image = |index: usize| deployment_pod(&set, index).containers[0].image.clone();
    assert_eq!(image(0).as_deref(), Some(factory::DEFAULT_IMAGE));
    assert_eq!(image(1).as_deref(), Some("busybox:1.36"));
}

#[tokio::test]
async fn create_submits_data_objects_first() {
    let (backend, mut set) = fixture();
    set.with_stateful_set("s")
        .and()
        .with_deployment("d")
        .and()
        .with_secret("x")
        .with_config_map("c");

    set.create().await.unwrap();

    assert_eq!(
        names(backend.operations_of(Verb::Create)),
        vec![
            (ResourceKind::ConfigMap, "c".to_owned()),
            (ResourceKind::Secret, "x".to_owned()),
            (ResourceKind::Deployment, "d".to_owned()),
            (ResourceKind::StatefulSet, "s".to_owned()),
        ]
    );
    assert!(backend.contains("default", ResourceKind::StatefulSet, "s"));
}

#[tokio::test]
async fn create_stops_at_first_failure_without_rollback() {
    let (backend, mut set) = fixture();
    set.with_config_map("c1")
        .with_secret("s")
        .with_deployment("d");
    backend.fail(Verb::Create, ResourceKind::Secret, "s", "quota exceeded");

    let error = set.create().await.unwrap_err();
    assert!(matches!(
        &error,
        Error::Create { kind: ResourceKind::Secret, name, .. } if name == "s"
    ));

    assert!(backend.contains("default", ResourceKind::ConfigMap, "c1"));
    assert!(!backend.contains("default", ResourceKind::Deployment, "d"));
    assert_eq!(backend.operations_of(Verb::Create).len(), 2);

    // Delete reclaims the partial state, skipping what was never created.
    set.delete().await.unwrap();
    assert!(backend.is_empty());
}

#[tokio::test]
async fn create_twice_conflicts() {
    let (_, mut set) = fixture();
    set.with_config_map("c");

    set.create().await.unwrap();
    let error = set.create().await.unwrap_err();
    assert!(matches!(
        error,
        Error::Create { source: BackendError::AlreadyExists { .. }, .. }
    ));
}

#[tokio::test]
async fn duplicate_names_conflict_on_create() {
    let (_, mut set) = fixture();
    set.with_secret("same").with_secret("same");

    assert_eq!(set.secrets().len(), 2);
    assert!(set.create().await.is_err());
}

#[tokio::test]
async fn delete_never_created_succeeds() {
    let (backend, mut set) = fixture();
    set.with_config_map("c").with_deployment("d");

    set.delete().await.unwrap();
    assert_eq!(backend.operations_of(Verb::Delete).len(), 2);
}

#[tokio::test]
async fn delete_twice_succeeds() {
    let (backend, mut set) = fixture();
    set.with_deployment("d").with_config_map("c");

    set.create().await.unwrap();
    set.delete().await.unwrap();
    assert!(backend.is_empty());
    set.delete().await.unwrap();
}

#[tokio::test]
async fn delete_removes_workloads_before_data() {
    let (backend, mut set) = fixture();
    set.with_config_map("c1")
        .with_config_map("c2")
        .with_secret("s")
        .with_deployment("d")
        .and()
        .with_stateful_set("ss");

    set.create().await.unwrap();
    set.delete().await.unwrap();

    assert_eq!(
        names(backend.operations_of(Verb::Delete)),
        vec![
            (ResourceKind::StatefulSet, "ss".to_owned()),
            (ResourceKind::Deployment, "d".to_owned()),
            (ResourceKind::Secret, "s".to_owned()),
            (ResourceKind::ConfigMap, "c2".to_owned()),
            (ResourceKind::ConfigMap, "c1".to_owned()),
        ]
    );
}

#[tokio::test]
async fn delete_aborts_on_other_errors() {
    let (backend, mut set) = fixture();
    set.with_config_map("c").with_deployment("d");
    set.create().await.unwrap();
    backend.fail(Verb::Delete, ResourceKind::Deployment, "d", "forbidden");

    let error = set.delete().await.unwrap_err();
    assert!(matches!(
        &error,
        Error::Delete { kind: ResourceKind::Deployment, name, .. } if name == "d"
    ));
    // The ConfigMap comes after the failing Deployment and is left alone.
    assert!(backend.contains("default", ResourceKind::ConfigMap, "c"));
}

#[tokio::test(start_paused = true)]
async fn wait_succeeds_once_workloads_ready() {
    let (backend, mut set) = fixture();
    set.with_deployment("d").and().with_stateful_set("s");
    backend.set_readiness(WorkloadKind::Deployment, "d", Readiness::AfterPolls(2));
    backend.set_readiness(WorkloadKind::StatefulSet, "s", Readiness::AfterPolls(1));
    set.create().await.unwrap();

    let started = Instant::now();
    set.wait().await.unwrap();
    assert_eq!(started.elapsed(), DEFAULT_POLL_INTERVAL * 3);

    assert_eq!(
        names(backend.operations_of(Verb::Status)),
        vec![
            (ResourceKind::Deployment, "d".to_owned()),
            (ResourceKind::Deployment, "d".to_owned()),
            (ResourceKind::Deployment, "d".to_owned()),
            (ResourceKind::StatefulSet, "s".to_owned()),
            (ResourceKind::StatefulSet, "s".to_owned()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn wait_without_workloads_returns_immediately() {
    let (backend, mut set) = fixture();
    set.with_config_map("c");
    set.wait().await.unwrap();
    assert!(backend.operations_of(Verb::Status).is_empty());
}

#[tokio::test(start_paused = true)]
async fn wait_times_out_within_one_interval() {
    let (backend, mut set) = fixture();
    set.with_deployment("stuck")
        .with_timeout(Duration::from_secs(1));
    backend.set_readiness(WorkloadKind::Deployment, "stuck", Readiness::Never);
    set.create().await.unwrap();

    let started = Instant::now();
    let error = set.wait().await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(
        &error,
        Error::WaitTimeout { kind: WorkloadKind::Deployment, name, .. } if name == "stuck"
    ));
    assert!(elapsed >= Duration::from_millis(900), "{elapsed:?}");
    assert!(elapsed <= Duration::from_millis(1500), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn wait_stays_bounded_when_backend_is_slow() {
    let (backend, mut set) = fixture();
    set.with_deployment("slow")
        .with_timeout(Duration::from_secs(1));
    backend.set_readiness(WorkloadKind::Deployment, "slow", Readiness::Never);
    set.create().await.unwrap();
    backend.set_latency(Duration::from_secs(60));

    let started = Instant::now();
    let error = set.wait().await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(error.is_timeout(), "{error}");
    assert!(elapsed <= Duration::from_secs(1) + DEFAULT_POLL_INTERVAL, "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn wait_cancels_promptly_when_backend_is_slow() {
    trace_init();
    let backend = Arc::new(MemoryBackend::new());
    let context = Context::background();
    let mut set = ResourceSet::new(backend.clone(), context.child());
    set.with_stateful_set("slow");
    set.create().await.unwrap();
    backend.set_latency(Duration::from_secs(60));

    let canceller = context.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let error = set.wait().await.unwrap_err();

    assert!(matches!(error, Error::WaitInterrupted { .. }), "{error}");
    assert_eq!(started.elapsed(), Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn wait_override_beats_default_timeout() {
    let (backend, mut set) = fixture();
    set.with_deployment("stuck");
    backend.set_readiness(WorkloadKind::Deployment, "stuck", Readiness::Never);
    set.create().await.unwrap();

    let started = Instant::now();
    let error = set
        .wait_with_timeout(Duration::from_millis(300))
        .await
        .unwrap_err();
    assert!(error.is_timeout());
    assert_eq!(started.elapsed(), Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn wait_budget_is_shared_across_kinds() {
    let (backend, mut set) = fixture();
    set.with_deployment("slow")
        .and()
        .with_stateful_set("stuck")
        .and()
        .with_timeout(Duration::from_secs(1));
    // Ready on the seventh poll, i.e. after 600ms.
    backend.set_readiness(WorkloadKind::Deployment, "slow", Readiness::AfterPolls(6));
    backend.set_readiness(WorkloadKind::StatefulSet, "stuck", Readiness::Never);
    set.create().await.unwrap();

    let started = Instant::now();
    let error = set.wait().await.unwrap_err();

    assert!(matches!(
        &error,
        Error::WaitTimeout { kind: WorkloadKind::StatefulSet, name, timeout }
            if name == "stuck" && *timeout == Duration::from_secs(1)
    ));
    // The StatefulSet only got what the Deployment left over.
    assert_eq!(started.elapsed(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn wait_fails_fast_on_backend_errors() {
    let (backend, mut set) = fixture();
    set.with_deployment("d").and().with_stateful_set("s");
    set.create().await.unwrap();
    backend.fail(Verb::Status, ResourceKind::Deployment, "d", "connection refused");

    let started = Instant::now();
    let error = set.wait().await.unwrap_err();
    assert!(matches!(error, Error::WaitBackend { kind: WorkloadKind::Deployment, .. }));
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(
        backend
            .operations_of(Verb::Status)
            .iter()
            .all(|operation| operation.kind == ResourceKind::Deployment)
    );
}

#[tokio::test(start_paused = true)]
async fn wait_before_create_reports_missing_workload() {
    let (_, mut set) = fixture();
    set.with_stateful_set("s");

    let error = set.wait().await.unwrap_err();
    assert!(matches!(
        error,
        Error::WaitBackend { source: BackendError::NotFound { .. }, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn wait_honors_cancellation() {
    trace_init();
    let backend = Arc::new(MemoryBackend::new());
    let context = Context::background();
    let mut set = ResourceSet::new(backend.clone(), context.clone());
    set.with_deployment("stuck");
    backend.set_readiness(WorkloadKind::Deployment, "stuck", Readiness::Never);
    set.create().await.unwrap();

    let canceller = context.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(450)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let error = set.wait().await.unwrap_err();
    assert!(matches!(
        error,
        Error::WaitInterrupted { reason: Interruption::Cancelled, .. }
    ));
    assert_eq!(started.elapsed(), Duration::from_millis(450));
}

#[tokio::test(start_paused = true)]
async fn status_queries_run_alongside_wait() {
    let (backend, mut set) = fixture();
    set.with_deployment("d");
    backend.set_readiness(WorkloadKind::Deployment, "d", Readiness::AfterPolls(5));
    set.create().await.unwrap();

    let query = async {
        tokio::time::sleep(Duration::from_millis(150)).await;
        set.status(WorkloadKind::Deployment, "d").await
    };
    let (waited, status) = tokio::join!(set.wait(), query);

    waited.unwrap();
    assert_eq!(status.unwrap().desired, 1);
    assert_eq!(set.deployments().len(), 1);
}

#[tokio::test]
async fn pod_waiting_reasons_of_workload() {
    let (backend, mut set) = fixture();
    set.with_deployment("web");
    backend.add_waiting_pod("default", "web", "ImagePullBackOff");
    backend.add_waiting_pod("default", "other", "ErrImagePull");

    assert_eq!(
        set.pod_waiting_reasons("web").await.unwrap(),
        vec!["ImagePullBackOff".to_owned()]
    );
    assert_eq!(set.observer("web").selector(), "app=web");
}
