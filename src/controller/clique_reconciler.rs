//! Reconciler for Clique status
//!
//! Lists the Pods of a Clique, synthesizes its status from them and writes
//! the status subresource back in one conditional replace.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, ListParams, PostParams},
    client::Client,
    runtime::{
        controller::{self, Action, Controller},
        reflector::ObjectRef,
        watcher::Config,
    },
    ResourceExt,
};
use tracing::{debug, error, info, instrument, warn};

use crate::crd::{format_validation_errors, Clique};
use crate::error::{Error, ReconcileStep, Result};

use super::conditions::is_min_available_breached;
use super::managed::ManagementConfig;
use super::selector::selector_from_labels;
use super::status::{is_terminating, mark_observed, synthesize_status};
use super::ControllerState;

pub(crate) const CONTROLLER_NAME: &str = "clique";

/// Source of the Pods belonging to a Clique.
///
/// Terminating Pods are returned too; the synthesizer filters them.
#[async_trait]
pub trait PodLister: Send + Sync {
    async fn list_pods(&self, group_name: &str, clique: &Clique) -> Result<Vec<Pod>>;
}

/// Lists Pods through the API server by the Clique's Pod labels
pub struct KubePodLister {
    client: Client,
    config: ManagementConfig,
}

impl KubePodLister {
    pub fn new(client: Client, config: ManagementConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl PodLister for KubePodLister {
    async fn list_pods(&self, group_name: &str, clique: &Clique) -> Result<Vec<Pod>> {
        let namespace = clique.namespace().unwrap_or_else(|| "default".to_string());
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);

        let labels = self.config.clique_pod_labels(group_name, &clique.name_any());
        let selector = selector_from_labels(&labels)?;
        let list = pods.list(&ListParams::default().labels(&selector)).await?;
        Ok(list.items)
    }
}

fn target_of(clique: &Clique) -> String {
    format!(
        "Clique {}/{}",
        clique.namespace().unwrap_or_default(),
        clique.name_any()
    )
}

/// Recompute the status of `clique` in memory.
///
/// An invalid spec is rejected before any Pods are listed. On error
/// `clique.status` is left as it was.
pub async fn reconcile_status<L>(
    lister: &L,
    config: &ManagementConfig,
    clique: &mut Clique,
) -> Result<()>
where
    L: PodLister + ?Sized,
{
    let target = target_of(clique);

    if let Err(errors) = clique.spec.validate() {
        return Err(Error::at_step(
            ReconcileStep::ValidateSpec,
            &target,
            Error::ValidationError(format_validation_errors(&errors)),
        ));
    }

    let group_name = config
        .group_name(clique.labels())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::at_step(
                ReconcileStep::ListPods,
                &target,
                Error::ConfigError(format!("missing label {}", config.part_of_key)),
            )
        })?;

    let pods = lister
        .list_pods(&group_name, clique)
        .await
        .map_err(|e| Error::at_step(ReconcileStep::ListPods, &target, e))?;
    debug!("Listed {} pods for {}", pods.len(), target);

    synthesize_status(config, &group_name, clique, &pods)
        .map_err(|e| Error::at_step(ReconcileStep::BuildSelector, &target, e))?;
    mark_observed(clique);
    Ok(())
}

/// Replace the status subresource.
///
/// The request carries the object's resourceVersion, so a concurrent
/// writer makes it fail with a conflict instead of being overwritten.
pub async fn write_status(api: &Api<Clique>, clique: &Clique) -> Result<Clique> {
    let target = target_of(clique);
    let data = serde_json::to_vec(clique)
        .map_err(|e| Error::at_step(ReconcileStep::UpdateStatus, &target, e))?;
    api.replace_status(&clique.name_any(), &PostParams::default(), data)
        .await
        .map_err(|e| Error::at_step(ReconcileStep::UpdateStatus, &target, e))
}

/// The Clique a Pod belongs to, by its clique label
pub fn map_pod_to_clique(config: &ManagementConfig, pod: &Pod) -> Option<ObjectRef<Clique>> {
    let name = config.clique_of(pod.labels())?;
    let mut obj_ref = ObjectRef::new(name);
    if let Some(namespace) = pod.namespace() {
        obj_ref = obj_ref.within(&namespace);
    }
    Some(obj_ref)
}

/// Main entry point for the Clique controller
pub async fn run_clique_controller(state: Arc<ControllerState>) -> Result<()> {
    let cliques: Api<Clique> = state.api();
    let pods: Api<Pod> = state.api();

    info!("Starting Clique controller");

    // Verify CRD exists
    match cliques.list(&ListParams::default().limit(1)).await {
        Ok(_) => info!("Clique CRD is available"),
        Err(e) => {
            error!("Clique CRD not found. Please install the CRD first: {:?}", e);
            return Err(Error::ConfigError("Clique CRD not installed".to_string()));
        }
    }

    let config = state.config.clone();
    let managed_pods = Config::default().labels(&format!(
        "{}={}",
        config.managed_by_key, config.managed_by_value
    ));

    Controller::new(cliques, Config::default())
        .watches(pods, managed_pods, move |pod| {
            map_pod_to_clique(&config, &pod)
        })
        .with_config(controller::Config::default().concurrency(state.concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!("Reconciled: {}", obj),
                Err(e) => warn!("Clique reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

#[instrument(skip(obj, ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<Clique>, ctx: Arc<ControllerState>) -> Result<Action> {
    if !ctx.is_leader() {
        debug!("Not the leader, skipping reconciliation");
        return Ok(Action::requeue(Duration::from_secs(5)));
    }
    if is_terminating(&obj.metadata) {
        return Ok(Action::await_change());
    }

    let started = Instant::now();
    let result = sync_clique(&ctx, &obj).await;
    let elapsed = started.elapsed();
    debug!("Clique reconcile took {:?}", elapsed);

    #[cfg(feature = "metrics")]
    super::metrics::observe_reconcile_duration_seconds(CONTROLLER_NAME, elapsed.as_secs_f64());

    result.map(|_| Action::requeue(Duration::from_secs(300)))
}

async fn sync_clique(ctx: &ControllerState, obj: &Clique) -> Result<()> {
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<Clique> = Api::namespaced(ctx.client.clone(), &namespace);
    let lister = KubePodLister::new(ctx.client.clone(), ctx.config.clone());

    let mut clique = obj.clone();
    reconcile_status(&lister, &ctx.config, &mut clique).await?;

    if clique.status == obj.status {
        debug!("Status of {}/{} unchanged", namespace, clique.name_any());
        return Ok(());
    }

    let written = write_status(&api, &clique).await?;
    if let Some(status) = written.status.as_ref() {
        let breached = is_min_available_breached(&status.conditions);
        info!(
            "Updated Clique {}/{}: replicas={} ready={} gated={} breached={}",
            namespace,
            written.name_any(),
            status.replicas,
            status.ready_replicas,
            status.schedule_gated_replicas,
            breached
        );
        #[cfg(feature = "metrics")]
        super::metrics::set_min_available_breached(&namespace, &written.name_any(), breached);
    }
    Ok(())
}

fn error_policy(clique: Arc<Clique>, error: &Error, _ctx: Arc<ControllerState>) -> Action {
    #[cfg(feature = "metrics")]
    super::metrics::inc_reconcile_error(CONTROLLER_NAME, error.kind());

    requeue_after_error(&clique.name_any(), error)
}

/// Requeue delay shared by both controllers.
///
/// Configuration errors still requeue so a fixed spec is picked up, but they
/// are reported separately from transient failures.
pub(crate) fn requeue_after_error(name: &str, error: &Error) -> Action {
    if error.is_config_error() {
        warn!("Configuration error for {}: {}", name, error);
        return Action::requeue(Duration::from_secs(60));
    }
    error!("Reconciliation error for {}: {:?}", name, error);

    // Use shorter retry for retriable errors
    let retry_duration = if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(60)
    };

    Action::requeue(retry_duration)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::controller::conditions::CONDITION_TYPE_MIN_AVAILABLE_BREACHED;
    use crate::controller::managed::LABEL_PART_OF_KEY;
    use crate::controller::test_fixtures::*;
    use crate::crd::ConditionStatus;

    /// Returns a fixed Pod set, or fails like an unreachable API server
    struct FakePodLister {
        pods: Vec<Pod>,
        fail: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakePodLister {
        fn with_pods(pods: Vec<Pod>) -> Self {
            Self {
                pods,
                fail: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::with_pods(Vec::new())
            }
        }
    }

    #[async_trait]
    impl PodLister for FakePodLister {
        async fn list_pods(&self, group_name: &str, clique: &Clique) -> Result<Vec<Pod>> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{group_name}/{}", clique.name_any()));
            if self.fail {
                return Err(Error::KubeError(kube::Error::Api(
                    kube::error::ErrorResponse {
                        status: "Failure".to_string(),
                        message: "connection refused".to_string(),
                        reason: "ServiceUnavailable".to_string(),
                        code: 503,
                    },
                )));
            }
            Ok(self.pods.clone())
        }
    }

    #[tokio::test]
    async fn test_reconcile_status_lists_by_group_and_sets_observed() {
        let lister = FakePodLister::with_pods(vec![ready_pod("p0"), gated_pod("p1")]);
        let mut clique = clique("c1", Some(1));

        reconcile_status(&lister, &ManagementConfig::default(), &mut clique)
            .await
            .unwrap();

        assert_eq!(*lister.calls.lock().unwrap(), vec!["inference/c1".to_string()]);
        let status = clique.status.unwrap();
        assert_eq!(status.replicas, 2);
        assert_eq!(status.ready_replicas, 1);
        assert_eq!(status.schedule_gated_replicas, 1);
        assert_eq!(status.observed_generation, Some(1));
        // observedGeneration was unset when the pass started
        assert!(status.conditions.is_empty());
    }

    #[tokio::test]
    async fn test_second_pass_evaluates_condition() {
        let lister = FakePodLister::with_pods(vec![ready_pod("p0")]);
        let config = ManagementConfig::default();
        let mut clique = clique("c1", Some(2));

        reconcile_status(&lister, &config, &mut clique).await.unwrap();
        reconcile_status(&lister, &config, &mut clique).await.unwrap();

        let condition = clique
            .status
            .as_ref()
            .and_then(|s| s.conditions.get(CONDITION_TYPE_MIN_AVAILABLE_BREACHED))
            .cloned()
            .unwrap();
        assert_eq!(condition.status, ConditionStatus::True);
    }

    #[tokio::test]
    async fn test_list_failure_leaves_status_untouched() {
        let lister = FakePodLister::failing();
        let mut clique = observed_clique("c1", Some(1));
        let before = clique.status.clone();

        let err = reconcile_status(&lister, &ManagementConfig::default(), &mut clique)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Step {
                step: ReconcileStep::ListPods,
                ..
            }
        ));
        assert!(err.is_retriable());
        assert!(err.to_string().contains("Clique default/c1"));
        assert_eq!(clique.status, before);
    }

    #[tokio::test]
    async fn test_missing_group_label_is_config_error() {
        let lister = FakePodLister::with_pods(vec![ready_pod("p0")]);
        let mut clique = clique("c1", None);
        if let Some(labels) = clique.metadata.labels.as_mut() {
            labels.remove(LABEL_PART_OF_KEY);
        }

        let err = reconcile_status(&lister, &ManagementConfig::default(), &mut clique)
            .await
            .unwrap_err();

        assert!(err.is_config_error());
        assert!(lister.calls.lock().unwrap().is_empty());
        assert!(clique.status.is_none());
    }

    #[tokio::test]
    async fn test_invalid_spec_is_rejected_before_listing() {
        let lister = FakePodLister::with_pods(vec![ready_pod("p0")]);
        let mut clique = observed_clique("c1", Some(-1));
        let before = clique.status.clone();

        let err = reconcile_status(&lister, &ManagementConfig::default(), &mut clique)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Step {
                step: ReconcileStep::ValidateSpec,
                ..
            }
        ));
        assert!(err.is_config_error());
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("spec.minAvailable"));
        assert!(lister.calls.lock().unwrap().is_empty());
        assert_eq!(clique.status, before);
        assert_eq!(
            requeue_after_error("c1", &err),
            Action::requeue(Duration::from_secs(60))
        );
    }

    #[tokio::test]
    async fn test_selector_failure_reports_build_selector_step() {
        let lister = FakePodLister::with_pods(vec![ready_pod("p0")]);
        let mut clique = scalable(observed_clique("c1", Some(1)));
        if let Some(labels) = clique.metadata.labels.as_mut() {
            labels.insert(LABEL_PART_OF_KEY.to_string(), "-bad-".to_string());
        }
        let before = clique.status.clone();

        let err = reconcile_status(&lister, &ManagementConfig::default(), &mut clique)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Step {
                step: ReconcileStep::BuildSelector,
                ..
            }
        ));
        assert!(err.is_config_error());
        assert_eq!(clique.status, before);
    }

    #[test]
    fn test_map_pod_to_clique() {
        let config = ManagementConfig::default();
        let mut pod = ready_pod("p0");
        pod.metadata.labels = Some(config.clique_pod_labels(GROUP, "c1"));

        let obj_ref = map_pod_to_clique(&config, &pod).unwrap();
        assert_eq!(obj_ref.name, "c1");
        assert_eq!(obj_ref.namespace.as_deref(), Some(NAMESPACE));

        pod.metadata.labels = None;
        assert!(map_pod_to_clique(&config, &pod).is_none());
    }

    #[test]
    fn test_requeue_after_error_by_category() {
        let transient = Error::at_step(
            ReconcileStep::UpdateStatus,
            "Clique default/c1",
            Error::KubeError(kube::Error::Api(kube::error::ErrorResponse {
                status: "Failure".to_string(),
                message: "conflict".to_string(),
                reason: "Conflict".to_string(),
                code: 409,
            })),
        );
        let config = Error::InvalidSelector("bad".to_string());

        assert_eq!(
            requeue_after_error("c1", &transient),
            Action::requeue(Duration::from_secs(15))
        );
        assert_eq!(
            requeue_after_error("c1", &config),
            Action::requeue(Duration::from_secs(60))
        );
    }

    const PODS_PATH: &str = "/api/v1/namespaces/default/pods";
    const STATUS_PATH: &str = "/apis/clique.dev/v1alpha1/namespaces/default/cliques/c1/status";

    async fn serve_pods(server: &MockServer, pods: &[Pod]) {
        Mock::given(method("GET"))
            .and(path(PODS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(list_body("PodList", pods)))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_sync_skips_write_when_status_unchanged() {
        let pods = vec![ready_pod("p0"), ready_pod("p1")];
        let config = ManagementConfig::default();
        let mut settled = clique("c1", Some(1));
        let lister = FakePodLister::with_pods(pods.clone());
        reconcile_status(&lister, &config, &mut settled).await.unwrap();
        reconcile_status(&lister, &config, &mut settled).await.unwrap();

        let server = MockServer::start().await;
        serve_pods(&server, &pods).await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        sync_clique(&mock_state(&server), &settled).await.unwrap();
    }

    #[tokio::test]
    async fn test_sync_fails_on_conflicting_write() {
        let server = MockServer::start().await;
        serve_pods(&server, &[ready_pod("p0")]).await;
        Mock::given(method("PUT"))
            .and(path(STATUS_PATH))
            .and(body_partial_json(serde_json::json!({
                "metadata": { "resourceVersion": "7" },
                "status": { "replicas": 1, "readyReplicas": 1 }
            })))
            .respond_with(ResponseTemplate::new(409).set_body_json(conflict_body("c1")))
            .expect(1)
            .mount(&server)
            .await;

        let mut stale = observed_clique("c1", Some(1));
        stale.metadata.resource_version = Some("7".to_string());

        let err = sync_clique(&mock_state(&server), &stale)
            .await
            .unwrap_err();

        assert!(err.is_retriable());
        match err {
            Error::Step { step, source, .. } => {
                assert_eq!(step, ReconcileStep::UpdateStatus);
                assert!(matches!(
                    *source,
                    Error::KubeError(kube::Error::Api(ref response)) if response.code == 409
                ));
            }
            other => panic!("expected a step error, got {other:?}"),
        }
    }
}
