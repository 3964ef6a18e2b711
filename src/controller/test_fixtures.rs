//! Builders shared by the controller tests

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{Pod, PodCondition, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference, Time};
use serde_json::{json, Value};
use wiremock::MockServer;

use crate::crd::{
    Clique, CliqueSpec, CliqueStatus, Group, GroupSpec, GroupTemplate, ScaleConfig, ScalingGroup,
    ScalingGroupConfig, ScalingGroupSpec,
};

use super::managed::{
    ManagementConfig, LABEL_MANAGED_BY_KEY, LABEL_MANAGED_BY_VALUE, LABEL_SCALING_GROUP_KEY,
};
use super::ControllerState;

pub const NAMESPACE: &str = "default";
pub const GROUP: &str = "inference";

pub fn owner(kind: &str, name: &str) -> OwnerReference {
    OwnerReference {
        api_version: "clique.dev/v1alpha1".to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
        uid: format!("uid-{name}"),
        controller: Some(true),
        ..Default::default()
    }
}

pub fn managed_labels() -> BTreeMap<String, String> {
    ManagementConfig::default().default_labels(GROUP)
}

fn pod(name: &str, conditions: Vec<PodCondition>) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        spec: None,
        status: Some(PodStatus {
            conditions: Some(conditions),
            ..Default::default()
        }),
    }
}

fn pod_condition(type_: &str, status: &str, reason: Option<&str>) -> PodCondition {
    PodCondition {
        type_: type_.to_string(),
        status: status.to_string(),
        reason: reason.map(str::to_string),
        ..Default::default()
    }
}

pub fn ready_pod(name: &str) -> Pod {
    pod(
        name,
        vec![
            pod_condition("PodScheduled", "True", None),
            pod_condition("Ready", "True", None),
        ],
    )
}

pub fn gated_pod(name: &str) -> Pod {
    pod(
        name,
        vec![pod_condition("PodScheduled", "False", Some("SchedulingGated"))],
    )
}

pub fn pending_pod(name: &str) -> Pod {
    pod(
        name,
        vec![
            pod_condition("PodScheduled", "True", None),
            pod_condition("Ready", "False", Some("ContainersNotReady")),
        ],
    )
}

pub fn terminating(mut pod: Pod) -> Pod {
    pod.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
    pod
}

pub fn clique(name: &str, min_available: Option<i32>) -> Clique {
    let mut clique = Clique::new(
        name,
        CliqueSpec {
            replicas: 3,
            min_available,
            scale_config: None,
        },
    );
    clique.metadata.namespace = Some(NAMESPACE.to_string());
    clique.metadata.generation = Some(1);
    clique.metadata.labels = Some(managed_labels());
    clique.metadata.owner_references = Some(vec![owner("Group", GROUP)]);
    clique
}

/// Clique that has already gone through one successful reconciliation
pub fn observed_clique(name: &str, min_available: Option<i32>) -> Clique {
    let mut clique = clique(name, min_available);
    clique.status = Some(CliqueStatus {
        observed_generation: Some(1),
        ..Default::default()
    });
    clique
}

pub fn scalable(mut clique: Clique) -> Clique {
    clique.spec.scale_config = Some(ScaleConfig {
        min_replicas: Some(1),
        max_replicas: 5,
    });
    clique
}

/// Managed Clique owned by a ScalingGroup with the given ready count
pub fn member_clique(name: &str, scaling_group: &str, ready_replicas: i32) -> Clique {
    let mut clique = clique(name, Some(1));
    let mut labels = managed_labels();
    labels.insert(LABEL_SCALING_GROUP_KEY.to_string(), scaling_group.to_string());
    clique.metadata.labels = Some(labels);
    clique.metadata.owner_references = Some(vec![owner("ScalingGroup", scaling_group)]);
    clique.status = Some(CliqueStatus {
        observed_generation: Some(1),
        replicas: 3,
        ready_replicas,
        updated_replicas: 3,
        ..Default::default()
    });
    clique
}

pub fn group(replicas: i32, templates: &[&str]) -> Group {
    let mut group = Group::new(
        GROUP,
        GroupSpec {
            replicas,
            template: GroupTemplate {
                cliques: vec![],
                scaling_group_configs: templates
                    .iter()
                    .map(|name| ScalingGroupConfig {
                        name: name.to_string(),
                        ..Default::default()
                    })
                    .collect(),
            },
        },
    );
    group.metadata.namespace = Some(NAMESPACE.to_string());
    group.metadata.labels = Some(BTreeMap::from([(
        LABEL_MANAGED_BY_KEY.to_string(),
        LABEL_MANAGED_BY_VALUE.to_string(),
    )]));
    group
}

pub fn scaling_group(name: &str) -> ScalingGroup {
    let mut sg = ScalingGroup::new(name, ScalingGroupSpec::default());
    sg.metadata.namespace = Some(NAMESPACE.to_string());
    sg.metadata.generation = Some(1);
    sg.metadata.labels = Some(managed_labels());
    sg.metadata.owner_references = Some(vec![owner("Group", GROUP)]);
    sg
}

/// Client that talks to `server` instead of an API server
pub fn mock_client(server: &MockServer) -> kube::Client {
    let config = kube::Config::new(server.uri().parse().unwrap());
    kube::Client::try_from(config).unwrap()
}

/// Leader state scoped to [`NAMESPACE`] against a mock API server
pub fn mock_state(server: &MockServer) -> ControllerState {
    ControllerState {
        client: mock_client(server),
        config: ManagementConfig::default(),
        namespace: Some(NAMESPACE.to_string()),
        concurrency: 1,
        is_leader: Arc::new(AtomicBool::new(true)),
    }
}

/// Body of a list response
pub fn list_body<T: serde::Serialize>(kind: &str, items: &[T]) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": kind,
        "metadata": { "resourceVersion": "1" },
        "items": items,
    })
}

/// Body of a 409 response for a write against a stale resourceVersion
pub fn conflict_body(name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Status",
        "metadata": {},
        "status": "Failure",
        "message": format!("Operation cannot be fulfilled on {name}: the object has been modified"),
        "reason": "Conflict",
        "code": 409,
    })
}
