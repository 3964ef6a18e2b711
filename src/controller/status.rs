//! Clique status synthesis
//!
//! Derives the replica counters, the MinAvailableBreached condition and the
//! scale selector of a Clique from the Pods currently labelled as its
//! members. Everything is recomputed on every pass, so applying the same
//! Pod set twice leaves the status untouched.

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use crate::crd::{Clique, CliqueStatus};
use crate::error::Result;

use super::conditions::{min_available_breached_condition, set_condition};
use super::managed::ManagementConfig;
use super::selector::selector_from_labels;

const POD_CONDITION_READY: &str = "Ready";
const POD_CONDITION_SCHEDULED: &str = "PodScheduled";
const POD_REASON_SCHEDULING_GATED: &str = "SchedulingGated";

/// Replica counts observed from a Pod set
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PodCounts {
    pub replicas: i32,
    pub ready: i32,
    pub schedule_gated: i32,
}

/// A resource is terminating once a deletion timestamp has been set.
pub fn is_terminating(meta: &ObjectMeta) -> bool {
    meta.deletion_timestamp.is_some()
}

/// Count non-terminating, ready and schedule-gated Pods.
pub fn count_pods(pods: &[Pod]) -> PodCounts {
    pods.iter()
        .filter(|pod| !is_terminating(&pod.metadata))
        .fold(PodCounts::default(), |mut counts, pod| {
            counts.replicas += 1;
            let (ready, gated) = classify_pod(pod);
            counts.ready += i32::from(ready);
            counts.schedule_gated += i32::from(gated);
            counts
        })
}

// One pass over the Pod's conditions: (ready, schedule-gated)
fn classify_pod(pod: &Pod) -> (bool, bool) {
    let conditions = pod
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or_default();

    conditions
        .iter()
        .fold((false, false), |(ready, gated), cond| {
            match cond.type_.as_str() {
                POD_CONDITION_READY if cond.status == "True" => (true, gated),
                POD_CONDITION_SCHEDULED
                    if cond.status == "False"
                        && cond.reason.as_deref() == Some(POD_REASON_SCHEDULING_GATED) =>
                {
                    (ready, true)
                }
                _ => (ready, gated),
            }
        })
}

/// Overwrite the replica counters in `status` from `pods`.
pub fn apply_replica_counts(status: &mut CliqueStatus, pods: &[Pod]) {
    let counts = count_pods(pods);
    status.replicas = counts.replicas;
    status.ready_replicas = counts.ready;
    status.schedule_gated_replicas = counts.schedule_gated;
    // Rollouts are not tracked per Pod yet, so every live Pod counts as updated
    status.updated_replicas = counts.replicas;
}

/// Recompute MinAvailableBreached. Returns whether the stored condition changed.
///
/// Does nothing until the Clique has been reconciled once, so a Clique that
/// is still bringing up its first Pods is never reported as breached.
pub fn apply_min_available_breached(status: &mut CliqueStatus, min_available: Option<i32>) -> bool {
    if status.observed_generation.is_none() {
        return false;
    }
    let condition = min_available_breached_condition(min_available, status.ready_replicas);
    set_condition(&mut status.conditions, condition)
}

/// Publish the scale selector when the Clique has a scale config.
pub fn apply_selector(
    config: &ManagementConfig,
    group_name: &str,
    clique: &Clique,
    status: &mut CliqueStatus,
) -> Result<()> {
    if clique.spec.scale_config.is_none() {
        return Ok(());
    }
    let labels = config.clique_pod_labels(group_name, &clique.name_any());
    status.selector = Some(selector_from_labels(&labels)?);
    Ok(())
}

/// Synthesize the full status of `clique` from `pods`.
///
/// The new status is built on a copy and only assigned back once every
/// step succeeded, so a failing pass leaves `clique.status` as it was.
pub fn synthesize_status(
    config: &ManagementConfig,
    group_name: &str,
    clique: &mut Clique,
    pods: &[Pod],
) -> Result<()> {
    let mut status = clique.status.clone().unwrap_or_default();

    apply_replica_counts(&mut status, pods);
    apply_min_available_breached(&mut status, clique.spec.min_available);
    apply_selector(config, group_name, clique, &mut status)?;

    clique.status = Some(status);
    Ok(())
}

/// Record that the current generation has been reconciled.
pub fn mark_observed(clique: &mut Clique) {
    let generation = clique.metadata.generation.unwrap_or_default();
    clique
        .status
        .get_or_insert_with(CliqueStatus::default)
        .observed_generation = Some(generation);
}
