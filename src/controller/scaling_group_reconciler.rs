//! Controller wiring for ScalingGroups
//!
//! ScalingGroup events come in through a reflector-backed stream filtered by
//! the own-kind predicate. Group and Clique events are turned into lifecycle
//! events, judged by the [`EventRouter`] and fanned out to the ScalingGroups
//! they affect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{future, stream, Stream, StreamExt};
use kube::{
    api::{Api, ListParams, Patch, PatchParams},
    runtime::{
        controller::{self, Action, Controller},
        reflector::{self, ObjectRef},
        watcher::{self, watcher, Config},
        WatchStreamExt,
    },
    Resource, ResourceExt,
};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::crd::{Clique, Group, ScalingGroup, ScalingGroupStatus};
use crate::error::{Error, ReconcileStep, Result};

use super::clique_reconciler::requeue_after_error;
use super::conditions::is_min_available_breached;
use super::lifecycle::{generation_changed, lifecycle_stream, Lifecycle};
use super::managed::{is_managed_clique, ManagementConfig};
use super::router::{EventRouter, ReconcileKey, RoutedObject, WatchRole};
use super::selector::selector_from_labels;
use super::ControllerState;

pub(crate) const CONTROLLER_NAME: &str = "scaling-group";

/// Member Clique conditions can flip without a ready count change, which
/// the child predicate does not route, so summaries are refreshed on a timer.
const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Member counts reported in ScalingGroup status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemberSummary {
    pub members: i32,
    pub breached: i32,
}

/// Count member Cliques and how many of them report MinAvailableBreached=True.
pub fn summarize_members(cliques: &[Clique]) -> MemberSummary {
    cliques
        .iter()
        .fold(MemberSummary::default(), |mut summary, clique| {
            summary.members += 1;
            let breached = clique
                .status
                .as_ref()
                .is_some_and(|s| is_min_available_breached(&s.conditions));
            summary.breached += i32::from(breached);
            summary
        })
}

/// Route one lifecycle event.
///
/// Own and parent updates only count when the spec generation moved, so
/// status and metadata churn does not trigger reconciles.
pub fn route_lifecycle<K>(
    router: &EventRouter,
    role: WatchRole,
    event: &Lifecycle<K>,
) -> Vec<ReconcileKey>
where
    K: RoutedObject + Resource,
{
    if let Lifecycle::Update { old, new } = event {
        if matches!(role, WatchRole::Own | WatchRole::Parent) && !generation_changed(old, new) {
            return Vec::new();
        }
    }
    router.route(role, &event.as_routed())
}

fn to_object_ref(key: ReconcileKey) -> ObjectRef<ScalingGroup> {
    ObjectRef::new(&key.name).within(&key.namespace)
}

/// Reconcile triggers derived from a watched kind
fn routed_triggers<K, S>(
    router: EventRouter,
    role: WatchRole,
    events: S,
) -> impl Stream<Item = ObjectRef<ScalingGroup>> + Send
where
    K: RoutedObject + Resource + Clone + Send + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone + Send,
    S: Stream<Item = std::result::Result<watcher::Event<K>, watcher::Error>> + Send,
{
    lifecycle_stream(events)
        .filter_map(move |event| {
            let keys = match event {
                Ok(event) => {
                    let keys = route_lifecycle(&router, role, &event);
                    #[cfg(feature = "metrics")]
                    super::metrics::inc_routed_event(
                        &event.latest().kind().to_string(),
                        !keys.is_empty(),
                    );
                    if !keys.is_empty() {
                        debug!(
                            "Routed {} event on {} to {} scaling group(s)",
                            role,
                            event.latest().object_name(),
                            keys.len()
                        );
                    }
                    keys
                }
                Err(e) => {
                    warn!("{} watch error: {}", role, e);
                    Vec::new()
                }
            };
            future::ready(Some(stream::iter(keys.into_iter().map(to_object_ref))))
        })
        .flatten()
}

/// Main entry point for the ScalingGroup controller
pub async fn run_scaling_group_controller(state: Arc<ControllerState>) -> Result<()> {
    let scaling_groups: Api<ScalingGroup> = state.api();
    let groups: Api<Group> = state.api();
    let cliques: Api<Clique> = state.api();

    info!("Starting ScalingGroup controller");

    // Verify CRD exists
    if let Err(e) = scaling_groups.list(&ListParams::default().limit(1)).await {
        warn!("ScalingGroup CRD not found. Please install the CRD first: {:?}", e);
        return Err(Error::ConfigError(
            "ScalingGroup CRD not installed".to_string(),
        ));
    }

    let router = EventRouter::new(state.config.clone());
    let (reader, writer) = reflector::store();

    let own_router = router.clone();
    let own = lifecycle_stream(
        watcher(scaling_groups, Config::default())
            .default_backoff()
            .reflect(writer),
    )
    .filter_map(move |event| {
        let admitted = event.as_ref().map_or(true, |event| {
            !route_lifecycle(&own_router, WatchRole::Own, event).is_empty()
        });
        future::ready(admitted.then(|| event.map(|event| event.latest().clone())))
    });

    let parent = routed_triggers(
        router.clone(),
        WatchRole::Parent,
        watcher(groups, Config::default()).default_backoff(),
    );
    let child = routed_triggers(
        router,
        WatchRole::Child,
        watcher(cliques, Config::default()).default_backoff(),
    );

    Controller::for_stream(own, reader)
        .reconcile_on(stream::select(parent, child))
        .with_config(controller::Config::default().concurrency(state.concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!("Reconciled: {}", obj),
                Err(e) => warn!("ScalingGroup reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

#[instrument(skip(sg, ctx), fields(name = %sg.name_any(), namespace = sg.namespace()))]
async fn reconcile(sg: Arc<ScalingGroup>, ctx: Arc<ControllerState>) -> Result<Action> {
    if !ctx.is_leader() {
        debug!("Not the leader, skipping reconciliation");
        return Ok(Action::requeue(Duration::from_secs(5)));
    }
    if sg.meta().deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    let started = Instant::now();
    let result = sync_scaling_group(&ctx, &sg).await;

    #[cfg(feature = "metrics")]
    super::metrics::observe_reconcile_duration_seconds(
        CONTROLLER_NAME,
        started.elapsed().as_secs_f64(),
    );
    #[cfg(not(feature = "metrics"))]
    debug!("ScalingGroup reconcile took {:?}", started.elapsed());

    result.map(|_| Action::requeue(RESYNC_INTERVAL))
}

/// Member Cliques of a ScalingGroup: labelled with its name and owned by a ScalingGroup
pub async fn list_members(
    api: &Api<Clique>,
    config: &ManagementConfig,
    sg_name: &str,
) -> Result<Vec<Clique>> {
    let labels = std::collections::BTreeMap::from([
        (config.managed_by_key.clone(), config.managed_by_value.clone()),
        (config.scaling_group_key.clone(), sg_name.to_string()),
    ]);
    let selector = selector_from_labels(&labels)?;
    let list = api.list(&ListParams::default().labels(&selector)).await?;

    let owner_kinds = [config.scaling_group_kind.as_str()];
    Ok(list
        .items
        .into_iter()
        .filter(|clique| is_managed_clique(config, clique, &owner_kinds))
        .collect())
}

async fn sync_scaling_group(ctx: &ControllerState, sg: &ScalingGroup) -> Result<()> {
    let namespace = sg.namespace().unwrap_or_else(|| "default".to_string());
    let name = sg.name_any();
    let target = format!("ScalingGroup {}/{}", namespace, name);

    let cliques: Api<Clique> = Api::namespaced(ctx.client.clone(), &namespace);
    let members = list_members(&cliques, &ctx.config, &name)
        .await
        .map_err(|e| Error::at_step(ReconcileStep::ListCliques, &target, e))?;

    let summary = summarize_members(&members);
    let status = ScalingGroupStatus {
        observed_generation: sg.metadata.generation,
        member_cliques: summary.members,
        breached_cliques: summary.breached,
    };
    if sg.status.as_ref() == Some(&status) {
        return Ok(());
    }

    let api: Api<ScalingGroup> = Api::namespaced(ctx.client.clone(), &namespace);
    api.patch_status(
        &name,
        &PatchParams::default(),
        &Patch::Merge(&json!({ "status": status })),
    )
    .await
    .map_err(|e| Error::at_step(ReconcileStep::UpdateStatus, &target, e))?;

    info!(
        "Updated {}: members={} breached={}",
        target, summary.members, summary.breached
    );
    Ok(())
}

fn error_policy(sg: Arc<ScalingGroup>, error: &Error, _ctx: Arc<ControllerState>) -> Action {
    #[cfg(feature = "metrics")]
    super::metrics::inc_reconcile_error(CONTROLLER_NAME, error.kind());

    requeue_after_error(&sg.name_any(), error)
}
