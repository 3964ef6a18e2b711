//! Controller module for Clique and ScalingGroup reconciliation
//!
//! This module contains the status synthesizer for Cliques, the event router
//! that decides which ScalingGroups to reconcile, and the controller loops
//! wiring both to the Kubernetes API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use k8s_openapi::NamespaceResourceScope;
use kube::{api::Api, client::Client, Resource};

mod clique_reconciler;
pub mod conditions;
pub mod lifecycle;
pub mod managed;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod router;
#[cfg(test)]
mod router_test;
mod scaling_group_reconciler;
pub mod selector;
pub mod status;
#[cfg(test)]
pub(crate) mod test_fixtures;

pub use clique_reconciler::{
    map_pod_to_clique, reconcile_status, run_clique_controller, write_status, KubePodLister,
    PodLister,
};
pub use managed::ManagementConfig;
pub use router::{EventRouter, ReconcileKey, RoutedEvent, RoutedObject, WatchRole};
pub use scaling_group_reconciler::{
    list_members, route_lifecycle, run_scaling_group_controller, summarize_members, MemberSummary,
};
pub use status::synthesize_status;

/// Shared state for the controllers
pub struct ControllerState {
    pub client: Client,
    pub config: ManagementConfig,
    /// Namespace to watch, or every namespace when unset
    pub namespace: Option<String>,
    pub concurrency: u16,
    pub is_leader: Arc<AtomicBool>,
}

impl ControllerState {
    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::Relaxed)
    }

    /// Api for `K` scoped to the watched namespace
    pub fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        match &self.namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }
}

/// Run the Clique and ScalingGroup controllers until shutdown.
pub async fn run_controllers(state: Arc<ControllerState>) -> crate::Result<()> {
    futures::try_join!(
        run_clique_controller(Arc::clone(&state)),
        run_scaling_group_controller(state),
    )?;
    Ok(())
}
