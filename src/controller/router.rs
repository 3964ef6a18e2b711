//! Event routing for the ScalingGroup controller
//!
//! Decides which lifecycle events on Groups, ScalingGroups and Cliques
//! should cause a ScalingGroup to be reconciled, and fans accepted events
//! out to the ScalingGroups they affect.
//!
//! Everything here is a pure function of the objects in the event. An
//! object of an unexpected kind never errors, it simply routes nowhere.

use std::collections::{BTreeMap, HashSet};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::crd::{scaling_group_names, Clique, Group, ScalingGroup};

use super::managed::ManagementConfig;

/// Resource kinds the router knows about
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Group,
    ScalingGroup,
    Clique,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Group => write!(f, "Group"),
            ResourceKind::ScalingGroup => write!(f, "ScalingGroup"),
            ResourceKind::Clique => write!(f, "Clique"),
        }
    }
}

/// Kind-specific fields the router needs
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Snapshot<'a> {
    Group {
        replicas: i32,
        scaling_groups: Vec<&'a str>,
    },
    ScalingGroup,
    Clique {
        ready_replicas: i32,
    },
}

/// What the router can see of a watched object.
pub trait RoutedObject {
    fn kind(&self) -> ResourceKind;
    fn object_name(&self) -> &str;
    fn object_namespace(&self) -> &str;
    fn object_labels(&self) -> &BTreeMap<String, String>;
    fn object_owners(&self) -> &[OwnerReference];
    fn snapshot(&self) -> Snapshot<'_>;
}

impl RoutedObject for Group {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Group
    }
    fn object_name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
    fn object_namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or_default()
    }
    fn object_labels(&self) -> &BTreeMap<String, String> {
        self.labels()
    }
    fn object_owners(&self) -> &[OwnerReference] {
        self.owner_references()
    }
    fn snapshot(&self) -> Snapshot<'_> {
        Snapshot::Group {
            replicas: self.spec.replicas,
            scaling_groups: self
                .spec
                .template
                .scaling_group_configs
                .iter()
                .map(|c| c.name.as_str())
                .collect(),
        }
    }
}

impl RoutedObject for ScalingGroup {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ScalingGroup
    }
    fn object_name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
    fn object_namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or_default()
    }
    fn object_labels(&self) -> &BTreeMap<String, String> {
        self.labels()
    }
    fn object_owners(&self) -> &[OwnerReference] {
        self.owner_references()
    }
    fn snapshot(&self) -> Snapshot<'_> {
        Snapshot::ScalingGroup
    }
}

impl RoutedObject for Clique {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Clique
    }
    fn object_name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
    fn object_namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or_default()
    }
    fn object_labels(&self) -> &BTreeMap<String, String> {
        self.labels()
    }
    fn object_owners(&self) -> &[OwnerReference] {
        self.owner_references()
    }
    fn snapshot(&self) -> Snapshot<'_> {
        Snapshot::Clique {
            ready_replicas: self.status.as_ref().map(|s| s.ready_replicas).unwrap_or(0),
        }
    }
}

/// A raw lifecycle event on a watched object
#[derive(Clone, Copy)]
pub enum RoutedEvent<'a> {
    Create(&'a dyn RoutedObject),
    Update {
        old: &'a dyn RoutedObject,
        new: &'a dyn RoutedObject,
    },
    Delete(&'a dyn RoutedObject),
    Generic(&'a dyn RoutedObject),
}

impl<'a> RoutedEvent<'a> {
    /// Most recent state of the object
    pub fn latest(&self) -> &'a dyn RoutedObject {
        match *self {
            RoutedEvent::Create(obj) | RoutedEvent::Delete(obj) | RoutedEvent::Generic(obj) => obj,
            RoutedEvent::Update { new, .. } => new,
        }
    }

    pub fn phase(&self) -> &'static str {
        match self {
            RoutedEvent::Create(_) => "create",
            RoutedEvent::Update { .. } => "update",
            RoutedEvent::Delete(_) => "delete",
            RoutedEvent::Generic(_) => "generic",
        }
    }
}

/// How the watched kind relates to the reconciled ScalingGroup
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WatchRole {
    /// ScalingGroup events
    Own,
    /// Group events, fanned out to every ScalingGroup of the Group
    Parent,
    /// Clique events, routed to the ScalingGroup the Clique is a member of
    Child,
}

impl std::fmt::Display for WatchRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchRole::Own => write!(f, "own"),
            WatchRole::Parent => write!(f, "parent"),
            WatchRole::Child => write!(f, "child"),
        }
    }
}

/// Reconcile request emitted by the router
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReconcileKey {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ReconcileKey {
    /// Request against a ScalingGroup, the only kind this router targets
    pub fn scaling_group(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::ScalingGroup,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ReconcileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// Admission predicates and fan-out for ScalingGroup reconciliation
#[derive(Clone, Debug, Default)]
pub struct EventRouter {
    config: ManagementConfig,
}

impl EventRouter {
    pub fn new(config: ManagementConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ManagementConfig {
        &self.config
    }

    /// Admission predicate for `role`
    pub fn admit(&self, role: WatchRole, event: &RoutedEvent<'_>) -> bool {
        match role {
            WatchRole::Own => self.admit_own(event),
            WatchRole::Parent => self.admit_parent(event),
            WatchRole::Child => self.admit_child(event),
        }
    }

    /// ScalingGroup events.
    ///
    /// Creates need a managed object; updates are judged on the state before
    /// the change. Deletion cleanup happens through owner references.
    pub fn admit_own(&self, event: &RoutedEvent<'_>) -> bool {
        match event {
            RoutedEvent::Create(obj) => self.is_managed_scaling_group(*obj),
            RoutedEvent::Update { old, .. } => self.is_managed_scaling_group(*old),
            RoutedEvent::Delete(_) | RoutedEvent::Generic(_) => false,
        }
    }

    /// Group events: only updates of managed Groups matter.
    pub fn admit_parent(&self, event: &RoutedEvent<'_>) -> bool {
        match event {
            RoutedEvent::Update { old, .. } => {
                old.kind() == ResourceKind::Group && self.config.is_managed(old.object_labels())
            }
            RoutedEvent::Create(_) | RoutedEvent::Delete(_) | RoutedEvent::Generic(_) => false,
        }
    }

    /// Clique events.
    ///
    /// A new Clique has no status worth reacting to yet, and among status
    /// changes only the ready count is relevant to its ScalingGroup.
    pub fn admit_child(&self, event: &RoutedEvent<'_>) -> bool {
        match event {
            RoutedEvent::Delete(obj) => self.is_managed_member_clique(*obj),
            RoutedEvent::Update { old, new } => {
                self.is_managed_member_clique(*old) && ready_replicas_changed(*old, *new)
            }
            RoutedEvent::Create(_) | RoutedEvent::Generic(_) => false,
        }
    }

    /// Fan an object out to the ScalingGroups it affects
    pub fn map(&self, role: WatchRole, obj: &dyn RoutedObject) -> Vec<ReconcileKey> {
        match role {
            WatchRole::Own if obj.kind() == ResourceKind::ScalingGroup => {
                vec![ReconcileKey::scaling_group(obj.object_namespace(), obj.object_name())]
            }
            WatchRole::Own => Vec::new(),
            WatchRole::Parent => self.map_group(obj),
            WatchRole::Child => self.map_clique(obj),
        }
    }

    /// Every ScalingGroup of every replica of the Group
    pub fn map_group(&self, obj: &dyn RoutedObject) -> Vec<ReconcileKey> {
        let Snapshot::Group {
            replicas,
            scaling_groups,
        } = obj.snapshot()
        else {
            return Vec::new();
        };
        let namespace = obj.object_namespace();
        scaling_group_names(obj.object_name(), replicas, &scaling_groups)
            .into_iter()
            .map(|name| ReconcileKey::scaling_group(namespace, name))
            .collect()
    }

    /// The ScalingGroup named by the Clique's membership label, if any
    pub fn map_clique(&self, obj: &dyn RoutedObject) -> Vec<ReconcileKey> {
        if obj.kind() != ResourceKind::Clique {
            return Vec::new();
        }
        match self.config.scaling_group_of(obj.object_labels()) {
            Some(name) => vec![ReconcileKey::scaling_group(obj.object_namespace(), name)],
            None => Vec::new(),
        }
    }

    /// Predicate, then fan-out, deduplicated in first-seen order.
    ///
    /// Updates fan out from both states, so a ScalingGroup that an object
    /// moved away from is reconciled as well as the one it moved to.
    pub fn route(&self, role: WatchRole, event: &RoutedEvent<'_>) -> Vec<ReconcileKey> {
        if !self.admit(role, event) {
            return Vec::new();
        }
        let mut keys = match *event {
            RoutedEvent::Update { old, new } => {
                let mut keys = self.map(role, new);
                keys.extend(self.map(role, old));
                keys
            }
            _ => self.map(role, event.latest()),
        };
        let mut seen = HashSet::new();
        keys.retain(|key| seen.insert(key.clone()));
        keys
    }

    fn is_managed_scaling_group(&self, obj: &dyn RoutedObject) -> bool {
        obj.kind() == ResourceKind::ScalingGroup
            && self.config.is_managed_with_owner(
                obj.object_labels(),
                obj.object_owners(),
                &[self.config.group_kind.as_str()],
            )
    }

    fn is_managed_member_clique(&self, obj: &dyn RoutedObject) -> bool {
        obj.kind() == ResourceKind::Clique
            && self.config.is_managed_with_owner(
                obj.object_labels(),
                obj.object_owners(),
                &[self.config.scaling_group_kind.as_str()],
            )
    }
}

/// Whether the ready count differs between two Clique states
pub fn ready_replicas_changed(old: &dyn RoutedObject, new: &dyn RoutedObject) -> bool {
    match (old.snapshot(), new.snapshot()) {
        (
            Snapshot::Clique {
                ready_replicas: before,
            },
            Snapshot::Clique {
                ready_replicas: after,
            },
        ) => before != after,
        _ => false,
    }
}
