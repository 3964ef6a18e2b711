//! Management labels and ownership checks
//!
//! Every resource created for a Group carries the same management label and
//! a single owner reference. Objects that miss either are left alone by
//! every controller in this crate.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

use crate::crd::{Clique, Group, ScalingGroup};

pub const LABEL_MANAGED_BY_KEY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_MANAGED_BY_VALUE: &str = "clique-operator";
pub const LABEL_PART_OF_KEY: &str = "app.kubernetes.io/part-of";
pub const LABEL_CLIQUE_KEY: &str = "clique.dev/clique";
pub const LABEL_SCALING_GROUP_KEY: &str = "clique.dev/scaling-group";

/// Label keys, the managed-by value and owner kinds shared with whatever
/// creates Groups, ScalingGroups, Cliques and Pods.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagementConfig {
    pub managed_by_key: String,
    pub managed_by_value: String,
    pub part_of_key: String,
    pub clique_key: String,
    pub scaling_group_key: String,
    pub group_kind: String,
    pub scaling_group_kind: String,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            managed_by_key: LABEL_MANAGED_BY_KEY.to_string(),
            managed_by_value: LABEL_MANAGED_BY_VALUE.to_string(),
            part_of_key: LABEL_PART_OF_KEY.to_string(),
            clique_key: LABEL_CLIQUE_KEY.to_string(),
            scaling_group_key: LABEL_SCALING_GROUP_KEY.to_string(),
            group_kind: Group::kind(&()).to_string(),
            scaling_group_kind: ScalingGroup::kind(&()).to_string(),
        }
    }
}

impl ManagementConfig {
    /// Override the managed-by value, e.g. when several operators share a cluster
    pub fn with_managed_by(mut self, value: impl Into<String>) -> Self {
        self.managed_by_value = value.into();
        self
    }

    /// Whether the labels carry the management label with the expected value
    pub fn is_managed(&self, labels: &BTreeMap<String, String>) -> bool {
        labels
            .get(&self.managed_by_key)
            .map(|v| *v == self.managed_by_value)
            .unwrap_or(false)
    }

    /// Managed label plus exactly one owner of one of `owner_kinds`
    pub fn is_managed_with_owner(
        &self,
        labels: &BTreeMap<String, String>,
        owners: &[OwnerReference],
        owner_kinds: &[&str],
    ) -> bool {
        self.is_managed(labels)
            && owner_kinds
                .iter()
                .any(|kind| has_expected_owner(kind, owners))
    }

    /// Labels every resource belonging to `group_name` carries
    pub fn default_labels(&self, group_name: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (self.managed_by_key.clone(), self.managed_by_value.clone()),
            (self.part_of_key.clone(), group_name.to_string()),
        ])
    }

    /// Labels selecting the Pods of one Clique
    pub fn clique_pod_labels(&self, group_name: &str, clique_name: &str) -> BTreeMap<String, String> {
        let mut labels = self.default_labels(group_name);
        labels.insert(self.clique_key.clone(), clique_name.to_string());
        labels
    }

    /// Name of the Group a resource belongs to
    pub fn group_name<'a>(&self, labels: &'a BTreeMap<String, String>) -> Option<&'a str> {
        non_empty(labels.get(&self.part_of_key))
    }

    /// Scaling group a Clique is a member of
    pub fn scaling_group_of<'a>(&self, labels: &'a BTreeMap<String, String>) -> Option<&'a str> {
        non_empty(labels.get(&self.scaling_group_key))
    }

    /// Clique a Pod belongs to
    pub fn clique_of<'a>(&self, labels: &'a BTreeMap<String, String>) -> Option<&'a str> {
        non_empty(labels.get(&self.clique_key))
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

/// Exactly one owner reference, of the expected kind.
pub fn has_expected_owner(expected_kind: &str, owners: &[OwnerReference]) -> bool {
    match owners {
        [owner] => owner.kind == expected_kind,
        _ => false,
    }
}

/// Managed Clique owned by one of `owner_kinds`
pub fn is_managed_clique(config: &ManagementConfig, clique: &Clique, owner_kinds: &[&str]) -> bool {
    config.is_managed_with_owner(clique.labels(), clique.owner_references(), owner_kinds)
}
