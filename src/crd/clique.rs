//! Clique Custom Resource Definition
//!
//! A Clique is the leaf of the hierarchy: a set of Pods with a shared role.
//! Its status is derived entirely from the Pods labelled as its members.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, Conditions, ScaleConfig, SpecValidationError};

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "clique.dev",
    version = "v1alpha1",
    kind = "Clique",
    namespaced,
    status = "CliqueStatus",
    shortname = "clq",
    scale = r#"{"specReplicasPath":".spec.replicas","statusReplicasPath":".status.replicas","labelSelectorPath":".status.selector"}"#,
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".status.replicas"}"#,
    printcolumn = r#"{"name":"Ready","type":"integer","jsonPath":".status.readyReplicas"}"#,
    printcolumn = r#"{"name":"Breached","type":"string","jsonPath":".status.conditions[?(@.type=='MinAvailableBreached')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CliqueSpec {
    /// Desired number of Pods
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Minimum number of ready Pods before the clique counts as breached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_available: Option<i32>,

    /// Present when an external autoscaler may scale this clique
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_config: Option<ScaleConfig>,
}

fn default_replicas() -> i32 {
    1
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CliqueStatus {
    /// Set after the first successful status reconciliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Non-terminating Pods
    #[serde(default)]
    pub replicas: i32,

    #[serde(default)]
    pub ready_replicas: i32,

    /// Pods held back from scheduling by a scheduling gate
    #[serde(default)]
    pub schedule_gated_replicas: i32,

    /// Mirrors `replicas` until rollouts are tracked per Pod
    #[serde(default)]
    pub updated_replicas: i32,

    /// Label selector in string form, published for the scale subresource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    #[schemars(with = "Vec<Condition>")]
    pub conditions: Conditions,
}

impl CliqueSpec {
    pub fn validate(&self) -> Result<(), Vec<SpecValidationError>> {
        let mut errors = Vec::new();

        if self.replicas < 0 {
            errors.push(SpecValidationError::new(
                "spec.replicas",
                "replicas must not be negative",
                "Set spec.replicas to 0 or more",
            ));
        }

        if let Some(min) = self.min_available {
            if min < 1 {
                errors.push(SpecValidationError::new(
                    "spec.minAvailable",
                    "minAvailable must be at least 1",
                    "Remove minAvailable or set it to a positive value",
                ));
            } else if min > self.replicas {
                errors.push(SpecValidationError::new(
                    "spec.minAvailable",
                    format!(
                        "minAvailable ({}) exceeds replicas ({})",
                        min, self.replicas
                    ),
                    "Lower minAvailable or raise replicas",
                ));
            }
        }

        if let Some(scale) = &self.scale_config {
            scale.validate("spec.scaleConfig", &mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
