//! ScalingGroup Custom Resource Definition
//!
//! One ScalingGroup exists per Group replica and scaling group template. It
//! is the scale target external autoscalers act on.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ScaleConfig, SpecValidationError};

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "clique.dev",
    version = "v1alpha1",
    kind = "ScalingGroup",
    namespaced,
    status = "ScalingGroupStatus",
    shortname = "sg",
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Breached","type":"integer","jsonPath":".status.breachedCliques"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ScalingGroupSpec {
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clique_names: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_config: Option<ScaleConfig>,
}

fn default_replicas() -> i32 {
    1
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScalingGroupStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Cliques currently labelled as members of this scaling group
    #[serde(default)]
    pub member_cliques: i32,

    /// Members whose MinAvailableBreached condition is True
    #[serde(default)]
    pub breached_cliques: i32,
}

impl ScalingGroupSpec {
    pub fn validate(&self) -> Result<(), Vec<SpecValidationError>> {
        let mut errors = Vec::new();

        if self.replicas < 0 {
            errors.push(SpecValidationError::new(
                "spec.replicas",
                "replicas must not be negative",
                "Set spec.replicas to 0 or more",
            ));
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
