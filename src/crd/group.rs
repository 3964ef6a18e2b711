//! Group Custom Resource Definition
//!
//! A Group is the top of the workload hierarchy. It declares how many
//! replicas of the whole workload exist and which scaling groups each
//! replica is made of. ScalingGroups are linked to their Group purely by
//! name, see [`scaling_group_name`].

use std::collections::HashSet;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ScaleConfig, SpecValidationError};

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "clique.dev",
    version = "v1alpha1",
    kind = "Group",
    namespaced,
    shortname = "grp",
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GroupSpec {
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    #[serde(default)]
    pub template: GroupTemplate,
}

fn default_replicas() -> i32 {
    1
}

/// Template stamped out once per Group replica
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupTemplate {
    /// Names of the Cliques every replica contains
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cliques: Vec<String>,

    /// Scaling group templates; one ScalingGroup is created per replica and entry
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scaling_group_configs: Vec<ScalingGroupConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScalingGroupConfig {
    pub name: String,

    /// Cliques from the template that scale together in this group
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clique_names: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_config: Option<ScaleConfig>,
}

/// Deterministic ScalingGroup name for one Group replica and template.
pub fn scaling_group_name(group_name: &str, replica: i32, template_name: &str) -> String {
    format!("{group_name}-{replica}-{template_name}")
}

/// Names of every ScalingGroup of a Group, replica-major.
pub fn scaling_group_names(group_name: &str, replicas: i32, templates: &[&str]) -> Vec<String> {
    (0..replicas.max(0))
        .flat_map(|replica| {
            templates
                .iter()
                .map(move |template| scaling_group_name(group_name, replica, template))
        })
        .collect()
}

impl GroupSpec {
    /// Validate replica count and scaling group templates
    pub fn validate(&self) -> Result<(), Vec<SpecValidationError>> {
        let mut errors = Vec::new();

        if self.replicas < 0 {
            errors.push(SpecValidationError::new(
                "spec.replicas",
                "replicas must not be negative",
                "Set spec.replicas to 0 or more",
            ));
        }

        let mut seen = HashSet::new();
        for (i, config) in self.template.scaling_group_configs.iter().enumerate() {
            let field = format!("spec.template.scalingGroupConfigs[{i}]");
            if config.name.trim().is_empty() {
                errors.push(SpecValidationError::new(
                    format!("{field}.name"),
                    "scaling group name must not be empty",
                    "Give every scaling group template a name",
                ));
            } else if !seen.insert(config.name.as_str()) {
                errors.push(SpecValidationError::new(
                    format!("{field}.name"),
                    format!("duplicate scaling group name '{}'", config.name),
                    "Use a unique name per scaling group template",
                ));
            }

            for clique in &config.clique_names {
                if !self.template.cliques.contains(clique) {
                    errors.push(SpecValidationError::new(
                        format!("{field}.cliqueNames"),
                        format!("clique '{clique}' is not declared in spec.template.cliques"),
                        "Declare the clique in the template or remove it from the scaling group",
                    ));
                }
            }

            if let Some(scale) = &config.scale_config {
                scale.validate(&format!("{field}.scaleConfig"), &mut errors);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
