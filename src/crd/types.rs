//! Shared types for the workload hierarchy
//!
//! These types are used across the CRD definitions and controller logic.
//!
//! # Type Hierarchy
//!
//! - [`Condition`] / [`ConditionStatus`] - Kubernetes style status conditions
//! - [`Conditions`] - condition set keyed by condition type
//! - [`ScaleConfig`] - bounds an external autoscaler may scale a resource within
//! - [`SpecValidationError`] - structured validation failure for any spec in this crate

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of a condition
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., "MinAvailableBreached")
    #[serde(rename = "type")]
    pub type_: String,
    /// Status of the condition: "True", "False", or "Unknown"
    pub status: ConditionStatus,
    /// Last time the condition transitioned (RFC 3339)
    pub last_transition_time: String,
    /// Machine-readable reason for the condition
    pub reason: String,
    /// Human-readable message
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    pub fn new(type_: &str, status: ConditionStatus, reason: &str, message: impl Into<String>) -> Self {
        Self {
            type_: type_.to_string(),
            status,
            last_transition_time: chrono::Utc::now().to_rfc3339(),
            reason: reason.to_string(),
            message: message.into(),
            observed_generation: None,
        }
    }

    /// True when status, reason or message differ. Timestamps are ignored.
    pub fn differs_from(&self, other: &Condition) -> bool {
        self.status != other.status || self.reason != other.reason || self.message != other.message
    }
}

/// Condition set keyed by condition type.
///
/// Serialized as the usual Kubernetes condition list so the wire format stays
/// compatible with `kubectl` and other tooling.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Condition>", into = "Vec<Condition>")]
pub struct Conditions(BTreeMap<String, Condition>);

impl Conditions {
    pub fn get(&self, type_: &str) -> Option<&Condition> {
        self.0.get(type_)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.values()
    }

    /// Upsert `condition` if it differs from the stored one.
    ///
    /// Returns whether anything was written. The transition time is only
    /// replaced when the status flips; a reason or message change keeps the
    /// stored timestamp.
    pub fn set(&mut self, condition: Condition) -> bool {
        match self.0.get_mut(&condition.type_) {
            Some(existing) if !existing.differs_from(&condition) => false,
            Some(existing) => {
                if existing.status != condition.status {
                    existing.last_transition_time = condition.last_transition_time;
                }
                existing.status = condition.status;
                existing.reason = condition.reason;
                existing.message = condition.message;
                existing.observed_generation = condition.observed_generation;
                true
            }
            None => {
                self.0.insert(condition.type_.clone(), condition);
                true
            }
        }
    }

    pub fn is_true(&self, type_: &str) -> bool {
        self.get(type_)
            .map(|c| c.status == ConditionStatus::True)
            .unwrap_or(false)
    }
}

impl From<Vec<Condition>> for Conditions {
    fn from(conditions: Vec<Condition>) -> Self {
        // Later entries win, matching how the API server treats duplicate types
        Self(
            conditions
                .into_iter()
                .map(|c| (c.type_.clone(), c))
                .collect(),
        )
    }
}

impl From<Conditions> for Vec<Condition> {
    fn from(conditions: Conditions) -> Self {
        conditions.0.into_values().collect()
    }
}

/// Bounds within which an external autoscaler may scale a resource.
///
/// The operator never acts on these values itself; their presence only
/// causes a scale selector to be published in status.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScaleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,
    pub max_replicas: i32,
}

impl ScaleConfig {
    pub(crate) fn validate(&self, field: &str, errors: &mut Vec<SpecValidationError>) {
        if self.max_replicas < 1 {
            errors.push(SpecValidationError::new(
                format!("{field}.maxReplicas"),
                "maxReplicas must be at least 1",
                "Set maxReplicas to a positive value",
            ));
        }
        if let Some(min) = self.min_replicas {
            if min < 0 {
                errors.push(SpecValidationError::new(
                    format!("{field}.minReplicas"),
                    "minReplicas must not be negative",
                    "Remove minReplicas or set it to 0 or more",
                ));
            } else if min > self.max_replicas {
                errors.push(SpecValidationError::new(
                    format!("{field}.minReplicas"),
                    format!(
                        "minReplicas ({}) is greater than maxReplicas ({})",
                        min, self.max_replicas
                    ),
                    "Lower minReplicas or raise maxReplicas",
                ));
            }
        }
    }
}

/// Structured validation error for the specs in this crate
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecValidationError {
    pub field: String,
    pub message: String,
    pub how_to_fix: String,
}

impl SpecValidationError {
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        how_to_fix: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            how_to_fix: how_to_fix.into(),
        }
    }
}

impl std::fmt::Display for SpecValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.field, self.message, self.how_to_fix)
    }
}

/// Join validation errors into a single message for logs and status
pub fn format_validation_errors(errors: &[SpecValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
