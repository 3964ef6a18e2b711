//! Condition types and reasons published on Clique status

use crate::crd::{Condition, ConditionStatus, Conditions};

/// Ready replicas have fallen below `spec.minAvailable`
pub const CONDITION_TYPE_MIN_AVAILABLE_BREACHED: &str = "MinAvailableBreached";

pub const REASON_MIN_AVAILABLE_NIL: &str = "MinAvailableNil";
pub const REASON_INSUFFICIENT_READY_PODS: &str = "InsufficientReadyPods";
pub const REASON_SUFFICIENT_READY_PODS: &str = "SufficientReadyPods";

/// MinAvailableBreached for the given threshold and ready count
pub fn min_available_breached_condition(min_available: Option<i32>, ready_replicas: i32) -> Condition {
    match min_available {
        None => Condition::new(
            CONDITION_TYPE_MIN_AVAILABLE_BREACHED,
            ConditionStatus::Unknown,
            REASON_MIN_AVAILABLE_NIL,
            "MinAvailable is nil, cannot determine if the condition is breached",
        ),
        Some(min) if ready_replicas < min => Condition::new(
            CONDITION_TYPE_MIN_AVAILABLE_BREACHED,
            ConditionStatus::True,
            REASON_INSUFFICIENT_READY_PODS,
            format!(
                "Insufficient ready pods. expected at least: {}, found: {}",
                min, ready_replicas
            ),
        ),
        Some(min) => Condition::new(
            CONDITION_TYPE_MIN_AVAILABLE_BREACHED,
            ConditionStatus::False,
            REASON_SUFFICIENT_READY_PODS,
            format!(
                "Sufficient ready pods found. expected at least: {}, found: {}",
                min, ready_replicas
            ),
        ),
    }
}

/// Set `condition` only if it differs from what is stored. Returns whether it was written.
pub fn set_condition(conditions: &mut Conditions, condition: Condition) -> bool {
    conditions.set(condition)
}

/// Whether the MinAvailableBreached condition is currently True
pub fn is_min_available_breached(conditions: &Conditions) -> bool {
    conditions.is_true(CONDITION_TYPE_MIN_AVAILABLE_BREACHED)
}
