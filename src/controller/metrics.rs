//! Prometheus metrics for the clique operator
//!
//! # Exported metrics
//! The `/metrics` endpoint (when built with `--features metrics`) exports the following metrics:
//! - `clique_reconcile_duration_seconds` (histogram): reconcile duration labeled by controller.
//! - `clique_reconcile_errors_total` (counter): reconcile errors labeled by controller and kind.
//! - `clique_routed_events_total` (counter): watch events seen by the ScalingGroup router,
//!   labeled by watched kind and verdict (`admitted` / `rejected`).
//! - `clique_min_available_breached` (gauge): 1 when a Clique reports MinAvailableBreached=True.

use std::sync::atomic::{AtomicI64, AtomicU64};

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReconcileLabels {
    pub controller: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub controller: String,
    pub kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RoutedLabels {
    pub kind: String,
    pub verdict: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CliqueLabels {
    pub namespace: String,
    pub name: String,
}

/// Histogram tracking reconcile duration (seconds)
pub static RECONCILE_DURATION_SECONDS: Lazy<Family<ReconcileLabels, Histogram>> = Lazy::new(|| {
    fn reconcile_histogram() -> Histogram {
        // 1ms .. ~32s across 16 buckets.
        Histogram::new(exponential_buckets(0.001, 2.0, 16))
    }

    Family::new_with_constructor(reconcile_histogram)
});

/// Counter tracking reconcile errors
pub static RECONCILE_ERRORS_TOTAL: Lazy<Family<ErrorLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Counter tracking router verdicts
pub static ROUTED_EVENTS_TOTAL: Lazy<Family<RoutedLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Gauge mirroring the MinAvailableBreached condition per Clique
pub static MIN_AVAILABLE_BREACHED: Lazy<Family<CliqueLabels, Gauge<i64, AtomicI64>>> =
    Lazy::new(Family::default);

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();

    registry.register(
        "clique_reconcile_duration_seconds",
        "Duration of reconcile loops in seconds",
        RECONCILE_DURATION_SECONDS.clone(),
    );
    registry.register(
        "clique_reconcile_errors_total",
        "Total number of reconcile errors",
        RECONCILE_ERRORS_TOTAL.clone(),
    );
    registry.register(
        "clique_routed_events_total",
        "Watch events judged by the ScalingGroup event router",
        ROUTED_EVENTS_TOTAL.clone(),
    );
    registry.register(
        "clique_min_available_breached",
        "Whether the Clique has fewer ready Pods than minAvailable",
        MIN_AVAILABLE_BREACHED.clone(),
    );

    registry
});

/// Observe a reconcile duration in seconds.
pub fn observe_reconcile_duration_seconds(controller: &str, seconds: f64) {
    let labels = ReconcileLabels {
        controller: controller.to_string(),
    };
    RECONCILE_DURATION_SECONDS
        .get_or_create(&labels)
        .observe(seconds);
}

/// Increment the reconcile error counter.
pub fn inc_reconcile_error(controller: &str, kind: &str) {
    let labels = ErrorLabels {
        controller: controller.to_string(),
        kind: kind.to_string(),
    };
    RECONCILE_ERRORS_TOTAL.get_or_create(&labels).inc();
}

/// Count one router verdict for an event on `kind`.
pub fn inc_routed_event(kind: &str, admitted: bool) {
    let labels = RoutedLabels {
        kind: kind.to_string(),
        verdict: if admitted { "admitted" } else { "rejected" }.to_string(),
    };
    ROUTED_EVENTS_TOTAL.get_or_create(&labels).inc();
}

pub fn set_min_available_breached(namespace: &str, name: &str, breached: bool) {
    let labels = CliqueLabels {
        namespace: namespace.to_string(),
        name: name.to_string(),
    };
    MIN_AVAILABLE_BREACHED
        .get_or_create(&labels)
        .set(i64::from(breached));
}

/// Render the registry in the OpenMetrics text format.
pub fn encode_registry() -> Result<String, std::fmt::Error> {
    let mut buffer = String::new();
    prometheus_client::encoding::text::encode(&mut buffer, &REGISTRY)?;
    Ok(buffer)
}
