//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `microcks_operator_reconciliations_total` - Reconciliations by kind
//! - `microcks_operator_reconciliation_errors_total` - Reconciliation errors by kind
//! - `microcks_operator_reconciliation_duration_seconds` - Duration of reconciliations by kind
//! - `microcks_operator_resource_applies_total` - Managed resource writes by kind and change
//! - `microcks_operator_module_ready` - Readiness of each module per instance (1 = ready)
//! - `microcks_operator_remote_operations_total` - Calls to Microcks instance APIs by operation
//! - `microcks_operator_remote_operation_errors_total` - Failed instance API calls by operation
//! - `microcks_operator_remote_operation_duration_seconds` - Duration of instance API calls
//! - `microcks_operator_tests_completed_total` - Completed tests by outcome
//! - `microcks_operator_requeues_total` - Requeues by reason

use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec, IntGaugeVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "microcks_operator_reconciliations_total",
            "Total number of reconciliations",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "microcks_operator_reconciliation_errors_total",
            "Total number of reconciliation errors",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "microcks_operator_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static RESOURCE_APPLIES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "microcks_operator_resource_applies_total",
            "Total number of managed resource writes",
        ),
        &["kind", "change"],
    )
    .expect("Failed to create RESOURCE_APPLIES_TOTAL metric - this should never happen")
});

static MODULE_READY: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        prometheus::Opts::new(
            "microcks_operator_module_ready",
            "Readiness of a module of a Microcks instance (1 = ready)",
        ),
        &["module", "namespace", "instance"],
    )
    .expect("Failed to create MODULE_READY metric - this should never happen")
});

static REMOTE_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "microcks_operator_remote_operations_total",
            "Total number of Microcks instance API calls",
        ),
        &["operation"],
    )
    .expect("Failed to create REMOTE_OPERATIONS_TOTAL metric - this should never happen")
});

static REMOTE_OPERATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "microcks_operator_remote_operation_errors_total",
            "Total number of failed Microcks instance API calls",
        ),
        &["operation"],
    )
    .expect("Failed to create REMOTE_OPERATION_ERRORS_TOTAL metric - this should never happen")
});

static REMOTE_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "microcks_operator_remote_operation_duration_seconds",
            "Duration of Microcks instance API calls in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        &["operation"],
    )
    .expect("Failed to create REMOTE_OPERATION_DURATION metric - this should never happen")
});

static TESTS_COMPLETED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "microcks_operator_tests_completed_total",
            "Total number of completed tests",
        ),
        &["outcome"],
    )
    .expect("Failed to create TESTS_COMPLETED_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "microcks_operator_requeues_total",
            "Total number of requeues",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

/// Register all metrics with the registry
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(RESOURCE_APPLIES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(MODULE_READY.clone()))?;
    REGISTRY.register(Box::new(REMOTE_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REMOTE_OPERATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REMOTE_OPERATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(TESTS_COMPLETED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_reconciliations(kind: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(kind: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[kind])
        .observe(duration);
}

pub fn increment_resource_applies(kind: &str, change: &str) {
    RESOURCE_APPLIES_TOTAL
        .with_label_values(&[kind, change])
        .inc();
}

pub fn set_module_ready(module: &str, namespace: &str, instance: &str, ready: bool) {
    MODULE_READY
        .with_label_values(&[module, namespace, instance])
        .set(i64::from(ready));
}

/// Record an instance API call and its duration
pub fn record_remote_operation(operation: &str, duration: f64, success: bool) {
    REMOTE_OPERATIONS_TOTAL.with_label_values(&[operation]).inc();
    REMOTE_OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(duration);
    if !success {
        REMOTE_OPERATION_ERRORS_TOTAL
            .with_label_values(&[operation])
            .inc();
    }
}

pub fn increment_tests_completed(outcome: &str) {
    TESTS_COMPLETED_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn increment_requeues(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}
