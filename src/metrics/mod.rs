//! Prometheus metrics for scrapegate
//!
//! This module provides metrics tracking for:
//! - License server: validations by outcome, monthly usage resets
//! - Dispatcher: dispatches by outcome, worker load probes
//! - Worker: scraper definition loads
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{register_counter, register_counter_vec, Counter, CounterVec, Encoder, TextEncoder};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all scrapegate metrics
struct GateMetrics {
    license_validations: CounterVec,
    usage_resets: Counter,
    dispatches: CounterVec,
    load_probes: CounterVec,
    plugin_loads: CounterVec,
}

/// Global storage; `None` when registration failed
static METRICS: OnceLock<Option<GateMetrics>> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

fn register() -> Result<GateMetrics, prometheus::Error> {
    Ok(GateMetrics {
        license_validations: register_counter_vec!(
            "scrapegate_license_validations_total",
            "License validations by outcome",
            &["outcome"]
        )?,
        usage_resets: register_counter!(
            "scrapegate_license_usage_resets_total",
            "Number of monthly usage resets performed"
        )?,
        dispatches: register_counter_vec!(
            "scrapegate_dispatches_total",
            "Submitted jobs by outcome",
            &["outcome"]
        )?,
        load_probes: register_counter_vec!(
            "scrapegate_load_probes_total",
            "Worker load probes by outcome",
            &["outcome"]
        )?,
        plugin_loads: register_counter_vec!(
            "scrapegate_plugin_loads_total",
            "Scraper definition loads by outcome",
            &["outcome"]
        )?,
    })
}

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; only the first call registers. If
/// registration fails the error is logged and every `record_*` function
/// becomes a no-op.
pub fn init_metrics() -> Result<(), String> {
    let metrics = METRICS.get_or_init(|| match register() {
        Ok(metrics) => {
            tracing::info!("Prometheus metrics initialized successfully");
            Some(metrics)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Metrics initialization failed; metrics disabled");
            None
        }
    });

    match metrics {
        Some(_) => Ok(()),
        None => Err("metrics registration failed".to_string()),
    }
}

fn metrics() -> Option<&'static GateMetrics> {
    METRICS.get().and_then(Option::as_ref)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Text exposition for the `/metrics` endpoint; empty on encoding failure
pub fn gather_metrics() -> String {
    encode_metrics().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to encode metrics");
        String::new()
    })
}

/// Record a license validation (`valid`, `expired`, `quota_exceeded`, ...)
pub fn record_license_validation(outcome: &str) {
    if let Some(m) = metrics() {
        m.license_validations.with_label_values(&[outcome]).inc();
    }
}

/// Record a monthly usage reset
pub fn record_usage_reset() {
    if let Some(m) = metrics() {
        m.usage_resets.inc();
    }
}

/// Record a dispatched job (`success`, `not_authorized`, `no_worker`, ...)
pub fn record_dispatch(outcome: &str) {
    if let Some(m) = metrics() {
        m.dispatches.with_label_values(&[outcome]).inc();
    }
}

/// Record a worker load probe (`ok`, `error`, `unreachable`)
pub fn record_load_probe(outcome: &str) {
    if let Some(m) = metrics() {
        m.load_probes.with_label_values(&[outcome]).inc();
    }
}

/// Record a scraper definition load (`loaded`, `failed`)
pub fn record_plugin_load(outcome: &str) {
    if let Some(m) = metrics() {
        m.plugin_loads.with_label_values(&[outcome]).inc();
    }
}

// ============================================================================
// Tests
// ============================================================================
