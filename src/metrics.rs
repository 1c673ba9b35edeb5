// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
    increment_counter, Unit,
};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {
    Count,
    Seconds,
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! increment_counter {
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
    increment_counter,
};

use crate::error::Tier;
use once_cell::sync::OnceCell;
use std::time::Duration;

static DESCRIBED: OnceCell<()> = OnceCell::new();

/// Registers descriptions for every repository metric. Safe to call more than once.
pub fn describe_metrics() {
    DESCRIBED.get_or_init(|| {
        describe_counter!(
            "repository_tier_calls_total",
            Unit::Count,
            "Calls issued to a backing tier, labeled by tier and operation."
        );
        describe_counter!(
            "repository_tier_errors_total",
            Unit::Count,
            "Failed tier calls, labeled by tier, operation and kind (error, timeout)."
        );
        describe_histogram!(
            "repository_tier_call_seconds",
            Unit::Seconds,
            "Latency of tier calls, labeled by tier and operation."
        );
        describe_counter!(
            "repository_cache_hits_total",
            Unit::Count,
            "Cache lookups answered from the cache, labeled by cache name."
        );
        describe_counter!(
            "repository_cache_miss_total",
            Unit::Count,
            "Cache lookups that fell through, labeled by cache name."
        );
        describe_gauge!(
            "repository_cache_size",
            "Entries currently held per cache."
        );
        describe_counter!(
            "repository_degraded_total",
            Unit::Count,
            "Resolutions answered with a best-effort result."
        );
        describe_counter!(
            "repository_swaps_recorded_total",
            Unit::Count,
            "Swaps appended to the store, labeled by outcome (new, duplicate)."
        );
    });
}

// --- Helper functions to update metrics ---

pub fn record_tier_call(tier: Tier, op: &'static str, duration: Duration) {
    counter!("repository_tier_calls_total", 1, "tier" => tier.as_str(), "op" => op);
    histogram!(
        "repository_tier_call_seconds",
        duration.as_secs_f64(),
        "tier" => tier.as_str(),
        "op" => op
    );
}

pub fn increment_tier_error(tier: Tier, op: &'static str, kind: &'static str) {
    counter!(
        "repository_tier_errors_total",
        1,
        "tier" => tier.as_str(),
        "op" => op,
        "kind" => kind
    );
}

pub fn increment_cache_hit(cache_name: &'static str) {
    counter!("repository_cache_hits_total", 1, "cache" => cache_name);
}

pub fn increment_cache_miss(cache_name: &'static str) {
    counter!("repository_cache_miss_total", 1, "cache" => cache_name);
}

pub fn set_cache_size(cache_name: &'static str, size: f64) {
    gauge!("repository_cache_size", size, "cache" => cache_name);
}

pub fn increment_degraded(op: &'static str) {
    increment_counter!("repository_degraded_total", "op" => op);
}

pub fn increment_swaps_recorded(outcome: &'static str) {
    counter!("repository_swaps_recorded_total", 1, "outcome" => outcome);
}

/// Installs the Prometheus exporter on `addr` and registers metric descriptions.
#[cfg(feature = "observability")]
pub fn install_prometheus_exporter(addr: std::net::SocketAddr) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();
    Ok(())
}
