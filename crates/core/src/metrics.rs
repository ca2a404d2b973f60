//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Conversions (outcomes, duration)
//! - Capability probes

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Conversion Metrics
// =============================================================================

/// Conversions total by outcome.
pub static CONVERSIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("audiograb_conversions_total", "Total conversion requests"),
        &["outcome"], // "completed", "cancelled", "failed", "busy"
    )
    .unwrap()
});

/// Conversion duration in seconds.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "audiograb_conversion_duration_seconds",
            "Duration of conversions from load to finalize",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
        &["outcome"],
    )
    .unwrap()
});

/// Size of produced outputs in bytes.
pub static OUTPUT_BYTES: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("audiograb_output_bytes", "Size of converted outputs")
            .buckets(prometheus::exponential_buckets(16_384.0, 4.0, 8).unwrap()),
        &["format"],
    )
    .unwrap()
});

// =============================================================================
// Capability Metrics
// =============================================================================

/// Encoder capability probes by result.
pub static CAPABILITY_PROBES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "audiograb_capability_probes_total",
            "Encoder capability probes run",
        ),
        &["result"], // "supported", "unsupported"
    )
    .unwrap()
});

/// Returns every collector defined here, for registration with a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(CONVERSIONS.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        Box::new(OUTPUT_BYTES.clone()),
        Box::new(CAPABILITY_PROBES.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_cleanly() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        CONVERSIONS.with_label_values(&["completed"]).inc();
        assert!(!registry.gather().is_empty());
    }
}
