/*!
Observability infrastructure for the fragments system.

This module provides:
- Structured logging setup through `tracing-subscriber`
- Prometheus metrics for storage operations and conversions (`metrics` feature)
*/

#[cfg(feature = "metrics")]
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
use tracing::subscriber::set_global_default;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{FragmentsError, Result};

/// Global metrics instance
#[cfg(feature = "metrics")]
static METRICS: OnceLock<FragmentsMetrics> = OnceLock::new();

/// Metrics collection for fragment operations
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct FragmentsMetrics {
    /// Storage façade calls, labelled by backend and operation
    pub storage_operations_total: IntCounterVec,
    pub storage_errors_total: IntCounterVec,

    /// Successful conversions, labelled by source and target mime type
    pub conversions_total: IntCounterVec,
    pub unsupported_conversions_total: IntCounter,

    /// Size of payloads written
    pub payload_size_bytes: Histogram,

    // Prometheus registry for scraping
    registry: Registry,
}

#[cfg(feature = "metrics")]
impl FragmentsMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let storage_operations_total = IntCounterVec::new(
            Opts::new(
                "fragments_storage_operations_total",
                "Total storage operations performed",
            ),
            &["backend", "operation"],
        )
        .map_err(metric_error)?;

        let storage_errors_total = IntCounterVec::new(
            Opts::new(
                "fragments_storage_errors_total",
                "Total storage operations that failed",
            ),
            &["backend", "operation"],
        )
        .map_err(metric_error)?;

        let conversions_total = IntCounterVec::new(
            Opts::new("fragments_conversions_total", "Total successful conversions"),
            &["from", "to"],
        )
        .map_err(metric_error)?;

        let unsupported_conversions_total = IntCounter::new(
            "fragments_unsupported_conversions_total",
            "Total conversion requests with no supported path",
        )
        .map_err(metric_error)?;

        let payload_size_bytes = Histogram::with_opts(
            HistogramOpts::new("fragments_payload_size_bytes", "Size of written payloads in bytes")
                .buckets(prometheus::exponential_buckets(64.0, 4.0, 10).map_err(metric_error)?),
        )
        .map_err(metric_error)?;

        registry
            .register(Box::new(storage_operations_total.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(storage_errors_total.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(conversions_total.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(unsupported_conversions_total.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(payload_size_bytes.clone()))
            .map_err(metric_error)?;

        Ok(Self {
            storage_operations_total,
            storage_errors_total,
            conversions_total,
            unsupported_conversions_total,
            payload_size_bytes,
            registry,
        })
    }

    /// Get or initialize global metrics instance
    pub fn global() -> &'static FragmentsMetrics {
        METRICS.get_or_init(|| Self::new().expect("Failed to initialize fragments metrics"))
    }

    pub fn record_storage_op(&self, backend: &str, operation: &str) {
        self.storage_operations_total
            .with_label_values(&[backend, operation])
            .inc();
    }

    pub fn record_storage_error(&self, backend: &str, operation: &str) {
        self.storage_errors_total
            .with_label_values(&[backend, operation])
            .inc();
    }

    pub fn record_conversion(&self, from: &str, to: &str) {
        self.conversions_total.with_label_values(&[from, to]).inc();
    }

    pub fn record_unsupported_conversion(&self) {
        self.unsupported_conversions_total.inc();
    }

    pub fn record_payload_size(&self, size_bytes: usize) {
        self.payload_size_bytes.observe(size_bytes as f64);
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| FragmentsError::storage(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer).map_err(|e| {
            FragmentsError::storage(format!("Failed to convert metrics to string: {e}"))
        })
    }
}

#[cfg(feature = "metrics")]
fn metric_error(e: prometheus::Error) -> FragmentsError {
    FragmentsError::storage(format!("Failed to set up metrics: {e}"))
}

/// Initialize the global logging system
///
/// Events go to stderr. `RUST_LOG` takes precedence; otherwise both the core
/// library and the `fragments` binary log at `level`.
///
/// # Arguments
/// * `json` - Emit one JSON object per event instead of human-readable lines
/// * `level` - Default verbosity when `RUST_LOG` is unset
pub fn init_observability(json: bool, level: Level) -> Result<()> {
    #[cfg(feature = "metrics")]
    FragmentsMetrics::global();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fragments_core={level},fragments={level}")));
    let registry = TracingRegistry::default().with(filter);

    let installed = if json {
        set_global_default(
            registry.with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_current_span(false),
            ),
        )
    } else {
        set_global_default(
            registry.with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            ),
        )
    };
    installed.map_err(|e| {
        FragmentsError::storage(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::debug!("Fragments observability initialized");
    Ok(())
}

/// Initialize logging with default settings
pub fn init_default_observability() -> Result<()> {
    init_observability(false, Level::INFO)
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording_and_gathering() {
        let metrics = FragmentsMetrics::global();
        metrics.record_storage_op("memory", "write_fragment");
        metrics.record_storage_error("memory", "delete_fragment");
        metrics.record_conversion("text/markdown", "text/html");
        metrics.record_unsupported_conversion();
        metrics.record_payload_size(1024);

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("fragments_storage_operations_total"));
        assert!(text.contains("fragments_conversions_total"));
    }
}
