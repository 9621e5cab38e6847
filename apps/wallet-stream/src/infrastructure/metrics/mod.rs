//! Prometheus Metrics Module
//!
//! Exposes wallet stream metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Events**: Counts of ledger events received and dropped by category
//! - **Store**: Upserts and current item count
//! - **Transport**: Transport faults by category and trust
//! - **Notifications**: Debounced "updated" notifications fired
//!
//! # Integration
//!
//! When initialized with a non-zero port, metrics are served at `/metrics`
//! on that port. Recording functions are no-ops until a recorder is
//! installed, so library users who never call [`init_metrics`] pay nothing.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::application::ports::{DropReason, StreamMetrics};
use crate::domain::subscription::StreamCategory;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Errors raised while installing the metrics recorder.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The recorder or exporter could not be built.
    #[error("failed to build Prometheus exporter: {0}")]
    Build(#[from] BuildError),

    /// Another global recorder is already installed.
    #[error("failed to install global metrics recorder: {0}")]
    Install(String),
}

/// Initialize the Prometheus metrics recorder.
///
/// With `port` non-zero, an HTTP exporter serving `/metrics` is spawned on
/// `0.0.0.0:{port}` (requires a Tokio runtime). Calling again returns the
/// existing handle.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built or another global
/// recorder is already installed.
pub fn init_metrics(port: u16) -> Result<PrometheusHandle, MetricsError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let (recorder, exporter) = if port == 0 {
        (PrometheusBuilder::new().build_recorder(), None)
    } else {
        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
            .build()?;
        (recorder, Some(exporter))
    };

    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).map_err(|e| MetricsError::Install(e.to_string()))?;

    if let Some(exporter) = exporter {
        tokio::spawn(async move {
            if let Err(e) = exporter.await {
                tracing::error!(error = ?e, "Metrics exporter stopped");
            }
        });
        tracing::info!(port, "Metrics exporter listening");
    }

    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "wallet_stream_events_received_total",
        "Total ledger events received from the transport"
    );
    describe_counter!(
        "wallet_stream_items_upserted_total",
        "Total display items inserted or replaced"
    );
    describe_counter!(
        "wallet_stream_events_dropped_total",
        "Total ledger events dropped without producing an item"
    );
    describe_counter!(
        "wallet_stream_transport_errors_total",
        "Total transport faults by trust"
    );
    describe_counter!(
        "wallet_stream_notifications_total",
        "Total debounced update notifications fired"
    );
    describe_gauge!(
        "wallet_stream_items",
        "Number of distinct display items held"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a ledger event received from the transport.
pub fn record_event_received(category: StreamCategory) {
    counter!(
        "wallet_stream_events_received_total",
        "category" => category.as_str()
    )
    .increment(1);
}

/// Record an upsert. Only inserts of a new id grow the item gauge.
pub fn record_item_upserted(category: StreamCategory, inserted: bool) {
    counter!(
        "wallet_stream_items_upserted_total",
        "category" => category.as_str()
    )
    .increment(1);
    if inserted {
        gauge!("wallet_stream_items", "category" => category.as_str()).increment(1.0);
    }
}

/// Remove a departed stream's items from the item gauge.
#[allow(clippy::cast_precision_loss)]
pub fn record_items_released(category: StreamCategory, count: usize) {
    if count > 0 {
        gauge!("wallet_stream_items", "category" => category.as_str()).decrement(count as f64);
    }
}

/// Record an event dropped without producing an item.
pub fn record_event_dropped(category: StreamCategory, reason: DropReason) {
    counter!(
        "wallet_stream_events_dropped_total",
        "category" => category.as_str(),
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record a transport fault.
pub fn record_transport_error(category: StreamCategory, trusted: bool) {
    counter!(
        "wallet_stream_transport_errors_total",
        "category" => category.as_str(),
        "trusted" => if trusted { "true" } else { "false" }
    )
    .increment(1);
}

/// Record a fired update notification.
pub fn record_notification() {
    counter!("wallet_stream_notifications_total").increment(1);
}

// =============================================================================
// Metrics Port Adapter
// =============================================================================

/// [`StreamMetrics`] sink writing to the global `metrics` recorder.
///
/// The item gauge sums every live stream in the process, so streams on the
/// same category add up instead of overwriting each other.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetrics;

impl StreamMetrics for PrometheusMetrics {
    fn event_received(&self, category: StreamCategory) {
        record_event_received(category);
    }

    fn item_upserted(&self, category: StreamCategory, inserted: bool) {
        record_item_upserted(category, inserted);
    }

    fn items_released(&self, category: StreamCategory, count: usize) {
        record_items_released(category, count);
    }

    fn event_dropped(&self, category: StreamCategory, reason: DropReason) {
        record_event_dropped(category, reason);
    }

    fn transport_error(&self, category: StreamCategory, trusted: bool) {
        record_transport_error(category, trusted);
    }

    fn notification(&self) {
        record_notification();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use metrics_exporter_prometheus::PrometheusBuilder;

    use super::*;

    fn items_gauge(rendered: &str) -> Option<f64> {
        rendered
            .lines()
            .find(|line| line.starts_with("wallet_stream_items{category=\"payments\"}"))
            .and_then(|line| line.rsplit(' ').next())
            .and_then(|value| value.parse().ok())
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        let metrics = PrometheusMetrics;
        metrics.event_received(StreamCategory::Payments);
        metrics.item_upserted(StreamCategory::Operations, true);
        metrics.items_released(StreamCategory::Operations, 1);
        metrics.event_dropped(StreamCategory::Trades, DropReason::Malformed);
        metrics.transport_error(StreamCategory::Transactions, true);
        metrics.notification();
    }

    #[test]
    fn item_gauge_sums_streams_on_one_category() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            let metrics = PrometheusMetrics;
            // Two streams on the same category, three distinct items between them.
            metrics.item_upserted(StreamCategory::Payments, true);
            metrics.item_upserted(StreamCategory::Payments, true);
            metrics.item_upserted(StreamCategory::Payments, false);
            metrics.item_upserted(StreamCategory::Payments, true);
        });
        assert_eq!(items_gauge(&handle.render()), Some(3.0));

        metrics::with_local_recorder(&recorder, || {
            PrometheusMetrics.items_released(StreamCategory::Payments, 2);
        });
        assert_eq!(items_gauge(&handle.render()), Some(1.0));
    }
}
