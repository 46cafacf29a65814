//! # Internal Metrics Module
//!
//! - **`MetricsBuilder`**: installs the Prometheus recorder and prepares the
//!   metrics server when metrics are enabled.
//! - **`Metrics`**: a cloneable handle with one method per pipeline event.
//!   Without an installed recorder every call is a no-op.
//! - **`MetricsServer`**: (Defined in `server.rs`) serves `/metrics`.

pub mod server;

use crate::config::MetricsConfig;
use crate::internal_metrics::server::MetricsServer;
use anyhow::{Context, Result};
use metrics::{Counter, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// The public API for the metrics system.
#[derive(Clone)]
pub struct Metrics {
    pub events_received_total: Counter,
    pub events_enqueued_total: Counter,
    pub enqueue_failures_total: Counter,
    pub messages_consumed_total: Counter,
    pub messages_malformed_total: Counter,
    pub emergencies_detected_total: Counter,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Registers descriptions and creates handles against the current recorder.
    pub fn new() -> Self {
        metrics::describe_counter!("events_received_total", Unit::Count, "Requests that reached the ingress handler.");
        metrics::describe_counter!("events_rejected_total", Unit::Count, "Ingress requests rejected before publishing, labeled by reason.");
        metrics::describe_counter!("events_enqueued_total", Unit::Count, "Events handed to the broker client.");
        metrics::describe_counter!("enqueue_failures_total", Unit::Count, "Publish attempts the broker client rejected.");
        metrics::describe_counter!("messages_consumed_total", Unit::Count, "Messages taken off the queue by the dispatcher.");
        metrics::describe_counter!("messages_malformed_total", Unit::Count, "Consumed messages that could not be decoded and were dropped.");
        metrics::describe_counter!("emergencies_detected_total", Unit::Count, "Consumed events classified as emergencies.");
        metrics::describe_counter!("notifications_total", Unit::Count, "Alert delivery attempts, labeled by outcome.");
        metrics::describe_gauge!("worker_slots_in_use", Unit::Count, "Units of work currently holding a worker slot.");
        metrics::describe_histogram!("notification_duration_seconds", Unit::Seconds, "Time spent in the notification transport per alert.");

        Self {
            events_received_total: metrics::counter!("events_received_total"),
            events_enqueued_total: metrics::counter!("events_enqueued_total"),
            enqueue_failures_total: metrics::counter!("enqueue_failures_total"),
            messages_consumed_total: metrics::counter!("messages_consumed_total"),
            messages_malformed_total: metrics::counter!("messages_malformed_total"),
            emergencies_detected_total: metrics::counter!("emergencies_detected_total"),
        }
    }

    /// Counts an ingress request rejected for `reason`.
    pub fn increment_rejected(&self, reason: &'static str) {
        metrics::counter!("events_rejected_total", "reason" => reason).increment(1);
    }

    /// Counts a notification attempt with its outcome ("sent" or "failed").
    pub fn increment_notification(&self, outcome: &'static str) {
        metrics::counter!("notifications_total", "outcome" => outcome).increment(1);
    }

    pub fn set_worker_slots_in_use(&self, in_use: usize) {
        metrics::gauge!("worker_slots_in_use").set(in_use as f64);
    }
}

/// Builder for the metrics system.
pub struct MetricsBuilder {
    config: MetricsConfig,
}

impl MetricsBuilder {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Installs the global Prometheus recorder and binds the metrics listener.
    ///
    /// Returns `None` for the server when metrics are disabled.
    pub async fn build(
        self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<(Metrics, Option<(MetricsServer, SocketAddr)>)> {
        if !self.config.enabled {
            return Ok((Metrics::new(), None));
        }

        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
            )
            .context("Invalid histogram buckets")?
            .build_recorder();
        let handle = recorder.handle();

        let listener = TcpListener::bind(self.config.listen_address)
            .await
            .with_context(|| {
                format!(
                    "Failed to bind metrics server to {}",
                    self.config.listen_address
                )
            })?;
        let addr = listener.local_addr()?;

        metrics::set_global_recorder(recorder)
            .map_err(|e| anyhow::anyhow!("Failed to install metrics recorder: {}", e))?;

        // Handles must be created after the recorder is installed.
        let metrics = Metrics::new();
        let server = MetricsServer::new(listener, handle, shutdown_rx);
        Ok((metrics, Some((server, addr))))
    }
}
