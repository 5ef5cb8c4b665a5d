//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the lifecycle runtime:
//! - Workflow commands (outcome and latency)
//! - Event store appends and loads
//! - Dispatch publishes and failures
//! - Read model projection failures
//! - Temporal recovery checks and repairs
//! - Retries
//!
//! # Example
//!
//! ```rust,no_run
//! use ticketflow_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Serve metrics on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Installs the global recorder and exposes it on an HTTP endpoint for
/// Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the recorder and spawn the HTTP listener.
    ///
    /// Must be called from inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this logs a
    /// warning and leaves the existing recorder in place.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        match metrics::set_global_recorder(recorder) {
            Ok(()) => {
                tokio::spawn(async move {
                    if exporter.await.is_err() {
                        tracing::error!("Metrics exporter stopped");
                    }
                });
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics server started - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(_) => {
                tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                Ok(())
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Workflow
    describe_counter!(
        "workflow_commands_total",
        "Total number of workflow commands by command name and outcome"
    );
    describe_histogram!(
        "workflow_command_duration_seconds",
        "Time taken to execute a workflow command"
    );

    // Event store
    describe_counter!(
        "event_store_events_appended_total",
        "Total number of domain events appended"
    );
    describe_counter!(
        "event_store_events_loaded_total",
        "Total number of domain events loaded"
    );
    describe_counter!(
        "event_store_conflicts_total",
        "Total number of appends rejected by optimistic concurrency"
    );
    describe_histogram!(
        "event_store_append_duration_seconds",
        "Time taken to append a domain event"
    );

    // Dispatch
    describe_counter!(
        "event_bus_messages_published_total",
        "Total number of messages dispatched"
    );
    describe_counter!(
        "event_bus_publish_errors_total",
        "Total number of dispatch failures (events stay appended)"
    );
    describe_histogram!(
        "event_bus_publish_duration_seconds",
        "Time taken to dispatch a message"
    );

    // Read model
    describe_counter!(
        "read_model_projection_failures_total",
        "Total number of read model writes that failed after a successful append"
    );

    // Recovery
    describe_counter!(
        "recovery_entities_checked_total",
        "Total number of aggregates reconciled"
    );
    describe_counter!(
        "recovery_repairs_total",
        "Total number of read model rows repaired"
    );
    describe_counter!(
        "recovery_failures_total",
        "Total number of aggregates that could not be reconciled"
    );

    // Retry
    describe_counter!("retry_attempts_total", "Total number of retry attempts");
    describe_counter!("retry_successes_total", "Total number of successful retries");
    describe_counter!(
        "retry_exhausted_total",
        "Total number of retry attempts that exhausted max retries"
    );
}

/// Workflow metrics recorder.
pub struct WorkflowMetrics;

impl WorkflowMetrics {
    /// Record a finished command.
    pub fn record_command(command: &'static str, outcome: &'static str, duration: Duration) {
        counter!("workflow_commands_total", "command" => command, "outcome" => outcome)
            .increment(1);
        histogram!("workflow_command_duration_seconds", "command" => command)
            .record(duration.as_secs_f64());
    }

    /// Record a read model write that failed after the append succeeded.
    pub fn record_projection_failure(aggregate_type: &'static str) {
        counter!("read_model_projection_failures_total", "aggregate_type" => aggregate_type)
            .increment(1);
    }
}

/// Event store metrics recorder.
pub struct EventStoreMetrics;

impl EventStoreMetrics {
    /// Record an append.
    pub fn record_append(event_type: &'static str, duration: Duration) {
        counter!("event_store_events_appended_total", "event_type" => event_type).increment(1);
        histogram!("event_store_append_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a load.
    pub fn record_load(count: usize) {
        counter!("event_store_events_loaded_total").increment(count as u64);
    }

    /// Record an append that lost a version race.
    pub fn record_conflict(aggregate_type: &'static str) {
        counter!("event_store_conflicts_total", "aggregate_type" => aggregate_type).increment(1);
    }
}

/// Dispatch metrics recorder.
pub struct EventBusMetrics;

impl EventBusMetrics {
    /// Record a message publish.
    pub fn record_publish(duration: Duration) {
        counter!("event_bus_messages_published_total").increment(1);
        histogram!("event_bus_publish_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a publish error.
    pub fn record_publish_error(event_type: &'static str) {
        counter!("event_bus_publish_errors_total", "event_type" => event_type).increment(1);
    }
}

/// Temporal recovery metrics recorder.
pub struct RecoveryMetrics;

impl RecoveryMetrics {
    /// Record an aggregate checked.
    pub fn record_checked(aggregate_type: &'static str) {
        counter!("recovery_entities_checked_total", "aggregate_type" => aggregate_type)
            .increment(1);
    }

    /// Record a repaired row.
    pub fn record_repair(aggregate_type: &'static str) {
        counter!("recovery_repairs_total", "aggregate_type" => aggregate_type).increment(1);
    }

    /// Record an aggregate that could not be reconciled.
    pub fn record_failure(aggregate_type: &'static str) {
        counter!("recovery_failures_total", "aggregate_type" => aggregate_type).increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}
