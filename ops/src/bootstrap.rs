//! Resource management for infrastructure setup.
//!
//! Connects the pool, applies migrations and wires the Postgres adapters into
//! the runtime components the CLI drives.

use crate::config::Config;
use std::sync::Arc;
use thiserror::Error;
use ticketflow_core::environment::SystemClock;
use ticketflow_core::event_store::EventStoreError;
use ticketflow_postgres::{PostgresEventBus, PostgresEventStore, PostgresReadModel};
use ticketflow_runtime::metrics::{MetricsError, MetricsServer};
use ticketflow_runtime::{DomainEventStore, TemporalRecovery, WorkflowOrchestrator};
use tracing::info;

/// Failure to bring up a resource.
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// Connecting or migrating the database failed.
    #[error("Database setup failed: {0}")]
    Database(#[from] EventStoreError),

    /// The metrics exporter could not be installed.
    #[error("Metrics setup failed: {0}")]
    Metrics(#[from] MetricsError),
}

/// Everything the ops commands need, built once at startup.
///
/// All handles are cheap to clone and safe to share across tasks.
#[derive(Clone)]
pub struct Resources {
    /// Application configuration
    pub config: Arc<Config>,
    /// Append, read and redispatch over the log
    pub events: DomainEventStore,
    /// Current-state tables
    pub read_model: Arc<PostgresReadModel>,
    /// Command pipeline
    pub orchestrator: WorkflowOrchestrator,
    /// Read model repair
    pub recovery: TemporalRecovery,
}

impl Resources {
    /// Connect to `PostgreSQL`, run migrations and assemble the runtime.
    ///
    /// Installs the Prometheus exporter when `METRICS_ADDR` is configured.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError`] if the database is unreachable, a migration
    /// fails, or the metrics exporter cannot be installed.
    pub async fn from_config(config: Config) -> Result<Self, BootstrapError> {
        if let Some(addr) = config.observability.metrics_addr {
            MetricsServer::new(addr).start()?;
        }

        info!(max_connections = config.database.max_connections, "Connecting to database...");
        let pool =
            ticketflow_postgres::connect(&config.database.url, config.database.max_connections)
                .await?;
        ticketflow_postgres::migrate(&pool).await?;
        info!("Database ready");

        let read_model = Arc::new(PostgresReadModel::from_pool(pool.clone()));
        let events = DomainEventStore::new(
            Arc::new(PostgresEventStore::from_pool(pool.clone())),
            Arc::new(PostgresEventBus::from_pool(pool)),
            Arc::new(SystemClock),
        );
        let orchestrator = WorkflowOrchestrator::new(events.clone(), read_model.clone());
        let recovery = TemporalRecovery::new(events.clone(), read_model.clone());

        Ok(Self {
            config: Arc::new(config),
            events,
            read_model,
            orchestrator,
            recovery,
        })
    }
}
