//! `PostgreSQL` storage for the ticket lifecycle.
//!
//! This crate provides the production implementations of the two storage ports
//! defined in `ticketflow-core`:
//!
//! - [`PostgresEventStore`]: the append-only `domain_events` log, with the
//!   `(aggregate_type, aggregate_id, version)` unique constraint as its
//!   optimistic concurrency check
//! - [`PostgresReadModel`]: the `events` and `guests` current-state tables
//!
//! plus [`PostgresEventBus`], a `LISTEN`/`NOTIFY` dispatch channel.
//!
//! All three share one pool. Schema changes ship as embedded migrations; call
//! [`migrate`] once at startup.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ticketflow_postgres::{PostgresEventStore, PostgresReadModel};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = ticketflow_postgres::connect("postgres://localhost/ticketflow", 10).await?;
//! ticketflow_postgres::migrate(&pool).await?;
//!
//! let event_store = Arc::new(PostgresEventStore::from_pool(pool.clone()));
//! let read_model = Arc::new(PostgresReadModel::from_pool(pool));
//! # Ok(())
//! # }
//! ```

mod event_bus;
mod event_store;
mod read_model;

pub use event_bus::PostgresEventBus;
pub use event_store::PostgresEventStore;
pub use read_model::PostgresReadModel;

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use ticketflow_core::event_store::EventStoreError;

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`EventStoreError::DatabaseError`] if the database is unreachable.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, EventStoreError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
        .map_err(|e| EventStoreError::DatabaseError(format!("Failed to connect: {e}")))
}

/// Apply the embedded migrations (`domain_events`, `events`, `guests`).
///
/// # Errors
///
/// Returns [`EventStoreError::DatabaseError`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), EventStoreError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| EventStoreError::DatabaseError(format!("Migration failed: {e}")))?;
    tracing::info!("Database migrations applied");
    Ok(())
}
