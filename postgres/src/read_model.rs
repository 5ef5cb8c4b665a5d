//! `PostgreSQL` implementation of [`ReadModel`].
//!
//! Event rows live in `events`, ticket rows in `guests` (one row per guest
//! registration). Both carry `status`, `updated_at` and a nullable
//! `recovered_at` that temporal recovery stamps when it rewrites a status.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use ticketflow_core::definitions::{EventStatus, TicketStatus};
use ticketflow_core::projection::{
    EventRecord, ProjectionError, ProjectionFuture, ReadModel, StatusChange, TicketRecord,
};
use ticketflow_core::stream::{AggregateId, AggregateRef};

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    status: String,
    updated_at: DateTime<Utc>,
    recovered_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct GuestRow {
    id: String,
    event_id: String,
    status: String,
    updated_at: DateTime<Utc>,
    recovered_at: Option<DateTime<Utc>>,
}

fn parse_status<S: FromStr>(raw: &str) -> Result<S, ProjectionError>
where
    S::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e: S::Err| ProjectionError::Serialization(e.to_string()))
}

fn storage_error(context: &str, e: &sqlx::Error) -> ProjectionError {
    ProjectionError::Storage(format!("{context}: {e}"))
}

/// `PostgreSQL`-backed current-state tables.
#[derive(Clone)]
pub struct PostgresReadModel {
    pool: PgPool,
}

impl PostgresReadModel {
    /// Create a read model over an existing connection pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create an Event row, or reset an existing one to `status`.
    ///
    /// Used by the event creation flow and by tests; the workflow core itself
    /// never creates rows.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the write fails.
    pub async fn upsert_event(
        &self,
        id: &AggregateId,
        status: EventStatus,
    ) -> Result<(), ProjectionError> {
        sqlx::query(
            r"
            INSERT INTO events (id, status, updated_at) VALUES ($1, $2, now())
            ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, updated_at = now()
            ",
        )
        .bind(id.as_str())
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to upsert event", &e))?;
        Ok(())
    }

    /// Create a guest (Ticket) row, or reset an existing one to `status`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the write fails, including when
    /// the parent event row is missing.
    pub async fn upsert_ticket(
        &self,
        id: &AggregateId,
        event_id: &AggregateId,
        status: TicketStatus,
    ) -> Result<(), ProjectionError> {
        sqlx::query(
            r"
            INSERT INTO guests (id, event_id, status, updated_at) VALUES ($1, $2, $3, now())
            ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, updated_at = now()
            ",
        )
        .bind(id.as_str())
        .bind(event_id.as_str())
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to upsert guest", &e))?;
        Ok(())
    }

    async fn update_status(
        &self,
        table: &'static str,
        aggregate: AggregateRef,
        status: &'static str,
        change: StatusChange,
    ) -> Result<(), ProjectionError> {
        let query = format!(
            "UPDATE {table}
             SET status = $2,
                 updated_at = $3,
                 recovered_at = CASE WHEN $4 THEN $3 ELSE recovered_at END
             WHERE id = $1"
        );
        let result = sqlx::query(&query)
            .bind(aggregate.aggregate_id.as_str())
            .bind(status)
            .bind(change.at)
            .bind(change.is_recovery())
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to update status", &e))?;

        if result.rows_affected() == 0 {
            return Err(ProjectionError::NotFound(aggregate));
        }
        tracing::debug!(aggregate = %aggregate, status, recovery = change.is_recovery(), "Status projected");
        Ok(())
    }
}

impl ReadModel for PostgresReadModel {
    fn load_event(&self, id: AggregateId) -> ProjectionFuture<'_, Option<EventRecord>> {
        Box::pin(async move {
            let row: Option<EventRow> = sqlx::query_as(
                "SELECT id, status, updated_at, recovered_at FROM events WHERE id = $1",
            )
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to load event", &e))?;

            row.map(|row| {
                Ok(EventRecord {
                    id: AggregateId::new(row.id),
                    status: parse_status(&row.status)?,
                    updated_at: row.updated_at,
                    recovered_at: row.recovered_at,
                })
            })
            .transpose()
        })
    }

    fn load_ticket(&self, id: AggregateId) -> ProjectionFuture<'_, Option<TicketRecord>> {
        Box::pin(async move {
            let row: Option<GuestRow> = sqlx::query_as(
                "SELECT id, event_id, status, updated_at, recovered_at FROM guests WHERE id = $1",
            )
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to load guest", &e))?;

            row.map(|row| {
                Ok(TicketRecord {
                    id: AggregateId::new(row.id),
                    event_id: AggregateId::new(row.event_id),
                    status: parse_status(&row.status)?,
                    updated_at: row.updated_at,
                    recovered_at: row.recovered_at,
                })
            })
            .transpose()
        })
    }

    fn set_event_status(
        &self,
        id: AggregateId,
        status: EventStatus,
        change: StatusChange,
    ) -> ProjectionFuture<'_, ()> {
        Box::pin(async move {
            self.update_status("events", AggregateRef::event(id), status.as_str(), change)
                .await
        })
    }

    fn set_ticket_status(
        &self,
        id: AggregateId,
        status: TicketStatus,
        change: StatusChange,
    ) -> ProjectionFuture<'_, ()> {
        Box::pin(async move {
            self.update_status("guests", AggregateRef::ticket(id), status.as_str(), change)
                .await
        })
    }
}
