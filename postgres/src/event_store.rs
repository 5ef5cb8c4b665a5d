//! `PostgreSQL` implementation of [`EventStore`].
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE domain_events (
//!     position BIGSERIAL PRIMARY KEY,
//!     id UUID NOT NULL UNIQUE,
//!     aggregate_type TEXT NOT NULL,
//!     aggregate_id TEXT NOT NULL,
//!     version BIGINT NOT NULL,
//!     event_type TEXT NOT NULL,
//!     payload JSONB NOT NULL,
//!     metadata JSONB NOT NULL,
//!     correlation_id TEXT NOT NULL,
//!     occurred_at TIMESTAMPTZ NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     UNIQUE (aggregate_type, aggregate_id, version)
//! );
//! ```
//!
//! The unique constraint is the optimistic concurrency check: a second writer
//! claiming the same version gets SQLSTATE 23505, reported as
//! [`EventStoreError::ConcurrencyConflict`].

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use sqlx::PgPool;
use ticketflow_core::envelope::{DomainEventEnvelope, EventMetadata};
use ticketflow_core::event::{DomainEvent, DomainEventKind};
use ticketflow_core::event_store::{EventStore, EventStoreError, StoreFuture};
use ticketflow_core::stream::{AggregateId, AggregateRef, AggregateType, Version};
use uuid::Uuid;

const SELECT_ENVELOPE: &str = r"
    SELECT id, aggregate_type, aggregate_id, version, event_type, payload, metadata, created_at
    FROM domain_events
";

#[derive(sqlx::FromRow)]
struct EnvelopeRow {
    id: Uuid,
    aggregate_type: String,
    aggregate_id: String,
    version: i64,
    event_type: String,
    payload: Value,
    metadata: Value,
    created_at: DateTime<Utc>,
}

impl EnvelopeRow {
    fn into_envelope(self) -> Result<DomainEventEnvelope, EventStoreError> {
        let aggregate_type: AggregateType = self
            .aggregate_type
            .parse()
            .map_err(|e| EventStoreError::SerializationError(format!("{e}")))?;
        let version = u64::try_from(self.version).map_err(|_| {
            EventStoreError::SerializationError(format!("Negative version {}", self.version))
        })?;
        let event: DomainEvent =
            serde_json::from_value(json!({ "type": self.event_type, "payload": self.payload }))
                .map_err(|e| {
                    EventStoreError::SerializationError(format!(
                        "Failed to decode {} payload: {e}",
                        self.event_type
                    ))
                })?;
        let mut metadata: EventMetadata = serde_json::from_value(self.metadata)
            .map_err(|e| EventStoreError::SerializationError(format!("Failed to decode metadata: {e}")))?;
        metadata.created_at = Some(self.created_at);

        Ok(DomainEventEnvelope {
            id: self.id,
            aggregate_type,
            aggregate_id: AggregateId::new(self.aggregate_id),
            version: Version::new(version),
            event,
            metadata,
        })
    }
}

fn decode_rows(rows: Vec<EnvelopeRow>) -> Result<Vec<DomainEventEnvelope>, EventStoreError> {
    rows.into_iter().map(EnvelopeRow::into_envelope).collect()
}

fn db_version(version: Version) -> Result<i64, EventStoreError> {
    i64::try_from(version.value())
        .map_err(|_| EventStoreError::DatabaseError(format!("Version {version} out of range")))
}

fn database_error(e: &sqlx::Error) -> EventStoreError {
    EventStoreError::DatabaseError(e.to_string())
}

/// `PostgreSQL`-backed domain event log.
///
/// # Example
///
/// ```no_run
/// use ticketflow_postgres::PostgresEventStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = ticketflow_postgres::connect("postgres://localhost/ticketflow", 10).await?;
/// ticketflow_postgres::migrate(&pool).await?;
/// let store = PostgresEventStore::from_pool(pool);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Create an event store over an existing connection pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl EventStore for PostgresEventStore {
    fn current_version(&self, aggregate: AggregateRef) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            let (max,): (Option<i64>,) = sqlx::query_as(
                "SELECT MAX(version) FROM domain_events WHERE aggregate_type = $1 AND aggregate_id = $2",
            )
            .bind(aggregate.aggregate_type.as_str())
            .bind(aggregate.aggregate_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| database_error(&e))?;

            let value = u64::try_from(max.unwrap_or(0)).map_err(|_| {
                EventStoreError::DatabaseError(format!("Negative version stored for {aggregate}"))
            })?;
            Ok(Version::new(value))
        })
    }

    fn insert(&self, envelope: DomainEventEnvelope) -> StoreFuture<'_, DomainEventEnvelope> {
        Box::pin(async move {
            let mut body = serde_json::to_value(&envelope.event)
                .map_err(|e| EventStoreError::SerializationError(e.to_string()))?;
            let payload = body
                .get_mut("payload")
                .map(Value::take)
                .unwrap_or_else(|| json!({}));
            let metadata = serde_json::to_value(&envelope.metadata)
                .map_err(|e| EventStoreError::SerializationError(e.to_string()))?;

            let result: Result<(DateTime<Utc>,), sqlx::Error> = sqlx::query_as(
                r"
                INSERT INTO domain_events (
                    id, aggregate_type, aggregate_id, version, event_type,
                    payload, metadata, correlation_id, occurred_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING created_at
                ",
            )
            .bind(envelope.id)
            .bind(envelope.aggregate_type.as_str())
            .bind(envelope.aggregate_id.as_str())
            .bind(db_version(envelope.version)?)
            .bind(envelope.event_type())
            .bind(payload)
            .bind(metadata)
            .bind(&envelope.metadata.correlation_id)
            .bind(envelope.metadata.occurred_at)
            .fetch_one(&self.pool)
            .await;

            match result {
                Ok((created_at,)) => {
                    let mut stored = envelope;
                    stored.metadata.created_at = Some(created_at);
                    Ok(stored)
                }
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    tracing::debug!(
                        aggregate = %envelope.aggregate(),
                        version = %envelope.version,
                        constraint = ?db.constraint(),
                        "Version already taken"
                    );
                    Err(EventStoreError::ConcurrencyConflict {
                        aggregate: envelope.aggregate(),
                        version: envelope.version,
                    })
                }
                Err(e) => Err(database_error(&e)),
            }
        })
    }

    fn load_stream(
        &self,
        aggregate: AggregateRef,
        after: Version,
    ) -> StoreFuture<'_, Vec<DomainEventEnvelope>> {
        Box::pin(async move {
            let query = format!(
                "{SELECT_ENVELOPE} WHERE aggregate_type = $1 AND aggregate_id = $2 AND version > $3 ORDER BY version ASC"
            );
            let rows: Vec<EnvelopeRow> = sqlx::query_as(&query)
                .bind(aggregate.aggregate_type.as_str())
                .bind(aggregate.aggregate_id.as_str())
                .bind(db_version(after)?)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| database_error(&e))?;
            decode_rows(rows)
        })
    }

    fn load_by_correlation(
        &self,
        correlation_id: String,
    ) -> StoreFuture<'_, Vec<DomainEventEnvelope>> {
        Box::pin(async move {
            let query = format!(
                "{SELECT_ENVELOPE} WHERE correlation_id = $1 ORDER BY occurred_at ASC, position ASC"
            );
            let rows: Vec<EnvelopeRow> = sqlx::query_as(&query)
                .bind(&correlation_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| database_error(&e))?;
            decode_rows(rows)
        })
    }

    fn load_recent(
        &self,
        limit: usize,
        kinds: Vec<DomainEventKind>,
    ) -> StoreFuture<'_, Vec<DomainEventEnvelope>> {
        Box::pin(async move {
            let kinds: Vec<String> = kinds.iter().map(|kind| kind.as_str().to_string()).collect();
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let query = format!(
                "{SELECT_ENVELOPE} WHERE cardinality($1::text[]) = 0 OR event_type = ANY($1) ORDER BY position DESC LIMIT $2"
            );
            let rows: Vec<EnvelopeRow> = sqlx::query_as(&query)
                .bind(&kinds)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| database_error(&e))?;
            decode_rows(rows)
        })
    }

    fn aggregate_ids(&self, aggregate_type: AggregateType) -> StoreFuture<'_, Vec<AggregateId>> {
        Box::pin(async move {
            let rows: Vec<(String,)> = sqlx::query_as(
                r"
                SELECT aggregate_id FROM domain_events
                WHERE aggregate_type = $1
                GROUP BY aggregate_id
                ORDER BY MIN(position)
                ",
            )
            .bind(aggregate_type.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| database_error(&e))?;
            Ok(rows.into_iter().map(|(id,)| AggregateId::new(id)).collect())
        })
    }
}
