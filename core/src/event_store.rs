//! Persistence port for the domain event log.
//!
//! The [`EventStore`] trait is the narrow contract the workflow core needs from a
//! database: per-aggregate version lookup, an insert that rejects a duplicate
//! `(aggregate_type, aggregate_id, version)`, and ordered range queries.
//!
//! Version assignment, metadata defaults and dispatch live one layer up (the
//! `DomainEventStore` in `ticketflow-runtime`), so every backend gets them for free.
//!
//! # Implementations
//!
//! - `PostgresEventStore` (in `ticketflow-postgres`): production implementation
//! - `InMemoryEventStore` (in `ticketflow-testing`): fast, deterministic testing
//!
//! # Example
//!
//! ```no_run
//! use ticketflow_core::event_store::{EventStore, EventStoreError};
//! use ticketflow_core::stream::{AggregateRef, Version};
//!
//! async fn replay<E: EventStore>(store: &E) -> Result<(), EventStoreError> {
//!     let ticket = AggregateRef::ticket("guest-1");
//!     let events = store.load_stream(ticket.clone(), Version::INITIAL).await?;
//!     let current = store.current_version(ticket).await?;
//!     assert_eq!(events.len() as u64, current.value());
//!     Ok(())
//! }
//! ```

use crate::envelope::DomainEventEnvelope;
use crate::event::DomainEventKind;
use crate::stream::{AggregateId, AggregateRef, AggregateType, Version};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`EventStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EventStoreError>> + Send + 'a>>;

/// Errors that can occur during event store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventStoreError {
    /// Another writer already stored this version of the aggregate.
    ///
    /// Two commands raced for the same aggregate and this one lost. The command
    /// should be retried from freshly reloaded state; it is not a permanent failure.
    #[error("Concurrency conflict: {aggregate} already has version {version}")]
    ConcurrencyConflict {
        /// The aggregate where the conflict occurred.
        aggregate: AggregateRef,
        /// The version both writers tried to claim.
        version: Version,
    },

    /// Database connection or query error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl EventStoreError {
    /// Whether this error is the retry-safe version race.
    #[must_use]
    pub const fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// Append-only storage for [`DomainEventEnvelope`]s.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the log is never mutated in place, so
/// readers need no coordination.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures so the store can be shared as
/// `Arc<dyn EventStore>` between the orchestrator and recovery.
pub trait EventStore: Send + Sync {
    /// Highest stored version of `aggregate`, or [`Version::INITIAL`] for an
    /// empty stream.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: query failed
    fn current_version(&self, aggregate: AggregateRef) -> StoreFuture<'_, Version>;

    /// Durably insert one envelope.
    ///
    /// Returns the envelope as stored, with `metadata.created_at` filled in.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict`: the aggregate already has an envelope at this version
    /// - `DatabaseError`: any other persistence failure
    /// - `SerializationError`: the payload could not be encoded
    fn insert(&self, envelope: DomainEventEnvelope) -> StoreFuture<'_, DomainEventEnvelope>;

    /// Envelopes of `aggregate` with a version strictly greater than `after`,
    /// ordered by version ascending. Pass [`Version::INITIAL`] for the whole stream.
    ///
    /// A stream that does not exist is empty, not an error.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: query failed
    /// - `SerializationError`: a stored row could not be decoded
    fn load_stream(
        &self,
        aggregate: AggregateRef,
        after: Version,
    ) -> StoreFuture<'_, Vec<DomainEventEnvelope>>;

    /// Every envelope sharing `correlation_id`, ordered by occurrence time.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: query failed
    /// - `SerializationError`: a stored row could not be decoded
    fn load_by_correlation(&self, correlation_id: String)
    -> StoreFuture<'_, Vec<DomainEventEnvelope>>;

    /// The `limit` most recently stored envelopes, newest first, optionally
    /// restricted to the given kinds (an empty list means all kinds).
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: query failed
    /// - `SerializationError`: a stored row could not be decoded
    fn load_recent(
        &self,
        limit: usize,
        kinds: Vec<DomainEventKind>,
    ) -> StoreFuture<'_, Vec<DomainEventEnvelope>>;

    /// Ids of every aggregate of `aggregate_type` that has at least one envelope.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: query failed
    fn aggregate_ids(&self, aggregate_type: AggregateType) -> StoreFuture<'_, Vec<AggregateId>>;
}
