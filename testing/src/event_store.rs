//! In-memory [`EventStore`] for fast, deterministic tests.

use crate::mocks::test_clock;
use std::sync::{Arc, RwLock};
use ticketflow_core::envelope::DomainEventEnvelope;
use ticketflow_core::environment::Clock;
use ticketflow_core::event::DomainEventKind;
use ticketflow_core::event_store::{EventStore, EventStoreError, StoreFuture};
use ticketflow_core::stream::{AggregateId, AggregateRef, AggregateType, Version};

/// In-memory event log.
///
/// Enforces the same `(aggregate_type, aggregate_id, version)` uniqueness as the
/// Postgres table, and can be told to fail upcoming inserts so tests can drive
/// the conflict and outage paths.
///
/// # Example
///
/// ```
/// use ticketflow_testing::mocks::InMemoryEventStore;
/// use ticketflow_testing::fixtures;
/// use ticketflow_core::event_store::EventStore;
/// use ticketflow_core::stream::{AggregateRef, Version};
///
/// # tokio_test::block_on(async {
/// let store = InMemoryEventStore::new();
/// let envelope = fixtures::envelope(fixtures::ticket_registered("guest-1", "evt-1"), 1);
/// store.insert(envelope.clone()).await.unwrap();
///
/// let duplicate = store.insert(envelope).await;
/// assert!(duplicate.unwrap_err().is_concurrency_conflict());
/// assert_eq!(
///     store.current_version(AggregateRef::ticket("guest-1")).await.unwrap(),
///     Version::new(1)
/// );
/// # });
/// ```
#[derive(Clone)]
pub struct InMemoryEventStore {
    envelopes: Arc<RwLock<Vec<DomainEventEnvelope>>>,
    insert_failures: Arc<RwLock<Vec<EventStoreError>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryEventStore {
    /// Create an empty store stamping `created_at` from [`test_clock`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(test_clock()))
    }

    /// Create an empty store with a custom clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            envelopes: Arc::new(RwLock::new(Vec::new())),
            insert_failures: Arc::new(RwLock::new(Vec::new())),
            clock,
        }
    }

    /// Make the next insert fail with `error` (queued, first in first out).
    pub fn fail_next_insert(&self, error: EventStoreError) {
        self.insert_failures.write().unwrap().push(error);
    }

    /// Every stored envelope in insertion order.
    #[must_use]
    pub fn all(&self) -> Vec<DomainEventEnvelope> {
        self.envelopes.read().unwrap().clone()
    }

    /// Number of stored envelopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.envelopes.read().unwrap().len()
    }

    /// Whether nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.envelopes.read().unwrap().is_empty()
    }

    /// Remove every envelope (for test isolation).
    pub fn clear(&self) {
        self.envelopes.write().unwrap().clear();
    }

    fn stream_of(&self, aggregate: &AggregateRef) -> Vec<DomainEventEnvelope> {
        let mut stream: Vec<_> = self
            .envelopes
            .read()
            .unwrap()
            .iter()
            .filter(|envelope| envelope.aggregate() == *aggregate)
            .cloned()
            .collect();
        stream.sort_by_key(|envelope| envelope.version);
        stream
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore for InMemoryEventStore {
    fn current_version(&self, aggregate: AggregateRef) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            Ok(self
                .stream_of(&aggregate)
                .last()
                .map_or(Version::INITIAL, |envelope| envelope.version))
        })
    }

    fn insert(&self, mut envelope: DomainEventEnvelope) -> StoreFuture<'_, DomainEventEnvelope> {
        Box::pin(async move {
            {
                let mut failures = self.insert_failures.write().unwrap();
                if !failures.is_empty() {
                    return Err(failures.remove(0));
                }
            }

            let mut envelopes = self.envelopes.write().unwrap();
            let duplicate = envelopes.iter().any(|stored| {
                stored.aggregate_type == envelope.aggregate_type
                    && stored.aggregate_id == envelope.aggregate_id
                    && stored.version == envelope.version
            });
            if duplicate {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate: envelope.aggregate(),
                    version: envelope.version,
                });
            }

            envelope.metadata.created_at = Some(self.clock.now());
            envelopes.push(envelope.clone());
            Ok(envelope)
        })
    }

    fn load_stream(
        &self,
        aggregate: AggregateRef,
        after: Version,
    ) -> StoreFuture<'_, Vec<DomainEventEnvelope>> {
        Box::pin(async move {
            Ok(self
                .stream_of(&aggregate)
                .into_iter()
                .filter(|envelope| envelope.version > after)
                .collect())
        })
    }

    fn load_by_correlation(
        &self,
        correlation_id: String,
    ) -> StoreFuture<'_, Vec<DomainEventEnvelope>> {
        Box::pin(async move {
            let mut matching: Vec<_> = self
                .envelopes
                .read()
                .unwrap()
                .iter()
                .filter(|envelope| envelope.metadata.correlation_id == correlation_id)
                .cloned()
                .collect();
            matching.sort_by_key(|envelope| envelope.metadata.occurred_at);
            Ok(matching)
        })
    }

    fn load_recent(
        &self,
        limit: usize,
        kinds: Vec<DomainEventKind>,
    ) -> StoreFuture<'_, Vec<DomainEventEnvelope>> {
        Box::pin(async move {
            Ok(self
                .envelopes
                .read()
                .unwrap()
                .iter()
                .rev()
                .filter(|envelope| kinds.is_empty() || kinds.contains(&envelope.kind()))
                .take(limit)
                .cloned()
                .collect())
        })
    }

    fn aggregate_ids(&self, aggregate_type: AggregateType) -> StoreFuture<'_, Vec<AggregateId>> {
        Box::pin(async move {
            let mut ids: Vec<AggregateId> = Vec::new();
            for envelope in self.envelopes.read().unwrap().iter() {
                if envelope.aggregate_type == aggregate_type && !ids.contains(&envelope.aggregate_id)
                {
                    ids.push(envelope.aggregate_id.clone());
                }
            }
            Ok(ids)
        })
    }
}
