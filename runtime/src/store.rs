//! Domain event store: version assignment, durable append and dispatch.
//!
//! [`DomainEventStore`] wraps a persistence [`EventStore`] and an [`EventBus`].
//! An append computes the next version on the server side, completes the
//! metadata, inserts, and only then dispatches. A dispatch failure is logged
//! and counted but never undoes the append; [`DomainEventStore::redispatch`]
//! re-sends envelopes a consumer missed.

use crate::metrics::{EventBusMetrics, EventStoreMetrics};
use std::sync::Arc;
use std::time::Instant;
use ticketflow_core::envelope::{DomainEventEnvelope, MetadataInput};
use ticketflow_core::environment::Clock;
use ticketflow_core::event::{DomainEvent, DomainEventKind};
use ticketflow_core::event_bus::{DispatchMessage, EventBus};
use ticketflow_core::event_store::{EventStore, EventStoreError};
use ticketflow_core::stream::{AggregateId, AggregateRef, AggregateType, Version};

/// Outcome of a batch of dispatches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Messages the bus accepted.
    pub published: usize,
    /// Messages that failed to publish.
    pub failed: usize,
}

/// Append-and-dispatch front end over the event log.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use ticketflow_core::envelope::MetadataInput;
/// use ticketflow_runtime::store::DomainEventStore;
/// use ticketflow_testing::{fixtures, test_clock, InMemoryEventBus, InMemoryEventStore};
///
/// # tokio_test::block_on(async {
/// let events = DomainEventStore::new(
///     Arc::new(InMemoryEventStore::new()),
///     Arc::new(InMemoryEventBus::new()),
///     Arc::new(test_clock()),
/// );
///
/// let envelope = events
///     .append(fixtures::event_created("evt-1"), MetadataInput::default())
///     .await
///     .unwrap();
/// assert_eq!(envelope.version.value(), 1);
/// # });
/// ```
#[derive(Clone)]
pub struct DomainEventStore {
    store: Arc<dyn EventStore>,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
}

impl DomainEventStore {
    /// Create a store over the given log, dispatch channel and clock.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, bus: Arc<dyn EventBus>, clock: Arc<dyn Clock>) -> Self {
        Self { store, bus, clock }
    }

    /// The underlying persistence port.
    #[must_use]
    pub fn event_store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// The clock used for metadata defaults.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Append `event` to its aggregate's stream.
    ///
    /// The version is the aggregate's current version plus one. Missing
    /// metadata is defaulted (fresh correlation id, system actor, `occurred_at`
    /// from the clock). After the insert succeeds the envelope is dispatched to
    /// `app/<type>`; a dispatch failure is logged and otherwise ignored.
    ///
    /// Callers that decided on the event from previously loaded state should use
    /// [`append_at`](Self::append_at) so a write in between is detected.
    ///
    /// # Errors
    ///
    /// - [`EventStoreError::ConcurrencyConflict`] if another writer claimed the version first
    /// - any other [`EventStoreError`] from the persistence layer
    pub async fn append(
        &self,
        event: DomainEvent,
        metadata: MetadataInput,
    ) -> Result<DomainEventEnvelope, EventStoreError> {
        let current = self.store.current_version(event.aggregate()).await?;
        self.append_at(event, current, metadata).await
    }

    /// Append `event` right after version `expected`.
    ///
    /// `expected` is the version the caller observed when it loaded the
    /// aggregate. If any envelope was appended since, the insert at
    /// `expected + 1` collides and the call fails with a conflict.
    ///
    /// # Errors
    ///
    /// - [`EventStoreError::ConcurrencyConflict`] if the stream moved past `expected`
    /// - any other [`EventStoreError`] from the persistence layer
    #[tracing::instrument(
        skip(self, event, metadata),
        name = "event_store_append",
        fields(aggregate = %event.aggregate(), event_type = event.event_type())
    )]
    pub async fn append_at(
        &self,
        event: DomainEvent,
        expected: Version,
        metadata: MetadataInput,
    ) -> Result<DomainEventEnvelope, EventStoreError> {
        let aggregate = event.aggregate();
        let envelope =
            DomainEventEnvelope::new(event, expected.next(), metadata.complete(self.clock.now()));

        let started = Instant::now();
        let stored = match self.store.insert(envelope).await {
            Ok(stored) => stored,
            Err(error) => {
                if error.is_concurrency_conflict() {
                    tracing::warn!(
                        aggregate = %aggregate,
                        version = %expected.next(),
                        "Version already taken, command lost a concurrent race"
                    );
                    EventStoreMetrics::record_conflict(aggregate.aggregate_type.as_str());
                } else {
                    tracing::error!(error = %error, "Failed to append domain event");
                }
                return Err(error);
            }
        };
        EventStoreMetrics::record_append(stored.event_type(), started.elapsed());

        tracing::debug!(
            envelope_id = %stored.id,
            version = %stored.version,
            correlation_id = %stored.metadata.correlation_id,
            "Domain event appended"
        );

        self.dispatch(&stored).await;
        Ok(stored)
    }

    /// Envelopes of `aggregate` after version `from`, ascending.
    ///
    /// # Errors
    ///
    /// Propagates [`EventStoreError`] from the persistence layer.
    #[tracing::instrument(skip(self), name = "event_store_get_stream")]
    pub async fn get_stream(
        &self,
        aggregate: AggregateRef,
        from: Version,
    ) -> Result<Vec<DomainEventEnvelope>, EventStoreError> {
        let stream = self.store.load_stream(aggregate, from).await?;
        EventStoreMetrics::record_load(stream.len());
        Ok(stream)
    }

    /// Every envelope of one logical workflow, by occurrence time.
    ///
    /// # Errors
    ///
    /// Propagates [`EventStoreError`] from the persistence layer.
    pub async fn get_by_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<DomainEventEnvelope>, EventStoreError> {
        let envelopes = self
            .store
            .load_by_correlation(correlation_id.to_string())
            .await?;
        EventStoreMetrics::record_load(envelopes.len());
        Ok(envelopes)
    }

    /// The `limit` newest envelopes, optionally limited to `kinds`.
    ///
    /// # Errors
    ///
    /// Propagates [`EventStoreError`] from the persistence layer.
    pub async fn get_recent(
        &self,
        limit: usize,
        kinds: &[DomainEventKind],
    ) -> Result<Vec<DomainEventEnvelope>, EventStoreError> {
        let envelopes = self.store.load_recent(limit, kinds.to_vec()).await?;
        EventStoreMetrics::record_load(envelopes.len());
        Ok(envelopes)
    }

    /// Ids of every aggregate of `aggregate_type` with at least one event.
    ///
    /// # Errors
    ///
    /// Propagates [`EventStoreError`] from the persistence layer.
    pub async fn aggregate_ids(
        &self,
        aggregate_type: AggregateType,
    ) -> Result<Vec<AggregateId>, EventStoreError> {
        self.store.aggregate_ids(aggregate_type).await
    }

    /// Dispatch already-appended envelopes again, in the given order.
    ///
    /// Consumers must be idempotent on `_envelope.id`, so replaying an envelope
    /// they already saw is harmless.
    #[tracing::instrument(skip(self, envelopes), fields(count = envelopes.len()))]
    pub async fn redispatch(&self, envelopes: &[DomainEventEnvelope]) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        for envelope in envelopes {
            if self.dispatch(envelope).await {
                summary.published += 1;
            } else {
                summary.failed += 1;
            }
        }
        tracing::info!(
            published = summary.published,
            failed = summary.failed,
            "Redispatch finished"
        );
        summary
    }

    async fn dispatch(&self, envelope: &DomainEventEnvelope) -> bool {
        let message = match DispatchMessage::from_envelope(envelope) {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(envelope_id = %envelope.id, error = %error, "Could not build dispatch message");
                EventBusMetrics::record_publish_error(envelope.event_type());
                return false;
            }
        };

        let topic = message.topic.clone();
        let started = Instant::now();
        match self.bus.publish(message).await {
            Ok(()) => {
                EventBusMetrics::record_publish(started.elapsed());
                true
            }
            Err(error) => {
                tracing::warn!(
                    envelope_id = %envelope.id,
                    topic = %topic,
                    error = %error,
                    "Dispatch failed; event stays appended and can be redispatched"
                );
                EventBusMetrics::record_publish_error(envelope.event_type());
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ticketflow_core::envelope::{Actor, ActorType};
    use ticketflow_testing::{InMemoryEventBus, InMemoryEventStore, fixtures, test_clock};

    fn setup() -> (DomainEventStore, InMemoryEventStore, InMemoryEventBus) {
        let store = InMemoryEventStore::new();
        let bus = InMemoryEventBus::new();
        let events = DomainEventStore::new(
            Arc::new(store.clone()),
            Arc::new(bus.clone()),
            Arc::new(test_clock()),
        );
        (events, store, bus)
    }

    #[tokio::test]
    async fn versions_are_assigned_per_aggregate() {
        let (events, _, _) = setup();

        let first = events
            .append(fixtures::ticket_registered("guest-1", "evt-1"), MetadataInput::default())
            .await
            .unwrap();
        let second = events
            .append(fixtures::ticket_issued("guest-1", "evt-1"), MetadataInput::default())
            .await
            .unwrap();
        let other = events
            .append(fixtures::ticket_registered("guest-2", "evt-1"), MetadataInput::default())
            .await
            .unwrap();

        assert_eq!(first.version, Version::new(1));
        assert_eq!(second.version, Version::new(2));
        assert_eq!(other.version, Version::new(1));
    }

    #[tokio::test]
    async fn metadata_defaults_are_applied() {
        let (events, _, _) = setup();

        let envelope = events
            .append(fixtures::event_created("evt-1"), MetadataInput::default())
            .await
            .unwrap();

        assert_eq!(envelope.metadata.actor.actor_type, ActorType::System);
        assert_eq!(envelope.metadata.occurred_at, test_clock().now());
        assert!(envelope.metadata.created_at.is_some());
        assert!(!envelope.metadata.correlation_id.is_empty());
    }

    #[tokio::test]
    async fn appended_events_are_dispatched() {
        let (events, _, bus) = setup();

        events
            .append(
                fixtures::ticket_registered("guest-1", "evt-1"),
                MetadataInput {
                    actor: Some(Actor::user("user-1")),
                    ..MetadataInput::default()
                },
            )
            .await
            .unwrap();

        let published = bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "app/ticket_registered");
        assert_eq!(published[0].body["_envelope"]["version"], 1);
        assert_eq!(published[0].body["_metadata"]["actor"]["id"], "user-1");
    }

    #[tokio::test]
    async fn dispatch_failure_does_not_roll_back() {
        let (events, store, bus) = setup();
        bus.set_failing(true);

        let result = events
            .append(fixtures::event_created("evt-1"), MetadataInput::default())
            .await;

        assert!(result.is_ok());
        assert_eq!(store.len(), 1);
        assert!(bus.published().is_empty());

        bus.set_failing(false);
        let summary = events.redispatch(&store.all()).await;
        assert_eq!(summary, DispatchSummary { published: 1, failed: 0 });
        assert_eq!(bus.topics(), vec!["app/event_created".to_string()]);
    }

    #[tokio::test]
    async fn conflicts_surface_distinctly_and_are_not_dispatched() {
        let (events, store, bus) = setup();
        store.fail_next_insert(EventStoreError::ConcurrencyConflict {
            aggregate: AggregateRef::event("evt-1"),
            version: Version::new(1),
        });

        let result = events
            .append(fixtures::event_created("evt-1"), MetadataInput::default())
            .await;

        assert!(result.unwrap_err().is_concurrency_conflict());
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn append_at_a_stale_version_conflicts() {
        let (events, store, bus) = setup();
        events
            .append_at(fixtures::event_created("evt-1"), Version::INITIAL, MetadataInput::default())
            .await
            .unwrap();

        let stale = events
            .append_at(fixtures::event_published("evt-1"), Version::INITIAL, MetadataInput::default())
            .await
            .unwrap_err();
        assert!(stale.is_concurrency_conflict());
        assert_eq!(store.len(), 1);
        assert_eq!(bus.published().len(), 1);

        let fresh = events
            .append_at(fixtures::event_published("evt-1"), Version::new(1), MetadataInput::default())
            .await
            .unwrap();
        assert_eq!(fresh.version, Version::new(2));
    }

    #[tokio::test]
    async fn correlation_and_recent_queries() {
        let (events, _, _) = setup();
        let metadata = || MetadataInput {
            correlation_id: Some("checkout-1".to_string()),
            ..MetadataInput::default()
        };

        events
            .append(fixtures::ticket_staked("guest-1", "evt-1"), metadata())
            .await
            .unwrap();
        events
            .append(fixtures::payment_received("pay-1", "guest-1"), metadata())
            .await
            .unwrap();
        events
            .append(fixtures::event_created("evt-2"), MetadataInput::default())
            .await
            .unwrap();

        let traced = events.get_by_correlation("checkout-1").await.unwrap();
        assert_eq!(traced.len(), 2);

        let recent = events
            .get_recent(10, &[DomainEventKind::PaymentReceived])
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].aggregate(), AggregateRef::payment("pay-1"));
    }
}
