//! Temporal recovery: repair read model drift from the event log.
//!
//! The read model is projected after each append but outside any transaction,
//! so it can fall behind. Recovery replays an aggregate's full stream, folds it
//! into the status the log says it should have, and overwrites the stored row
//! when the two disagree.
//!
//! The fold uses the event-kind → status mapping ([`Lifecycle::from_event_kind`]),
//! never the action table, so a stream stays replayable if the table changes shape.
//!
//! Recovery is run out of band (ops tooling, a scheduled loop), never from the
//! orchestrator's request path.

use crate::metrics::RecoveryMetrics;
use crate::store::DomainEventStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use ticketflow_core::definitions::{EventStatus, Lifecycle, Status, TicketStatus};
use ticketflow_core::envelope::DomainEventEnvelope;
use ticketflow_core::event_store::EventStoreError;
use ticketflow_core::projection::{ProjectionError, ReadModel, StatusChange};
use ticketflow_core::stream::{AggregateRef, AggregateType, Version};

/// Why an aggregate could not be reconciled.
#[derive(Error, Debug)]
pub enum RecoveryError {
    /// The stream could not be loaded.
    #[error("Event store error: {0}")]
    Store(#[from] EventStoreError),

    /// The row could not be read or rewritten.
    #[error("Read model error: {0}")]
    ReadModel(#[from] ProjectionError),

    /// The aggregate has events but no read model row to repair.
    #[error("{0} has events but no read model row")]
    MissingRow(AggregateRef),

    /// The aggregate type has no lifecycle to fold.
    #[error("Aggregate type {0} has no lifecycle")]
    Unsupported(AggregateType),
}

/// Outcome of reconciling one aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The stream is empty; nothing to compare.
    NoEvents,
    /// The stored status already matches the fold.
    InSync {
        /// Current status.
        status: Status,
    },
    /// The stored status was overwritten.
    Repaired {
        /// Status found in the read model.
        old: Status,
        /// Status derived from the stream.
        new: Status,
    },
}

impl Reconciliation {
    /// Whether the read model was changed.
    #[must_use]
    pub const fn fixed(&self) -> bool {
        matches!(self, Self::Repaired { .. })
    }

    /// Stored status before a repair.
    #[must_use]
    pub const fn old_status(&self) -> Option<Status> {
        match self {
            Self::Repaired { old, .. } => Some(*old),
            _ => None,
        }
    }

    /// Stored status after a repair.
    #[must_use]
    pub const fn new_status(&self) -> Option<Status> {
        match self {
            Self::Repaired { new, .. } => Some(*new),
            _ => None,
        }
    }
}

/// Totals from [`TemporalRecovery::reconcile_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    /// Aggregates reconciled without error.
    pub checked: usize,
    /// Of those, how many were repaired.
    pub repaired: usize,
    /// Aggregates that failed to reconcile.
    pub failed: usize,
}

impl ReconciliationReport {
    fn merge(&mut self, other: Self) {
        self.checked += other.checked;
        self.repaired += other.repaired;
        self.failed += other.failed;
    }
}

/// Fold a stream into the status of lifecycle `S`.
///
/// Starts at `S::INITIAL`; kinds that do not belong to `S` leave the status unchanged.
#[must_use]
pub fn fold_stream<S: Lifecycle>(stream: &[DomainEventEnvelope]) -> S {
    stream
        .iter()
        .filter_map(|envelope| S::from_event_kind(envelope.kind()))
        .fold(S::INITIAL, |_, next| next)
}

/// Status the log says an aggregate should have.
///
/// `None` for an empty stream or an aggregate type without a lifecycle.
///
/// # Example
///
/// ```
/// use ticketflow_core::definitions::{Status, TicketStatus};
/// use ticketflow_runtime::recovery::expected_status;
/// use ticketflow_testing::fixtures;
///
/// let stream = fixtures::stream(vec![
///     fixtures::ticket_registered("guest-1", "evt-1"),
///     fixtures::ticket_approved("guest-1", "evt-1"),
///     fixtures::ticket_staked("guest-1", "evt-1"),
/// ]);
/// assert_eq!(expected_status(&stream), Some(Status::Ticket(TicketStatus::Staked)));
/// assert_eq!(expected_status(&[]), None);
/// ```
#[must_use]
pub fn expected_status(stream: &[DomainEventEnvelope]) -> Option<Status> {
    match stream.first()?.aggregate_type {
        AggregateType::Event => Some(fold_stream::<EventStatus>(stream).into_status()),
        AggregateType::Ticket => Some(fold_stream::<TicketStatus>(stream).into_status()),
        _ => None,
    }
}

/// Reconciles read model rows against the event log.
#[derive(Clone)]
pub struct TemporalRecovery {
    events: DomainEventStore,
    read_model: Arc<dyn ReadModel>,
}

impl TemporalRecovery {
    /// Create a recovery runner.
    #[must_use]
    pub fn new(events: DomainEventStore, read_model: Arc<dyn ReadModel>) -> Self {
        Self { events, read_model }
    }

    /// Reconcile one aggregate.
    ///
    /// Idempotent: a second call with no new events returns `InSync`.
    ///
    /// # Errors
    ///
    /// - `Unsupported` for aggregate types without a read model table
    /// - `MissingRow` if the stream is non-empty but no row exists
    /// - `Store` / `ReadModel` on storage failures
    #[tracing::instrument(skip(self), fields(aggregate = %aggregate))]
    pub async fn reconcile_entity(
        &self,
        aggregate: AggregateRef,
    ) -> Result<Reconciliation, RecoveryError> {
        if !matches!(
            aggregate.aggregate_type,
            AggregateType::Event | AggregateType::Ticket
        ) {
            return Err(RecoveryError::Unsupported(aggregate.aggregate_type));
        }

        let stream = self
            .events
            .get_stream(aggregate.clone(), Version::INITIAL)
            .await?;
        let Some(expected) = expected_status(&stream) else {
            tracing::debug!("No events; nothing to reconcile");
            RecoveryMetrics::record_checked(aggregate.aggregate_type.as_str());
            return Ok(Reconciliation::NoEvents);
        };

        let stored = self
            .read_model
            .status_of(aggregate.clone())
            .await?
            .ok_or_else(|| RecoveryError::MissingRow(aggregate.clone()))?;
        RecoveryMetrics::record_checked(aggregate.aggregate_type.as_str());

        if stored == expected {
            return Ok(Reconciliation::InSync { status: stored });
        }

        let now = self.events.clock().now();
        self.read_model
            .set_status(
                aggregate.aggregate_id.clone(),
                expected,
                StatusChange::recovery(now),
            )
            .await?;

        tracing::warn!(
            old_status = %stored,
            new_status = %expected,
            events = stream.len(),
            "Read model drift repaired from event log"
        );
        RecoveryMetrics::record_repair(aggregate.aggregate_type.as_str());

        Ok(Reconciliation::Repaired {
            old: stored,
            new: expected,
        })
    }

    /// Reconcile every aggregate of `aggregate_type` that has events.
    ///
    /// Individual failures are logged and counted; the sweep continues.
    /// `limit` caps how many aggregates are visited.
    ///
    /// # Errors
    ///
    /// Only if the list of aggregate ids cannot be loaded.
    #[tracing::instrument(skip(self), fields(aggregate_type = %aggregate_type))]
    pub async fn reconcile_all(
        &self,
        aggregate_type: AggregateType,
        limit: Option<usize>,
    ) -> Result<ReconciliationReport, RecoveryError> {
        let ids = self.events.aggregate_ids(aggregate_type).await?;
        let limit = limit.unwrap_or(ids.len());
        let mut report = ReconciliationReport::default();

        for id in ids.into_iter().take(limit) {
            let aggregate = AggregateRef::new(aggregate_type, id);
            match self.reconcile_entity(aggregate.clone()).await {
                Ok(outcome) => {
                    report.checked += 1;
                    if outcome.fixed() {
                        report.repaired += 1;
                    }
                }
                Err(error) => {
                    tracing::error!(aggregate = %aggregate, error = %error, "Reconciliation failed");
                    RecoveryMetrics::record_failure(aggregate_type.as_str());
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            checked = report.checked,
            repaired = report.repaired,
            failed = report.failed,
            "Reconciliation sweep finished"
        );
        Ok(report)
    }

    /// Sweep `aggregate_types` every `interval` until `shutdown` resolves.
    ///
    /// A sweep that cannot list ids is logged and retried on the next tick.
    /// Returns the totals across all sweeps.
    pub async fn watch<F>(
        &self,
        aggregate_types: &[AggregateType],
        limit: Option<usize>,
        interval: Duration,
        shutdown: F,
    ) -> ReconciliationReport
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut totals = ReconciliationReport::default();
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("Recovery watch stopping");
                    return totals;
                }
                _ = ticker.tick() => {
                    for aggregate_type in aggregate_types {
                        match self.reconcile_all(*aggregate_type, limit).await {
                            Ok(report) => totals.merge(report),
                            Err(error) => tracing::error!(
                                aggregate_type = %aggregate_type,
                                error = %error,
                                "Reconciliation sweep failed"
                            ),
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use ticketflow_core::envelope::MetadataInput;
    use ticketflow_core::environment::Clock;
    use ticketflow_core::event::DomainEvent;
    use ticketflow_testing::{
        InMemoryEventBus, InMemoryEventStore, InMemoryReadModel, fixtures, properties, test_clock,
    };

    fn setup() -> (TemporalRecovery, DomainEventStore, InMemoryReadModel) {
        let events = DomainEventStore::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
            Arc::new(test_clock()),
        );
        let read_model = InMemoryReadModel::new();
        let recovery = TemporalRecovery::new(events.clone(), Arc::new(read_model.clone()));
        (recovery, events, read_model)
    }

    async fn append_all(events: &DomainEventStore, stream: Vec<DomainEvent>) {
        for event in stream {
            events.append(event, MetadataInput::default()).await.unwrap();
        }
    }

    #[test]
    fn fold_starts_from_initial_status() {
        let stream = fixtures::stream(vec![fixtures::event_published("evt-1")]);
        assert_eq!(fold_stream::<EventStatus>(&stream), EventStatus::Published);
        assert_eq!(fold_stream::<EventStatus>(&[]), EventStatus::Draft);
    }

    #[test]
    fn fold_ignores_foreign_kinds() {
        let mut stream = fixtures::stream(vec![
            fixtures::ticket_registered("guest-1", "evt-1"),
            fixtures::ticket_issued("guest-1", "evt-1"),
        ]);
        stream.push(fixtures::envelope(fixtures::payment_received("pay-1", "guest-1"), 3));
        assert_eq!(fold_stream::<TicketStatus>(&stream), TicketStatus::Issued);
    }

    #[tokio::test]
    async fn repairs_drifted_ticket() {
        let (recovery, events, read_model) = setup();
        read_model.insert_ticket("guest-1", "evt-1", TicketStatus::Approved);
        append_all(
            &events,
            vec![
                fixtures::ticket_registered("guest-1", "evt-1"),
                fixtures::ticket_approved("guest-1", "evt-1"),
                fixtures::ticket_staked("guest-1", "evt-1"),
            ],
        )
        .await;

        let outcome = recovery
            .reconcile_entity(AggregateRef::ticket("guest-1"))
            .await
            .unwrap();

        assert!(outcome.fixed());
        assert_eq!(outcome.old_status(), Some(Status::Ticket(TicketStatus::Approved)));
        assert_eq!(outcome.new_status(), Some(Status::Ticket(TicketStatus::Staked)));

        let row = read_model.ticket("guest-1").unwrap();
        assert_eq!(row.status, TicketStatus::Staked);
        assert_eq!(row.recovered_at, Some(test_clock().now()));
    }

    #[tokio::test]
    async fn second_run_is_in_sync() {
        let (recovery, events, read_model) = setup();
        read_model.insert_event("evt-1", EventStatus::Draft);
        append_all(
            &events,
            vec![
                fixtures::event_created("evt-1"),
                fixtures::event_published("evt-1"),
                fixtures::event_went_live("evt-1"),
            ],
        )
        .await;

        let first = recovery
            .reconcile_entity(AggregateRef::event("evt-1"))
            .await
            .unwrap();
        let second = recovery
            .reconcile_entity(AggregateRef::event("evt-1"))
            .await
            .unwrap();

        assert!(first.fixed());
        assert_eq!(
            second,
            Reconciliation::InSync {
                status: Status::Event(EventStatus::Live)
            }
        );
    }

    #[tokio::test]
    async fn empty_stream_is_not_fixed() {
        let (recovery, _, read_model) = setup();
        read_model.insert_ticket("guest-9", "evt-1", TicketStatus::Issued);

        let outcome = recovery
            .reconcile_entity(AggregateRef::ticket("guest-9"))
            .await
            .unwrap();

        assert_eq!(outcome, Reconciliation::NoEvents);
        assert_eq!(read_model.ticket("guest-9").unwrap().status, TicketStatus::Issued);
    }

    #[tokio::test]
    async fn events_without_a_row_are_reported() {
        let (recovery, events, _) = setup();
        append_all(&events, vec![fixtures::ticket_registered("guest-1", "evt-1")]).await;

        let error = recovery
            .reconcile_entity(AggregateRef::ticket("guest-1"))
            .await
            .unwrap_err();
        assert!(matches!(error, RecoveryError::MissingRow(_)));
    }

    #[tokio::test]
    async fn payments_are_unsupported() {
        let (recovery, _, _) = setup();
        let error = recovery
            .reconcile_entity(AggregateRef::payment("pay-1"))
            .await
            .unwrap_err();
        assert!(matches!(error, RecoveryError::Unsupported(AggregateType::Payment)));
    }

    #[tokio::test]
    async fn sweep_counts_repairs_and_failures() {
        let (recovery, events, read_model) = setup();
        read_model.insert_ticket("guest-1", "evt-1", TicketStatus::Pending);
        read_model.insert_ticket("guest-2", "evt-1", TicketStatus::Issued);
        append_all(
            &events,
            vec![
                fixtures::ticket_registered("guest-1", "evt-1"),
                fixtures::ticket_issued("guest-1", "evt-1"),
                fixtures::ticket_registered("guest-2", "evt-1"),
                fixtures::ticket_issued("guest-2", "evt-1"),
                // guest-3 has no row
                fixtures::ticket_registered("guest-3", "evt-1"),
            ],
        )
        .await;

        let report = recovery
            .reconcile_all(AggregateType::Ticket, None)
            .await
            .unwrap();
        assert_eq!(
            report,
            ReconciliationReport {
                checked: 2,
                repaired: 1,
                failed: 1,
            }
        );

        let limited = recovery
            .reconcile_all(AggregateType::Ticket, Some(1))
            .await
            .unwrap();
        assert_eq!(limited.checked + limited.failed, 1);
    }

    #[tokio::test]
    async fn watch_stops_on_shutdown() {
        let (recovery, events, read_model) = setup();
        read_model.insert_event("evt-1", EventStatus::Draft);
        append_all(
            &events,
            vec![fixtures::event_created("evt-1"), fixtures::event_published("evt-1")],
        )
        .await;

        let totals = recovery
            .watch(
                &[AggregateType::Event],
                None,
                Duration::from_millis(5),
                tokio::time::sleep(Duration::from_millis(30)),
            )
            .await;

        assert!(totals.checked >= 1);
        assert_eq!(totals.repaired, 1);
        assert_eq!(read_model.event("evt-1").unwrap().status, EventStatus::Published);
    }

    proptest! {
        #[test]
        fn fold_is_deterministic(kinds in proptest::collection::vec(properties::event_kind(), 0..20)) {
            let stream: Vec<_> = kinds
                .iter()
                .enumerate()
                .map(|(i, kind)| fixtures::envelope(fixtures::event_of_kind(*kind, "agg-1"), i as u64 + 1))
                .collect();

            let first = fold_stream::<TicketStatus>(&stream);
            let second = fold_stream::<TicketStatus>(&stream);
            prop_assert_eq!(first, second);
            prop_assert_eq!(fold_stream::<EventStatus>(&stream), fold_stream::<EventStatus>(&stream));
        }

        #[test]
        fn fold_ends_in_last_mapped_status(kinds in proptest::collection::vec(properties::event_kind(), 1..20)) {
            let stream: Vec<_> = kinds
                .iter()
                .enumerate()
                .map(|(i, kind)| fixtures::envelope(fixtures::event_of_kind(*kind, "agg-1"), i as u64 + 1))
                .collect();

            let last = stream
                .iter()
                .rev()
                .find_map(|envelope| TicketStatus::from_event_kind(envelope.kind()))
                .unwrap_or(TicketStatus::INITIAL);
            prop_assert_eq!(fold_stream::<TicketStatus>(&stream), last);
        }
    }
}
