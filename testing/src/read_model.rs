//! In-memory [`ReadModel`] with seeding and drift helpers.

use crate::mocks::test_clock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use ticketflow_core::definitions::{EventStatus, TicketStatus};
use ticketflow_core::environment::Clock;
use ticketflow_core::projection::{
    EventRecord, ProjectionError, ProjectionFuture, ReadModel, StatusChange, TicketRecord,
};
use ticketflow_core::stream::{AggregateId, AggregateRef};

/// In-memory `events` and `guests` tables.
///
/// # Example
///
/// ```
/// use ticketflow_testing::mocks::InMemoryReadModel;
/// use ticketflow_core::definitions::{EventStatus, TicketStatus};
///
/// let read_model = InMemoryReadModel::new();
/// read_model.insert_event("evt-1", EventStatus::Live);
/// read_model.insert_ticket("guest-1", "evt-1", TicketStatus::Issued);
///
/// assert_eq!(read_model.ticket("guest-1").unwrap().status, TicketStatus::Issued);
/// ```
#[derive(Clone)]
pub struct InMemoryReadModel {
    events: Arc<RwLock<HashMap<AggregateId, EventRecord>>>,
    tickets: Arc<RwLock<HashMap<AggregateId, TicketRecord>>>,
    failing_writes: Arc<AtomicBool>,
    yielding_loads: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
}

impl InMemoryReadModel {
    /// Create empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(HashMap::new())),
            tickets: Arc::new(RwLock::new(HashMap::new())),
            failing_writes: Arc::new(AtomicBool::new(false)),
            yielding_loads: Arc::new(AtomicBool::new(false)),
            clock: Arc::new(test_clock()),
        }
    }

    /// Seed an Event row (what the event-creation flow would do).
    pub fn insert_event(&self, id: impl Into<AggregateId>, status: EventStatus) {
        let id = id.into();
        self.events.write().unwrap().insert(
            id.clone(),
            EventRecord {
                id,
                status,
                updated_at: self.clock.now(),
                recovered_at: None,
            },
        );
    }

    /// Seed a Ticket row (what the registration flow would do).
    pub fn insert_ticket(
        &self,
        id: impl Into<AggregateId>,
        event_id: impl Into<AggregateId>,
        status: TicketStatus,
    ) {
        let id = id.into();
        self.tickets.write().unwrap().insert(
            id.clone(),
            TicketRecord {
                id,
                event_id: event_id.into(),
                status,
                updated_at: self.clock.now(),
                recovered_at: None,
            },
        );
    }

    /// Current Event row, if any.
    #[must_use]
    pub fn event(&self, id: &str) -> Option<EventRecord> {
        self.events.read().unwrap().get(&AggregateId::new(id)).cloned()
    }

    /// Current Ticket row, if any.
    #[must_use]
    pub fn ticket(&self, id: &str) -> Option<TicketRecord> {
        self.tickets.read().unwrap().get(&AggregateId::new(id)).cloned()
    }

    /// Make every status write fail (`true`) or succeed again (`false`).
    ///
    /// Reads keep working, which is how a projection outage looks to the
    /// orchestrator.
    pub fn set_failing_writes(&self, failing: bool) {
        self.failing_writes.store(failing, Ordering::SeqCst);
    }

    /// Yield to the scheduler before every load (`true`).
    ///
    /// Lets commands joined on one task interleave between loading state and
    /// appending, so concurrent writers actually race.
    pub fn set_yielding_loads(&self, yielding: bool) {
        self.yielding_loads.store(yielding, Ordering::SeqCst);
    }

    async fn maybe_yield(&self) {
        if self.yielding_loads.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
    }

    fn check_writable(&self) -> Result<(), ProjectionError> {
        if self.failing_writes.load(Ordering::SeqCst) {
            Err(ProjectionError::Storage("in-memory read model set to fail".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for InMemoryReadModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadModel for InMemoryReadModel {
    fn load_event(&self, id: AggregateId) -> ProjectionFuture<'_, Option<EventRecord>> {
        Box::pin(async move {
            self.maybe_yield().await;
            Ok(self.events.read().unwrap().get(&id).cloned())
        })
    }

    fn load_ticket(&self, id: AggregateId) -> ProjectionFuture<'_, Option<TicketRecord>> {
        Box::pin(async move {
            self.maybe_yield().await;
            Ok(self.tickets.read().unwrap().get(&id).cloned())
        })
    }

    fn set_event_status(
        &self,
        id: AggregateId,
        status: EventStatus,
        change: StatusChange,
    ) -> ProjectionFuture<'_, ()> {
        Box::pin(async move {
            self.check_writable()?;
            let mut events = self.events.write().unwrap();
            let row = events
                .get_mut(&id)
                .ok_or_else(|| ProjectionError::NotFound(AggregateRef::event(id.clone())))?;
            row.status = status;
            row.updated_at = change.at;
            if change.is_recovery() {
                row.recovered_at = Some(change.at);
            }
            Ok(())
        })
    }

    fn set_ticket_status(
        &self,
        id: AggregateId,
        status: TicketStatus,
        change: StatusChange,
    ) -> ProjectionFuture<'_, ()> {
        Box::pin(async move {
            self.check_writable()?;
            let mut tickets = self.tickets.write().unwrap();
            let row = tickets
                .get_mut(&id)
                .ok_or_else(|| ProjectionError::NotFound(AggregateRef::ticket(id.clone())))?;
            row.status = status;
            row.updated_at = change.at;
            if change.is_recovery() {
                row.recovered_at = Some(change.at);
            }
            Ok(())
        })
    }
}
