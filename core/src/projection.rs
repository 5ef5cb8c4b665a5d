//! Read model port: the current-state tables the workflow projects into.
//!
//! # Overview
//!
//! The read model is the **query side** of the system. The event log is the
//! source of truth; the `events` and `guests` tables only cache the status each
//! aggregate has reached, so pages and APIs can list and filter without replaying
//! streams.
//!
//! ```text
//! Write Side:                  Read Side:
//! ┌─────────────────┐         ┌─────────────────┐
//! │  domain_events  │ project │  events.status  │
//! │  (append-only)  │ ──────► │  guests.status  │
//! └─────────────────┘         └─────────────────┘
//!          │                           ▲
//!          └──── reconcile (repair) ───┘
//! ```
//!
//! Projection is synchronous but not transactional with the append. When it
//! fails the read model is stale until temporal recovery repairs it.
//!
//! Rows are created by the registration and event-creation flows, which live
//! outside this crate. Workflow code only reads rows and rewrites their status.

use crate::definitions::{EventStatus, Status, TicketStatus};
use crate::stream::{AggregateId, AggregateRef, AggregateType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Error type for read model operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProjectionError {
    /// The row for this aggregate does not exist.
    #[error("Not found: {0}")]
    NotFound(AggregateRef),

    /// The aggregate type has no current-state table.
    #[error("No read model for aggregate type {0}")]
    Unsupported(AggregateType),

    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A stored value could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for read model operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// Boxed future returned by [`ReadModel`] methods.
pub type ProjectionFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Who rewrote a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOrigin {
    /// A command projected its own transition.
    Workflow,
    /// Temporal recovery repaired drift.
    Recovery,
}

/// Timestamp and origin of a status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    /// When the write happened.
    pub at: DateTime<Utc>,
    /// Who made it.
    pub origin: ChangeOrigin,
}

impl StatusChange {
    /// A write made by the orchestrator.
    #[must_use]
    pub const fn workflow(at: DateTime<Utc>) -> Self {
        Self {
            at,
            origin: ChangeOrigin::Workflow,
        }
    }

    /// A write made by recovery; sets the row's recovery marker.
    #[must_use]
    pub const fn recovery(at: DateTime<Utc>) -> Self {
        Self {
            at,
            origin: ChangeOrigin::Recovery,
        }
    }

    /// Whether this write should tag the row with `recovered_at`.
    #[must_use]
    pub const fn is_recovery(self) -> bool {
        matches!(self.origin, ChangeOrigin::Recovery)
    }
}

/// Current-state row of an Event aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Event id.
    pub id: AggregateId,
    /// Last projected status.
    pub status: EventStatus,
    /// Last status write.
    pub updated_at: DateTime<Utc>,
    /// Last time recovery rewrote the status.
    pub recovered_at: Option<DateTime<Utc>>,
}

/// Current-state row of a Ticket aggregate (a guest registration).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRecord {
    /// Guest (ticket) id.
    pub id: AggregateId,
    /// Parent event.
    pub event_id: AggregateId,
    /// Last projected status.
    pub status: TicketStatus,
    /// Last status write.
    pub updated_at: DateTime<Utc>,
    /// Last time recovery rewrote the status.
    pub recovered_at: Option<DateTime<Utc>>,
}

/// Storage for the current-state tables.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures so the read model can be shared as
/// `Arc<dyn ReadModel>`.
pub trait ReadModel: Send + Sync {
    /// Load an Event row.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the query fails.
    fn load_event(&self, id: AggregateId) -> ProjectionFuture<'_, Option<EventRecord>>;

    /// Load a Ticket row.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the query fails.
    fn load_ticket(&self, id: AggregateId) -> ProjectionFuture<'_, Option<TicketRecord>>;

    /// Overwrite an Event row's status.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such row
    /// - `Storage`: the update failed
    fn set_event_status(
        &self,
        id: AggregateId,
        status: EventStatus,
        change: StatusChange,
    ) -> ProjectionFuture<'_, ()>;

    /// Overwrite a Ticket row's status.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such row
    /// - `Storage`: the update failed
    fn set_ticket_status(
        &self,
        id: AggregateId,
        status: TicketStatus,
        change: StatusChange,
    ) -> ProjectionFuture<'_, ()>;

    /// Stored status of any aggregate that has a current-state table.
    ///
    /// # Errors
    ///
    /// - `Unsupported`: the aggregate type has no table
    /// - `Storage`: the query failed
    fn status_of(&self, aggregate: AggregateRef) -> ProjectionFuture<'_, Option<Status>> {
        Box::pin(async move {
            match aggregate.aggregate_type {
                AggregateType::Event => Ok(self
                    .load_event(aggregate.aggregate_id)
                    .await?
                    .map(|row| Status::Event(row.status))),
                AggregateType::Ticket => Ok(self
                    .load_ticket(aggregate.aggregate_id)
                    .await?
                    .map(|row| Status::Ticket(row.status))),
                other => Err(ProjectionError::Unsupported(other)),
            }
        })
    }

    /// Overwrite the status of whichever table `status` belongs to.
    ///
    /// # Errors
    ///
    /// Same as [`ReadModel::set_event_status`] and [`ReadModel::set_ticket_status`].
    fn set_status(
        &self,
        id: AggregateId,
        status: Status,
        change: StatusChange,
    ) -> ProjectionFuture<'_, ()> {
        match status {
            Status::Event(status) => self.set_event_status(id, status, change),
            Status::Ticket(status) => self.set_ticket_status(id, status, change),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_aggregate() {
        let error = ProjectionError::NotFound(AggregateRef::ticket("guest-9"));
        assert_eq!(error.to_string(), "Not found: ticket:guest-9");
    }

    #[test]
    fn recovery_changes_are_tagged() {
        let at = Utc::now();
        assert!(StatusChange::recovery(at).is_recovery());
        assert!(!StatusChange::workflow(at).is_recovery());
    }
}
