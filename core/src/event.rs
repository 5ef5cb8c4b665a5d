//! Domain event vocabulary.
//!
//! A [`DomainEvent`] is an immutable fact about something that happened to one
//! aggregate. The set of events is closed: every kind is a variant here and has a
//! matching [`DomainEventKind`]. Names are namespaced by aggregate (`EVENT_*`,
//! `TICKET_*`, `PAYMENT_*` / `ESCROW_*`).
//!
//! On the wire an event is `{ "type": "TICKET_STAKED", "payload": { ... } }` with
//! camelCase payload fields:
//!
//! ```
//! use ticketflow_core::event::DomainEvent;
//!
//! let json = serde_json::json!({
//!     "type": "TICKET_CHECKED_IN",
//!     "payload": {
//!         "guestId": "guest-1",
//!         "eventId": "evt-1",
//!         "checkedInAt": "2025-01-01T18:00:00Z"
//!     }
//! });
//! let event: DomainEvent = serde_json::from_value(json).unwrap();
//! assert_eq!(event.event_type(), "TICKET_CHECKED_IN");
//! assert_eq!(event.aggregate().to_string(), "ticket:guest-1");
//! ```

use crate::definitions::{EventStatus, ParseLifecycleError, TicketStatus};
use crate::stream::{AggregateId, AggregateRef, AggregateType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Discriminant of [`DomainEvent`], usable without a payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainEventKind {
    /// `EVENT_CREATED`
    EventCreated,
    /// `EVENT_PUBLISHED`
    EventPublished,
    /// `EVENT_WENT_LIVE`
    EventWentLive,
    /// `EVENT_ENDED`
    EventEnded,
    /// `EVENT_ARCHIVED`
    EventArchived,
    /// `EVENT_CANCELLED`
    EventCancelled,
    /// `TICKET_REGISTERED`
    TicketRegistered,
    /// `TICKET_APPROVAL_REQUESTED`
    TicketApprovalRequested,
    /// `TICKET_APPROVED`
    TicketApproved,
    /// `TICKET_REJECTED`
    TicketRejected,
    /// `TICKET_ISSUED`
    TicketIssued,
    /// `TICKET_STAKED`
    TicketStaked,
    /// `TICKET_CHECKED_IN`
    TicketCheckedIn,
    /// `TICKET_SCANNED`
    TicketScanned,
    /// `TICKET_FORFEITED`
    TicketForfeited,
    /// `TICKET_REFUNDED`
    TicketRefunded,
    /// `TICKET_REVOKED`
    TicketRevoked,
    /// `TICKET_CANCELLED`
    TicketCancelled,
    /// `PAYMENT_RECEIVED`
    PaymentReceived,
    /// `ESCROW_RELEASED`
    EscrowReleased,
    /// `ESCROW_REFUNDED`
    EscrowRefunded,
}

impl DomainEventKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 21] = [
        Self::EventCreated,
        Self::EventPublished,
        Self::EventWentLive,
        Self::EventEnded,
        Self::EventArchived,
        Self::EventCancelled,
        Self::TicketRegistered,
        Self::TicketApprovalRequested,
        Self::TicketApproved,
        Self::TicketRejected,
        Self::TicketIssued,
        Self::TicketStaked,
        Self::TicketCheckedIn,
        Self::TicketScanned,
        Self::TicketForfeited,
        Self::TicketRefunded,
        Self::TicketRevoked,
        Self::TicketCancelled,
        Self::PaymentReceived,
        Self::EscrowReleased,
        Self::EscrowRefunded,
    ];

    /// Stable event type name, e.g. `"TICKET_STAKED"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EventCreated => "EVENT_CREATED",
            Self::EventPublished => "EVENT_PUBLISHED",
            Self::EventWentLive => "EVENT_WENT_LIVE",
            Self::EventEnded => "EVENT_ENDED",
            Self::EventArchived => "EVENT_ARCHIVED",
            Self::EventCancelled => "EVENT_CANCELLED",
            Self::TicketRegistered => "TICKET_REGISTERED",
            Self::TicketApprovalRequested => "TICKET_APPROVAL_REQUESTED",
            Self::TicketApproved => "TICKET_APPROVED",
            Self::TicketRejected => "TICKET_REJECTED",
            Self::TicketIssued => "TICKET_ISSUED",
            Self::TicketStaked => "TICKET_STAKED",
            Self::TicketCheckedIn => "TICKET_CHECKED_IN",
            Self::TicketScanned => "TICKET_SCANNED",
            Self::TicketForfeited => "TICKET_FORFEITED",
            Self::TicketRefunded => "TICKET_REFUNDED",
            Self::TicketRevoked => "TICKET_REVOKED",
            Self::TicketCancelled => "TICKET_CANCELLED",
            Self::PaymentReceived => "PAYMENT_RECEIVED",
            Self::EscrowReleased => "ESCROW_RELEASED",
            Self::EscrowRefunded => "ESCROW_REFUNDED",
        }
    }

    /// Aggregate kind whose stream carries events of this kind.
    #[must_use]
    pub const fn aggregate_type(self) -> AggregateType {
        match self {
            Self::EventCreated
            | Self::EventPublished
            | Self::EventWentLive
            | Self::EventEnded
            | Self::EventArchived
            | Self::EventCancelled => AggregateType::Event,
            Self::PaymentReceived | Self::EscrowReleased | Self::EscrowRefunded => {
                AggregateType::Payment
            },
            _ => AggregateType::Ticket,
        }
    }

    /// Event status recorded by this kind (event-sourced derivation).
    #[must_use]
    pub const fn event_status(self) -> Option<EventStatus> {
        match self {
            Self::EventCreated => Some(EventStatus::Draft),
            Self::EventPublished => Some(EventStatus::Published),
            Self::EventWentLive => Some(EventStatus::Live),
            Self::EventEnded => Some(EventStatus::Ended),
            Self::EventArchived => Some(EventStatus::Archived),
            Self::EventCancelled => Some(EventStatus::Cancelled),
            _ => None,
        }
    }

    /// Ticket status recorded by this kind (event-sourced derivation).
    #[must_use]
    pub const fn ticket_status(self) -> Option<TicketStatus> {
        match self {
            Self::TicketRegistered => Some(TicketStatus::Pending),
            Self::TicketApprovalRequested => Some(TicketStatus::PendingApproval),
            Self::TicketApproved => Some(TicketStatus::Approved),
            Self::TicketRejected => Some(TicketStatus::Rejected),
            Self::TicketIssued => Some(TicketStatus::Issued),
            Self::TicketStaked => Some(TicketStatus::Staked),
            Self::TicketCheckedIn => Some(TicketStatus::CheckedIn),
            Self::TicketScanned => Some(TicketStatus::Scanned),
            Self::TicketForfeited => Some(TicketStatus::Forfeited),
            Self::TicketRefunded => Some(TicketStatus::Refunded),
            Self::TicketRevoked => Some(TicketStatus::Revoked),
            Self::TicketCancelled => Some(TicketStatus::Cancelled),
            _ => None,
        }
    }

    /// Dispatch channel name: `app/<event_type lowercased>`.
    #[must_use]
    pub fn topic(self) -> String {
        format!("app/{}", self.as_str().to_lowercase())
    }
}

impl fmt::Display for DomainEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DomainEventKind {
    type Err = ParseLifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseLifecycleError::unknown("event type", s))
    }
}

/// An immutable fact about one aggregate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum DomainEvent {
    /// A draft event was created.
    EventCreated {
        /// Event id.
        event_id: AggregateId,
        /// Owning calendar, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        calendar_id: Option<String>,
        /// Creation time.
        created_at: DateTime<Utc>,
    },
    /// The event became visible.
    EventPublished {
        /// Event id.
        event_id: AggregateId,
        /// Publication time.
        published_at: DateTime<Utc>,
    },
    /// The event started; check-in is open.
    EventWentLive {
        /// Event id.
        event_id: AggregateId,
        /// Start time.
        started_at: DateTime<Utc>,
    },
    /// The event finished.
    EventEnded {
        /// Event id.
        event_id: AggregateId,
        /// End time.
        ended_at: DateTime<Utc>,
    },
    /// The event was archived.
    EventArchived {
        /// Event id.
        event_id: AggregateId,
        /// Archive time.
        archived_at: DateTime<Utc>,
    },
    /// The event was called off.
    EventCancelled {
        /// Event id.
        event_id: AggregateId,
        /// Cancellation time.
        cancelled_at: DateTime<Utc>,
        /// Reason given by the host.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// A guest registered.
    TicketRegistered {
        /// Guest (ticket) id.
        guest_id: AggregateId,
        /// Parent event id.
        event_id: AggregateId,
        /// Registering user, if known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        /// Registration time.
        registered_at: DateTime<Utc>,
    },
    /// The guest asked for approval.
    TicketApprovalRequested {
        /// Guest (ticket) id.
        guest_id: AggregateId,
        /// Parent event id.
        event_id: AggregateId,
        /// Request time.
        requested_at: DateTime<Utc>,
    },
    /// The host approved the guest.
    TicketApproved {
        /// Guest (ticket) id.
        guest_id: AggregateId,
        /// Parent event id.
        event_id: AggregateId,
        /// Approval time.
        approved_at: DateTime<Utc>,
        /// Approving host.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        approved_by: Option<String>,
    },
    /// The host declined the guest.
    TicketRejected {
        /// Guest (ticket) id.
        guest_id: AggregateId,
        /// Parent event id.
        event_id: AggregateId,
        /// Rejection time.
        rejected_at: DateTime<Utc>,
        /// Reason given by the host.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// A ticket was issued without a stake.
    TicketIssued {
        /// Guest (ticket) id.
        guest_id: AggregateId,
        /// Parent event id.
        event_id: AggregateId,
        /// Issue time.
        issued_at: DateTime<Utc>,
    },
    /// The guest posted a stake into escrow.
    TicketStaked {
        /// Guest (ticket) id.
        guest_id: AggregateId,
        /// Parent event id.
        event_id: AggregateId,
        /// Staked amount in `currency` units.
        amount: f64,
        /// Transaction hash of the escrow deposit.
        tx_hash: String,
        /// Chain the deposit was made on.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chain: Option<String>,
        /// Currency or token symbol.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        currency: Option<String>,
        /// Depositing wallet.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        wallet_address: Option<String>,
        /// Stake time.
        staked_at: DateTime<Utc>,
    },
    /// The guest was admitted.
    TicketCheckedIn {
        /// Guest (ticket) id.
        guest_id: AggregateId,
        /// Parent event id.
        event_id: AggregateId,
        /// Admission time.
        checked_in_at: DateTime<Utc>,
        /// Staff member who admitted the guest.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checked_in_by: Option<String>,
    },
    /// The guest was admitted through the legacy scanner.
    TicketScanned {
        /// Guest (ticket) id.
        guest_id: AggregateId,
        /// Parent event id.
        event_id: AggregateId,
        /// Scan time.
        scanned_at: DateTime<Utc>,
        /// Scanner operator.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scanned_by: Option<String>,
    },
    /// A no-show's stake was kept.
    TicketForfeited {
        /// Guest (ticket) id.
        guest_id: AggregateId,
        /// Parent event id.
        event_id: AggregateId,
        /// Forfeit time.
        forfeited_at: DateTime<Utc>,
    },
    /// The stake was returned.
    TicketRefunded {
        /// Guest (ticket) id.
        guest_id: AggregateId,
        /// Parent event id.
        event_id: AggregateId,
        /// Refund time.
        refunded_at: DateTime<Utc>,
        /// Why the stake is returned.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// The host withdrew an issued ticket.
    TicketRevoked {
        /// Guest (ticket) id.
        guest_id: AggregateId,
        /// Parent event id.
        event_id: AggregateId,
        /// Revocation time.
        revoked_at: DateTime<Utc>,
        /// Reason given by the host.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// The guest withdrew before staking.
    TicketCancelled {
        /// Guest (ticket) id.
        guest_id: AggregateId,
        /// Parent event id.
        event_id: AggregateId,
        /// Cancellation time.
        cancelled_at: DateTime<Utc>,
        /// Reason given by the guest.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// A payment provider confirmed funds.
    PaymentReceived {
        /// Payment id.
        payment_id: AggregateId,
        /// Paying guest, if tied to a ticket.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guest_id: Option<AggregateId>,
        /// Amount received.
        amount: f64,
        /// Currency or token symbol.
        currency: String,
        /// Receipt time.
        received_at: DateTime<Utc>,
    },
    /// Escrowed funds went back to the guest after attendance.
    EscrowReleased {
        /// Payment id.
        payment_id: AggregateId,
        /// Guest whose stake was released.
        guest_id: AggregateId,
        /// Released amount.
        amount: f64,
        /// Release transaction hash.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tx_hash: Option<String>,
        /// Release time.
        released_at: DateTime<Utc>,
    },
    /// Escrowed funds were refunded.
    EscrowRefunded {
        /// Payment id.
        payment_id: AggregateId,
        /// Guest whose stake was refunded.
        guest_id: AggregateId,
        /// Refunded amount.
        amount: f64,
        /// Refund transaction hash.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tx_hash: Option<String>,
        /// Refund time.
        refunded_at: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Discriminant of this event.
    #[must_use]
    pub const fn kind(&self) -> DomainEventKind {
        use DomainEventKind as K;
        match self {
            Self::EventCreated { .. } => K::EventCreated,
            Self::EventPublished { .. } => K::EventPublished,
            Self::EventWentLive { .. } => K::EventWentLive,
            Self::EventEnded { .. } => K::EventEnded,
            Self::EventArchived { .. } => K::EventArchived,
            Self::EventCancelled { .. } => K::EventCancelled,
            Self::TicketRegistered { .. } => K::TicketRegistered,
            Self::TicketApprovalRequested { .. } => K::TicketApprovalRequested,
            Self::TicketApproved { .. } => K::TicketApproved,
            Self::TicketRejected { .. } => K::TicketRejected,
            Self::TicketIssued { .. } => K::TicketIssued,
            Self::TicketStaked { .. } => K::TicketStaked,
            Self::TicketCheckedIn { .. } => K::TicketCheckedIn,
            Self::TicketScanned { .. } => K::TicketScanned,
            Self::TicketForfeited { .. } => K::TicketForfeited,
            Self::TicketRefunded { .. } => K::TicketRefunded,
            Self::TicketRevoked { .. } => K::TicketRevoked,
            Self::TicketCancelled { .. } => K::TicketCancelled,
            Self::PaymentReceived { .. } => K::PaymentReceived,
            Self::EscrowReleased { .. } => K::EscrowReleased,
            Self::EscrowRefunded { .. } => K::EscrowRefunded,
        }
    }

    /// Stable type name, e.g. `"TICKET_STAKED"`.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        self.kind().as_str()
    }

    /// The aggregate this event belongs to.
    ///
    /// Payment and escrow facts belong to their payment; anything carrying a
    /// `guest_id` belongs to that ticket; the rest belong to their event.
    #[must_use]
    pub fn aggregate(&self) -> AggregateRef {
        match self {
            Self::PaymentReceived { payment_id, .. }
            | Self::EscrowReleased { payment_id, .. }
            | Self::EscrowRefunded { payment_id, .. } => AggregateRef::payment(payment_id.clone()),
            Self::TicketRegistered { guest_id, .. }
            | Self::TicketApprovalRequested { guest_id, .. }
            | Self::TicketApproved { guest_id, .. }
            | Self::TicketRejected { guest_id, .. }
            | Self::TicketIssued { guest_id, .. }
            | Self::TicketStaked { guest_id, .. }
            | Self::TicketCheckedIn { guest_id, .. }
            | Self::TicketScanned { guest_id, .. }
            | Self::TicketForfeited { guest_id, .. }
            | Self::TicketRefunded { guest_id, .. }
            | Self::TicketRevoked { guest_id, .. }
            | Self::TicketCancelled { guest_id, .. } => AggregateRef::ticket(guest_id.clone()),
            Self::EventCreated { event_id, .. }
            | Self::EventPublished { event_id, .. }
            | Self::EventWentLive { event_id, .. }
            | Self::EventEnded { event_id, .. }
            | Self::EventArchived { event_id, .. }
            | Self::EventCancelled { event_id, .. } => AggregateRef::event(event_id.clone()),
        }
    }
}

/// Classify an untyped payload by its shape.
///
/// Used by dispatch consumers that only see JSON: a `paymentId` marks a payment,
/// a `guestId` a ticket, a bare `eventId` an event.
#[must_use]
pub fn classify_payload(payload: &serde_json::Value) -> Option<AggregateRef> {
    let field = |name: &str| payload.get(name).and_then(serde_json::Value::as_str);

    if let Some(id) = field("paymentId") {
        Some(AggregateRef::payment(id))
    } else if let Some(id) = field("guestId") {
        Some(AggregateRef::ticket(id))
    } else {
        field("eventId").map(AggregateRef::event)
    }
}
