//! Ready-made domain events and envelopes, all stamped with [`test_clock`] time.

use crate::mocks::test_clock;
use chrono::{DateTime, Utc};
use ticketflow_core::envelope::{DomainEventEnvelope, MetadataInput};
use ticketflow_core::environment::Clock;
use ticketflow_core::event::{DomainEvent, DomainEventKind};
use ticketflow_core::stream::{AggregateId, Version};

/// Correlation id used by [`stream`].
pub const FIXTURE_CORRELATION_ID: &str = "fixture-correlation";

/// The fixed instant every fixture uses.
#[must_use]
pub fn at() -> DateTime<Utc> {
    test_clock().now()
}

/// `EVENT_CREATED` for `event_id`.
#[must_use]
pub fn event_created(event_id: &str) -> DomainEvent {
    DomainEvent::EventCreated {
        event_id: AggregateId::new(event_id),
        calendar_id: None,
        created_at: at(),
    }
}

/// `EVENT_PUBLISHED` for `event_id`.
#[must_use]
pub fn event_published(event_id: &str) -> DomainEvent {
    DomainEvent::EventPublished {
        event_id: AggregateId::new(event_id),
        published_at: at(),
    }
}

/// `EVENT_WENT_LIVE` for `event_id`.
#[must_use]
pub fn event_went_live(event_id: &str) -> DomainEvent {
    DomainEvent::EventWentLive {
        event_id: AggregateId::new(event_id),
        started_at: at(),
    }
}

/// `EVENT_ENDED` for `event_id`.
#[must_use]
pub fn event_ended(event_id: &str) -> DomainEvent {
    DomainEvent::EventEnded {
        event_id: AggregateId::new(event_id),
        ended_at: at(),
    }
}

/// `EVENT_CANCELLED` for `event_id`.
#[must_use]
pub fn event_cancelled(event_id: &str) -> DomainEvent {
    DomainEvent::EventCancelled {
        event_id: AggregateId::new(event_id),
        cancelled_at: at(),
        reason: None,
    }
}

/// `TICKET_REGISTERED` for `guest_id` at `event_id`.
#[must_use]
pub fn ticket_registered(guest_id: &str, event_id: &str) -> DomainEvent {
    DomainEvent::TicketRegistered {
        guest_id: AggregateId::new(guest_id),
        event_id: AggregateId::new(event_id),
        user_id: None,
        registered_at: at(),
    }
}

/// `TICKET_APPROVAL_REQUESTED`.
#[must_use]
pub fn ticket_approval_requested(guest_id: &str, event_id: &str) -> DomainEvent {
    DomainEvent::TicketApprovalRequested {
        guest_id: AggregateId::new(guest_id),
        event_id: AggregateId::new(event_id),
        requested_at: at(),
    }
}

/// `TICKET_APPROVED`.
#[must_use]
pub fn ticket_approved(guest_id: &str, event_id: &str) -> DomainEvent {
    DomainEvent::TicketApproved {
        guest_id: AggregateId::new(guest_id),
        event_id: AggregateId::new(event_id),
        approved_at: at(),
        approved_by: None,
    }
}

/// `TICKET_ISSUED`.
#[must_use]
pub fn ticket_issued(guest_id: &str, event_id: &str) -> DomainEvent {
    DomainEvent::TicketIssued {
        guest_id: AggregateId::new(guest_id),
        event_id: AggregateId::new(event_id),
        issued_at: at(),
    }
}

/// `TICKET_STAKED` with a 0.05 stake.
#[must_use]
pub fn ticket_staked(guest_id: &str, event_id: &str) -> DomainEvent {
    DomainEvent::TicketStaked {
        guest_id: AggregateId::new(guest_id),
        event_id: AggregateId::new(event_id),
        amount: 0.05,
        tx_hash: "0xabc123".to_string(),
        chain: Some("base".to_string()),
        currency: Some("ETH".to_string()),
        wallet_address: None,
        staked_at: at(),
    }
}

/// `TICKET_CHECKED_IN`.
#[must_use]
pub fn ticket_checked_in(guest_id: &str, event_id: &str) -> DomainEvent {
    DomainEvent::TicketCheckedIn {
        guest_id: AggregateId::new(guest_id),
        event_id: AggregateId::new(event_id),
        checked_in_at: at(),
        checked_in_by: None,
    }
}

/// `TICKET_CANCELLED`.
#[must_use]
pub fn ticket_cancelled(guest_id: &str, event_id: &str) -> DomainEvent {
    DomainEvent::TicketCancelled {
        guest_id: AggregateId::new(guest_id),
        event_id: AggregateId::new(event_id),
        cancelled_at: at(),
        reason: None,
    }
}

/// `PAYMENT_RECEIVED` for a ticket purchase.
#[must_use]
pub fn payment_received(payment_id: &str, guest_id: &str) -> DomainEvent {
    DomainEvent::PaymentReceived {
        payment_id: AggregateId::new(payment_id),
        guest_id: Some(AggregateId::new(guest_id)),
        amount: 25.0,
        currency: "USD".to_string(),
        received_at: at(),
    }
}

/// Any event of `kind` for aggregate `id`, with placeholder values.
///
/// Ticket events use `id` as the guest and `evt-1` as the parent event; payment
/// events use `id` as the payment and `guest-1` as the guest.
#[must_use]
pub fn event_of_kind(kind: DomainEventKind, id: &str) -> DomainEvent {
    let aggregate_id = AggregateId::new(id);
    let parent = AggregateId::new("evt-1");
    let guest = AggregateId::new("guest-1");
    match kind {
        DomainEventKind::EventCreated => event_created(id),
        DomainEventKind::EventPublished => event_published(id),
        DomainEventKind::EventWentLive => event_went_live(id),
        DomainEventKind::EventEnded => event_ended(id),
        DomainEventKind::EventArchived => DomainEvent::EventArchived {
            event_id: aggregate_id,
            archived_at: at(),
        },
        DomainEventKind::EventCancelled => event_cancelled(id),
        DomainEventKind::TicketRegistered => ticket_registered(id, parent.as_str()),
        DomainEventKind::TicketApprovalRequested => ticket_approval_requested(id, parent.as_str()),
        DomainEventKind::TicketApproved => ticket_approved(id, parent.as_str()),
        DomainEventKind::TicketRejected => DomainEvent::TicketRejected {
            guest_id: aggregate_id,
            event_id: parent,
            rejected_at: at(),
            reason: None,
        },
        DomainEventKind::TicketIssued => ticket_issued(id, parent.as_str()),
        DomainEventKind::TicketStaked => ticket_staked(id, parent.as_str()),
        DomainEventKind::TicketCheckedIn => ticket_checked_in(id, parent.as_str()),
        DomainEventKind::TicketScanned => DomainEvent::TicketScanned {
            guest_id: aggregate_id,
            event_id: parent,
            scanned_at: at(),
            scanned_by: None,
        },
        DomainEventKind::TicketForfeited => DomainEvent::TicketForfeited {
            guest_id: aggregate_id,
            event_id: parent,
            forfeited_at: at(),
        },
        DomainEventKind::TicketRefunded => DomainEvent::TicketRefunded {
            guest_id: aggregate_id,
            event_id: parent,
            refunded_at: at(),
            reason: None,
        },
        DomainEventKind::TicketRevoked => DomainEvent::TicketRevoked {
            guest_id: aggregate_id,
            event_id: parent,
            revoked_at: at(),
            reason: None,
        },
        DomainEventKind::TicketCancelled => ticket_cancelled(id, parent.as_str()),
        DomainEventKind::PaymentReceived => payment_received(id, guest.as_str()),
        DomainEventKind::EscrowReleased => DomainEvent::EscrowReleased {
            payment_id: aggregate_id,
            guest_id: guest,
            amount: 0.05,
            tx_hash: None,
            released_at: at(),
        },
        DomainEventKind::EscrowRefunded => DomainEvent::EscrowRefunded {
            payment_id: aggregate_id,
            guest_id: guest,
            amount: 0.05,
            tx_hash: None,
            refunded_at: at(),
        },
    }
}

/// Wrap `event` at `version` with default metadata.
#[must_use]
pub fn envelope(event: DomainEvent, version: u64) -> DomainEventEnvelope {
    DomainEventEnvelope::new(
        event,
        Version::new(version),
        MetadataInput::default().complete(at()),
    )
}

/// Number `events` as one gapless stream starting at version 1, sharing
/// [`FIXTURE_CORRELATION_ID`].
#[must_use]
pub fn stream(events: Vec<DomainEvent>) -> Vec<DomainEventEnvelope> {
    events
        .into_iter()
        .zip(1_u64..)
        .map(|(event, version)| {
            DomainEventEnvelope::new(
                event,
                Version::new(version),
                MetadataInput {
                    correlation_id: Some(FIXTURE_CORRELATION_ID.to_string()),
                    ..MetadataInput::default()
                }
                .complete(at()),
            )
        })
        .collect()
}
