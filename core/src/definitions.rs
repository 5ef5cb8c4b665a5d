//! State machine definitions for the Event and Ticket lifecycles.
//!
//! This module is data only. Each lifecycle is a static table of
//! [`Transition`] rows `{ from, action, to, event_kind }`; a `(state, action)`
//! pair without a row is an illegal transition. Terminal states are simply states
//! that never appear in a `from` column.
//!
//! The same row decides three things: whether the action is legal, which state it
//! leads to, and which [`DomainEventKind`] records it. Querying the tables is the
//! job of [`crate::engine`].
//!
//! ```text
//! Ticket (staking path):
//!   pending ──request_approval──▶ pending_approval ──approve──▶ approved ──stake──▶ staked ──check_in──▶ checked_in
//! Ticket (free event):
//!   pending ──issue──▶ issued ──check_in──▶ checked_in
//! Event:
//!   draft ──publish──▶ published ──go_live──▶ live ──end──▶ ended ──archive──▶ archived
//! ```

use crate::event::DomainEventKind;
use crate::stream::AggregateType;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when parsing an unknown status or action name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {kind}: {value}")]
pub struct ParseLifecycleError {
    kind: &'static str,
    value: String,
}

impl ParseLifecycleError {
    pub(crate) fn unknown(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Generates `as_str`, `ALL`, `Display` and `FromStr` for a fieldless enum with
/// snake_case storage names.
macro_rules! named_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Storage / wire representation.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ParseLifecycleError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    _ => Err(ParseLifecycleError::unknown($kind, s)),
                }
            }
        }
    };
}

/// Lifecycle states of an Event aggregate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Being prepared by its host, not visible to guests.
    Draft,
    /// Visible and open for registration.
    Published,
    /// Currently happening; check-in is open.
    Live,
    /// Finished.
    Ended,
    /// Archived after ending (terminal).
    Archived,
    /// Called off (terminal).
    Cancelled,
}

named_enum!(EventStatus, "event status", {
    Draft => "draft",
    Published => "published",
    Live => "live",
    Ended => "ended",
    Archived => "archived",
    Cancelled => "cancelled",
});

/// Lifecycle states of a Ticket (guest registration) aggregate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Registered, nothing decided yet.
    Pending,
    /// Waiting for a host decision.
    PendingApproval,
    /// Accepted by the host, stake not yet posted.
    Approved,
    /// Declined by the host (terminal).
    Rejected,
    /// Issued without a stake (free events).
    Issued,
    /// Stake escrowed on-chain.
    Staked,
    /// Attended (terminal).
    CheckedIn,
    /// Attended, recorded through the legacy scanner path (terminal).
    Scanned,
    /// Stake kept after a no-show (terminal).
    Forfeited,
    /// Stake returned (terminal).
    Refunded,
    /// Withdrawn by the host (terminal).
    Revoked,
    /// Withdrawn before any stake was posted (terminal).
    Cancelled,
}

named_enum!(TicketStatus, "ticket status", {
    Pending => "pending",
    PendingApproval => "pending_approval",
    Approved => "approved",
    Rejected => "rejected",
    Issued => "issued",
    Staked => "staked",
    CheckedIn => "checked_in",
    Scanned => "scanned",
    Forfeited => "forfeited",
    Refunded => "refunded",
    Revoked => "revoked",
    Cancelled => "cancelled",
});

/// Actions that drive the Event lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// Make a draft visible.
    Publish,
    /// Open the doors.
    GoLive,
    /// Close the event.
    End,
    /// Archive an ended event.
    Archive,
    /// Call the event off.
    Cancel,
}

named_enum!(EventAction, "event action", {
    Publish => "publish",
    GoLive => "go_live",
    End => "end",
    Archive => "archive",
    Cancel => "cancel",
});

/// Actions that drive the Ticket lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketAction {
    /// Ask the host to approve the registration.
    RequestApproval,
    /// Host accepts.
    Approve,
    /// Host declines.
    Reject,
    /// Issue a ticket without a stake.
    Issue,
    /// Post the stake into escrow.
    Stake,
    /// Admit the guest.
    CheckIn,
    /// Legacy alias of `check_in`, lands in `scanned`.
    Scan,
    /// Keep the stake of a no-show.
    Forfeit,
    /// Return the stake.
    Refund,
    /// Host withdraws an issued ticket.
    Revoke,
    /// Guest withdraws.
    Cancel,
}

named_enum!(TicketAction, "ticket action", {
    RequestApproval => "request_approval",
    Approve => "approve",
    Reject => "reject",
    Issue => "issue",
    Stake => "stake",
    CheckIn => "check_in",
    Scan => "scan",
    Forfeit => "forfeit",
    Refund => "refund",
    Revoke => "revoke",
    Cancel => "cancel",
});

/// One legal edge of a lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition<S, A> {
    /// State the edge leaves.
    pub from: S,
    /// Action that triggers it.
    pub action: A,
    /// State the edge enters.
    pub to: S,
    /// Domain event recorded when the edge is taken.
    pub event_kind: DomainEventKind,
}

impl<S, A> Transition<S, A> {
    /// Declare an edge.
    #[must_use]
    pub const fn new(from: S, action: A, to: S, event_kind: DomainEventKind) -> Self {
        Self {
            from,
            action,
            to,
            event_kind,
        }
    }
}

/// A named, static transition table.
#[derive(Debug)]
pub struct StateMachine<S: 'static, A: 'static> {
    /// Human-readable table name, used in logs.
    pub name: &'static str,
    /// Every legal edge.
    pub transitions: &'static [Transition<S, A>],
}

/// A status enum that has a state machine attached.
///
/// Implemented by [`EventStatus`] and [`TicketStatus`]; lets the orchestrator and
/// recovery treat both lifecycles uniformly.
pub trait Lifecycle:
    Copy
    + Eq
    + Hash
    + fmt::Debug
    + fmt::Display
    + FromStr<Err = ParseLifecycleError>
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Action vocabulary of this lifecycle.
    type Action: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Aggregate kind whose status this is.
    const AGGREGATE: AggregateType;

    /// State a freshly created aggregate starts in.
    const INITIAL: Self;

    /// The transition table for this lifecycle.
    fn machine() -> &'static StateMachine<Self, Self::Action>;

    /// State recorded by a domain event of the given kind, if the kind belongs to
    /// this lifecycle.
    ///
    /// This mapping is keyed on event kinds only, never on actions, so an event
    /// stream can be folded even if the transition table changes shape.
    fn from_event_kind(kind: DomainEventKind) -> Option<Self>;

    /// Wrap into the kind-agnostic [`Status`].
    fn into_status(self) -> Status;
}

impl Lifecycle for EventStatus {
    type Action = EventAction;

    const AGGREGATE: AggregateType = AggregateType::Event;
    const INITIAL: Self = Self::Draft;

    fn machine() -> &'static StateMachine<Self, Self::Action> {
        &EVENT_MACHINE
    }

    fn from_event_kind(kind: DomainEventKind) -> Option<Self> {
        kind.event_status()
    }

    fn into_status(self) -> Status {
        Status::Event(self)
    }
}

impl Lifecycle for TicketStatus {
    type Action = TicketAction;

    const AGGREGATE: AggregateType = AggregateType::Ticket;
    const INITIAL: Self = Self::Pending;

    fn machine() -> &'static StateMachine<Self, Self::Action> {
        &TICKET_MACHINE
    }

    fn from_event_kind(kind: DomainEventKind) -> Option<Self> {
        kind.ticket_status()
    }

    fn into_status(self) -> Status {
        Status::Ticket(self)
    }
}

/// Status of either lifecycle, for reporting across aggregate kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "aggregateType", content = "status", rename_all = "snake_case")]
pub enum Status {
    /// Status of an Event aggregate.
    Event(EventStatus),
    /// Status of a Ticket aggregate.
    Ticket(TicketStatus),
}

impl Status {
    /// Aggregate kind this status belongs to.
    #[must_use]
    pub const fn aggregate_type(self) -> AggregateType {
        match self {
            Self::Event(_) => AggregateType::Event,
            Self::Ticket(_) => AggregateType::Ticket,
        }
    }

    /// Storage representation of the inner status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Event(status) => status.as_str(),
            Self::Ticket(status) => status.as_str(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use DomainEventKind as K;
use EventAction as EA;
use EventStatus as ES;
use TicketAction as TA;
use TicketStatus as TS;

/// Event lifecycle table.
pub static EVENT_MACHINE: StateMachine<EventStatus, EventAction> = StateMachine {
    name: "event",
    transitions: &[
        Transition::new(ES::Draft, EA::Publish, ES::Published, K::EventPublished),
        Transition::new(ES::Draft, EA::Cancel, ES::Cancelled, K::EventCancelled),
        Transition::new(ES::Published, EA::GoLive, ES::Live, K::EventWentLive),
        Transition::new(ES::Published, EA::Cancel, ES::Cancelled, K::EventCancelled),
        Transition::new(ES::Live, EA::End, ES::Ended, K::EventEnded),
        Transition::new(ES::Live, EA::Cancel, ES::Cancelled, K::EventCancelled),
        Transition::new(ES::Ended, EA::Archive, ES::Archived, K::EventArchived),
    ],
};

/// Ticket lifecycle table.
///
/// Cancelling a staked ticket lands in `refunded`, not `cancelled`: the stake is
/// already escrowed and has to be returned. `scan` mirrors `check_in` from both
/// `issued` and `staked` but records the separate `scanned` state kept for rows
/// written by the legacy scanner.
pub static TICKET_MACHINE: StateMachine<TicketStatus, TicketAction> = StateMachine {
    name: "ticket",
    transitions: &[
        Transition::new(TS::Pending, TA::RequestApproval, TS::PendingApproval, K::TicketApprovalRequested),
        Transition::new(TS::Pending, TA::Issue, TS::Issued, K::TicketIssued),
        Transition::new(TS::Pending, TA::Cancel, TS::Cancelled, K::TicketCancelled),
        Transition::new(TS::PendingApproval, TA::Approve, TS::Approved, K::TicketApproved),
        Transition::new(TS::PendingApproval, TA::Reject, TS::Rejected, K::TicketRejected),
        Transition::new(TS::PendingApproval, TA::Cancel, TS::Cancelled, K::TicketCancelled),
        Transition::new(TS::Approved, TA::Stake, TS::Staked, K::TicketStaked),
        Transition::new(TS::Approved, TA::Issue, TS::Issued, K::TicketIssued),
        Transition::new(TS::Approved, TA::Cancel, TS::Cancelled, K::TicketCancelled),
        Transition::new(TS::Issued, TA::CheckIn, TS::CheckedIn, K::TicketCheckedIn),
        Transition::new(TS::Issued, TA::Scan, TS::Scanned, K::TicketScanned),
        Transition::new(TS::Issued, TA::Revoke, TS::Revoked, K::TicketRevoked),
        Transition::new(TS::Issued, TA::Cancel, TS::Cancelled, K::TicketCancelled),
        Transition::new(TS::Staked, TA::CheckIn, TS::CheckedIn, K::TicketCheckedIn),
        Transition::new(TS::Staked, TA::Scan, TS::Scanned, K::TicketScanned),
        Transition::new(TS::Staked, TA::Forfeit, TS::Forfeited, K::TicketForfeited),
        Transition::new(TS::Staked, TA::Refund, TS::Refunded, K::TicketRefunded),
        Transition::new(TS::Staked, TA::Cancel, TS::Refunded, K::TicketRefunded),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn assert_rows_agree_with_fold<S: Lifecycle>() {
        for row in S::machine().transitions {
            assert_eq!(
                S::from_event_kind(row.event_kind),
                Some(row.to),
                "{} --{}--> {} is recorded as {} which folds elsewhere",
                row.from,
                row.action,
                row.to,
                row.event_kind
            );
        }
    }

    fn assert_no_duplicate_edges<S: Lifecycle>() {
        let mut seen = HashSet::new();
        for row in S::machine().transitions {
            assert!(
                seen.insert((row.from, row.action)),
                "duplicate edge {} --{}-->",
                row.from,
                row.action
            );
        }
    }

    #[test]
    fn every_event_row_folds_to_its_target_state() {
        assert_rows_agree_with_fold::<EventStatus>();
    }

    #[test]
    fn every_ticket_row_folds_to_its_target_state() {
        assert_rows_agree_with_fold::<TicketStatus>();
    }

    #[test]
    fn tables_have_no_duplicate_edges() {
        assert_no_duplicate_edges::<EventStatus>();
        assert_no_duplicate_edges::<TicketStatus>();
    }

    #[test]
    fn status_names_round_trip() {
        for status in TicketStatus::ALL {
            assert_eq!(status.as_str().parse::<TicketStatus>(), Ok(*status));
        }
        for status in EventStatus::ALL {
            assert_eq!(status.as_str().parse::<EventStatus>(), Ok(*status));
        }
    }

    #[test]
    fn action_names_match_serde() {
        for action in TicketAction::ALL {
            let json = serde_json::to_string(action).unwrap_or_default();
            assert_eq!(json, format!("\"{action}\""));
        }
    }

    #[test]
    fn unknown_status_is_reported() {
        let err = "teleported".parse::<TicketStatus>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown ticket status: teleported");
    }

    #[test]
    fn status_reports_its_aggregate() {
        assert_eq!(
            Status::Ticket(TicketStatus::Staked).aggregate_type(),
            AggregateType::Ticket
        );
        assert_eq!(Status::Event(EventStatus::Live).to_string(), "live");
    }
}
