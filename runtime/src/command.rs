//! Workflow commands: the closed set of requests the orchestrator accepts.
//!
//! On the wire a command is a flat JSON object:
//!
//! ```json
//! {
//!   "name": "CHECK_IN_TICKET",
//!   "payload": { "guestId": "guest-1", "eventId": "evt-1" },
//!   "actorType": "user",
//!   "actorId": "staff-7",
//!   "correlationId": "req-42"
//! }
//! ```
//!
//! Each name maps to exactly one lifecycle action; the mapping lives in
//! [`Command::action`] and nowhere else.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use ticketflow_core::definitions::{EventAction, TicketAction};
use ticketflow_core::envelope::{Actor, ActorType, MetadataInput};
use ticketflow_core::stream::{AggregateId, AggregateRef};
use thiserror::Error;

/// Payload of every Event command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    /// Target event.
    pub event_id: AggregateId,
    /// Free-text reason (used by cancellation).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Payload of most Ticket commands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketPayload {
    /// Target ticket (guest registration).
    pub guest_id: AggregateId,
    /// Parent event as the caller believes it to be; checked against the
    /// stored parent when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<AggregateId>,
    /// Free-text reason (rejection, refund, revocation, cancellation).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Payload of `STAKE_TICKET`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakePayload {
    /// Target ticket.
    pub guest_id: AggregateId,
    /// Parent event as the caller believes it to be.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<AggregateId>,
    /// Amount escrowed.
    pub amount: f64,
    /// On-chain transaction hash of the escrow deposit.
    pub tx_hash: String,
    /// Chain the deposit was made on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<String>,
    /// Currency or token symbol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Depositing wallet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
}

/// A lifecycle command with its typed payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// `draft → published`.
    PublishEvent(EventPayload),
    /// `published → live`.
    StartEvent(EventPayload),
    /// `live → ended`.
    EndEvent(EventPayload),
    /// `ended → archived`.
    ArchiveEvent(EventPayload),
    /// Cancel an event that has not ended.
    CancelEvent(EventPayload),
    /// Ask the host to approve a registration.
    RequestApproval(TicketPayload),
    /// Approve a pending registration.
    ApproveTicket(TicketPayload),
    /// Reject a pending registration.
    RejectTicket(TicketPayload),
    /// Issue a ticket (free events, or approved without stake).
    IssueTicket(TicketPayload),
    /// Record an escrow stake.
    StakeTicket(StakePayload),
    /// Check a guest in at the door.
    CheckInTicket(TicketPayload),
    /// Legacy QR scan; behaves like check-in but ends in `scanned`.
    ScanTicket(TicketPayload),
    /// Forfeit a stake (no-show).
    ForfeitTicket(TicketPayload),
    /// Refund a stake.
    RefundTicket(TicketPayload),
    /// Revoke an issued ticket.
    RevokeTicket(TicketPayload),
    /// Cancel a ticket; a staked ticket is refunded instead.
    CancelTicket(TicketPayload),
}

/// The lifecycle action a command performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandAction {
    /// An Event lifecycle action.
    Event(EventAction),
    /// A Ticket lifecycle action.
    Ticket(TicketAction),
}

impl fmt::Display for CommandAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event(action) => fmt::Display::fmt(action, f),
            Self::Ticket(action) => fmt::Display::fmt(action, f),
        }
    }
}

impl Command {
    /// Every command name, in declaration order.
    pub const NAMES: [&'static str; 16] = [
        "PUBLISH_EVENT",
        "START_EVENT",
        "END_EVENT",
        "ARCHIVE_EVENT",
        "CANCEL_EVENT",
        "REQUEST_APPROVAL",
        "APPROVE_TICKET",
        "REJECT_TICKET",
        "ISSUE_TICKET",
        "STAKE_TICKET",
        "CHECK_IN_TICKET",
        "SCAN_TICKET",
        "FORFEIT_TICKET",
        "REFUND_TICKET",
        "REVOKE_TICKET",
        "CANCEL_TICKET",
    ];

    /// Wire name of the command.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PublishEvent(_) => "PUBLISH_EVENT",
            Self::StartEvent(_) => "START_EVENT",
            Self::EndEvent(_) => "END_EVENT",
            Self::ArchiveEvent(_) => "ARCHIVE_EVENT",
            Self::CancelEvent(_) => "CANCEL_EVENT",
            Self::RequestApproval(_) => "REQUEST_APPROVAL",
            Self::ApproveTicket(_) => "APPROVE_TICKET",
            Self::RejectTicket(_) => "REJECT_TICKET",
            Self::IssueTicket(_) => "ISSUE_TICKET",
            Self::StakeTicket(_) => "STAKE_TICKET",
            Self::CheckInTicket(_) => "CHECK_IN_TICKET",
            Self::ScanTicket(_) => "SCAN_TICKET",
            Self::ForfeitTicket(_) => "FORFEIT_TICKET",
            Self::RefundTicket(_) => "REFUND_TICKET",
            Self::RevokeTicket(_) => "REVOKE_TICKET",
            Self::CancelTicket(_) => "CANCEL_TICKET",
        }
    }

    /// The lifecycle action this command performs.
    #[must_use]
    pub const fn action(&self) -> CommandAction {
        use CommandAction::{Event, Ticket};
        match self {
            Self::PublishEvent(_) => Event(EventAction::Publish),
            Self::StartEvent(_) => Event(EventAction::GoLive),
            Self::EndEvent(_) => Event(EventAction::End),
            Self::ArchiveEvent(_) => Event(EventAction::Archive),
            Self::CancelEvent(_) => Event(EventAction::Cancel),
            Self::RequestApproval(_) => Ticket(TicketAction::RequestApproval),
            Self::ApproveTicket(_) => Ticket(TicketAction::Approve),
            Self::RejectTicket(_) => Ticket(TicketAction::Reject),
            Self::IssueTicket(_) => Ticket(TicketAction::Issue),
            Self::StakeTicket(_) => Ticket(TicketAction::Stake),
            Self::CheckInTicket(_) => Ticket(TicketAction::CheckIn),
            Self::ScanTicket(_) => Ticket(TicketAction::Scan),
            Self::ForfeitTicket(_) => Ticket(TicketAction::Forfeit),
            Self::RefundTicket(_) => Ticket(TicketAction::Refund),
            Self::RevokeTicket(_) => Ticket(TicketAction::Revoke),
            Self::CancelTicket(_) => Ticket(TicketAction::Cancel),
        }
    }

    /// The aggregate this command acts on.
    #[must_use]
    pub fn target(&self) -> AggregateRef {
        match self {
            Self::PublishEvent(p)
            | Self::StartEvent(p)
            | Self::EndEvent(p)
            | Self::ArchiveEvent(p)
            | Self::CancelEvent(p) => AggregateRef::event(p.event_id.clone()),
            Self::StakeTicket(p) => AggregateRef::ticket(p.guest_id.clone()),
            Self::RequestApproval(p)
            | Self::ApproveTicket(p)
            | Self::RejectTicket(p)
            | Self::IssueTicket(p)
            | Self::CheckInTicket(p)
            | Self::ScanTicket(p)
            | Self::ForfeitTicket(p)
            | Self::RefundTicket(p)
            | Self::RevokeTicket(p)
            | Self::CancelTicket(p) => AggregateRef::ticket(p.guest_id.clone()),
        }
    }

    /// Parent event id claimed by a ticket command's payload.
    #[must_use]
    pub const fn claimed_event_id(&self) -> Option<&AggregateId> {
        match self {
            Self::StakeTicket(p) => p.event_id.as_ref(),
            Self::RequestApproval(p)
            | Self::ApproveTicket(p)
            | Self::RejectTicket(p)
            | Self::IssueTicket(p)
            | Self::CheckInTicket(p)
            | Self::ScanTicket(p)
            | Self::ForfeitTicket(p)
            | Self::RefundTicket(p)
            | Self::RevokeTicket(p)
            | Self::CancelTicket(p) => p.event_id.as_ref(),
            _ => None,
        }
    }

    /// Free-text reason carried by the payload, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::PublishEvent(p)
            | Self::StartEvent(p)
            | Self::EndEvent(p)
            | Self::ArchiveEvent(p)
            | Self::CancelEvent(p) => p.reason.clone(),
            Self::StakeTicket(_) => None,
            Self::RequestApproval(p)
            | Self::ApproveTicket(p)
            | Self::RejectTicket(p)
            | Self::IssueTicket(p)
            | Self::CheckInTicket(p)
            | Self::ScanTicket(p)
            | Self::ForfeitTicket(p)
            | Self::RefundTicket(p)
            | Self::RevokeTicket(p)
            | Self::CancelTicket(p) => p.reason.clone(),
        }
    }
}

/// Failure to decode a command from its wire form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandDecodeError {
    /// `name` is not one of [`Command::NAMES`].
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    /// The name is known but the rest of the object does not fit.
    #[error("Invalid command: {0}")]
    Invalid(String),
}

/// A command plus who issued it and how it correlates with other work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowCommand {
    /// The command and its payload.
    #[serde(flatten)]
    pub command: Command,
    /// Kind of actor issuing the command.
    #[serde(default)]
    pub actor_type: ActorType,
    /// Actor identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    /// Correlation id to join; a fresh one is generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Direct cause of this command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,
    /// Inbound request id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl WorkflowCommand {
    /// A command issued by the system with no correlation.
    #[must_use]
    pub const fn new(command: Command) -> Self {
        Self {
            command,
            actor_type: ActorType::System,
            actor_id: None,
            correlation_id: None,
            causation_id: None,
            request_id: None,
        }
    }

    /// Set the actor.
    #[must_use]
    pub fn by(mut self, actor: Actor) -> Self {
        self.actor_type = actor.actor_type;
        self.actor_id = actor.id;
        self
    }

    /// Join an existing correlation.
    #[must_use]
    pub fn correlated(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Decode the wire form, separating unknown names from malformed payloads.
    ///
    /// # Errors
    ///
    /// - [`CommandDecodeError::UnknownCommand`] when `name` is missing or unknown
    /// - [`CommandDecodeError::Invalid`] when the payload does not match the name
    pub fn from_json(value: Value) -> Result<Self, CommandDecodeError> {
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if !Command::NAMES.contains(&name.as_str()) {
            return Err(CommandDecodeError::UnknownCommand(name));
        }
        serde_json::from_value(value).map_err(|e| CommandDecodeError::Invalid(e.to_string()))
    }

    /// The issuing actor.
    #[must_use]
    pub fn actor(&self) -> Actor {
        Actor {
            actor_type: self.actor_type,
            id: self.actor_id.clone(),
        }
    }

    /// Metadata for the event this command produces.
    #[must_use]
    pub fn metadata(&self) -> MetadataInput {
        MetadataInput {
            correlation_id: self.correlation_id.clone(),
            causation_id: self.causation_id.clone(),
            request_id: self.request_id.clone(),
            actor: Some(self.actor()),
            occurred_at: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use ticketflow_core::definitions::{EventAction, TicketAction};

    #[test]
    fn wire_form_decodes() {
        let command = WorkflowCommand::from_json(json!({
            "name": "CHECK_IN_TICKET",
            "payload": { "guestId": "guest-1", "eventId": "evt-1" },
            "actorType": "user",
            "actorId": "staff-7",
            "correlationId": "req-42"
        }))
        .unwrap();

        assert_eq!(command.command.name(), "CHECK_IN_TICKET");
        assert_eq!(
            command.command.action(),
            CommandAction::Ticket(TicketAction::CheckIn)
        );
        assert_eq!(command.command.target(), AggregateRef::ticket("guest-1"));
        assert_eq!(command.actor(), Actor::user("staff-7"));
        assert_eq!(command.correlation_id.as_deref(), Some("req-42"));
    }

    #[test]
    fn actor_defaults_to_system() {
        let command = WorkflowCommand::from_json(json!({
            "name": "START_EVENT",
            "payload": { "eventId": "evt-1" }
        }))
        .unwrap();

        assert_eq!(command.actor(), Actor::system());
        assert_eq!(command.command.action(), CommandAction::Event(EventAction::GoLive));
    }

    #[test]
    fn unknown_names_are_distinguished() {
        let result = WorkflowCommand::from_json(json!({
            "name": "TELEPORT_TICKET",
            "payload": { "guestId": "guest-1" }
        }));
        assert_eq!(
            result,
            Err(CommandDecodeError::UnknownCommand("TELEPORT_TICKET".to_string()))
        );
    }

    #[test]
    fn malformed_payloads_are_invalid() {
        let result = WorkflowCommand::from_json(json!({
            "name": "STAKE_TICKET",
            "payload": { "guestId": "guest-1" }
        }));
        assert!(matches!(result, Err(CommandDecodeError::Invalid(_))));
    }

    #[test]
    fn names_match_serde_tags() {
        let commands = [
            Command::CancelEvent(EventPayload {
                event_id: AggregateId::new("evt-1"),
                reason: None,
            }),
            Command::RequestApproval(TicketPayload {
                guest_id: AggregateId::new("guest-1"),
                event_id: None,
                reason: None,
            }),
        ];
        for command in commands {
            let json = serde_json::to_value(&command).unwrap();
            assert_eq!(json["name"], command.name());
            assert!(Command::NAMES.contains(&command.name()));
        }
    }
}
