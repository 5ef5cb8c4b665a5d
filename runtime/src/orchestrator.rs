//! Workflow orchestrator: the only writer of Event and Ticket domain events.
//!
//! `execute` runs one command through a fixed sequence of gates:
//!
//! 1. **Load** the aggregate's row from the read model (and, for tickets, the
//!    parent event's row). Missing ⇒ `NotFound`. The current status and version
//!    come from the aggregate's stream; the row's status is used only while the
//!    stream is empty.
//! 2. **Map** the command to its lifecycle action.
//! 3. **Ask the engine** for the transition. None ⇒ `InvalidTransition`.
//! 4. **Guards**: cross-aggregate and payload rules.
//! 5. **Build** the domain event named by the transition row.
//! 6. **Append** right after the version loaded in step 1. A write that landed
//!    in between makes the append conflict, which is retryable.
//! 7. **Project** the new status into the read model.
//!
//! Nothing is appended unless gates 1–5 pass. Projection runs after the append
//! and outside any transaction: if it fails the command still succeeds, the
//! receipt says `projected: false`, and temporal recovery repairs the row.

use crate::command::{Command, CommandAction, CommandDecodeError, WorkflowCommand};
use crate::metrics::WorkflowMetrics;
use crate::recovery::fold_stream;
use crate::retry::{RetryPolicy, retry_with_predicate};
use crate::store::DomainEventStore;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use ticketflow_core::definitions::{
    EVENT_MACHINE, EventAction, EventStatus, Lifecycle, Status, TICKET_MACHINE, TicketAction,
};
use ticketflow_core::engine;
use ticketflow_core::event::{DomainEvent, DomainEventKind};
use ticketflow_core::event_store::EventStoreError;
use ticketflow_core::projection::{EventRecord, ProjectionError, ReadModel, StatusChange, TicketRecord};
use ticketflow_core::stream::{AggregateId, AggregateRef, Version};
use uuid::Uuid;

/// How a caller should react to a [`WorkflowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// "Not allowed right now": invalid transition, guard, unknown command, missing aggregate.
    Rejected,
    /// "Please retry": lost an optimistic-concurrency race.
    Retryable,
    /// "Something went wrong": infrastructure failure.
    Fatal,
}

impl ErrorClass {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rejected => "rejected",
            Self::Retryable => "retryable",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A business rule that blocked an otherwise legal transition.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardViolation {
    /// Check-in and scan need the parent event to be live.
    EventNotLive {
        /// Parent event.
        event_id: AggregateId,
        /// Its current status.
        status: EventStatus,
    },
    /// Registration flow actions need the parent event to be published or live.
    EventNotOpen {
        /// Parent event.
        event_id: AggregateId,
        /// Its current status.
        status: EventStatus,
    },
    /// The payload names a different parent event than the stored one.
    EventMismatch {
        /// Event id in the payload.
        claimed: AggregateId,
        /// Event id stored on the ticket.
        actual: AggregateId,
    },
    /// A stake must be a positive amount.
    NonPositiveStake(f64),
    /// A stake must carry the deposit transaction hash.
    MissingTxHash,
}

impl fmt::Display for GuardViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EventNotLive { event_id, status } => {
                write!(f, "event {event_id} must be live (currently {status})")
            }
            Self::EventNotOpen { event_id, status } => {
                write!(f, "event {event_id} must be published or live (currently {status})")
            }
            Self::EventMismatch { claimed, actual } => {
                write!(f, "ticket belongs to event {actual}, not {claimed}")
            }
            Self::NonPositiveStake(amount) => write!(f, "stake amount must be positive, got {amount}"),
            Self::MissingTxHash => f.write_str("stake requires a transaction hash"),
        }
    }
}

/// Why a command was not applied.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// The command name is not recognised.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// The command name is known but its payload is malformed.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// The target aggregate (or a ticket's parent event) has no read model row.
    #[error("{0} not found")]
    NotFound(AggregateRef),

    /// The lifecycle has no edge for this action from the current status.
    #[error("Invalid transition: cannot {action} {aggregate} in state {from}")]
    InvalidTransition {
        /// Target aggregate.
        aggregate: AggregateRef,
        /// Its current status.
        from: Status,
        /// Requested action.
        action: CommandAction,
    },

    /// A business rule blocked the transition.
    #[error("Guard failed: {0}")]
    GuardFailed(GuardViolation),

    /// The transition table names an event the command cannot produce.
    #[error("Cannot build {kind} from {command}")]
    UnbuildableEvent {
        /// Event kind from the transition row.
        kind: DomainEventKind,
        /// Command name.
        command: &'static str,
    },

    /// Appending failed.
    #[error(transparent)]
    Store(#[from] EventStoreError),

    /// Loading the current state failed.
    #[error("Read model error: {0}")]
    ReadModel(#[from] ProjectionError),
}

impl WorkflowError {
    /// Classify the error for the caller.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::UnknownCommand(_)
            | Self::InvalidCommand(_)
            | Self::NotFound(_)
            | Self::InvalidTransition { .. }
            | Self::GuardFailed(_) => ErrorClass::Rejected,
            Self::Store(error) if error.is_concurrency_conflict() => ErrorClass::Retryable,
            Self::Store(_) | Self::ReadModel(_) | Self::UnbuildableEvent { .. } => ErrorClass::Fatal,
        }
    }
}

impl From<CommandDecodeError> for WorkflowError {
    fn from(error: CommandDecodeError) -> Self {
        match error {
            CommandDecodeError::UnknownCommand(name) => Self::UnknownCommand(name),
            CommandDecodeError::Invalid(message) => Self::InvalidCommand(message),
        }
    }
}

/// Result of a successfully applied command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReceipt {
    /// Id of the appended envelope.
    pub event_id: Uuid,
    /// Aggregate the command acted on.
    pub aggregate: AggregateRef,
    /// Version of the appended envelope.
    pub version: Version,
    /// Status before the command.
    pub from: Status,
    /// Status after the command.
    pub to: Status,
    /// Correlation id the envelope was appended under.
    pub correlation_id: String,
    /// Whether the read model was updated; `false` leaves drift for recovery.
    pub projected: bool,
}

/// Command handler for Event and Ticket aggregates.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use ticketflow_core::definitions::{EventStatus, TicketStatus};
/// use ticketflow_runtime::command::{Command, TicketPayload, WorkflowCommand};
/// use ticketflow_runtime::orchestrator::WorkflowOrchestrator;
/// use ticketflow_runtime::store::DomainEventStore;
/// use ticketflow_testing::{test_clock, InMemoryEventBus, InMemoryEventStore, InMemoryReadModel};
///
/// # tokio_test::block_on(async {
/// let read_model = InMemoryReadModel::new();
/// read_model.insert_event("evt-1", EventStatus::Live);
/// read_model.insert_ticket("guest-1", "evt-1", TicketStatus::Issued);
///
/// let orchestrator = WorkflowOrchestrator::new(
///     DomainEventStore::new(
///         Arc::new(InMemoryEventStore::new()),
///         Arc::new(InMemoryEventBus::new()),
///         Arc::new(test_clock()),
///     ),
///     Arc::new(read_model.clone()),
/// );
///
/// let receipt = orchestrator
///     .execute(WorkflowCommand::new(Command::CheckInTicket(TicketPayload {
///         guest_id: "guest-1".into(),
///         event_id: None,
///         reason: None,
///     })))
///     .await
///     .unwrap();
/// assert!(receipt.projected);
/// assert_eq!(read_model.ticket("guest-1").unwrap().status, TicketStatus::CheckedIn);
/// # });
/// ```
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    events: DomainEventStore,
    read_model: Arc<dyn ReadModel>,
}

impl WorkflowOrchestrator {
    /// Create an orchestrator over an event store and read model.
    #[must_use]
    pub fn new(events: DomainEventStore, read_model: Arc<dyn ReadModel>) -> Self {
        Self { events, read_model }
    }

    /// The event store commands append through.
    #[must_use]
    pub const fn events(&self) -> &DomainEventStore {
        &self.events
    }

    /// Decode a wire-form command and execute it.
    ///
    /// # Errors
    ///
    /// `UnknownCommand` / `InvalidCommand` for undecodable input, otherwise as
    /// [`WorkflowOrchestrator::execute`].
    pub async fn execute_json(&self, value: Value) -> Result<CommandReceipt, WorkflowError> {
        let command = match WorkflowCommand::from_json(value) {
            Ok(command) => command,
            Err(error) => {
                tracing::info!(error = %error, "Rejected undecodable command");
                WorkflowMetrics::record_command("UNKNOWN", ErrorClass::Rejected.as_str(), std::time::Duration::ZERO);
                return Err(error.into());
            }
        };
        self.execute(command).await
    }

    /// Apply one command.
    ///
    /// Never panics; every failure is a typed [`WorkflowError`] whose
    /// [`class`](WorkflowError::class) tells the caller how to react.
    ///
    /// # Errors
    ///
    /// - `NotFound`, `InvalidTransition`, `GuardFailed`: nothing was appended
    /// - `Store` with a concurrency conflict: reload and retry
    /// - `Store` / `ReadModel` otherwise: infrastructure failure
    #[tracing::instrument(
        skip(self, command),
        name = "workflow_execute",
        fields(
            command = command.command.name(),
            aggregate = %command.command.target(),
            correlation_id = ?command.correlation_id,
        )
    )]
    pub async fn execute(&self, command: WorkflowCommand) -> Result<CommandReceipt, WorkflowError> {
        let started = Instant::now();
        let result = match command.command.action() {
            CommandAction::Event(action) => self.execute_event(&command, action).await,
            CommandAction::Ticket(action) => self.execute_ticket(&command, action).await,
        };

        let outcome = match &result {
            Ok(receipt) => {
                tracing::info!(
                    from = %receipt.from,
                    to = %receipt.to,
                    version = %receipt.version,
                    projected = receipt.projected,
                    "Command applied"
                );
                "ok"
            }
            Err(error) => {
                match error.class() {
                    ErrorClass::Rejected => tracing::info!(error = %error, "Command rejected"),
                    ErrorClass::Retryable => tracing::warn!(error = %error, "Command conflicted"),
                    ErrorClass::Fatal => tracing::error!(error = %error, "Command failed"),
                }
                error.class().as_str()
            }
        };
        WorkflowMetrics::record_command(command.command.name(), outcome, started.elapsed());
        result
    }

    /// Execute, reloading state and retrying while the error is retryable.
    ///
    /// # Errors
    ///
    /// The first non-retryable error, or the last conflict once `policy` is exhausted.
    pub async fn execute_with_retry(
        &self,
        command: WorkflowCommand,
        policy: RetryPolicy,
    ) -> Result<CommandReceipt, WorkflowError> {
        retry_with_predicate(
            policy,
            || self.execute(command.clone()),
            |error: &WorkflowError| error.class() == ErrorClass::Retryable,
        )
        .await
    }

    /// Actions currently legal for `aggregate`, in table order.
    ///
    /// Guards are not evaluated; an action listed here can still be refused.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the aggregate has no row
    /// - `ReadModel` if the row could not be loaded
    pub async fn available_actions(
        &self,
        aggregate: AggregateRef,
    ) -> Result<Vec<CommandAction>, WorkflowError> {
        match self.read_model.status_of(aggregate.clone()).await? {
            Some(Status::Event(row)) => {
                let current = self.current(&aggregate, row).await?;
                Ok(engine::available_actions(&EVENT_MACHINE, current.status)
                    .into_iter()
                    .map(CommandAction::Event)
                    .collect())
            }
            Some(Status::Ticket(row)) => {
                let current = self.current(&aggregate, row).await?;
                Ok(engine::available_actions(&TICKET_MACHINE, current.status)
                    .into_iter()
                    .map(CommandAction::Ticket)
                    .collect())
            }
            None => Err(WorkflowError::NotFound(aggregate)),
        }
    }

    async fn execute_event(
        &self,
        command: &WorkflowCommand,
        action: EventAction,
    ) -> Result<CommandReceipt, WorkflowError> {
        let target = command.command.target();
        let row = self.load_event(&target).await?;
        let current = self.current(&target, row.status).await?;

        let transition = engine::find_transition(&EVENT_MACHINE, current.status, action)
            .ok_or_else(|| WorkflowError::InvalidTransition {
                aggregate: target.clone(),
                from: current.status.into_status(),
                action: CommandAction::Event(action),
            })?;

        let now = self.events.clock().now();
        let event = build_event_event(transition.event_kind, &row.id, &command.command, now)?;

        self.commit(command, target, current, transition.to, event, now).await
    }

    async fn execute_ticket(
        &self,
        command: &WorkflowCommand,
        action: TicketAction,
    ) -> Result<CommandReceipt, WorkflowError> {
        let target = command.command.target();
        let ticket = self
            .read_model
            .load_ticket(target.aggregate_id.clone())
            .await?
            .ok_or_else(|| WorkflowError::NotFound(target.clone()))?;
        let current = self.current(&target, ticket.status).await?;

        let transition = engine::find_transition(&TICKET_MACHINE, current.status, action)
            .ok_or_else(|| WorkflowError::InvalidTransition {
                aggregate: target.clone(),
                from: current.status.into_status(),
                action: CommandAction::Ticket(action),
            })?;

        let parent = match self.read_model.load_event(ticket.event_id.clone()).await? {
            Some(row) => {
                let parent = AggregateRef::event(row.id);
                Some(self.current(&parent, row.status).await?.status)
            }
            None => None,
        };
        check_ticket_guards(&command.command, action, &ticket, parent)?;

        let now = self.events.clock().now();
        let event = build_ticket_event(transition.event_kind, &ticket, command, now)?;

        self.commit(command, target, current, transition.to, event, now).await
    }

    async fn load_event(&self, target: &AggregateRef) -> Result<EventRecord, WorkflowError> {
        self.read_model
            .load_event(target.aggregate_id.clone())
            .await?
            .ok_or_else(|| WorkflowError::NotFound(target.clone()))
    }

    /// Status and version of `aggregate` according to its stream.
    ///
    /// Falls back to `row` for an aggregate with no events yet.
    async fn current<S: Lifecycle>(
        &self,
        aggregate: &AggregateRef,
        row: S,
    ) -> Result<Current<S>, WorkflowError> {
        let stream = self
            .events
            .get_stream(aggregate.clone(), Version::INITIAL)
            .await?;
        let Some(last) = stream.last() else {
            return Ok(Current {
                status: row,
                version: Version::INITIAL,
            });
        };

        let status = fold_stream::<S>(&stream);
        if status != row {
            tracing::debug!(
                aggregate = %aggregate,
                row = %row,
                log = %status,
                "Read model row behind the log; deciding from the log"
            );
        }
        Ok(Current {
            status,
            version: last.version,
        })
    }

    async fn commit<S: Lifecycle>(
        &self,
        command: &WorkflowCommand,
        target: AggregateRef,
        current: Current<S>,
        to: S,
        event: DomainEvent,
        now: DateTime<Utc>,
    ) -> Result<CommandReceipt, WorkflowError> {
        let (from, to) = (current.status.into_status(), to.into_status());
        let envelope = self
            .events
            .append_at(event, current.version, command.metadata())
            .await?;

        let projected = match self
            .read_model
            .set_status(target.aggregate_id.clone(), to, StatusChange::workflow(now))
            .await
        {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(
                    aggregate = %target,
                    version = %envelope.version,
                    error = %error,
                    "Read model projection failed; event log is authoritative, recovery will repair"
                );
                WorkflowMetrics::record_projection_failure(target.aggregate_type.as_str());
                false
            }
        };

        Ok(CommandReceipt {
            event_id: envelope.id,
            aggregate: target,
            version: envelope.version,
            from,
            to,
            correlation_id: envelope.metadata.correlation_id,
            projected,
        })
    }
}

/// State the orchestrator decides from.
#[derive(Debug, Clone, Copy)]
struct Current<S> {
    status: S,
    version: Version,
}

fn check_ticket_guards(
    command: &Command,
    action: TicketAction,
    ticket: &TicketRecord,
    parent: Option<EventStatus>,
) -> Result<(), WorkflowError> {
    if let Some(claimed) = command.claimed_event_id() {
        if *claimed != ticket.event_id {
            return Err(WorkflowError::GuardFailed(GuardViolation::EventMismatch {
                claimed: claimed.clone(),
                actual: ticket.event_id.clone(),
            }));
        }
    }

    let parent_status = || {
        parent.ok_or_else(|| WorkflowError::NotFound(AggregateRef::event(ticket.event_id.clone())))
    };

    match action {
        TicketAction::CheckIn | TicketAction::Scan => {
            let status = parent_status()?;
            if status != EventStatus::Live {
                return Err(WorkflowError::GuardFailed(GuardViolation::EventNotLive {
                    event_id: ticket.event_id.clone(),
                    status,
                }));
            }
        }
        TicketAction::RequestApproval
        | TicketAction::Approve
        | TicketAction::Issue
        | TicketAction::Stake => {
            let status = parent_status()?;
            if !matches!(status, EventStatus::Published | EventStatus::Live) {
                return Err(WorkflowError::GuardFailed(GuardViolation::EventNotOpen {
                    event_id: ticket.event_id.clone(),
                    status,
                }));
            }
        }
        _ => {}
    }

    if let Command::StakeTicket(stake) = command {
        if !(stake.amount.is_finite() && stake.amount > 0.0) {
            return Err(WorkflowError::GuardFailed(GuardViolation::NonPositiveStake(
                stake.amount,
            )));
        }
        if stake.tx_hash.trim().is_empty() {
            return Err(WorkflowError::GuardFailed(GuardViolation::MissingTxHash));
        }
    }

    Ok(())
}

fn build_event_event(
    kind: DomainEventKind,
    event_id: &AggregateId,
    command: &Command,
    now: DateTime<Utc>,
) -> Result<DomainEvent, WorkflowError> {
    let event_id = event_id.clone();
    let event = match kind {
        DomainEventKind::EventPublished => DomainEvent::EventPublished {
            event_id,
            published_at: now,
        },
        DomainEventKind::EventWentLive => DomainEvent::EventWentLive {
            event_id,
            started_at: now,
        },
        DomainEventKind::EventEnded => DomainEvent::EventEnded {
            event_id,
            ended_at: now,
        },
        DomainEventKind::EventArchived => DomainEvent::EventArchived {
            event_id,
            archived_at: now,
        },
        DomainEventKind::EventCancelled => DomainEvent::EventCancelled {
            event_id,
            cancelled_at: now,
            reason: command.reason(),
        },
        other => {
            return Err(WorkflowError::UnbuildableEvent {
                kind: other,
                command: command.name(),
            });
        }
    };
    Ok(event)
}

fn build_ticket_event(
    kind: DomainEventKind,
    ticket: &TicketRecord,
    command: &WorkflowCommand,
    now: DateTime<Utc>,
) -> Result<DomainEvent, WorkflowError> {
    let guest_id = ticket.id.clone();
    let event_id = ticket.event_id.clone();
    let performed_by = command.actor_id.clone();
    let reason = command.command.reason();

    let event = match (kind, &command.command) {
        (DomainEventKind::TicketApprovalRequested, _) => DomainEvent::TicketApprovalRequested {
            guest_id,
            event_id,
            requested_at: now,
        },
        (DomainEventKind::TicketApproved, _) => DomainEvent::TicketApproved {
            guest_id,
            event_id,
            approved_at: now,
            approved_by: performed_by,
        },
        (DomainEventKind::TicketRejected, _) => DomainEvent::TicketRejected {
            guest_id,
            event_id,
            rejected_at: now,
            reason,
        },
        (DomainEventKind::TicketIssued, _) => DomainEvent::TicketIssued {
            guest_id,
            event_id,
            issued_at: now,
        },
        (DomainEventKind::TicketStaked, Command::StakeTicket(stake)) => DomainEvent::TicketStaked {
            guest_id,
            event_id,
            amount: stake.amount,
            tx_hash: stake.tx_hash.trim().to_string(),
            chain: stake.chain.clone(),
            currency: stake.currency.clone(),
            wallet_address: stake.wallet_address.clone(),
            staked_at: now,
        },
        (DomainEventKind::TicketCheckedIn, _) => DomainEvent::TicketCheckedIn {
            guest_id,
            event_id,
            checked_in_at: now,
            checked_in_by: performed_by,
        },
        (DomainEventKind::TicketScanned, _) => DomainEvent::TicketScanned {
            guest_id,
            event_id,
            scanned_at: now,
            scanned_by: performed_by,
        },
        (DomainEventKind::TicketForfeited, _) => DomainEvent::TicketForfeited {
            guest_id,
            event_id,
            forfeited_at: now,
        },
        (DomainEventKind::TicketRefunded, _) => DomainEvent::TicketRefunded {
            guest_id,
            event_id,
            refunded_at: now,
            reason,
        },
        (DomainEventKind::TicketRevoked, _) => DomainEvent::TicketRevoked {
            guest_id,
            event_id,
            revoked_at: now,
            reason,
        },
        (DomainEventKind::TicketCancelled, _) => DomainEvent::TicketCancelled {
            guest_id,
            event_id,
            cancelled_at: now,
            reason,
        },
        (other, _) => {
            return Err(WorkflowError::UnbuildableEvent {
                kind: other,
                command: command.command.name(),
            });
        }
    };
    Ok(event)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::command::{EventPayload, StakePayload, TicketPayload};
    use ticketflow_core::definitions::TicketStatus;
    use ticketflow_core::envelope::Actor;
    use ticketflow_core::environment::Clock;
    use ticketflow_testing::{InMemoryEventBus, InMemoryEventStore, InMemoryReadModel, test_clock};

    struct Harness {
        orchestrator: WorkflowOrchestrator,
        store: InMemoryEventStore,
        read_model: InMemoryReadModel,
    }

    fn harness() -> Harness {
        let store = InMemoryEventStore::new();
        let read_model = InMemoryReadModel::new();
        let orchestrator = WorkflowOrchestrator::new(
            DomainEventStore::new(
                Arc::new(store.clone()),
                Arc::new(InMemoryEventBus::new()),
                Arc::new(test_clock()),
            ),
            Arc::new(read_model.clone()),
        );
        Harness {
            orchestrator,
            store,
            read_model,
        }
    }

    fn ticket(guest_id: &str) -> TicketPayload {
        TicketPayload {
            guest_id: AggregateId::new(guest_id),
            event_id: None,
            reason: None,
        }
    }

    fn stake(amount: f64, tx_hash: &str) -> Command {
        Command::StakeTicket(StakePayload {
            guest_id: AggregateId::new("guest-1"),
            event_id: None,
            amount,
            tx_hash: tx_hash.to_string(),
            chain: None,
            currency: None,
            wallet_address: None,
        })
    }

    #[tokio::test]
    async fn check_in_against_live_event() {
        let h = harness();
        h.read_model.insert_event("evt-1", EventStatus::Live);
        h.read_model.insert_ticket("guest-1", "evt-1", TicketStatus::Issued);

        let receipt = h
            .orchestrator
            .execute(
                WorkflowCommand::new(Command::CheckInTicket(ticket("guest-1")))
                    .by(Actor::user("staff-7")),
            )
            .await
            .unwrap();

        assert_eq!(receipt.from, Status::Ticket(TicketStatus::Issued));
        assert_eq!(receipt.to, Status::Ticket(TicketStatus::CheckedIn));
        assert_eq!(receipt.version, Version::new(1));
        assert!(receipt.projected);

        let stored = h.store.all();
        assert_eq!(stored.len(), 1);
        assert_eq!(
            stored[0].event,
            DomainEvent::TicketCheckedIn {
                guest_id: AggregateId::new("guest-1"),
                event_id: AggregateId::new("evt-1"),
                checked_in_at: test_clock().now(),
                checked_in_by: Some("staff-7".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn check_in_against_published_event_is_guarded() {
        let h = harness();
        h.read_model.insert_event("evt-1", EventStatus::Published);
        h.read_model.insert_ticket("guest-1", "evt-1", TicketStatus::Staked);

        let error = h
            .orchestrator
            .execute(WorkflowCommand::new(Command::CheckInTicket(ticket("guest-1"))))
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            WorkflowError::GuardFailed(GuardViolation::EventNotLive {
                status: EventStatus::Published,
                ..
            })
        ));
        assert_eq!(error.class(), ErrorClass::Rejected);
        assert!(h.store.is_empty());
        assert_eq!(h.read_model.ticket("guest-1").unwrap().status, TicketStatus::Staked);
    }

    #[tokio::test]
    async fn invalid_transition_appends_nothing() {
        let h = harness();
        h.read_model.insert_event("evt-1", EventStatus::Published);
        h.read_model.insert_ticket("guest-1", "evt-1", TicketStatus::Pending);

        let error = h
            .orchestrator
            .execute(WorkflowCommand::new(stake(0.05, "0xabc")))
            .await
            .unwrap_err();

        assert!(matches!(error, WorkflowError::InvalidTransition { .. }));
        assert_eq!(
            error.to_string(),
            "Invalid transition: cannot stake ticket:guest-1 in state pending"
        );
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn missing_aggregate_is_not_found() {
        let h = harness();

        let error = h
            .orchestrator
            .execute(WorkflowCommand::new(Command::PublishEvent(EventPayload {
                event_id: AggregateId::new("evt-404"),
                reason: None,
            })))
            .await
            .unwrap_err();

        assert!(matches!(error, WorkflowError::NotFound(_)));
        assert_eq!(error.class(), ErrorClass::Rejected);
    }

    #[tokio::test]
    async fn stake_payload_is_validated() {
        let h = harness();
        h.read_model.insert_event("evt-1", EventStatus::Published);
        h.read_model.insert_ticket("guest-1", "evt-1", TicketStatus::Approved);

        let zero = h
            .orchestrator
            .execute(WorkflowCommand::new(stake(0.0, "0xabc")))
            .await
            .unwrap_err();
        assert!(matches!(
            zero,
            WorkflowError::GuardFailed(GuardViolation::NonPositiveStake(_))
        ));

        let no_hash = h
            .orchestrator
            .execute(WorkflowCommand::new(stake(0.05, "  ")))
            .await
            .unwrap_err();
        assert!(matches!(
            no_hash,
            WorkflowError::GuardFailed(GuardViolation::MissingTxHash)
        ));
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn mismatched_parent_event_is_rejected() {
        let h = harness();
        h.read_model.insert_event("evt-1", EventStatus::Live);
        h.read_model.insert_ticket("guest-1", "evt-1", TicketStatus::Issued);

        let mut payload = ticket("guest-1");
        payload.event_id = Some(AggregateId::new("evt-2"));
        let error = h
            .orchestrator
            .execute(WorkflowCommand::new(Command::CheckInTicket(payload)))
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            WorkflowError::GuardFailed(GuardViolation::EventMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn cancelling_a_staked_ticket_appends_a_refund() {
        let h = harness();
        h.read_model.insert_event("evt-1", EventStatus::Live);
        h.read_model.insert_ticket("guest-1", "evt-1", TicketStatus::Staked);

        let receipt = h
            .orchestrator
            .execute(WorkflowCommand::new(Command::CancelTicket(ticket("guest-1"))))
            .await
            .unwrap();

        assert_eq!(receipt.to, Status::Ticket(TicketStatus::Refunded));
        assert_eq!(h.store.all()[0].kind(), DomainEventKind::TicketRefunded);
    }

    #[tokio::test]
    async fn projection_failure_still_succeeds() {
        let h = harness();
        h.read_model.insert_event("evt-1", EventStatus::Draft);
        h.read_model.set_failing_writes(true);

        let receipt = h
            .orchestrator
            .execute(WorkflowCommand::new(Command::PublishEvent(EventPayload {
                event_id: AggregateId::new("evt-1"),
                reason: None,
            })))
            .await
            .unwrap();

        assert!(!receipt.projected);
        assert_eq!(h.store.len(), 1);
        assert_eq!(h.read_model.event("evt-1").unwrap().status, EventStatus::Draft);
    }

    #[tokio::test]
    async fn commands_after_a_lost_projection_are_decided_from_the_log() {
        let h = harness();
        h.read_model.insert_event("evt-1", EventStatus::Live);
        h.read_model.insert_ticket("guest-1", "evt-1", TicketStatus::Issued);

        h.read_model.set_failing_writes(true);
        let checked_in = h
            .orchestrator
            .execute(WorkflowCommand::new(Command::CheckInTicket(ticket("guest-1"))))
            .await
            .unwrap();
        assert!(!checked_in.projected);
        h.read_model.set_failing_writes(false);
        assert_eq!(h.read_model.ticket("guest-1").unwrap().status, TicketStatus::Issued);

        let error = h
            .orchestrator
            .execute(WorkflowCommand::new(Command::RevokeTicket(ticket("guest-1"))))
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            WorkflowError::InvalidTransition {
                from: Status::Ticket(TicketStatus::CheckedIn),
                ..
            }
        ));
        assert_eq!(h.store.len(), 1);
        assert!(
            h.orchestrator
                .available_actions(AggregateRef::ticket("guest-1"))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn concurrency_conflicts_are_retryable() {
        let h = harness();
        h.read_model.insert_event("evt-1", EventStatus::Draft);
        h.store.fail_next_insert(EventStoreError::ConcurrencyConflict {
            aggregate: AggregateRef::event("evt-1"),
            version: Version::new(1),
        });

        let command = WorkflowCommand::new(Command::PublishEvent(EventPayload {
            event_id: AggregateId::new("evt-1"),
            reason: None,
        }));

        let error = h.orchestrator.execute(command.clone()).await.unwrap_err();
        assert_eq!(error.class(), ErrorClass::Retryable);

        h.store.fail_next_insert(EventStoreError::ConcurrencyConflict {
            aggregate: AggregateRef::event("evt-1"),
            version: Version::new(1),
        });
        let policy = RetryPolicy::builder()
            .initial_delay(std::time::Duration::from_millis(1))
            .build();
        let receipt = h
            .orchestrator
            .execute_with_retry(command, policy)
            .await
            .unwrap();
        assert_eq!(receipt.to, Status::Event(EventStatus::Published));
    }

    #[tokio::test]
    async fn infrastructure_errors_are_fatal_and_not_retried() {
        let h = harness();
        h.read_model.insert_event("evt-1", EventStatus::Draft);
        h.store
            .fail_next_insert(EventStoreError::DatabaseError("connection reset".to_string()));

        let error = h
            .orchestrator
            .execute_with_retry(
                WorkflowCommand::new(Command::PublishEvent(EventPayload {
                    event_id: AggregateId::new("evt-1"),
                    reason: None,
                })),
                RetryPolicy::default(),
            )
            .await
            .unwrap_err();

        assert_eq!(error.class(), ErrorClass::Fatal);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn unknown_json_commands_are_rejected() {
        let h = harness();
        let error = h
            .orchestrator
            .execute_json(serde_json::json!({ "name": "MELT_TICKET", "payload": {} }))
            .await
            .unwrap_err();

        assert!(matches!(error, WorkflowError::UnknownCommand(name) if name == "MELT_TICKET"));
    }

    #[tokio::test]
    async fn available_actions_follow_the_stored_status() {
        let h = harness();
        h.read_model.insert_event("evt-1", EventStatus::Live);

        let actions = h
            .orchestrator
            .available_actions(AggregateRef::event("evt-1"))
            .await
            .unwrap();
        assert_eq!(
            actions,
            vec![
                CommandAction::Event(EventAction::End),
                CommandAction::Event(EventAction::Cancel),
            ]
        );
    }
}
