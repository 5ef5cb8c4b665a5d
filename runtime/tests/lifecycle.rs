//! End-to-end lifecycle tests over the in-memory doubles.
//!
//! Covers the flows that cross component boundaries: orchestrator → store →
//! dispatch, projection drift → recovery, and missed dispatch → redispatch.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use ticketflow_core::definitions::{EventStatus, Status, TicketStatus};
use ticketflow_core::envelope::{Actor, MetadataInput};
use ticketflow_core::event::DomainEventKind;
use ticketflow_core::event_bus::EventBus;
use ticketflow_core::stream::{AggregateId, AggregateRef, Version};
use ticketflow_runtime::command::{Command, EventPayload, StakePayload, TicketPayload};
use ticketflow_runtime::{
    DomainEventStore, ErrorClass, RetryPolicy, TemporalRecovery, WorkflowCommand, WorkflowError,
    WorkflowOrchestrator,
};
use ticketflow_testing::{
    InMemoryEventBus, InMemoryEventStore, InMemoryReadModel, fixtures, test_clock,
};

// ============================================================================
// Test Fixtures
// ============================================================================

struct World {
    store: InMemoryEventStore,
    bus: InMemoryEventBus,
    read_model: InMemoryReadModel,
    events: DomainEventStore,
    orchestrator: WorkflowOrchestrator,
    recovery: TemporalRecovery,
}

fn world() -> World {
    let store = InMemoryEventStore::new();
    let bus = InMemoryEventBus::new();
    let read_model = InMemoryReadModel::new();
    let events = DomainEventStore::new(
        Arc::new(store.clone()),
        Arc::new(bus.clone()),
        Arc::new(test_clock()),
    );
    let orchestrator = WorkflowOrchestrator::new(events.clone(), Arc::new(read_model.clone()));
    let recovery = TemporalRecovery::new(events.clone(), Arc::new(read_model.clone()));
    World {
        store,
        bus,
        read_model,
        events,
        orchestrator,
        recovery,
    }
}

/// What the registration flow does before the orchestrator sees a ticket.
async fn register(world: &World, guest_id: &str, event_id: &str, correlation_id: &str) {
    world
        .read_model
        .insert_ticket(guest_id, event_id, TicketStatus::Pending);
    world
        .events
        .append(
            fixtures::ticket_registered(guest_id, event_id),
            MetadataInput {
                correlation_id: Some(correlation_id.to_string()),
                ..MetadataInput::default()
            },
        )
        .await
        .unwrap();
}

fn ticket(guest_id: &str) -> TicketPayload {
    TicketPayload {
        guest_id: AggregateId::new(guest_id),
        event_id: None,
        reason: None,
    }
}

fn stake(guest_id: &str) -> Command {
    Command::StakeTicket(StakePayload {
        guest_id: AggregateId::new(guest_id),
        event_id: Some(AggregateId::new("evt-1")),
        amount: 0.05,
        tx_hash: "0xabc123".to_string(),
        chain: Some("base".to_string()),
        currency: Some("ETH".to_string()),
        wallet_address: None,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn staking_flow_appends_a_gapless_stream() {
    let w = world();
    w.read_model.insert_event("evt-1", EventStatus::Published);
    register(&w, "guest-1", "evt-1", "reg-42").await;

    for command in [
        Command::RequestApproval(ticket("guest-1")),
        Command::ApproveTicket(ticket("guest-1")),
        stake("guest-1"),
    ] {
        let receipt = w
            .orchestrator
            .execute(
                WorkflowCommand::new(command)
                    .by(Actor::user("host-1"))
                    .correlated("reg-42"),
            )
            .await
            .unwrap();
        assert!(receipt.projected);
    }

    let stream = w
        .events
        .get_stream(AggregateRef::ticket("guest-1"), Version::INITIAL)
        .await
        .unwrap();
    let kinds: Vec<_> = stream.iter().map(|envelope| envelope.kind()).collect();
    let versions: Vec<_> = stream.iter().map(|envelope| envelope.version.value()).collect();

    assert_eq!(
        kinds,
        vec![
            DomainEventKind::TicketRegistered,
            DomainEventKind::TicketApprovalRequested,
            DomainEventKind::TicketApproved,
            DomainEventKind::TicketStaked,
        ]
    );
    assert_eq!(versions, vec![1, 2, 3, 4]);
    assert_eq!(
        w.read_model.ticket("guest-1").unwrap().status,
        TicketStatus::Staked
    );

    let trace = w.events.get_by_correlation("reg-42").await.unwrap();
    assert_eq!(trace.len(), 4);
    assert_eq!(
        w.bus.topics(),
        vec![
            "app/ticket_registered",
            "app/ticket_approval_requested",
            "app/ticket_approved",
            "app/ticket_staked",
        ]
    );
}

#[tokio::test]
async fn staking_through_check_in_records_four_versions() {
    let w = world();
    w.read_model.insert_event("evt-1", EventStatus::Live);
    w.read_model
        .insert_ticket("guest-1", "evt-1", TicketStatus::Pending);

    for command in [
        Command::RequestApproval(ticket("guest-1")),
        Command::ApproveTicket(ticket("guest-1")),
        stake("guest-1"),
        Command::CheckInTicket(ticket("guest-1")),
    ] {
        w.orchestrator
            .execute(WorkflowCommand::new(command))
            .await
            .unwrap();
    }

    let stream = w
        .events
        .get_stream(AggregateRef::ticket("guest-1"), Version::INITIAL)
        .await
        .unwrap();
    assert_eq!(
        stream
            .iter()
            .map(|envelope| (envelope.version.value(), envelope.kind()))
            .collect::<Vec<_>>(),
        vec![
            (1, DomainEventKind::TicketApprovalRequested),
            (2, DomainEventKind::TicketApproved),
            (3, DomainEventKind::TicketStaked),
            (4, DomainEventKind::TicketCheckedIn),
        ]
    );
    assert_eq!(
        w.read_model.ticket("guest-1").unwrap().status,
        TicketStatus::CheckedIn
    );
}

#[tokio::test]
async fn subscribers_receive_dispatched_envelopes() {
    let w = world();
    w.read_model.insert_event("evt-1", EventStatus::Live);
    w.read_model
        .insert_ticket("guest-1", "evt-1", TicketStatus::Staked);

    let mut subscription = w.bus.subscribe(&["app/ticket_checked_in"]).await.unwrap();

    w.orchestrator
        .execute(WorkflowCommand::new(Command::CheckInTicket(ticket("guest-1"))))
        .await
        .unwrap();

    let message = tokio::time::timeout(Duration::from_secs(1), subscription.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(message.event_type(), "TICKET_CHECKED_IN");
    assert_eq!(message.body["guestId"], "guest-1");
    assert_eq!(message.body["_envelope"]["version"], 1);
}

#[tokio::test]
async fn guard_failures_leave_no_trace() {
    let w = world();
    w.read_model.insert_event("evt-1", EventStatus::Draft);
    register(&w, "guest-1", "evt-1", "reg-1").await;

    let error = w
        .orchestrator
        .execute(WorkflowCommand::new(Command::IssueTicket(ticket("guest-1"))))
        .await
        .unwrap_err();

    assert_eq!(error.class(), ErrorClass::Rejected);
    assert_eq!(w.store.len(), 1);
    assert_eq!(w.bus.published().len(), 1);
    assert_eq!(
        w.read_model.ticket("guest-1").unwrap().status,
        TicketStatus::Pending
    );
}

#[tokio::test]
async fn racing_commands_append_once_and_the_loser_conflicts() {
    let w = world();
    w.read_model.insert_event("evt-1", EventStatus::Live);
    w.read_model
        .insert_ticket("guest-1", "evt-1", TicketStatus::Issued);
    w.read_model.set_yielding_loads(true);

    let (check_in, scan) = tokio::join!(
        w.orchestrator
            .execute(WorkflowCommand::new(Command::CheckInTicket(ticket("guest-1")))),
        w.orchestrator
            .execute(WorkflowCommand::new(Command::ScanTicket(ticket("guest-1")))),
    );

    let (winner, loser) = match (check_in, scan) {
        (Ok(winner), Err(loser)) | (Err(loser), Ok(winner)) => (winner, loser),
        (first, second) => panic!("expected exactly one winner, got {first:?} and {second:?}"),
    };
    assert_eq!(loser.class(), ErrorClass::Retryable);
    assert_eq!(winner.version, Version::new(1));

    let stream = w
        .events
        .get_stream(AggregateRef::ticket("guest-1"), Version::INITIAL)
        .await
        .unwrap();
    assert_eq!(stream.len(), 1);
    assert_eq!(
        Status::Ticket(w.read_model.ticket("guest-1").unwrap().status),
        winner.to
    );
}

#[tokio::test]
async fn retried_loser_reloads_and_is_rejected_by_the_terminal_state() {
    let w = world();
    w.read_model.insert_event("evt-1", EventStatus::Live);
    w.read_model
        .insert_ticket("guest-1", "evt-1", TicketStatus::Issued);
    w.read_model.set_yielding_loads(true);

    let policy = RetryPolicy::builder()
        .initial_delay(Duration::from_millis(1))
        .build();
    let (check_in, scan) = tokio::join!(
        w.orchestrator.execute_with_retry(
            WorkflowCommand::new(Command::CheckInTicket(ticket("guest-1"))),
            policy.clone(),
        ),
        w.orchestrator.execute_with_retry(
            WorkflowCommand::new(Command::ScanTicket(ticket("guest-1"))),
            policy,
        ),
    );

    let error = match (check_in, scan) {
        (Ok(_), Err(error)) | (Err(error), Ok(_)) => error,
        (first, second) => panic!("expected exactly one winner, got {first:?} and {second:?}"),
    };
    assert_eq!(error.class(), ErrorClass::Rejected);
    assert!(matches!(error, WorkflowError::InvalidTransition { .. }));
    assert_eq!(w.store.len(), 1);
}

#[tokio::test]
async fn projection_drift_is_repaired_by_recovery() {
    let w = world();
    w.read_model.insert_event("evt-1", EventStatus::Published);
    w.read_model.set_failing_writes(true);

    let receipt = w
        .orchestrator
        .execute(WorkflowCommand::new(Command::StartEvent(EventPayload {
            event_id: AggregateId::new("evt-1"),
            reason: None,
        })))
        .await
        .unwrap();
    assert!(!receipt.projected);
    assert_eq!(
        w.read_model.event("evt-1").unwrap().status,
        EventStatus::Published
    );

    w.read_model.set_failing_writes(false);
    let outcome = w
        .recovery
        .reconcile_entity(AggregateRef::event("evt-1"))
        .await
        .unwrap();

    assert!(outcome.fixed());
    assert_eq!(outcome.old_status(), Some(Status::Event(EventStatus::Published)));
    assert_eq!(outcome.new_status(), Some(Status::Event(EventStatus::Live)));
    assert_eq!(w.read_model.event("evt-1").unwrap().status, EventStatus::Live);

    let again = w
        .recovery
        .reconcile_entity(AggregateRef::event("evt-1"))
        .await
        .unwrap();
    assert!(!again.fixed());
}

#[tokio::test]
async fn missed_dispatch_is_replayed_not_reappended() {
    let w = world();
    w.read_model.insert_event("evt-1", EventStatus::Live);
    w.read_model
        .insert_ticket("guest-1", "evt-1", TicketStatus::Issued);
    w.bus.set_failing(true);

    let receipt = w
        .orchestrator
        .execute(WorkflowCommand::new(Command::ScanTicket(ticket("guest-1"))))
        .await
        .unwrap();
    assert_eq!(receipt.to, Status::Ticket(TicketStatus::Scanned));
    assert_eq!(w.store.len(), 1);
    assert!(w.bus.published().is_empty());

    w.bus.set_failing(false);
    let stream = w
        .events
        .get_stream(AggregateRef::ticket("guest-1"), Version::INITIAL)
        .await
        .unwrap();
    let summary = w.events.redispatch(&stream).await;

    assert_eq!(summary.published, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(w.store.len(), 1);
    assert_eq!(w.bus.topics(), vec!["app/ticket_scanned"]);
}
