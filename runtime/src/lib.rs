//! # Ticketflow Runtime
//!
//! Runtime services for the ticket lifecycle.
//!
//! The pure pieces (state machines, domain events, storage ports) live in
//! `ticketflow-core`. This crate wires them into the three services that do I/O:
//!
//! - [`store::DomainEventStore`]: appends with server-assigned versions, then
//!   dispatches each appended envelope to consumers
//! - [`orchestrator::WorkflowOrchestrator`]: the single command handler for
//!   Event and Ticket aggregates (load → engine → guards → append → project)
//! - [`recovery::TemporalRecovery`]: replays streams and repairs read model drift
//!
//! Supporting modules provide the command vocabulary, retry with backoff for
//! concurrency conflicts, and Prometheus metrics.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use ticketflow_core::definitions::{EventStatus, Status, TicketStatus};
//! use ticketflow_core::stream::AggregateRef;
//! use ticketflow_runtime::command::{Command, StakePayload, WorkflowCommand};
//! use ticketflow_runtime::{DomainEventStore, TemporalRecovery, WorkflowOrchestrator};
//! use ticketflow_testing::{test_clock, InMemoryEventBus, InMemoryEventStore, InMemoryReadModel};
//!
//! # tokio_test::block_on(async {
//! let read_model = Arc::new(InMemoryReadModel::new());
//! read_model.insert_event("evt-1", EventStatus::Published);
//! read_model.insert_ticket("guest-1", "evt-1", TicketStatus::Approved);
//!
//! let events = DomainEventStore::new(
//!     Arc::new(InMemoryEventStore::new()),
//!     Arc::new(InMemoryEventBus::new()),
//!     Arc::new(test_clock()),
//! );
//! let orchestrator = WorkflowOrchestrator::new(events.clone(), read_model.clone());
//!
//! let receipt = orchestrator
//!     .execute(WorkflowCommand::new(Command::StakeTicket(StakePayload {
//!         guest_id: "guest-1".into(),
//!         event_id: None,
//!         amount: 0.05,
//!         tx_hash: "0xabc123".into(),
//!         chain: None,
//!         currency: None,
//!         wallet_address: None,
//!     })))
//!     .await
//!     .unwrap();
//! assert_eq!(receipt.to, Status::Ticket(TicketStatus::Staked));
//!
//! // The log and the read model agree, so recovery has nothing to fix.
//! let recovery = TemporalRecovery::new(events, read_model);
//! let outcome = recovery.reconcile_entity(AggregateRef::ticket("guest-1")).await.unwrap();
//! assert!(!outcome.fixed());
//! # });
//! ```

pub mod command;
pub mod metrics;
pub mod orchestrator;
pub mod recovery;
pub mod retry;
pub mod store;

pub use command::{Command, WorkflowCommand};
pub use orchestrator::{CommandReceipt, ErrorClass, WorkflowError, WorkflowOrchestrator};
pub use recovery::{Reconciliation, ReconciliationReport, RecoveryError, TemporalRecovery};
pub use retry::RetryPolicy;
pub use store::{DispatchSummary, DomainEventStore};
