//! # Ticketflow Testing
//!
//! Testing utilities for the ticket lifecycle.
//!
//! This crate provides:
//! - In-memory implementations of the storage and dispatch ports
//! - A fixed clock for deterministic timestamps
//! - Domain event fixtures
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```
//! use ticketflow_testing::mocks::{InMemoryEventBus, InMemoryEventStore, InMemoryReadModel};
//! use ticketflow_core::definitions::{EventStatus, TicketStatus};
//!
//! let store = InMemoryEventStore::new();
//! let bus = InMemoryEventBus::new();
//! let read_model = InMemoryReadModel::new();
//! read_model.insert_event("evt-1", EventStatus::Live);
//! read_model.insert_ticket("guest-1", "evt-1", TicketStatus::Issued);
//!
//! assert!(store.is_empty());
//! assert!(bus.published().is_empty());
//! ```

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only happens after a test already panicked

use chrono::{DateTime, Utc};
use ticketflow_core::environment::Clock;

mod event_bus;
mod event_store;
pub mod fixtures;
mod read_model;

/// Mock implementations of the injected dependencies.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    pub use crate::event_bus::InMemoryEventBus;
    pub use crate::event_store::InMemoryEventStore;
    pub use crate::read_model::InMemoryReadModel;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use ticketflow_testing::mocks::FixedClock;
    /// use ticketflow_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Property-based testing strategies for lifecycle types.
pub mod properties {
    use proptest::prelude::*;
    use ticketflow_core::definitions::{EventStatus, TicketAction, TicketStatus};
    use ticketflow_core::event::DomainEventKind;

    /// Any ticket status.
    pub fn ticket_status() -> impl Strategy<Value = TicketStatus> {
        prop::sample::select(TicketStatus::ALL.to_vec())
    }

    /// Any ticket action.
    pub fn ticket_action() -> impl Strategy<Value = TicketAction> {
        prop::sample::select(TicketAction::ALL.to_vec())
    }

    /// Any event status.
    pub fn event_status() -> impl Strategy<Value = EventStatus> {
        prop::sample::select(EventStatus::ALL.to_vec())
    }

    /// Any domain event kind, including ones that never touch a lifecycle.
    pub fn event_kind() -> impl Strategy<Value = DomainEventKind> {
        prop::sample::select(DomainEventKind::ALL.to_vec())
    }
}

// Re-export commonly used items
pub use mocks::{
    FixedClock, InMemoryEventBus, InMemoryEventStore, InMemoryReadModel, test_clock,
};
