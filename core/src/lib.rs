//! # Ticketflow Core
//!
//! Lifecycle definitions, the pure transition engine and the domain event
//! vocabulary for event ticketing, plus the ports (`EventStore`, `EventBus`,
//! `ReadModel`, `Clock`) the runtime drives.
//!
//! ## Core Concepts
//!
//! - **Definitions**: static transition tables for the Event and Ticket lifecycles
//! - **Engine**: pure queries over those tables (`transition`, `available_actions`)
//! - **Domain events**: immutable facts, wrapped in versioned envelopes
//! - **Event store**: the append-only log, the source of truth
//! - **Read model**: current-state tables, a rebuildable projection of the log
//!
//! ## Architecture Principles
//!
//! - Functional core (definitions, engine, events) with no I/O
//! - Log first, project second, repair drift asynchronously
//! - Dependencies injected as trait objects, never global singletons
//!
//! ## Example
//!
//! ```
//! use ticketflow_core::definitions::{Lifecycle, TicketAction, TicketStatus};
//! use ticketflow_core::engine;
//!
//! let next = engine::transition(TicketStatus::machine(), TicketStatus::Approved, TicketAction::Stake);
//! assert_eq!(next, Some(TicketStatus::Staked));
//! ```

pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod definitions;
pub mod engine;
pub mod envelope;
pub mod event;
pub mod event_bus;
pub mod event_store;
pub mod projection;
pub mod stream;

/// Environment module - injected dependencies that are not storage ports.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use ticketflow_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = chrono::Utc::now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
