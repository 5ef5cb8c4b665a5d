//! Dispatch channel for persisted domain events.
//!
//! Every envelope the store appends is handed to an [`EventBus`] as a
//! [`DispatchMessage`] so background consumers (notifications, payouts, search
//! indexing) can react to it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ 1. Insert into  │
//! │  domain_events  │◄─── Source of truth
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ 2. Publish to   │
//! │  app/<type>     │◄─── At-least-once, may fail
//! └────────┬────────┘
//!          │
//!     ┌────┴────┐
//!     ▼         ▼
//! ┌───────┐ ┌───────┐
//! │Notify │ │Payout │
//! └───────┘ └───────┘
//! ```
//!
//! # Key Principles
//!
//! - **Log first**: an envelope is dispatched only after it is durable
//! - **Never rolled back**: a failed publish leaves the envelope in the log;
//!   `redispatch` re-sends it later
//! - **Idempotency**: subscribers must tolerate duplicates (use `_envelope.id`)
//!
//! # Topic Naming Convention
//!
//! Topics follow the pattern `app/<event type lowercased>`:
//! - `app/ticket_checked_in`
//! - `app/event_published`
//! - `app/escrow_released`

use crate::envelope::DomainEventEnvelope;
use futures::Stream;
use serde_json::{Map, Value, json};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during dispatch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Failed to connect to the channel.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message to a topic.
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics.
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// The envelope could not be turned into a message body.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),
}

/// A message on the dispatch channel.
///
/// The body is the event payload with two reserved keys merged in:
///
/// ```json
/// {
///   "guestId": "guest-1",
///   "eventId": "evt-1",
///   "checkedInAt": "2025-01-01T00:00:00Z",
///   "_envelope": { "id": "…", "version": 4, "aggregateType": "ticket", "aggregateId": "guest-1" },
///   "_metadata": { "correlationId": "…", "actor": { "type": "system" }, "occurredAt": "…" }
/// }
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchMessage {
    /// Destination topic, `app/<type lowercased>`.
    pub topic: String,
    /// Message body.
    pub body: Value,
}

impl DispatchMessage {
    /// Build the message for an appended envelope.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SerializationFailed`] if the payload does not
    /// serialize to a JSON object.
    pub fn from_envelope(envelope: &DomainEventEnvelope) -> Result<Self, EventBusError> {
        let tagged = serde_json::to_value(&envelope.event)
            .map_err(|e| EventBusError::SerializationFailed(e.to_string()))?;
        let mut body = match tagged.get("payload") {
            Some(Value::Object(payload)) => payload.clone(),
            _ => {
                return Err(EventBusError::SerializationFailed(format!(
                    "{} payload is not an object",
                    envelope.event_type()
                )));
            }
        };

        body.insert(
            "_envelope".to_string(),
            json!({
                "id": envelope.id,
                "version": envelope.version,
                "aggregateType": envelope.aggregate_type,
                "aggregateId": envelope.aggregate_id,
            }),
        );
        body.insert(
            "_metadata".to_string(),
            serde_json::to_value(&envelope.metadata)
                .map_err(|e| EventBusError::SerializationFailed(e.to_string()))?,
        );

        Ok(Self {
            topic: envelope.kind().topic(),
            body: Value::Object(body),
        })
    }

    /// Event type name, recovered from the topic.
    #[must_use]
    pub fn event_type(&self) -> String {
        self.topic
            .strip_prefix("app/")
            .unwrap_or(&self.topic)
            .to_uppercase()
    }

    /// The `_envelope` section of the body, if present.
    #[must_use]
    pub fn envelope_section(&self) -> Option<&Map<String, Value>> {
        self.body.get("_envelope").and_then(Value::as_object)
    }
}

/// Stream of messages from a subscription.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<DispatchMessage, EventBusError>> + Send>>;

/// Publish/subscribe channel for dispatched events.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` so the store can publish from any
/// task.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so it can be held as `Arc<dyn EventBus>`.
pub trait EventBus: Send + Sync {
    /// Publish a message to its topic.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the publish operation fails.
    fn publish(
        &self,
        message: DispatchMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more topics.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if subscription fails.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}
