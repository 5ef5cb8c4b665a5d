//! Envelopes: a [`DomainEvent`] plus its position in the log and its metadata.
//!
//! An envelope is the unit of persistence. Once appended it never changes; the
//! event log of envelopes is the source of truth and every read model is a
//! projection of it.

use crate::event::{DomainEvent, DomainEventKind};
use crate::stream::{AggregateId, AggregateRef, AggregateType, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Who or what caused a command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    /// A signed-in person.
    User,
    /// The platform itself.
    #[default]
    System,
    /// A scheduled job.
    Cron,
    /// An inbound webhook.
    Webhook,
}

impl ActorType {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
            Self::Cron => "cron",
            Self::Webhook => "webhook",
        }
    }
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actor recorded on an envelope.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Kind of actor.
    #[serde(rename = "type")]
    pub actor_type: ActorType,
    /// Actor identifier, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Actor {
    /// The platform acting on its own behalf.
    #[must_use]
    pub const fn system() -> Self {
        Self {
            actor_type: ActorType::System,
            id: None,
        }
    }

    /// A signed-in user.
    #[must_use]
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            actor_type: ActorType::User,
            id: Some(id.into()),
        }
    }
}

/// Tracing and attribution data attached to every envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    /// Groups every event caused by one logical workflow.
    pub correlation_id: String,
    /// Id of the envelope (or request) that directly caused this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,
    /// Id of the inbound request, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Who caused the event.
    pub actor: Actor,
    /// When the fact happened.
    pub occurred_at: DateTime<Utc>,
    /// When the store persisted it; set by the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Caller-supplied part of [`EventMetadata`]; the store fills in the rest.
///
/// A missing correlation id becomes a fresh UUID, a missing actor becomes
/// [`Actor::system`], and a missing `occurred_at` becomes "now".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataInput {
    /// Correlation id to join.
    pub correlation_id: Option<String>,
    /// Direct cause.
    pub causation_id: Option<String>,
    /// Inbound request id.
    pub request_id: Option<String>,
    /// Actor, defaulting to the system.
    pub actor: Option<Actor>,
    /// Occurrence time, defaulting to the store's clock.
    pub occurred_at: Option<DateTime<Utc>>,
}

impl MetadataInput {
    /// Complete the metadata.
    #[must_use]
    pub fn complete(self, now: DateTime<Utc>) -> EventMetadata {
        EventMetadata {
            correlation_id: self
                .correlation_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            causation_id: self.causation_id,
            request_id: self.request_id,
            actor: self.actor.unwrap_or_else(Actor::system),
            occurred_at: self.occurred_at.unwrap_or(now),
            created_at: None,
        }
    }
}

/// A persisted (or about to be persisted) domain event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEventEnvelope {
    /// Unique envelope id.
    pub id: Uuid,
    /// Kind of aggregate the event belongs to.
    pub aggregate_type: AggregateType,
    /// Aggregate instance.
    pub aggregate_id: AggregateId,
    /// Position within the aggregate's stream (1-based, gapless).
    pub version: Version,
    /// The fact itself, serialized as `{ type, payload }`.
    #[serde(flatten)]
    pub event: DomainEvent,
    /// Attribution and tracing.
    pub metadata: EventMetadata,
}

impl DomainEventEnvelope {
    /// Wrap `event` at `version`, addressing it to the event's own aggregate.
    #[must_use]
    pub fn new(event: DomainEvent, version: Version, metadata: EventMetadata) -> Self {
        let AggregateRef {
            aggregate_type,
            aggregate_id,
        } = event.aggregate();
        Self {
            id: Uuid::new_v4(),
            aggregate_type,
            aggregate_id,
            version,
            event,
            metadata,
        }
    }

    /// Address of the stream this envelope belongs to.
    #[must_use]
    pub fn aggregate(&self) -> AggregateRef {
        AggregateRef::new(self.aggregate_type, self.aggregate_id.clone())
    }

    /// Kind of the wrapped event.
    #[must_use]
    pub const fn kind(&self) -> DomainEventKind {
        self.event.kind()
    }

    /// Type name of the wrapped event.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        self.event.event_type()
    }
}

impl fmt::Display for DomainEventEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{} v{}",
            self.event_type(),
            self.aggregate_type,
            self.aggregate_id,
            self.version
        )
    }
}
