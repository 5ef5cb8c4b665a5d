//! `PostgreSQL` `LISTEN`/`NOTIFY` implementation of [`EventBus`].
//!
//! Each topic is a notification channel (`app/ticket_checked_in`); the message
//! body is the JSON payload. Delivery is at-most-once to connected listeners:
//! nothing is queued for a subscriber that is offline, which is why missed
//! dispatches are replayed from the log with `redispatch`.

use futures::StreamExt;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use std::future::Future;
use std::pin::Pin;
use ticketflow_core::event_bus::{DispatchMessage, EventBus, EventBusError, EventStream};

/// Largest payload `NOTIFY` accepts.
const MAX_PAYLOAD_BYTES: usize = 7999;

/// Dispatch channel over `pg_notify`.
#[derive(Clone)]
pub struct PostgresEventBus {
    pool: PgPool,
}

impl PostgresEventBus {
    /// Create a bus that publishes and listens through `pool`.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl EventBus for PostgresEventBus {
    fn publish(
        &self,
        message: DispatchMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        Box::pin(async move {
            let body = serde_json::to_string(&message.body)
                .map_err(|e| EventBusError::SerializationFailed(e.to_string()))?;
            if body.len() > MAX_PAYLOAD_BYTES {
                return Err(EventBusError::PublishFailed {
                    topic: message.topic,
                    reason: format!("payload of {} bytes exceeds NOTIFY limit", body.len()),
                });
            }

            sqlx::query("SELECT pg_notify($1, $2)")
                .bind(&message.topic)
                .bind(&body)
                .execute(&self.pool)
                .await
                .map_err(|e| EventBusError::PublishFailed {
                    topic: message.topic.clone(),
                    reason: e.to_string(),
                })?;
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(ToString::to_string).collect();
        Box::pin(async move {
            let failed = |reason: String| EventBusError::SubscriptionFailed {
                topics: topics.clone(),
                reason,
            };

            let mut listener = PgListener::connect_with(&self.pool)
                .await
                .map_err(|e| failed(e.to_string()))?;
            listener
                .listen_all(topics.iter().map(String::as_str))
                .await
                .map_err(|e| failed(e.to_string()))?;
            tracing::info!(topics = ?topics, "Listening for dispatched events");

            let stream = listener.into_stream().map(|notification| {
                let notification =
                    notification.map_err(|e| EventBusError::ConnectionFailed(e.to_string()))?;
                let body = serde_json::from_str(notification.payload())
                    .map_err(|e| EventBusError::SerializationFailed(e.to_string()))?;
                Ok(DispatchMessage {
                    topic: notification.channel().to_string(),
                    body,
                })
            });
            Ok(Box::pin(stream) as EventStream)
        })
    }
}
