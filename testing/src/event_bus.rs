//! In-memory [`EventBus`] that records every published message.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use ticketflow_core::event_bus::{DispatchMessage, EventBus, EventBusError, EventStream};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

/// In-memory dispatch channel.
///
/// Published messages are recorded for assertions and fanned out to live
/// subscribers over a `tokio::sync::broadcast` channel. Publishing can be
/// switched to fail so tests can check that dispatch errors never undo an
/// append.
#[derive(Clone)]
pub struct InMemoryEventBus {
    published: Arc<RwLock<Vec<DispatchMessage>>>,
    failing: Arc<AtomicBool>,
    sender: broadcast::Sender<DispatchMessage>,
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            published: Arc::new(RwLock::new(Vec::new())),
            failing: Arc::new(AtomicBool::new(false)),
            sender,
        }
    }

    /// Make every publish fail (`true`) or succeed again (`false`).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every successfully published message, oldest first.
    #[must_use]
    pub fn published(&self) -> Vec<DispatchMessage> {
        self.published.read().unwrap().clone()
    }

    /// Topics of every successfully published message, oldest first.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        self.published
            .read()
            .unwrap()
            .iter()
            .map(|message| message.topic.clone())
            .collect()
    }

    /// Forget recorded messages.
    pub fn clear(&self) {
        self.published.write().unwrap().clear();
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        message: DispatchMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(EventBusError::PublishFailed {
                    topic: message.topic,
                    reason: "in-memory bus set to fail".to_string(),
                });
            }

            self.published.write().unwrap().push(message.clone());
            // No live subscribers is not an error.
            let _ = self.sender.send(message);
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|topic| (*topic).to_string()).collect();
        let mut receiver = self.sender.subscribe();

        Box::pin(async move {
            let stream = async_stream::stream! {
                loop {
                    match receiver.recv().await {
                        Ok(message) => {
                            if topics.is_empty() || topics.contains(&message.topic) {
                                yield Ok(message);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            yield Err(EventBusError::SubscriptionFailed {
                                topics: topics.clone(),
                                reason: format!("subscriber lagged by {skipped} messages"),
                            });
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            };
            Ok(Box::pin(stream) as EventStream)
        })
    }
}
