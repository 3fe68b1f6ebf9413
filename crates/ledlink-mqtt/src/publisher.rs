//! Publisher trait consumed by the schedulers.
//!
//! Abstracts the broker publish so that schedulers and the pipeline facade
//! can be driven in tests without a broker.

use crate::config::PublishOptions;
use crate::connection::{ConnectionManager, ConnectionState, ConnectionStatus};
use crate::error::{MqttError, MqttResult};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Anything that can publish to the bus.
pub trait Publisher: Send + Sync {
    /// Publish one message. See [`ConnectionManager::publish`] for semantics.
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        payload: &'a str,
        options: PublishOptions,
    ) -> BoxFuture<'a, MqttResult<()>>;

    /// Connection state snapshot.
    fn status(&self) -> ConnectionStatus;
}

/// Arc wrapper for Publisher trait objects.
pub type DynPublisher = Arc<dyn Publisher>;

impl Publisher for ConnectionManager {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        payload: &'a str,
        options: PublishOptions,
    ) -> BoxFuture<'a, MqttResult<()>> {
        Box::pin(ConnectionManager::publish(self, topic, payload, options))
    }

    fn status(&self) -> ConnectionStatus {
        ConnectionManager::status(self)
    }
}

/// A message captured by [`MockPublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: String,
    pub options: PublishOptions,
}

/// In-memory publisher for tests.
///
/// Behaves like a connected broker by default. Publishing while the mock
/// state is not `Connected` fails with `NotConnected` and records nothing.
#[derive(Debug)]
pub struct MockPublisher {
    published: Mutex<Vec<PublishedMessage>>,
    phase: Mutex<ConnectionState>,
    failing_topics: Mutex<HashSet<String>>,
}

impl Default for MockPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPublisher {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            phase: Mutex::new(ConnectionState::Connected),
            failing_topics: Mutex::new(HashSet::new()),
        }
    }

    pub fn set_state(&self, phase: ConnectionState) {
        *self.phase.lock() = phase;
    }

    /// Make every publish on `topic` fail with a transport error.
    pub fn fail_topic(&self, topic: impl Into<String>) {
        self.failing_topics.lock().insert(topic.into());
    }

    /// All recorded publishes in order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().clone()
    }

    /// Payloads published on `topic`, in order.
    pub fn payloads_on(&self, topic: &str) -> Vec<String> {
        self.published
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .map(|m| m.payload.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.published.lock().clear();
    }
}

impl Publisher for MockPublisher {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        payload: &'a str,
        options: PublishOptions,
    ) -> BoxFuture<'a, MqttResult<()>> {
        Box::pin(async move {
            let phase = *self.phase.lock();
            if phase != ConnectionState::Connected {
                return Err(MqttError::NotConnected { phase });
            }
            if self.failing_topics.lock().contains(topic) {
                return Err(MqttError::Publish(format!("mock failure on {topic}")));
            }

            self.published.lock().push(PublishedMessage {
                topic: topic.to_string(),
                payload: payload.to_string(),
                options,
            });
            Ok(())
        })
    }

    fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            phase: *self.phase.lock(),
            last_error: None,
        }
    }
}
