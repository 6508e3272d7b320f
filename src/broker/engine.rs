//! In-memory broker engine
//!
//! `MemoryBroker` holds topics and their subscription queues. Brokers are
//! either private (`MemoryBroker::new`) or registered process-wide under a
//! name (`MemoryBroker::shared`), so several connections opened on the same
//! `memory://<name>` endpoint exchange messages exactly as separate nodes
//! sharing one external broker would.
//!
//! `MemoryNamespace` is a connection to a broker. Closing it only affects
//! that connection; the broker and other connections keep running.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use super::topic::{SubscriptionQueue, Topic};
use super::{BrokeredMessage, MessageReceiver, Namespace, OutgoingMessage, SubscriptionPath};
use crate::utils::error::BrokerError;

/// How long a receive waits for messages before returning an empty batch.
pub const DEFAULT_RECEIVE_WAIT: Duration = Duration::from_secs(60);

static SHARED_BROKERS: OnceLock<Mutex<HashMap<String, Arc<MemoryBroker>>>> = OnceLock::new();

#[derive(Debug, Default)]
pub struct MemoryBroker {
    topics: Mutex<HashMap<String, Topic>>,
}

impl MemoryBroker {
    /// Create a private broker.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get or create the process-wide broker registered under `name`.
    pub fn shared(name: &str) -> Arc<Self> {
        let registry = SHARED_BROKERS.get_or_init(|| Mutex::new(HashMap::new()));
        registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_insert_with(MemoryBroker::new)
            .clone()
    }

    /// Names of all existing topics, sorted.
    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.lock_topics().keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of the subscriptions attached to `topic`.
    pub fn subscription_names(&self, topic: &str) -> Vec<String> {
        self.lock_topics()
            .get(topic)
            .map(|t| t.subscriptions.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lock_topics(&self) -> std::sync::MutexGuard<'_, HashMap<String, Topic>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A connection to a [`MemoryBroker`].
#[derive(Debug)]
pub struct MemoryNamespace {
    broker: Arc<MemoryBroker>,
    closed: Arc<AtomicBool>,
    receive_wait: Duration,
}

impl MemoryNamespace {
    pub fn new(broker: Arc<MemoryBroker>) -> Self {
        Self {
            broker,
            closed: Arc::new(AtomicBool::new(false)),
            receive_wait: DEFAULT_RECEIVE_WAIT,
        }
    }

    /// Connect to the shared broker registered under `name`.
    pub fn connect(name: &str) -> Self {
        Self::new(MemoryBroker::shared(name))
    }

    pub fn with_receive_wait(mut self, receive_wait: Duration) -> Self {
        self.receive_wait = receive_wait;
        self
    }

    pub fn broker(&self) -> &Arc<MemoryBroker> {
        &self.broker
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BrokerError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Namespace for MemoryNamespace {
    type Receiver = MemoryReceiver;

    async fn topic_exists(&self, topic: &str) -> Result<bool, BrokerError> {
        self.ensure_open()?;
        Ok(self.broker.lock_topics().contains_key(topic))
    }

    async fn create_topic(&self, topic: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut topics = self.broker.lock_topics();
        if topics.contains_key(topic) {
            return Err(BrokerError::EntityExists(topic.to_string()));
        }
        topics.insert(topic.to_string(), Topic::new(topic));
        debug!(topic = %topic, "Created topic");
        Ok(())
    }

    async fn create_subscription(&self, path: &SubscriptionPath) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut topics = self.broker.lock_topics();
        let topic = topics
            .get_mut(&path.topic)
            .ok_or_else(|| BrokerError::EntityNotFound(path.topic.clone()))?;
        topic.subscribe(&path.name)?;
        Ok(())
    }

    async fn delete_subscription(&self, path: &SubscriptionPath) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.broker
            .lock_topics()
            .get_mut(&path.topic)
            .and_then(|t| t.unsubscribe(&path.name))
            .map(|_| ())
            .ok_or_else(|| BrokerError::EntityNotFound(path.to_string()))
    }

    async fn create_receiver(
        &self,
        path: &SubscriptionPath,
    ) -> Result<MemoryReceiver, BrokerError> {
        self.ensure_open()?;
        let queue = self
            .broker
            .lock_topics()
            .get(&path.topic)
            .and_then(|t| t.subscriptions.get(&path.name).cloned())
            .ok_or_else(|| BrokerError::EntityNotFound(path.to_string()))?;

        Ok(MemoryReceiver {
            path: path.clone(),
            queue,
            connection_closed: self.closed.clone(),
            closed: false,
            receive_wait: self.receive_wait,
        })
    }

    async fn send(&self, topic: &str, message: OutgoingMessage) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let sequence_number = self
            .broker
            .lock_topics()
            .get_mut(topic)
            .map(|t| t.publish(message))
            .ok_or_else(|| BrokerError::EntityNotFound(topic.to_string()))?;
        debug!(topic = %topic, sequence_number, "Accepted message");
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Receiver over one in-memory subscription queue.
#[derive(Debug)]
pub struct MemoryReceiver {
    path: SubscriptionPath,
    queue: Arc<SubscriptionQueue>,
    connection_closed: Arc<AtomicBool>,
    closed: bool,
    receive_wait: Duration,
}

#[async_trait]
impl MessageReceiver for MemoryReceiver {
    async fn receive_batch(
        &mut self,
        max_messages: usize,
    ) -> Result<Vec<BrokeredMessage>, BrokerError> {
        let deadline = Instant::now() + self.receive_wait;

        loop {
            if self.closed || self.connection_closed.load(Ordering::SeqCst) {
                return Err(BrokerError::Cancelled);
            }
            if self.queue.is_closed() {
                return Err(BrokerError::EntityNotFound(self.path.to_string()));
            }

            let batch = self.queue.take(max_messages);
            if !batch.is_empty() {
                return Ok(batch);
            }

            if tokio::time::timeout_at(deadline, self.queue.notified())
                .await
                .is_err()
            {
                return Ok(Vec::new());
            }
        }
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        self.closed = true;
        Ok(())
    }
}
