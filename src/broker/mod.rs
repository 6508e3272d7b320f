//! Broker collaborator
//!
//! The transport does not implement a message broker; it drives one through
//! the [`Namespace`] and [`MessageReceiver`] traits defined here. The
//! operations are the minimal lifecycle the transport needs: make sure a
//! topic exists, attach a uniquely named subscription, receive batches from
//! it, send single messages with a time-to-live, and tear the subscription
//! down again.
//!
//! [`MemoryNamespace`] is an in-process implementation used for local
//! deployments and tests.

pub mod engine;
pub mod topic;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::utils::error::BrokerError;

pub use engine::MemoryNamespace;

/// A message as delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokeredMessage {
    /// Assigned by the broker, strictly increasing within a topic.
    pub sequence_number: u64,
    pub enqueued_at: DateTime<Utc>,
    pub body: Bytes,
}

/// A message handed to the broker for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub body: Bytes,
    /// Undelivered messages are discarded once this elapses.
    pub time_to_live: Duration,
}

/// Address of one subscription on one topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionPath {
    pub topic: String,
    pub name: String,
}

impl SubscriptionPath {
    pub fn new(topic: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for SubscriptionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/subscriptions/{}", self.topic, self.name)
    }
}

/// Management and send operations on a broker namespace.
///
/// A namespace handle is shared by every subscription and publish of a
/// connection, so all methods take `&self`.
#[async_trait]
pub trait Namespace: Send + Sync + 'static {
    type Receiver: MessageReceiver;

    async fn topic_exists(&self, topic: &str) -> Result<bool, BrokerError>;

    async fn create_topic(&self, topic: &str) -> Result<(), BrokerError>;

    async fn create_subscription(&self, path: &SubscriptionPath) -> Result<(), BrokerError>;

    async fn delete_subscription(&self, path: &SubscriptionPath) -> Result<(), BrokerError>;

    async fn create_receiver(
        &self,
        path: &SubscriptionPath,
    ) -> Result<Self::Receiver, BrokerError>;

    /// Send one message to `topic`. Completes once the broker has accepted it.
    async fn send(&self, topic: &str, message: OutgoingMessage) -> Result<(), BrokerError>;

    /// Close the connection. Later operations fail with [`BrokerError::Closed`].
    async fn close(&self) -> Result<(), BrokerError>;
}

/// A receiver bound to a single subscription.
#[async_trait]
pub trait MessageReceiver: Send + 'static {
    /// Receive up to `max_messages`.
    ///
    /// Suspends until at least one message is available or the broker's
    /// server-side wait elapses (an empty batch). Returns
    /// [`BrokerError::ServerBusy`] when throttled and
    /// [`BrokerError::Cancelled`] once the receiver has been closed.
    async fn receive_batch(
        &mut self,
        max_messages: usize,
    ) -> Result<Vec<BrokeredMessage>, BrokerError>;

    async fn close(&mut self) -> Result<(), BrokerError>;
}
