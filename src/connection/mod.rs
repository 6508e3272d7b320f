//! Connection management
//!
//! `ConnectionManager` owns one broker namespace handle. It creates topic
//! subscriptions and runs a receive pump for each, and publishes encoded
//! batches to topics.
//!
//! The namespace handle is shared read-only by every pump and publish; each
//! pump owns its receiver outright, so pumps never contend with each other.

mod endpoint;
mod pump;
mod subscription;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::broker::{MemoryNamespace, Namespace, OutgoingMessage, SubscriptionPath};
use crate::utils::error::{BrokerError, Result, TransportError};

pub use endpoint::Endpoint;
pub use pump::BatchHandler;
pub use subscription::Subscription;

use pump::Pump;

/// Maximum number of messages requested per receive.
pub const RECEIVE_BATCH_SIZE: usize = 1000;

/// Delay before receiving again after the broker reported it is busy.
pub const BACKOFF_DELAY: Duration = Duration::from_secs(20);

/// Time-to-live of published batches.
pub const MESSAGE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub receive_batch_size: usize,
    pub backoff: Duration,
    pub message_ttl: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            receive_batch_size: RECEIVE_BATCH_SIZE,
            backoff: BACKOFF_DELAY,
            message_ttl: MESSAGE_TTL,
        }
    }
}

impl ConnectionOptions {
    /// Reject values the pump and broker cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.receive_batch_size == 0 {
            return Err(TransportError::InvalidConfig(
                "receive_batch_size must be at least 1".to_string(),
            ));
        }
        if self.message_ttl.is_zero() {
            return Err(TransportError::InvalidConfig(
                "message_ttl must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct ConnectionManager<N: Namespace = MemoryNamespace> {
    namespace: Arc<N>,
    options: ConnectionOptions,
}

impl ConnectionManager<MemoryNamespace> {
    /// Connect to the broker named by `endpoint`.
    ///
    /// A malformed or unsupported endpoint fails immediately; this is a
    /// startup condition and is not retried.
    pub fn open(endpoint: &str, options: ConnectionOptions) -> Result<Self> {
        options.validate()?;
        let namespace = match endpoint.parse::<Endpoint>()? {
            Endpoint::Memory { namespace } => MemoryNamespace::connect(&namespace),
        };

        info!(endpoint = %endpoint, "Opened broker connection");
        Ok(Self::new(namespace, options))
    }
}

impl<N: Namespace> ConnectionManager<N> {
    pub fn new(namespace: N, options: ConnectionOptions) -> Self {
        Self {
            namespace: Arc::new(namespace),
            options,
        }
    }

    pub fn namespace(&self) -> &Arc<N> {
        &self.namespace
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Attach a fresh subscription to each of `topics` and start pumping.
    ///
    /// Missing topics are created. Every subscription gets a unique
    /// generated name. If any topic fails to attach, the subscriptions made
    /// so far are torn down before the error is returned. Invalid options
    /// fail before anything is created.
    pub async fn subscribe<H>(&self, topics: &[String], handler: H) -> Result<Subscription<N>>
    where
        H: BatchHandler,
    {
        self.options.validate()?;

        let handler = Arc::new(handler);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut subscription = Subscription::new(self.namespace.clone(), cancel_tx);

        for topic in topics {
            let (path, receiver) = match self.attach(topic).await {
                Ok(attached) => attached,
                Err(e) => {
                    if let Err(close_err) = subscription.close().await {
                        warn!(error = %close_err, "Pump failed while unwinding subscribe");
                    }
                    return Err(e);
                }
            };

            let pump = Pump {
                topic: topic.clone(),
                receiver,
                handler: handler.clone(),
                batch_size: self.options.receive_batch_size,
                backoff: self.options.backoff,
                cancel: cancel_rx.clone(),
            };

            info!(topic = %topic, subscription = %path.name, "Subscribed");
            subscription.push(path, tokio::spawn(pump.run()));
        }

        Ok(subscription)
    }

    /// Send one encoded batch to `topic`.
    ///
    /// Completes when the broker has accepted the message. Failures are
    /// returned as-is; retrying is the caller's decision.
    pub async fn publish(&self, topic: &str, body: Bytes) -> Result<()> {
        let message = OutgoingMessage {
            body,
            time_to_live: self.options.message_ttl,
        };
        self.namespace.send(topic, message).await?;
        Ok(())
    }

    /// Close the broker connection.
    pub async fn close(&self) -> Result<()> {
        self.namespace.close().await?;
        info!("Closed broker connection");
        Ok(())
    }

    async fn attach(&self, topic: &str) -> Result<(SubscriptionPath, N::Receiver)> {
        self.ensure_topic(topic).await?;

        let path = SubscriptionPath::new(topic, Uuid::new_v4().to_string());
        self.namespace.create_subscription(&path).await?;

        match self.namespace.create_receiver(&path).await {
            Ok(receiver) => Ok((path, receiver)),
            Err(e) => {
                if let Err(delete_err) = self.namespace.delete_subscription(&path).await {
                    warn!(subscription = %path, error = %delete_err, "Failed to delete subscription");
                }
                Err(e.into())
            }
        }
    }

    async fn ensure_topic(&self, topic: &str) -> Result<()> {
        if self.namespace.topic_exists(topic).await? {
            return Ok(());
        }

        // another node may create the topic between the check and here
        match self.namespace.create_topic(topic).await {
            Ok(()) | Err(BrokerError::EntityExists(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_helpers;
