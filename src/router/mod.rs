//! Partition router
//!
//! The transport facade the upstream bus talks to. Outgoing batches are split
//! by stream key, each group is encoded and published to the topic its key
//! hashes to. Incoming broker items are decoded and forwarded upstream along
//! with the topic they arrived on and their broker sequence number.

pub mod partition;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::broker::{BrokeredMessage, MemoryNamespace, Namespace};
use crate::codec;
use crate::connection::{ConnectionManager, Subscription};
use crate::message::Message;
use crate::utils::error::{Result, TransportError};

pub use partition::{PARTITION_SCHEME_VERSION, topic_index, topic_names};

/// Upstream consumer of decoded batches.
///
/// Invoked once per raw broker item, from the receive pump of the topic the
/// item arrived on. `stream_id` is the topic name. Sequence numbers increase
/// per topic and may repeat after redelivery.
pub trait ScaleoutReceiver: Send + Sync + 'static {
    fn on_received(&self, stream_id: &str, sequence_number: u64, messages: Vec<Message>);
}

impl<F> ScaleoutReceiver for F
where
    F: Fn(&str, u64, Vec<Message>) + Send + Sync + 'static,
{
    fn on_received(&self, stream_id: &str, sequence_number: u64, messages: Vec<Message>) {
        self(stream_id, sequence_number, messages)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterOptions {
    pub topic_prefix: String,
    pub topic_count: usize,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            topic_prefix: "scaleout".to_string(),
            topic_count: 5,
        }
    }
}

#[derive(Debug)]
pub struct PartitionRouter<N: Namespace = MemoryNamespace> {
    connection: Arc<ConnectionManager<N>>,
    topics: Vec<String>,
    subscription: Option<Subscription<N>>,
}

impl<N: Namespace> PartitionRouter<N> {
    /// Subscribe to every partition topic and start delivering to `receiver`.
    pub async fn start<R>(
        connection: Arc<ConnectionManager<N>>,
        options: RouterOptions,
        receiver: Arc<R>,
    ) -> Result<Self>
    where
        R: ScaleoutReceiver + ?Sized,
    {
        if options.topic_count == 0 {
            return Err(TransportError::InvalidConfig(
                "topic_count must be at least 1".to_string(),
            ));
        }
        if options.topic_prefix.is_empty() {
            return Err(TransportError::InvalidConfig(
                "topic_prefix must not be empty".to_string(),
            ));
        }

        let topics = topic_names(&options.topic_prefix, options.topic_count);
        let handler = move |topic: &str, batch: Vec<BrokeredMessage>| -> Result<()> {
            on_message(&*receiver, topic, batch)
        };
        let subscription = connection.subscribe(&topics, handler).await?;

        info!(
            topics = topics.len(),
            prefix = %options.topic_prefix,
            scheme = PARTITION_SCHEME_VERSION,
            "Partition router started"
        );

        Ok(Self {
            connection,
            topics,
            subscription: Some(subscription),
        })
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Topic that messages from `source` are published to.
    pub fn topic_for(&self, source: &str) -> &str {
        &self.topics[topic_index(source, self.topics.len())]
    }

    pub fn connection(&self) -> &Arc<ConnectionManager<N>> {
        &self.connection
    }

    /// Publish `messages`, one encoded batch per source.
    ///
    /// Every group is encoded before the first publish, so a message that
    /// cannot be framed fails the call with nothing sent. Groups are then
    /// published one after another in the order their source was first
    /// seen. The first failed publish ends the call; later groups are not
    /// attempted and earlier ones have already been delivered.
    pub async fn send(&self, messages: Vec<Message>) -> Result<()> {
        let mut batches = Vec::new();
        for group in group_by_source(messages) {
            let body = codec::encode(&group.messages).into_bytes().map_err(|e| {
                warn!(source = %group.source, error = %e, "Refusing to send unencodable batch");
                e
            })?;
            batches.push((group, body));
        }

        for (group, body) in batches {
            let topic = self.topic_for(&group.source);

            debug!(
                topic = %topic,
                source = %group.source,
                count = group.messages.len(),
                "Publishing batch"
            );

            if let Err(e) = self.connection.publish(topic, body).await {
                warn!(topic = %topic, source = %group.source, error = %e, "Publish failed");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Stop receiving, delete the subscriptions, then close the connection.
    ///
    /// Returns the first pump failure if one occurred while running.
    pub async fn shutdown(mut self) -> Result<()> {
        let pumps = match self.subscription.take() {
            Some(subscription) => subscription.close().await,
            None => Ok(()),
        };
        self.connection.close().await?;
        info!("Partition router stopped");
        pumps
    }
}

/// Decode each raw item of `batch` and hand it to `receiver`.
///
/// Items are forwarded in order. The first item that fails to decode ends
/// the call with its framing error; the items after it are not delivered.
pub fn on_message<R>(receiver: &R, topic: &str, batch: Vec<BrokeredMessage>) -> Result<()>
where
    R: ScaleoutReceiver + ?Sized,
{
    for item in batch {
        let messages = codec::decode_slice(&item.body).map_err(|e| {
            warn!(
                topic = %topic,
                sequence_number = item.sequence_number,
                error = %e,
                "Dropping rest of batch after undecodable item"
            );
            e
        })?;
        receiver.on_received(topic, item.sequence_number, messages);
    }
    Ok(())
}

#[derive(Debug)]
struct SourceGroup {
    source: String,
    messages: Vec<Message>,
}

fn group_by_source(messages: Vec<Message>) -> Vec<SourceGroup> {
    let mut groups: Vec<SourceGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for message in messages {
        match index.get(&message.source) {
            Some(&i) => groups[i].messages.push(message),
            None => {
                index.insert(message.source.clone(), groups.len());
                groups.push(SourceGroup {
                    source: message.source.clone(),
                    messages: vec![message],
                });
            }
        }
    }

    groups
}

#[cfg(test)]
mod tests;
