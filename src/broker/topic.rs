//! Topic management for the in-memory broker
//!
//! A `Topic` owns a sequence counter and one queue per attached
//! subscription. Publishing stamps the message with the next sequence number
//! and appends a copy to every subscription queue, so each subscription sees
//! the topic's full stream in order.
//!
//! Concurrency note: callers synchronize access to `Topic` through the
//! broker's topic lock. Queues are shared with receivers and carry their own
//! lock.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{BrokeredMessage, OutgoingMessage};
use crate::utils::error::BrokerError;

pub type SubscriptionName = String;

#[derive(Debug)]
pub struct Topic {
    pub name: String,
    next_sequence: u64,
    pub subscriptions: HashMap<SubscriptionName, Arc<SubscriptionQueue>>,
}

impl Topic {
    /// Create a new topic with no subscriptions.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            next_sequence: 1,
            subscriptions: HashMap::new(),
        }
    }

    /// Attach a subscription. Names are unique per topic.
    pub fn subscribe(&mut self, name: &str) -> Result<Arc<SubscriptionQueue>, BrokerError> {
        if self.subscriptions.contains_key(name) {
            return Err(BrokerError::EntityExists(format!(
                "{}/subscriptions/{}",
                self.name, name
            )));
        }

        let queue = Arc::new(SubscriptionQueue::default());
        self.subscriptions.insert(name.to_string(), queue.clone());
        Ok(queue)
    }

    /// Detach a subscription and close its queue.
    pub fn unsubscribe(&mut self, name: &str) -> Option<Arc<SubscriptionQueue>> {
        let queue = self.subscriptions.remove(name)?;
        queue.close();
        Some(queue)
    }

    /// Fan a message out to every subscription and return its sequence number.
    pub fn publish(&mut self, message: OutgoingMessage) -> u64 {
        let sequence_number = self.next_sequence;
        self.next_sequence += 1;

        let expires_at = Instant::now() + message.time_to_live;
        let delivered = BrokeredMessage {
            sequence_number,
            enqueued_at: Utc::now(),
            body: message.body,
        };

        for queue in self.subscriptions.values() {
            queue.push(delivered.clone(), expires_at);
        }

        sequence_number
    }
}

#[derive(Debug)]
struct QueuedMessage {
    message: BrokeredMessage,
    expires_at: Instant,
}

/// Pending messages of one subscription.
#[derive(Debug, Default)]
pub struct SubscriptionQueue {
    entries: Mutex<VecDeque<QueuedMessage>>,
    notify: Notify,
    closed: AtomicBool,
}

impl SubscriptionQueue {
    /// Append a message, first discarding expired entries at the front so a
    /// queue nobody reads stays bounded by what is still live.
    fn push(&self, message: BrokeredMessage, expires_at: Instant) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        while entries.front().is_some_and(|e| e.expires_at <= now) {
            entries.pop_front();
        }
        entries.push_back(QueuedMessage {
            message,
            expires_at,
        });
        drop(entries);
        self.notify.notify_one();
    }

    /// Remove up to `max` live messages from the front of the queue.
    /// Expired messages are discarded on the way.
    pub fn take(&self, max: usize) -> Vec<BrokeredMessage> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut batch = Vec::new();

        while batch.len() < max {
            let Some(entry) = entries.pop_front() else {
                break;
            };
            if entry.expires_at > now {
                batch.push(entry.message);
            }
        }

        batch
    }

    /// Wait for the next push or close.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // notify_one stores a permit, so a receiver about to wait still wakes
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
