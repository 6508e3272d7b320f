//! Scripted broker fixtures for connection and router tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::time::Instant;

use crate::broker::{
    BrokeredMessage, MessageReceiver, Namespace, OutgoingMessage, SubscriptionPath,
};
use crate::utils::error::BrokerError;

pub type ReceiveOutcome = Result<Vec<BrokeredMessage>, BrokerError>;

#[derive(Debug, Default)]
pub struct ScriptState {
    pub topics: HashSet<String>,
    pub subscriptions: Vec<SubscriptionPath>,
    pub deleted: Vec<SubscriptionPath>,
    pub sent: Vec<(String, OutgoingMessage)>,
    pub send_attempts: usize,
    /// Zero-based index of the send attempt that fails.
    pub fail_send_at: Option<usize>,
    pub fail_delete: bool,
    pub fail_receiver_for: Option<String>,
    /// Receive outcomes per topic; once drained a receive never completes.
    pub scripts: HashMap<String, VecDeque<ReceiveOutcome>>,
    /// Topics that keep returning one-message batches after their script.
    pub endless: HashSet<String>,
    pub endless_sequence: u64,
    pub receive_calls: Vec<(String, Instant)>,
    pub closed_receivers: usize,
    pub closed: bool,
}

/// Namespace whose behaviour is driven entirely by `ScriptState`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedNamespace {
    pub state: Arc<Mutex<ScriptState>>,
}

impl ScriptedNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, topic: &str, outcomes: Vec<ReceiveOutcome>) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(topic.to_string(), outcomes.into());
    }

    pub fn endless(&self, topic: &str) {
        self.state.lock().unwrap().endless.insert(topic.to_string());
    }

    pub fn fail_send_at(&self, index: usize) {
        self.state.lock().unwrap().fail_send_at = Some(index);
    }

    pub fn sent(&self) -> Vec<(String, OutgoingMessage)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn receive_calls(&self, topic: &str) -> Vec<Instant> {
        self.state
            .lock()
            .unwrap()
            .receive_calls
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, at)| *at)
            .collect()
    }
}

pub fn brokered(sequence_number: u64, body: Bytes) -> BrokeredMessage {
    BrokeredMessage {
        sequence_number,
        enqueued_at: Utc::now(),
        body,
    }
}

#[async_trait]
impl Namespace for ScriptedNamespace {
    type Receiver = ScriptedReceiver;

    async fn topic_exists(&self, topic: &str) -> Result<bool, BrokerError> {
        Ok(self.state.lock().unwrap().topics.contains(topic))
    }

    async fn create_topic(&self, topic: &str) -> Result<(), BrokerError> {
        self.state.lock().unwrap().topics.insert(topic.to_string());
        Ok(())
    }

    async fn create_subscription(&self, path: &SubscriptionPath) -> Result<(), BrokerError> {
        self.state.lock().unwrap().subscriptions.push(path.clone());
        Ok(())
    }

    async fn delete_subscription(&self, path: &SubscriptionPath) -> Result<(), BrokerError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_delete {
            return Err(BrokerError::Communication("delete refused".to_string()));
        }
        state.subscriptions.retain(|p| p != path);
        state.deleted.push(path.clone());
        Ok(())
    }

    async fn create_receiver(
        &self,
        path: &SubscriptionPath,
    ) -> Result<ScriptedReceiver, BrokerError> {
        if self.state.lock().unwrap().fail_receiver_for.as_deref() == Some(path.topic.as_str()) {
            return Err(BrokerError::Communication("receiver refused".to_string()));
        }
        Ok(ScriptedReceiver {
            topic: path.topic.clone(),
            state: self.state.clone(),
        })
    }

    async fn send(&self, topic: &str, message: OutgoingMessage) -> Result<(), BrokerError> {
        let mut state = self.state.lock().unwrap();
        let attempt = state.send_attempts;
        state.send_attempts += 1;
        if state.fail_send_at == Some(attempt) {
            return Err(BrokerError::Communication("send rejected".to_string()));
        }
        state.sent.push((topic.to_string(), message));
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

#[derive(Debug)]
pub struct ScriptedReceiver {
    topic: String,
    state: Arc<Mutex<ScriptState>>,
}

#[async_trait]
impl MessageReceiver for ScriptedReceiver {
    async fn receive_batch(&mut self, _max_messages: usize) -> ReceiveOutcome {
        let (next, endless) = {
            let mut state = self.state.lock().unwrap();
            state.receive_calls.push((self.topic.clone(), Instant::now()));
            let next = state
                .scripts
                .get_mut(&self.topic)
                .and_then(|outcomes| outcomes.pop_front());
            let endless = match next {
                None if state.endless.contains(&self.topic) => {
                    state.endless_sequence += 1;
                    Some(state.endless_sequence)
                }
                _ => None,
            };
            (next, endless)
        };

        if let Some(outcome) = next {
            return outcome;
        }
        match endless {
            Some(sequence_number) => {
                // let other tasks run between batches
                tokio::task::yield_now().await;
                Ok(vec![brokered(sequence_number, Bytes::new())])
            }
            None => std::future::pending::<ReceiveOutcome>().await,
        }
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        self.state.lock().unwrap().closed_receivers += 1;
        Ok(())
    }
}
