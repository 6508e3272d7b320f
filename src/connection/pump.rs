//! Receive pump
//!
//! One pump runs per subscription as its own task. It is a plain loop:
//! receive a batch, hand it to the handler, receive again. A throttled
//! receive sleeps for the backoff delay before the next attempt. The pump
//! only ends when cancellation is signalled, the receiver reports it was
//! cancelled, or the broker returns an error that retrying cannot fix.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, trace, warn};

use crate::broker::{BrokeredMessage, MessageReceiver};
use crate::utils::error::{BrokerError, TransportError};

/// Consumer of received batches.
///
/// Called synchronously from the pump: the next receive is not issued until
/// `on_batch` returns, which bounds the number of in-flight messages per
/// subscription to one batch. An error abandons the rest of the batch; it is
/// logged and the pump carries on.
pub trait BatchHandler: Send + Sync + 'static {
    fn on_batch(&self, topic: &str, batch: Vec<BrokeredMessage>) -> Result<(), TransportError>;
}

impl<F> BatchHandler for F
where
    F: Fn(&str, Vec<BrokeredMessage>) -> Result<(), TransportError> + Send + Sync + 'static,
{
    fn on_batch(&self, topic: &str, batch: Vec<BrokeredMessage>) -> Result<(), TransportError> {
        self(topic, batch)
    }
}

pub(super) struct Pump<R, H> {
    pub topic: String,
    pub receiver: R,
    pub handler: Arc<H>,
    pub batch_size: usize,
    pub backoff: Duration,
    pub cancel: watch::Receiver<bool>,
}

impl<R, H> Pump<R, H>
where
    R: MessageReceiver,
    H: BatchHandler,
{
    /// Run until cancelled, then close the receiver.
    pub async fn run(mut self) -> Result<(), BrokerError> {
        let result = self.pump().await;

        match &result {
            Ok(()) => debug!(topic = %self.topic, "Receive pump stopped"),
            Err(e) => error!(topic = %self.topic, error = %e, "Receive pump failed"),
        }

        if let Err(e) = self.receiver.close().await {
            debug!(topic = %self.topic, error = %e, "Failed to close receiver");
        }

        result
    }

    async fn pump(&mut self) -> Result<(), BrokerError> {
        loop {
            if *self.cancel.borrow() {
                return Ok(());
            }

            let received = tokio::select! {
                biased;
                _ = self.cancel.changed() => return Ok(()),
                received = self.receiver.receive_batch(self.batch_size) => received,
            };

            match received {
                Ok(batch) if batch.is_empty() => {
                    trace!(topic = %self.topic, "Receive returned no messages");
                }
                Ok(batch) => {
                    // a receive that raced with close must not reach the handler
                    if *self.cancel.borrow() {
                        return Ok(());
                    }

                    debug!(topic = %self.topic, count = batch.len(), "Received batch");
                    if let Err(e) = self.handler.on_batch(&self.topic, batch) {
                        error!(topic = %self.topic, error = %e, "Batch handler failed");
                    }
                }
                Err(BrokerError::ServerBusy) => {
                    warn!(
                        topic = %self.topic,
                        backoff_secs = self.backoff.as_secs(),
                        "Broker is busy, backing off"
                    );

                    tokio::select! {
                        biased;
                        _ = self.cancel.changed() => return Ok(()),
                        _ = tokio::time::sleep(self.backoff) => {}
                    }
                }
                Err(BrokerError::Cancelled) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}
