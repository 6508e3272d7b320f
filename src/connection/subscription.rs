//! Subscription handle
//!
//! `Subscription` exclusively owns everything `ConnectionManager::subscribe`
//! created: the broker subscriptions, and the pump task (and with it the
//! receiver) for each. Closing it stops every pump, then deletes the broker
//! subscriptions so no metadata outlives the transport.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::broker::{Namespace, SubscriptionPath};
use crate::utils::error::{BrokerError, Result, TransportError};

#[derive(Debug)]
struct Entry {
    path: SubscriptionPath,
    pump: JoinHandle<std::result::Result<(), BrokerError>>,
}

#[derive(Debug)]
pub struct Subscription<N: Namespace> {
    namespace: Arc<N>,
    entries: Vec<Entry>,
    cancel: watch::Sender<bool>,
    closed: bool,
}

impl<N: Namespace> Subscription<N> {
    pub(super) fn new(namespace: Arc<N>, cancel: watch::Sender<bool>) -> Self {
        Self {
            namespace,
            entries: Vec::new(),
            cancel,
            closed: false,
        }
    }

    pub(super) fn push(
        &mut self,
        path: SubscriptionPath,
        pump: JoinHandle<std::result::Result<(), BrokerError>>,
    ) {
        self.entries.push(Entry { path, pump });
    }

    /// Broker paths of the subscriptions owned by this handle.
    pub fn paths(&self) -> Vec<&SubscriptionPath> {
        self.entries.iter().map(|e| &e.path).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of pumps that have not stopped yet.
    pub fn running_pumps(&self) -> usize {
        self.entries.iter().filter(|e| !e.pump.is_finished()).count()
    }

    /// Stop every pump, close the receivers and delete the broker
    /// subscriptions.
    ///
    /// Deletion is best-effort: failures are logged and skipped. Returns the
    /// first error a pump died with, if any did.
    pub async fn close(mut self) -> Result<()> {
        self.closed = true;
        let _ = self.cancel.send(true);

        let entries = std::mem::take(&mut self.entries);
        let (paths, pumps): (Vec<_>, Vec<_>) =
            entries.into_iter().map(|e| (e.path, e.pump)).unzip();

        let mut failure = None;
        for (path, joined) in paths.iter().zip(join_all(pumps).await) {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(source)) => {
                    failure.get_or_insert(TransportError::Pump {
                        topic: path.topic.clone(),
                        source,
                    });
                }
                Err(e) => error!(subscription = %path, error = %e, "Receive pump panicked"),
            }
        }

        for path in &paths {
            match self.namespace.delete_subscription(path).await {
                Ok(()) => info!(subscription = %path, "Deleted subscription"),
                Err(e) => warn!(subscription = %path, error = %e, "Failed to delete subscription"),
            }
        }

        failure.map_or(Ok(()), Err)
    }
}

impl<N: Namespace> Drop for Subscription<N> {
    fn drop(&mut self) {
        if !self.closed && !self.entries.is_empty() {
            let _ = self.cancel.send(true);
            warn!(
                subscriptions = self.entries.len(),
                "Subscription dropped without close; broker subscriptions were left behind"
            );
        }
    }
}
