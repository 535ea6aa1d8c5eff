// ============================
// crates/backend-lib/src/dispatcher.rs
// ============================
//! Routes queue change events to per-uid worker partitions.
//!
//! Events for the same uid always land on the same worker and are handled
//! in order. Different uids are handled concurrently.
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use metrics::counter;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::engine::Matchmaker;
use crate::leave::LeaveHandler;
use crate::metrics::EVENTS_LAGGED;
use crate::store::{QueueChange, QueueEvent};

/// Worker index for `uid`
pub fn partition_for(uid: &str, partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    uid.hash(&mut hasher);
    (hasher.finish() % partitions.max(1) as u64) as usize
}

pub struct Dispatcher {
    matchmaker: Arc<Matchmaker>,
    leave: Arc<LeaveHandler>,
    partitions: usize,
}

impl Dispatcher {
    pub fn new(matchmaker: Arc<Matchmaker>, leave: Arc<LeaveHandler>, partitions: usize) -> Self {
        Self {
            matchmaker,
            leave,
            partitions: partitions.max(1),
        }
    }

    /// Start the pump and its workers. The returned handles finish once
    /// `shutdown` flips or the event feed closes.
    pub fn spawn(
        self,
        events: broadcast::Receiver<QueueEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.partitions + 1);
        let mut senders = Vec::with_capacity(self.partitions);

        for worker in 0..self.partitions {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            handles.push(tokio::spawn(run_worker(
                worker,
                rx,
                self.matchmaker.clone(),
                self.leave.clone(),
            )));
        }
        handles.push(tokio::spawn(pump(events, senders, shutdown)));
        handles
    }
}

async fn pump(
    mut events: broadcast::Receiver<QueueEvent>,
    senders: Vec<mpsc::UnboundedSender<QueueEvent>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            received = events.recv() => match received {
                Ok(event) => {
                    let idx = partition_for(&event.uid, senders.len());
                    if senders[idx].send(event).is_err() {
                        warn!(worker = idx, "dispatch worker is gone");
                        break;
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    counter!(EVENTS_LAGGED).increment(skipped);
                    warn!(skipped, "queue event feed lagged, events dropped");
                },
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    // Dropping the senders lets workers drain and exit
    debug!("dispatch pump stopped");
}

async fn run_worker(
    worker: usize,
    mut rx: mpsc::UnboundedReceiver<QueueEvent>,
    matchmaker: Arc<Matchmaker>,
    leave: Arc<LeaveHandler>,
) {
    while let Some(event) = rx.recv().await {
        match &event.change {
            QueueChange::Written(entry) => matchmaker.handle_write(&event.uid, Some(entry)).await,
            QueueChange::Deleted(_) => leave.handle_delete(&event.uid).await,
        }
    }
    debug!(worker, "dispatch worker stopped");
}
