// src/worker/publisher.rs
//! Publisher-side worker: mirrors the durable queue into a local pending set
//! and publishes or rejects entries on request.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Result};
use chrono::Utc;
use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{spawn_loop, RetryPolicy, ShutdownRx};
use crate::logging::fingerprint;
use crate::model::PublishedRecord;
use crate::publish::Publisher;
use crate::queue::{DurableQueue, QueueRecord};

/// Failed sends per item before it is dropped.
pub const DEFAULT_MAX_SEND_ATTEMPTS: u32 = 5;

#[derive(Debug, Default)]
struct PendingState {
    pending: Vec<QueueRecord>,
    /// Every identity ever merged; a seen identity is never merged again.
    seen: HashSet<String>,
    /// Handled identities still in the queue after a failed removal.
    unremoved: HashSet<String>,
    failures: HashMap<String, u32>,
}

pub struct PublisherWorker {
    queue: DurableQueue,
    publisher: Arc<dyn Publisher>,
    sync_batch: usize,
    max_send_attempts: u32,
    state: Mutex<PendingState>,
}

impl PublisherWorker {
    pub fn new(queue: DurableQueue, publisher: Arc<dyn Publisher>, sync_batch: usize) -> Self {
        Self {
            queue,
            publisher,
            sync_batch: sync_batch.max(1),
            max_send_attempts: DEFAULT_MAX_SEND_ATTEMPTS,
            state: Mutex::new(PendingState::default()),
        }
    }

    pub fn with_max_send_attempts(mut self, n: u32) -> Self {
        self.max_send_attempts = n.max(1);
        self
    }

    fn state(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Retry removals that failed earlier, then peek the front of the queue
    /// and merge up to `sync_batch` unseen records into the pending set.
    /// Returns how many were added.
    pub async fn sync_once(&self) -> Result<usize> {
        self.retry_removals().await;

        // handled records still queued must not fill the peek window
        let stuck = self.state().unremoved.len();
        let records = self.queue.peek_range(self.sync_batch + stuck).await?;
        let mut st = self.state();
        let mut added = 0usize;
        for rec in records {
            if added == self.sync_batch {
                break;
            }
            if st.seen.insert(rec.id().to_string()) {
                st.pending.push(rec);
                added += 1;
            }
        }
        if added > 0 {
            info!(target: "publisher", added, pending = st.pending.len(), "synced from queue");
        }
        Ok(added)
    }

    async fn retry_removals(&self) {
        let ids: Vec<String> = self.state().unremoved.iter().cloned().collect();
        for id in ids {
            match self.queue.remove_by_identity(&id).await {
                Ok(_) => {
                    self.state().unremoved.remove(&id);
                }
                Err(e) => {
                    warn!(target: "publisher", item = %fingerprint(&id), "queue removal retry failed: {e:#}");
                }
            }
        }
    }

    /// Remove a handled record from the queue; on failure remember it for the
    /// next sync pass.
    async fn remove_or_defer(&self, id: &str) {
        if let Err(e) = self.queue.remove_by_identity(id).await {
            warn!(target: "publisher", item = %fingerprint(id), "queue removal failed: {e:#}");
            self.state().unremoved.insert(id.to_string());
        }
    }

    /// Number of handled identities waiting for queue removal.
    pub fn unremoved(&self) -> usize {
        self.state().unremoved.len()
    }

    pub fn pending(&self) -> Vec<QueueRecord> {
        self.state().pending.clone()
    }

    fn take_pending(&self, id: &str) -> Option<QueueRecord> {
        let mut st = self.state();
        let pos = st.pending.iter().position(|r| r.id() == id)?;
        Some(st.pending.remove(pos))
    }

    /// Put a failed record at the back of the pending set. Returns `true`
    /// instead when it has used up its attempts.
    fn send_failed(&self, rec: QueueRecord) -> bool {
        let id = rec.id().to_string();
        let mut st = self.state();
        let attempts = st.failures.entry(id.clone()).or_insert(0);
        *attempts += 1;
        if *attempts < self.max_send_attempts {
            st.pending.push(rec);
            false
        } else {
            st.failures.remove(&id);
            true
        }
    }

    /// Publish a pending item. On success the record leaves the queue and a
    /// confirmation is written. A failed item goes to the back of the pending
    /// set, and is dropped from pending and queue after too many failures.
    pub async fn publish(&self, id: &str) -> Result<PublishedRecord> {
        let rec = self
            .take_pending(id)
            .ok_or_else(|| anyhow!("item {} is not pending", fingerprint(id)))?;

        let message_id = match self.publisher.publish_to_channel(&rec.item).await {
            Ok(m) => m,
            Err(e) => {
                counter!("publisher_failures_total").increment(1);
                if self.send_failed(rec) {
                    counter!("publisher_abandoned_total").increment(1);
                    warn!(
                        target: "publisher",
                        item = %fingerprint(id),
                        attempts = self.max_send_attempts,
                        "giving up on item"
                    );
                    self.remove_or_defer(id).await;
                }
                return Err(e.context(format!("publish via {}", self.publisher.name())));
            }
        };
        counter!("publisher_published_total").increment(1);
        self.state().failures.remove(id);

        // The message is out; bookkeeping failures must not cause a re-send.
        self.remove_or_defer(id).await;
        let now = Utc::now();
        let record = match self
            .queue
            .record_published(id, Some(message_id.clone()), now)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "publisher", item = %fingerprint(id), "confirmation write failed: {e:#}");
                PublishedRecord {
                    url: id.to_string(),
                    published_at: now,
                    message_id: Some(message_id),
                }
            }
        };
        info!(target: "publisher", item = %fingerprint(id), "published");
        Ok(record)
    }

    /// Remove an item from the queue and drop it from pending. If the removal
    /// fails the item stays pending.
    pub async fn reject(&self, id: &str) -> Result<bool> {
        let removed = self.queue.remove_by_identity(id).await?;
        let was_pending = self.take_pending(id).is_some();
        if was_pending || removed {
            self.state().failures.remove(id);
            counter!("publisher_rejected_total").increment(1);
            info!(target: "publisher", item = %fingerprint(id), "rejected");
        }
        Ok(was_pending || removed)
    }

    /// Try every pending item once, oldest first. A failed send does not stop
    /// the pass; failures are reported together at the end.
    pub async fn publish_all_pending(&self) -> Result<usize> {
        let ids: Vec<String> = self
            .state()
            .pending
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        let mut published = 0usize;
        let mut failed = Vec::new();
        for id in ids {
            match self.publish(&id).await {
                Ok(_) => published += 1,
                Err(e) => failed.push(format!("{}: {e:#}", fingerprint(&id))),
            }
        }
        if !failed.is_empty() {
            return Err(anyhow!(
                "{} of {} sends failed ({published} published): {}",
                failed.len(),
                failed.len() + published,
                failed.join("; ")
            ));
        }
        Ok(published)
    }
}

/// Spawn the sync loop. With `auto_publish`, each pass also publishes
/// everything pending.
pub fn spawn_sync_loop(
    worker: Arc<PublisherWorker>,
    policy: RetryPolicy,
    auto_publish: bool,
    shutdown: ShutdownRx,
) -> JoinHandle<()> {
    spawn_loop("queue-sync", policy, shutdown, move || {
        let w = worker.clone();
        async move {
            w.sync_once().await?;
            if auto_publish {
                w.publish_all_pending().await?;
            }
            Ok(())
        }
    })
}
