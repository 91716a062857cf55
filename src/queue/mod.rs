// src/queue/mod.rs
//! Durable hand-off queue between the ingestion process and the publisher.
//!
//! Records are JSON values appended to a list under a fixed key. A second list
//! keeps confirmed publications so the ingestion side can reconcile.

pub mod redis_store;
pub mod store;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::logging::fingerprint;
use crate::model::{EnrichedItem, PublishedRecord};
use crate::scheduler::QueueEntry;
use store::ListStore;

pub const QUEUE_KEY: &str = "f1_news:moderation_queue";
pub const PUBLISHED_KEY: &str = "f1_news:published";

pub fn queue_ttl() -> Duration {
    Duration::hours(24)
}

pub fn published_ttl() -> Duration {
    Duration::days(7)
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("queue_pushed_total", "Records appended to the durable queue.");
        describe_counter!(
            "queue_malformed_total",
            "Queue records skipped because they failed to decode."
        );
        describe_counter!("queue_removed_total", "Records removed by identity.");
        describe_counter!(
            "queue_published_total",
            "Publication confirmations recorded."
        );
    });
}

/// Wire format of one queued item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub item: EnrichedItem,
    pub priority: u8,
    pub scheduled_for: DateTime<Utc>,
    pub added_to_queue_at: DateTime<Utc>,
}

impl QueueRecord {
    pub fn from_entry(entry: &QueueEntry, now: DateTime<Utc>) -> Self {
        Self {
            item: entry.item.clone(),
            priority: entry.priority,
            scheduled_for: entry.scheduled_for,
            added_to_queue_at: now,
        }
    }

    pub fn id(&self) -> &str {
        self.item.url()
    }
}

/// Just enough of a record to find its identity without a full decode.
#[derive(Deserialize)]
struct IdentityProbe {
    item: ProbeItem,
}

#[derive(Deserialize)]
struct ProbeItem {
    url: String,
}

fn probe_identity(raw: &str) -> Option<String> {
    serde_json::from_str::<IdentityProbe>(raw)
        .ok()
        .map(|p| p.item.url)
}

/// Summary returned by [`DurableQueue::status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatus {
    pub queued: usize,
    pub published: usize,
}

#[derive(Clone)]
pub struct DurableQueue {
    store: Arc<dyn ListStore>,
    queue_key: String,
    published_key: String,
}

impl DurableQueue {
    pub fn new(store: Arc<dyn ListStore>) -> Self {
        Self::with_keys(store, QUEUE_KEY, PUBLISHED_KEY)
    }

    pub fn with_keys(
        store: Arc<dyn ListStore>,
        queue_key: impl Into<String>,
        published_key: impl Into<String>,
    ) -> Self {
        ensure_metrics_described();
        Self {
            store,
            queue_key: queue_key.into(),
            published_key: published_key.into(),
        }
    }

    /// Append a released entry and refresh the queue TTL.
    pub async fn push(&self, entry: &QueueEntry, now: DateTime<Utc>) -> Result<()> {
        let record = QueueRecord::from_entry(entry, now);
        let json = serde_json::to_string(&record).context("encode queue record")?;
        self.store.push_back(&self.queue_key, &json).await?;
        self.store.expire(&self.queue_key, queue_ttl()).await?;
        counter!("queue_pushed_total").increment(1);
        debug!(target: "queue", id = %fingerprint(record.id()), "pushed");
        Ok(())
    }

    /// Read up to `limit` records from the front without removing them.
    /// Records that fail to decode are skipped and left in place.
    pub async fn peek_range(&self, limit: usize) -> Result<Vec<QueueRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let stop = isize::try_from(limit).unwrap_or(isize::MAX) - 1;
        let raw = self.store.range(&self.queue_key, 0, stop).await?;
        let mut out = Vec::with_capacity(raw.len());
        for value in raw {
            match serde_json::from_str::<QueueRecord>(&value) {
                Ok(rec) => out.push(rec),
                Err(e) => {
                    warn!(target: "queue", error = %e, "skipping malformed queue record");
                    counter!("queue_malformed_total").increment(1);
                }
            }
        }
        Ok(out)
    }

    /// Remove the first record whose identity matches. Returns whether one was
    /// removed.
    pub async fn remove_by_identity(&self, id: &str) -> Result<bool> {
        let raw = self.store.range(&self.queue_key, 0, -1).await?;
        let Some(value) = raw
            .into_iter()
            .find(|v| probe_identity(v).as_deref() == Some(id))
        else {
            return Ok(false);
        };
        let removed = self.store.remove_first(&self.queue_key, &value).await? > 0;
        if removed {
            counter!("queue_removed_total").increment(1);
            debug!(target: "queue", id = %fingerprint(id), "removed");
        }
        Ok(removed)
    }

    /// Append a publication confirmation and refresh its seven-day TTL.
    pub async fn record_published(
        &self,
        id: &str,
        message_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<PublishedRecord> {
        let record = PublishedRecord {
            url: id.to_string(),
            published_at: now,
            message_id,
        };
        let json = serde_json::to_string(&record).context("encode published record")?;
        self.store.push_back(&self.published_key, &json).await?;
        self.store.expire(&self.published_key, published_ttl()).await?;
        counter!("queue_published_total").increment(1);
        Ok(record)
    }

    /// Most recent `limit` confirmations, oldest first.
    pub async fn recent_published(&self, limit: usize) -> Result<Vec<PublishedRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let start = -isize::try_from(limit).unwrap_or(isize::MAX);
        let raw = self.store.range(&self.published_key, start, -1).await?;
        Ok(raw
            .iter()
            .filter_map(|v| match serde_json::from_str::<PublishedRecord>(v) {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!(target: "queue", error = %e, "skipping malformed published record");
                    None
                }
            })
            .collect())
    }

    pub async fn len(&self) -> Result<usize> {
        self.store.len(&self.queue_key).await
    }

    /// Drop every queued record. Confirmations are kept.
    pub async fn clear(&self) -> Result<()> {
        self.store.delete(&self.queue_key).await?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        self.store.ping().await.context("durable queue unreachable")
    }

    pub async fn status(&self) -> Result<QueueStatus> {
        Ok(QueueStatus {
            queued: self.store.len(&self.queue_key).await?,
            published: self.store.len(&self.published_key).await?,
        })
    }
}
