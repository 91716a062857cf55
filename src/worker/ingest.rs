// src/worker/ingest.rs
//! Ingestion-side pipeline: collect, enrich, moderate, hand off, reconcile.
//!
//! Each stage is one async step so the loops in [`spawn_loops`] and the tests
//! drive exactly the same code. The scheduler sits behind a std mutex that is
//! only held for synchronous sections, never across an await.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{spawn_loop, ShutdownRx};
use crate::collect::{self, CollectReport, Collector};
use crate::config::{Intervals, Limits};
use crate::enrich::Enricher;
use crate::logging::fingerprint;
use crate::model::ItemId;
use crate::moderation::Moderator;
use crate::queue::DurableQueue;
use crate::relevance::RelevanceScorer;
use crate::scheduler::{PublicationScheduler, SchedulerStatus};
use crate::store::{ItemStore, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrichReport {
    pub candidates: usize,
    pub enriched: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModerateReport {
    pub considered: usize,
    pub approved: usize,
    pub rejected: usize,
    pub already_admitted: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HandOffReport {
    pub released: usize,
    pub pushed: usize,
    pub requeued: usize,
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub min_relevance: f32,
    pub limits: Limits,
}

pub struct IngestionWorker {
    collectors: Vec<Box<dyn Collector>>,
    scorer: RelevanceScorer,
    moderator: Moderator,
    store: Arc<dyn ItemStore>,
    enricher: Arc<dyn Enricher>,
    queue: DurableQueue,
    scheduler: Mutex<PublicationScheduler>,
    /// Items moderation already decided on; skipped on later passes.
    decided: Mutex<HashSet<ItemId>>,
    settings: IngestSettings,
}

impl IngestionWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        collectors: Vec<Box<dyn Collector>>,
        scorer: RelevanceScorer,
        moderator: Moderator,
        store: Arc<dyn ItemStore>,
        enricher: Arc<dyn Enricher>,
        queue: DurableQueue,
        scheduler: PublicationScheduler,
        settings: IngestSettings,
    ) -> Self {
        Self {
            collectors,
            scorer,
            moderator,
            store,
            enricher,
            queue,
            scheduler: Mutex::new(scheduler),
            decided: Mutex::new(HashSet::new()),
            settings,
        }
    }

    fn scheduler(&self) -> MutexGuard<'_, PublicationScheduler> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn decided(&self) -> MutexGuard<'_, HashSet<ItemId>> {
        self.decided.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch from every collector, prepare the batch and persist unseen URLs.
    pub async fn collect_once(&self) -> Result<CollectReport> {
        let (raw, failed_collectors) = collect::collect_all(&self.collectors).await;
        let mut report = CollectReport {
            fetched: raw.len(),
            failed_collectors,
            ..Default::default()
        };

        let batch = collect::prepare_batch(raw, &self.scorer);
        report.invalid = batch.invalid;
        report.below_floor = batch.below_floor;
        report.batch_duplicates = batch.duplicates;

        for item in batch.items {
            if self.store.exists_by_url(&item.url).await? {
                report.known_urls += 1;
                continue;
            }
            match self.store.save(&item).await {
                Ok(id) => {
                    report.saved += 1;
                    debug!(target: "ingest", %id, item = %fingerprint(&item.url), "saved");
                }
                Err(StoreError::DuplicateUrl(_)) => report.known_urls += 1,
                Err(e) => return Err(e.into()),
            }
        }

        counter!("collect_saved_total").increment(report.saved as u64);
        info!(
            target: "ingest",
            fetched = report.fetched,
            saved = report.saved,
            known = report.known_urls,
            dup = report.batch_duplicates,
            below_floor = report.below_floor,
            invalid = report.invalid,
            "collect pass"
        );
        Ok(report)
    }

    /// Enrich unprocessed items at or above the relevance threshold. An item
    /// whose enrichment fails stays unprocessed for the next pass.
    pub async fn enrich_once(&self) -> Result<EnrichReport> {
        let items = self
            .store
            .query_unprocessed(self.settings.limits.enrich_batch, self.settings.min_relevance)
            .await?;
        let mut report = EnrichReport {
            candidates: items.len(),
            ..Default::default()
        };

        for raw in items {
            let Some(id) = raw.id else {
                continue;
            };
            match self.enricher.enrich(&raw).await {
                Ok(enriched) => {
                    self.store.update_processed(id, &enriched).await?;
                    report.enriched += 1;
                }
                Err(e) => {
                    report.failed += 1;
                    counter!("enrich_failures_total").increment(1);
                    warn!(
                        target: "ingest",
                        %id,
                        enricher = self.enricher.name(),
                        "enrichment failed: {e:#}"
                    );
                }
            }
        }
        if report.candidates > 0 {
            info!(target: "ingest", enriched = report.enriched, failed = report.failed, "enrich pass");
        }
        Ok(report)
    }

    pub async fn moderate_once(&self) -> Result<ModerateReport> {
        self.moderate_at(Utc::now()).await
    }

    /// Moderate processed, unpublished items and admit approved ones to the
    /// scheduler with their importance as priority.
    pub async fn moderate_at(&self, now: DateTime<Utc>) -> Result<ModerateReport> {
        let limit = self.settings.limits.moderation_batch;
        let skip = self.decided().len();
        let items = self
            .store
            .query_ready_for_publication(limit.saturating_add(skip))
            .await?;

        let mut report = ModerateReport::default();
        for item in items {
            let Some(id) = item.raw.id else {
                continue;
            };
            if self.decided().contains(&id) {
                continue;
            }
            if report.considered >= limit {
                break;
            }
            report.considered += 1;

            if self.scheduler().is_admitted(item.url()) {
                report.already_admitted += 1;
                self.decided().insert(id);
                continue;
            }

            let verdict = self.moderator.moderate(&item);
            self.decided().insert(id);
            if verdict.approved {
                let priority = item.priority();
                let admitted = self.scheduler().enqueue(item, priority, now);
                if admitted {
                    report.approved += 1;
                    counter!("moderation_approved_total").increment(1);
                } else {
                    report.already_admitted += 1;
                }
            } else {
                report.rejected += 1;
                counter!("moderation_rejected_total").increment(1);
                info!(
                    target: "ingest",
                    %id,
                    quality = verdict.quality_score,
                    reasons = ?verdict.reasons,
                    "rejected by moderation"
                );
            }
        }
        Ok(report)
    }

    pub async fn publish_once(&self) -> Result<HandOffReport> {
        self.publish_at(Utc::now()).await
    }

    /// Release due entries and push each to the durable queue. A successful
    /// push consumes quota; a failed push puts the entry back.
    pub async fn publish_at(&self, now: DateTime<Utc>) -> Result<HandOffReport> {
        let released = self.scheduler().drain_ready(now);
        let mut report = HandOffReport {
            released: released.len(),
            ..Default::default()
        };

        let mut last_err = None;
        for entry in released {
            match self.queue.push(&entry, now).await {
                Ok(()) => {
                    self.scheduler().mark_published(&entry, now)?;
                    report.pushed += 1;
                }
                Err(e) => {
                    warn!(
                        target: "ingest",
                        item = %fingerprint(entry.id()),
                        "hand-off failed; requeueing: {e:#}"
                    );
                    self.scheduler().requeue(entry);
                    report.requeued += 1;
                    last_err = Some(e);
                }
            }
        }

        if let Some(e) = last_err {
            return Err(e.context(format!("{} hand-offs failed", report.requeued)));
        }
        if report.pushed > 0 {
            info!(target: "ingest", pushed = report.pushed, "handed off to publisher");
        }
        Ok(report)
    }

    /// Copy publication confirmations from the queue into the item store and
    /// forget moderation decisions for published items. Returns how many
    /// items were newly marked published.
    pub async fn reconcile_once(&self) -> Result<usize> {
        let records = self
            .queue
            .recent_published(self.settings.limits.reconcile_batch)
            .await?;
        let mut marked = 0usize;
        for rec in records {
            let Some(state) = self.store.lookup_url(&rec.url).await? else {
                continue;
            };
            if !state.processed {
                continue;
            }
            if !state.published {
                match self.store.mark_published(state.id).await {
                    Ok(()) => marked += 1,
                    Err(StoreError::AlreadyPublished(_)) => {}
                    Err(e) => return Err(anyhow!(e)),
                }
            }
            // published items never come back to moderation
            self.decided().remove(&state.id);
        }
        if marked > 0 {
            info!(target: "ingest", marked, "reconciled publications");
        }
        Ok(marked)
    }

    /// Items moderation has decided on that are not yet known as published.
    pub fn decided_len(&self) -> usize {
        self.decided().len()
    }

    pub fn scheduler_status(&self, now: DateTime<Utc>) -> SchedulerStatus {
        self.scheduler().status(now)
    }

    pub fn queue(&self) -> &DurableQueue {
        &self.queue
    }
}

/// Spawn the five ingestion loops.
pub fn spawn_loops(
    worker: Arc<IngestionWorker>,
    intervals: &Intervals,
    shutdown: ShutdownRx,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(5);

    let w = worker.clone();
    handles.push(spawn_loop(
        "collect",
        intervals.policy(intervals.collect_secs),
        shutdown.clone(),
        move || {
            let w = w.clone();
            async move { w.collect_once().await.map(|_| ()) }
        },
    ));

    let w = worker.clone();
    handles.push(spawn_loop(
        "enrich",
        intervals.policy(intervals.enrich_secs),
        shutdown.clone(),
        move || {
            let w = w.clone();
            async move { w.enrich_once().await.map(|_| ()) }
        },
    ));

    let w = worker.clone();
    handles.push(spawn_loop(
        "moderate",
        intervals.policy(intervals.moderate_secs),
        shutdown.clone(),
        move || {
            let w = w.clone();
            async move { w.moderate_once().await.map(|_| ()) }
        },
    ));

    let w = worker.clone();
    handles.push(spawn_loop(
        "hand-off",
        intervals.policy(intervals.publish_secs),
        shutdown.clone(),
        move || {
            let w = w.clone();
            async move { w.publish_once().await.map(|_| ()) }
        },
    ));

    let w = worker;
    handles.push(spawn_loop(
        "reconcile",
        intervals.policy(intervals.reconcile_secs),
        shutdown,
        move || {
            let w = w.clone();
            async move { w.reconcile_once().await.map(|_| ()) }
        },
    ));

    handles
}
