// src/scheduler.rs
//! Priority publication queue with a rolling-hour rate limit.
//!
//! Entries are kept ordered by priority (desc), then scheduled time (asc),
//! then insertion order. `drain_ready` releases due entries while the hourly
//! quota allows; quota is consumed by `mark_published` once a release has been
//! handed off.
//!
//! Every operation takes `now` explicitly; nothing here reads the clock.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::logging::fingerprint;
use crate::model::EnrichedItem;
use crate::rolling::PublishWindow;

pub const DEFAULT_MAX_PER_HOUR: usize = 5;
pub const IMMEDIATE_PRIORITY: u8 = 5;
pub const MEDIUM_PRIORITY: u8 = 3;
/// Entries listed by `status`.
pub const STATUS_PREVIEW: usize = 5;

/// Delay between enqueue and earliest release for a priority.
pub fn schedule_delay(priority: u8) -> Duration {
    if priority >= IMMEDIATE_PRIORITY {
        Duration::zero()
    } else if priority >= MEDIUM_PRIORITY {
        Duration::minutes(30)
    } else {
        Duration::hours(2)
    }
}

/// Lifecycle of a queue entry. Transitions only move forward:
/// `Queued -> Ready -> Released -> Published`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    Queued,
    Ready,
    Released,
    Published,
}

impl EntryState {
    pub fn can_advance_to(self, next: EntryState) -> bool {
        matches!(
            (self, next),
            (EntryState::Queued, EntryState::Ready)
                | (EntryState::Ready, EntryState::Released)
                | (EntryState::Released, EntryState::Published)
        )
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SchedulerError {
    #[error("invalid state transition {from:?} -> {to:?}")]
    InvalidTransition { from: EntryState, to: EntryState },
    #[error("entry {0} was not released by this scheduler")]
    NotReleased(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub item: EnrichedItem,
    pub priority: u8,
    pub scheduled_for: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
    pub state: EntryState,
}

impl QueueEntry {
    /// Identity used for admission and removal.
    pub fn id(&self) -> &str {
        self.item.url()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_for <= now
    }

    pub fn advance(&mut self, next: EntryState) -> Result<(), SchedulerError> {
        if !self.state.can_advance_to(next) {
            return Err(SchedulerError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

/// One line of the status preview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntrySummary {
    pub id: String,
    pub title: String,
    pub priority: u8,
    pub scheduled_for: DateTime<Utc>,
    pub state: EntryState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub queue_len: usize,
    pub published_last_hour: usize,
    pub max_per_hour: usize,
    pub can_publish_now: bool,
    pub next_publication_time: Option<DateTime<Utc>>,
    pub upcoming: Vec<EntrySummary>,
}

#[derive(Debug)]
pub struct PublicationScheduler {
    max_per_hour: usize,
    window: PublishWindow,
    queue: Vec<QueueEntry>,
    admitted: HashSet<String>,
}

impl Default for PublicationScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PER_HOUR)
    }
}

impl PublicationScheduler {
    pub fn new(max_per_hour: usize) -> Self {
        Self {
            max_per_hour,
            window: PublishWindow::one_hour(),
            queue: Vec::new(),
            admitted: HashSet::new(),
        }
    }

    pub fn max_per_hour(&self) -> usize {
        self.max_per_hour
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// True once an identity has been admitted, even after it left the queue.
    pub fn is_admitted(&self, id: &str) -> bool {
        self.admitted.contains(id)
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.queue
    }

    /// Admit an item. Returns false when its identity was admitted before.
    pub fn enqueue(&mut self, item: EnrichedItem, priority: u8, now: DateTime<Utc>) -> bool {
        if !self.admitted.insert(item.url().to_string()) {
            debug!(target: "scheduler", id = %fingerprint(item.url()), "already admitted");
            return false;
        }

        let entry = QueueEntry {
            scheduled_for: now + schedule_delay(priority),
            enqueued_at: now,
            priority,
            item,
            state: EntryState::Queued,
        };
        debug!(
            target: "scheduler",
            id = %fingerprint(entry.id()),
            priority,
            scheduled_for = %entry.scheduled_for,
            "enqueued"
        );
        self.insert_ordered(entry);
        metrics::gauge!("scheduler_queue_len").set(self.queue.len() as f64);
        true
    }

    fn insert_ordered(&mut self, entry: QueueEntry) {
        let pos = self
            .queue
            .iter()
            .position(|e| {
                e.priority < entry.priority
                    || (e.priority == entry.priority && e.scheduled_for > entry.scheduled_for)
            })
            .unwrap_or(self.queue.len());
        self.queue.insert(pos, entry);
    }

    pub fn can_publish_now(&mut self, now: DateTime<Utc>) -> bool {
        self.window.count(now) < self.max_per_hour
    }

    /// `now` while quota remains, otherwise when the oldest publication in the
    /// window ages out. `None` only for a zero quota with an empty window.
    pub fn next_publication_time(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.can_publish_now(now) {
            return Some(now);
        }
        self.window.next_slot(now)
    }

    /// Release due entries in queue order while the quota allows. Releases made
    /// in this call count against the quota, so at most `max_per_hour` minus
    /// the recent publications come out.
    pub fn drain_ready(&mut self, now: DateTime<Utc>) -> Vec<QueueEntry> {
        let published = self.window.count(now);
        let mut released = Vec::new();

        for e in self.queue.iter_mut() {
            if e.state == EntryState::Queued && e.is_due(now) {
                e.state = EntryState::Ready;
            }
        }

        let mut i = 0;
        while i < self.queue.len() {
            if self.queue[i].state != EntryState::Ready {
                i += 1;
                continue;
            }
            if published + released.len() >= self.max_per_hour {
                debug!(
                    target: "scheduler",
                    published,
                    max_per_hour = self.max_per_hour,
                    "hourly quota exhausted"
                );
                break;
            }
            let mut entry = self.queue.remove(i);
            entry.state = EntryState::Released;
            released.push(entry);
        }

        if !released.is_empty() {
            info!(
                target: "scheduler",
                released = released.len(),
                remaining = self.queue.len(),
                "released entries"
            );
        }
        metrics::gauge!("scheduler_queue_len").set(self.queue.len() as f64);
        released
    }

    /// Record a handed-off release against the quota. The entry itself is not
    /// modified.
    pub fn mark_published(
        &mut self,
        entry: &QueueEntry,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        if entry.state != EntryState::Released {
            return Err(SchedulerError::NotReleased(entry.id().to_string()));
        }
        self.window.record(now);
        metrics::counter!("scheduler_published_total").increment(1);
        Ok(())
    }

    /// Put back a released entry whose hand-off failed. It keeps its original
    /// schedule and returns as `Ready`.
    pub fn requeue(&mut self, mut entry: QueueEntry) {
        entry.state = EntryState::Ready;
        self.admitted.insert(entry.id().to_string());
        self.insert_ordered(entry);
    }

    /// Cancel a queued entry. The identity stays admitted.
    pub fn remove(&mut self, id: &str) -> Option<QueueEntry> {
        let pos = self.queue.iter().position(|e| e.id() == id)?;
        Some(self.queue.remove(pos))
    }

    /// Drop every queued entry and forget their admission.
    pub fn clear(&mut self) -> usize {
        let n = self.queue.len();
        for e in self.queue.drain(..) {
            self.admitted.remove(e.item.url());
        }
        n
    }

    pub fn status(&mut self, now: DateTime<Utc>) -> SchedulerStatus {
        let published_last_hour = self.window.count(now);
        let next_publication_time = self.next_publication_time(now);
        SchedulerStatus {
            queue_len: self.queue.len(),
            published_last_hour,
            max_per_hour: self.max_per_hour,
            can_publish_now: published_last_hour < self.max_per_hour,
            next_publication_time,
            upcoming: self
                .queue
                .iter()
                .take(STATUS_PREVIEW)
                .map(|e| EntrySummary {
                    id: e.id().to_string(),
                    title: e.item.title().to_string(),
                    priority: e.priority,
                    scheduled_for: e.scheduled_for,
                    state: e.state,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RawItem, SourceKind};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 7, 14, 0, 0).unwrap()
    }

    fn item(url: &str) -> EnrichedItem {
        EnrichedItem::from_raw(RawItem::new(
            "Some race title",
            "body",
            url,
            "feed",
            SourceKind::Feed,
            t0(),
        ))
    }

    #[test]
    fn delay_by_priority() {
        assert_eq!(schedule_delay(5), Duration::zero());
        assert_eq!(schedule_delay(4), Duration::minutes(30));
        assert_eq!(schedule_delay(3), Duration::minutes(30));
        assert_eq!(schedule_delay(2), Duration::hours(2));
        assert_eq!(schedule_delay(0), Duration::hours(2));
    }

    #[test]
    fn transitions_only_move_forward() {
        assert!(EntryState::Queued.can_advance_to(EntryState::Ready));
        assert!(!EntryState::Queued.can_advance_to(EntryState::Released));
        assert!(!EntryState::Published.can_advance_to(EntryState::Queued));

        let mut s = PublicationScheduler::new(5);
        s.enqueue(item("https://a.test/1"), 5, t0());
        let mut e = s.drain_ready(t0()).remove(0);
        assert_eq!(
            e.advance(EntryState::Ready),
            Err(SchedulerError::InvalidTransition {
                from: EntryState::Released,
                to: EntryState::Ready
            })
        );
        assert!(e.advance(EntryState::Published).is_ok());
    }

    #[test]
    fn mark_published_requires_a_release() {
        let mut s = PublicationScheduler::new(5);
        s.enqueue(item("https://a.test/1"), 1, t0());
        let queued = s.entries()[0].clone();
        assert!(matches!(
            s.mark_published(&queued, t0()),
            Err(SchedulerError::NotReleased(_))
        ));
        assert!(s.can_publish_now(t0()));
    }

    #[test]
    fn clear_forgets_admission_but_remove_does_not() {
        let mut s = PublicationScheduler::new(5);
        s.enqueue(item("https://a.test/1"), 1, t0());
        s.enqueue(item("https://a.test/2"), 1, t0());
        assert!(s.remove("https://a.test/1").is_some());
        assert!(!s.enqueue(item("https://a.test/1"), 1, t0()));
        assert_eq!(s.clear(), 1);
        assert!(s.enqueue(item("https://a.test/2"), 1, t0()));
    }

    #[test]
    fn next_publication_time_is_now_while_quota_remains() {
        let mut s = PublicationScheduler::new(1);
        assert_eq!(s.next_publication_time(t0()), Some(t0()));

        s.enqueue(item("https://a.test/1"), 5, t0());
        let e = s.drain_ready(t0()).remove(0);
        s.mark_published(&e, t0()).unwrap();
        let later = t0() + Duration::minutes(10);
        assert_eq!(s.next_publication_time(later), Some(t0() + Duration::hours(1)));

        let mut closed = PublicationScheduler::new(0);
        assert_eq!(closed.next_publication_time(t0()), None);
    }
}
