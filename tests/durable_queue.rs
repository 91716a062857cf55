// tests/durable_queue.rs
use std::sync::Arc;

use chrono::{Duration, Utc};
use f1_news_pipeline::model::{EnrichedItem, RawItem, SourceKind};
use f1_news_pipeline::queue::store::MemoryListStore;
use f1_news_pipeline::queue::{DurableQueue, PUBLISHED_KEY, QUEUE_KEY};
use f1_news_pipeline::scheduler::{EntryState, QueueEntry};

fn entry(n: u32) -> QueueEntry {
    let now = Utc::now();
    let raw = RawItem::new(
        format!("Grand Prix story {n}"),
        "Body.",
        format!("https://news.test/{n}"),
        "Test Feed",
        SourceKind::Feed,
        now,
    );
    QueueEntry {
        item: EnrichedItem::from_raw(raw),
        priority: 5,
        scheduled_for: now,
        enqueued_at: now,
        state: EntryState::Released,
    }
}

fn setup() -> (Arc<MemoryListStore>, DurableQueue) {
    let store = Arc::new(MemoryListStore::new());
    let queue = DurableQueue::new(store.clone());
    (store, queue)
}

#[tokio::test]
async fn push_and_peek_preserve_fifo_order() {
    let (_store, q) = setup();
    let now = Utc::now();
    for n in 1..=3 {
        q.push(&entry(n), now).await.unwrap();
    }

    let head = q.peek_range(2).await.unwrap();
    let ids: Vec<_> = head.iter().map(|r| r.id().to_string()).collect();
    assert_eq!(ids, vec!["https://news.test/1", "https://news.test/2"]);
    assert_eq!(head[0].added_to_queue_at, now);
    assert_eq!(head[0].priority, 5);

    // peek does not consume
    assert_eq!(q.len().await.unwrap(), 3);
    assert!(q.peek_range(0).await.unwrap().is_empty());
}

#[tokio::test]
async fn push_refreshes_day_long_ttl() {
    let (store, q) = setup();
    q.push(&entry(1), Utc::now()).await.unwrap();

    let ttl = store.ttl(QUEUE_KEY).unwrap();
    assert!(ttl <= Duration::hours(24));
    assert!(ttl > Duration::hours(23));
}

#[tokio::test]
async fn remove_by_identity_removes_only_the_match() {
    let (_store, q) = setup();
    let now = Utc::now();
    for n in 1..=3 {
        q.push(&entry(n), now).await.unwrap();
    }

    assert!(q.remove_by_identity("https://news.test/2").await.unwrap());
    assert!(!q.remove_by_identity("https://news.test/2").await.unwrap());
    assert!(!q.remove_by_identity("https://news.test/404").await.unwrap());

    let ids: Vec<_> = q
        .peek_range(10)
        .await
        .unwrap()
        .iter()
        .map(|r| r.id().to_string())
        .collect();
    assert_eq!(ids, vec!["https://news.test/1", "https://news.test/3"]);
}

#[tokio::test]
async fn malformed_records_are_skipped_but_kept() {
    let (store, q) = setup();
    store.push_raw(QUEUE_KEY, "{not json");
    q.push(&entry(1), Utc::now()).await.unwrap();
    store.push_raw(QUEUE_KEY, r#"{"item":{"url":"https://news.test/half"}}"#);

    let records = q.peek_range(10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id(), "https://news.test/1");
    assert_eq!(q.len().await.unwrap(), 3);
}

#[tokio::test]
async fn confirmations_live_for_a_week_and_read_newest_last() {
    let (store, q) = setup();
    let now = Utc::now();
    q.record_published("https://news.test/1", Some("10".into()), now)
        .await
        .unwrap();
    let second = q
        .record_published("https://news.test/2", None, now)
        .await
        .unwrap();

    let ttl = store.ttl(PUBLISHED_KEY).unwrap();
    assert!(ttl > Duration::days(6));
    assert!(ttl <= Duration::days(7));

    let recent = q.recent_published(1).await.unwrap();
    assert_eq!(recent, vec![second]);
    assert_eq!(q.recent_published(10).await.unwrap().len(), 2);

    let status = q.status().await.unwrap();
    assert_eq!(status.queued, 0);
    assert_eq!(status.published, 2);
}

#[tokio::test]
async fn clear_keeps_confirmations() {
    let (_store, q) = setup();
    let now = Utc::now();
    q.push(&entry(1), now).await.unwrap();
    q.record_published("https://news.test/1", None, now)
        .await
        .unwrap();

    q.clear().await.unwrap();
    assert_eq!(q.len().await.unwrap(), 0);
    assert_eq!(q.recent_published(5).await.unwrap().len(), 1);
    q.health_check().await.unwrap();
}
