// src/store.rs
//! Item persistence boundary used by the ingestion loops.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{EnrichedItem, ItemId, RawItem};

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("an item with url {0} already exists")]
    DuplicateUrl(String),
    #[error("unknown item {0}")]
    UnknownItem(ItemId),
    #[error("item {0} was already processed")]
    AlreadyProcessed(ItemId),
    #[error("item {0} is not processed yet")]
    NotProcessed(ItemId),
    #[error("item {0} was already published")]
    AlreadyPublished(ItemId),
}

/// Lifecycle flags of a stored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredState {
    pub id: ItemId,
    pub processed: bool,
    pub published: bool,
}

#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn save(&self, item: &RawItem) -> Result<ItemId, StoreError>;
    async fn exists_by_url(&self, url: &str) -> Result<bool, StoreError>;
    async fn lookup_url(&self, url: &str) -> Result<Option<StoredState>, StoreError>;
    /// Attach enrichment output. Fails if the item was already processed.
    async fn update_processed(&self, id: ItemId, item: &EnrichedItem) -> Result<(), StoreError>;
    /// Fails if the item was already published.
    async fn mark_published(&self, id: ItemId) -> Result<(), StoreError>;
    /// Unprocessed items at or above `min_relevance`, oldest first.
    async fn query_unprocessed(
        &self,
        limit: usize,
        min_relevance: f32,
    ) -> Result<Vec<RawItem>, StoreError>;
    /// Processed, unpublished items by importance then relevance, both desc.
    async fn query_ready_for_publication(
        &self,
        limit: usize,
    ) -> Result<Vec<EnrichedItem>, StoreError>;
}

#[derive(Debug)]
struct Row {
    raw: RawItem,
    enriched: Option<EnrichedItem>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    rows: BTreeMap<ItemId, Row>,
    by_url: HashMap<String, ItemId>,
}

/// In-memory [`ItemStore`]. Content does not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryItemStore {
    inner: Mutex<Inner>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn save(&self, item: &RawItem) -> Result<ItemId, StoreError> {
        let mut g = self.lock();
        if g.by_url.contains_key(&item.url) {
            return Err(StoreError::DuplicateUrl(item.url.clone()));
        }
        g.next_id += 1;
        let id = ItemId(g.next_id);
        let mut raw = item.clone();
        raw.id = Some(id);
        raw.processed = false;
        raw.published = false;
        g.by_url.insert(raw.url.clone(), id);
        g.rows.insert(id, Row { raw, enriched: None });
        Ok(id)
    }

    async fn exists_by_url(&self, url: &str) -> Result<bool, StoreError> {
        Ok(self.lock().by_url.contains_key(url))
    }

    async fn lookup_url(&self, url: &str) -> Result<Option<StoredState>, StoreError> {
        let g = self.lock();
        Ok(g.by_url.get(url).and_then(|id| {
            g.rows.get(id).map(|r| StoredState {
                id: *id,
                processed: r.raw.processed,
                published: r.raw.published,
            })
        }))
    }

    async fn update_processed(&self, id: ItemId, item: &EnrichedItem) -> Result<(), StoreError> {
        let mut g = self.lock();
        let row = g.rows.get_mut(&id).ok_or(StoreError::UnknownItem(id))?;
        if row.raw.processed {
            return Err(StoreError::AlreadyProcessed(id));
        }
        row.raw.processed = true;
        let mut enriched = item.clone();
        enriched.raw = row.raw.clone();
        row.enriched = Some(enriched);
        Ok(())
    }

    async fn mark_published(&self, id: ItemId) -> Result<(), StoreError> {
        let mut g = self.lock();
        let row = g.rows.get_mut(&id).ok_or(StoreError::UnknownItem(id))?;
        if row.raw.published {
            return Err(StoreError::AlreadyPublished(id));
        }
        let enriched = row.enriched.as_mut().ok_or(StoreError::NotProcessed(id))?;
        row.raw.published = true;
        enriched.raw.published = true;
        Ok(())
    }

    async fn query_unprocessed(
        &self,
        limit: usize,
        min_relevance: f32,
    ) -> Result<Vec<RawItem>, StoreError> {
        let g = self.lock();
        Ok(g.rows
            .values()
            .filter(|r| !r.raw.processed && r.raw.relevance_score >= min_relevance)
            .take(limit)
            .map(|r| r.raw.clone())
            .collect())
    }

    async fn query_ready_for_publication(
        &self,
        limit: usize,
    ) -> Result<Vec<EnrichedItem>, StoreError> {
        let g = self.lock();
        let mut ready: Vec<&EnrichedItem> = g
            .rows
            .values()
            .filter(|r| !r.raw.published)
            .filter_map(|r| r.enriched.as_ref())
            .collect();
        // stable sort keeps id order among ties
        ready.sort_by(|a, b| {
            b.importance.cmp(&a.importance).then(
                b.raw
                    .relevance_score
                    .total_cmp(&a.raw.relevance_score),
            )
        });
        Ok(ready.into_iter().take(limit).cloned().collect())
    }
}
