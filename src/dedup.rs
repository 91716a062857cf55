// src/dedup.rs
//! Near-duplicate detection by word-set Jaccard similarity.

use std::collections::HashSet;

use crate::model::RawItem;

/// A title pair above this similarity is a duplicate.
pub const TITLE_DUPLICATE_THRESHOLD: f32 = 0.8;
/// Body prefixes above this similarity are a duplicate.
pub const BODY_DUPLICATE_THRESHOLD: f32 = 0.7;
/// Only the first N characters of a body are compared.
pub const BODY_PREFIX_CHARS: usize = 200;

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn body_prefix(body: &str) -> String {
    body.to_lowercase().chars().take(BODY_PREFIX_CHARS).collect()
}

fn jaccard_sets(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

/// Jaccard similarity of the lowercase whitespace-split word sets. Two empty
/// texts score 0.0.
pub fn jaccard(a: &str, b: &str) -> f32 {
    jaccard_sets(&word_set(a), &word_set(b))
}

/// True when `title`/`body` is a near-duplicate of any item in `existing`.
pub fn is_duplicate(title: &str, body: &str, existing: &[RawItem]) -> bool {
    let title_words = word_set(title);
    let body_words = word_set(&body_prefix(body));
    existing.iter().any(|other| {
        jaccard_sets(&title_words, &word_set(&other.title)) > TITLE_DUPLICATE_THRESHOLD
            || jaccard_sets(&body_words, &word_set(&body_prefix(&other.body)))
                > BODY_DUPLICATE_THRESHOLD
    })
}

/// Batch dedupe: identical URLs first, then near-duplicates against the items
/// already kept. First occurrence wins. Returns kept items and the drop count.
pub fn dedupe(items: Vec<RawItem>) -> (Vec<RawItem>, usize) {
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut kept: Vec<RawItem> = Vec::with_capacity(items.len());
    let mut dropped = 0usize;

    for item in items {
        if !seen_urls.insert(item.url.trim().to_string()) {
            dropped += 1;
            continue;
        }
        if is_duplicate(&item.title, &item.body, &kept) {
            dropped += 1;
            continue;
        }
        kept.push(item);
    }
    (kept, dropped)
}
