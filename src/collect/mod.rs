// src/collect/mod.rs
//! Collection stage: fetcher trait, text normalization, and the batch
//! preparation that runs before anything is persisted.
pub mod rss;

use async_trait::async_trait;
use metrics::{counter, describe_counter, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::dedup;
use crate::logging::fingerprint;
use crate::model::RawItem;
use crate::relevance::{RelevanceScorer, PERSIST_FLOOR};

/// Normalized text longer than this is truncated.
pub const MAX_TEXT_CHARS: usize = 4000;

/// A source of raw items. Implementations only fetch; scoring, dedup and
/// persistence happen downstream.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect(&self) -> anyhow::Result<Vec<RawItem>>;
    fn name(&self) -> &str;
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("collect_items_total", "Raw items returned by collectors.");
        describe_counter!(
            "collect_collector_errors_total",
            "Collector fetch/parse errors."
        );
        describe_counter!("collect_invalid_total", "Items failing validation.");
        describe_counter!(
            "collect_duplicates_total",
            "Items removed by batch dedupe."
        );
        describe_counter!(
            "collect_below_floor_total",
            "Items scoring under the persistence floor."
        );
        describe_histogram!("collect_parse_ms", "Feed parse time in milliseconds.");
        describe_counter!("collect_saved_total", "Items persisted.");
    });
}

/// Normalize text: decode entities, strip tags, fold curly quotes, collapse
/// whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > MAX_TEXT_CHARS {
        out = out.chars().take(MAX_TEXT_CHARS).collect();
    }
    out
}

/// Run every collector; one failing collector never aborts the others.
/// Returns the merged items and the number of failed collectors.
pub async fn collect_all(collectors: &[Box<dyn Collector>]) -> (Vec<RawItem>, usize) {
    ensure_metrics_described();

    let mut raw = Vec::new();
    let mut errors = 0usize;
    for c in collectors {
        match c.collect().await {
            Ok(mut v) => {
                debug!(target: "collect", collector = c.name(), items = v.len(), "fetched");
                counter!("collect_items_total").increment(v.len() as u64);
                raw.append(&mut v);
            }
            Err(e) => {
                warn!(target: "collect", error = ?e, collector = c.name(), "collector error");
                counter!("collect_collector_errors_total").increment(1);
                errors += 1;
            }
        }
    }
    (raw, errors)
}

/// Counters for one collection pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectReport {
    pub fetched: usize,
    pub failed_collectors: usize,
    pub invalid: usize,
    pub below_floor: usize,
    pub batch_duplicates: usize,
    pub known_urls: usize,
    pub saved: usize,
}

/// Output of [`prepare_batch`]: scored, deduplicated items ready to persist.
#[derive(Debug, Default)]
pub struct PreparedBatch {
    pub items: Vec<RawItem>,
    pub invalid: usize,
    pub below_floor: usize,
    pub duplicates: usize,
}

/// Normalize, validate, score, drop items under the floor, then dedupe.
pub fn prepare_batch(raw: Vec<RawItem>, scorer: &RelevanceScorer) -> PreparedBatch {
    ensure_metrics_described();

    let mut batch = PreparedBatch::default();
    let mut scored = Vec::with_capacity(raw.len());
    for mut item in raw {
        item.title = normalize_text(&item.title);
        item.body = normalize_text(&item.body);
        item.url = item.url.trim().to_string();
        if let Err(e) = item.validate() {
            debug!(target: "collect", id = %fingerprint(&item.url), error = %e, "invalid item");
            batch.invalid += 1;
            continue;
        }
        if scorer.apply(&mut item) < PERSIST_FLOOR {
            batch.below_floor += 1;
            continue;
        }
        scored.push(item);
    }

    let (kept, duplicates) = dedup::dedupe(scored);
    batch.items = kept;
    batch.duplicates = duplicates;

    counter!("collect_invalid_total").increment(batch.invalid as u64);
    counter!("collect_below_floor_total").increment(batch.below_floor as u64);
    counter!("collect_duplicates_total").increment(batch.duplicates as u64);
    gauge!("collect_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
    batch
}
