// src/enrich/mod.rs
//! Enrichment stage: turns a raw item into an enriched one (summary, key
//! points, sentiment, importance, tags, optional translation).
//!
//! The model call lives behind [`Enricher`]. Parsing of the model's reply and
//! the fallback used when it is unusable live here so they can be tested
//! without a model.

pub mod ollama;

use async_trait::async_trait;
use serde::Deserialize;

use crate::model::{EnrichedItem, ImportanceLevel, RawItem, Sentiment, Translation};

/// Summary length used by the fallback path.
pub const FALLBACK_SUMMARY_CHARS: usize = 200;

#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, item: &RawItem) -> anyhow::Result<EnrichedItem>;
    fn name(&self) -> &'static str;
}

/// Fields the model is asked to return. Everything is optional; missing or
/// malformed values fall back to neutral defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EnrichmentFields {
    pub summary: Option<String>,
    pub key_points: Vec<String>,
    pub sentiment: Option<String>,
    pub importance: Option<i64>,
    pub tags: Vec<String>,
    pub translated_title: Option<String>,
    pub translated_summary: Option<String>,
    pub translated_key_points: Vec<String>,
}

/// Fallback when the model reply is unusable: truncated body as summary,
/// neutral sentiment, lowest importance.
pub fn fallback_fields(item: &RawItem) -> EnrichmentFields {
    let body = item.body.trim();
    let summary = if body.chars().count() > FALLBACK_SUMMARY_CHARS {
        let head: String = body.chars().take(FALLBACK_SUMMARY_CHARS).collect();
        format!("{head}...")
    } else {
        body.to_string()
    };
    EnrichmentFields {
        summary: Some(summary),
        importance: Some(1),
        ..Default::default()
    }
}

/// Extract the JSON object from a model reply. Models often wrap it in prose,
/// so the slice between the first `{` and the last `}` is tried.
pub fn parse_model_response(reply: &str) -> Option<EnrichmentFields> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&reply[start..=end]).ok()
}

/// Rough language guess: "russian" when more than 30% of letters are
/// Cyrillic, "unknown" when there are no letters, "other" otherwise.
pub fn detect_language(text: &str) -> &'static str {
    let mut letters = 0usize;
    let mut cyrillic = 0usize;
    for c in text.chars().filter(|c| c.is_alphabetic()) {
        letters += 1;
        if ('\u{0400}'..='\u{04FF}').contains(&c) {
            cyrillic += 1;
        }
    }
    if letters == 0 {
        "unknown"
    } else if cyrillic as f32 / letters as f32 > 0.3 {
        "russian"
    } else {
        "other"
    }
}

fn clean_list(list: Vec<String>) -> Vec<String> {
    list.into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Build the enriched item from a raw one and parsed fields.
pub fn build_enriched(raw: &RawItem, fields: EnrichmentFields) -> EnrichedItem {
    let original_language = Some(detect_language(&format!("{} {}", raw.title, raw.body)).into());
    let mut out = EnrichedItem::from_raw(raw.clone());

    out.summary = fields
        .summary
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| fallback_fields(raw).summary.unwrap_or_default());
    out.key_points = clean_list(fields.key_points);
    out.sentiment = fields
        .sentiment
        .as_deref()
        .map(Sentiment::from_label)
        .unwrap_or_default();
    out.importance = fields
        .importance
        .map(ImportanceLevel::saturating)
        .unwrap_or_default();
    out.tags = clean_list(fields.tags);

    let translated_key_points = clean_list(fields.translated_key_points);
    if fields.translated_title.is_some()
        || fields.translated_summary.is_some()
        || !translated_key_points.is_empty()
    {
        out.translation = Some(Translation {
            title: fields.translated_title,
            summary: fields.translated_summary,
            key_points: translated_key_points,
        });
    }
    out.original_language = original_language;
    out.formatted = crate::publish::format_message(&out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceKind;
    use chrono::Utc;

    fn raw(body: &str) -> RawItem {
        RawItem::new(
            "Title",
            body,
            "https://x.test/a",
            "feed",
            SourceKind::Feed,
            Utc::now(),
        )
    }

    #[test]
    fn reply_with_prose_around_json_parses() {
        let reply = "Sure! Here you go:\n{\"summary\": \"S\", \"importance\": 4, \"sentiment\": \"positive\", \"tags\": [\"f1\"]}\nThanks";
        let f = parse_model_response(reply).unwrap();
        assert_eq!(f.summary.as_deref(), Some("S"));
        assert_eq!(f.importance, Some(4));
        assert_eq!(f.tags, vec!["f1"]);
        assert!(parse_model_response("no json here").is_none());
        assert!(parse_model_response("} backwards {").is_none());
    }

    #[test]
    fn fallback_truncates_long_bodies() {
        let f = fallback_fields(&raw(&"x".repeat(250)));
        let s = f.summary.unwrap();
        assert!(s.ends_with("..."));
        assert_eq!(s.chars().count(), FALLBACK_SUMMARY_CHARS + 3);
        assert_eq!(f.importance, Some(1));
    }

    #[test]
    fn out_of_range_importance_is_clamped() {
        let e = build_enriched(
            &raw("body"),
            EnrichmentFields {
                importance: Some(11),
                sentiment: Some("weird".into()),
                ..Default::default()
            },
        );
        assert_eq!(e.importance.get(), 5);
        assert_eq!(e.sentiment, Sentiment::Neutral);
        assert_eq!(e.summary, "body");
        assert!(e.raw.processed);
        assert!(!e.formatted.is_empty());
    }

    #[test]
    fn language_guess() {
        assert_eq!(detect_language("Гран-при Монако"), "russian");
        assert_eq!(detect_language("Monaco Grand Prix"), "other");
        assert_eq!(detect_language("123 !!"), "unknown");
    }
}
