//! Data model shared by both processes: raw items as fetched, enriched items as
//! returned by the enrichment step, and the bookkeeping record written once a
//! publication has been confirmed.
//!
//! Item identity is the URL. The store-assigned [`ItemId`] is only a handle for
//! persistence calls.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Handle assigned by the persistence layer on `save`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of feed an item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Feed,
    Channel,
    Forum,
    Other,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("item has no title")]
    MissingTitle,
    #[error("item has no url")]
    MissingUrl,
    #[error("item url is not http(s): {0}")]
    InvalidUrl(String),
    #[error("relevance score {0} is outside [0, 1]")]
    RelevanceOutOfRange(f32),
    #[error("importance level {0} is outside 1..=5")]
    ImportanceOutOfRange(i64),
}

/// An item as produced by a fetcher, before enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ItemId>,
    pub title: String,
    pub body: String,
    pub url: String,
    pub source: String,
    pub source_kind: SourceKind,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub relevance_score: f32,
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    #[serde(default)]
    pub processed: bool,
    #[serde(default)]
    pub published: bool,
    pub created_at: DateTime<Utc>,
}

impl RawItem {
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        url: impl Into<String>,
        source: impl Into<String>,
        source_kind: SourceKind,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            title: title.into(),
            body: body.into(),
            url: url.into(),
            source: source.into(),
            source_kind,
            published_at,
            relevance_score: 0.0,
            keywords: BTreeSet::new(),
            processed: false,
            published: false,
            created_at: Utc::now(),
        }
    }

    /// Reject items a fetcher should never have produced.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingTitle);
        }
        let url = self.url.trim();
        if url.is_empty() {
            return Err(ValidationError::MissingUrl);
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ValidationError::InvalidUrl(url.to_string()));
        }
        if !(0.0..=1.0).contains(&self.relevance_score) {
            return Err(ValidationError::RelevanceOutOfRange(self.relevance_score));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Sentiment {
    /// Lenient parse of a model-produced label; anything unknown is neutral.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }
    }
}

/// Editorial priority in 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct ImportanceLevel(u8);

impl ImportanceLevel {
    pub const MIN: ImportanceLevel = ImportanceLevel(1);
    pub const MAX: ImportanceLevel = ImportanceLevel(5);

    pub fn new(level: i64) -> Result<Self, ValidationError> {
        if (1..=5).contains(&level) {
            Ok(Self(level as u8))
        } else {
            Err(ValidationError::ImportanceOutOfRange(level))
        }
    }

    /// Clamp any integer into the valid range.
    pub fn saturating(level: i64) -> Self {
        Self(level.clamp(1, 5) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for ImportanceLevel {
    fn default() -> Self {
        Self::MIN
    }
}

impl TryFrom<i64> for ImportanceLevel {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ImportanceLevel> for i64 {
    fn from(value: ImportanceLevel) -> Self {
        value.0 as i64
    }
}

/// Translated variants produced by the enrichment step, when it translated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Translation {
    pub title: Option<String>,
    pub summary: Option<String>,
    #[serde(default)]
    pub key_points: Vec<String>,
}

/// A raw item plus the enrichment output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedItem {
    #[serde(flatten)]
    pub raw: RawItem,
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub sentiment: Sentiment,
    #[serde(default)]
    pub importance: ImportanceLevel,
    #[serde(default)]
    pub formatted: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<Translation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_language: Option<String>,
}

impl EnrichedItem {
    /// Wrap a raw item with neutral enrichment defaults and flip `processed`.
    pub fn from_raw(mut raw: RawItem) -> Self {
        raw.processed = true;
        Self {
            raw,
            summary: String::new(),
            key_points: Vec::new(),
            sentiment: Sentiment::Neutral,
            importance: ImportanceLevel::MIN,
            formatted: String::new(),
            tags: Vec::new(),
            translation: None,
            original_language: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.raw.url
    }

    pub fn title(&self) -> &str {
        &self.raw.title
    }

    pub fn body(&self) -> &str {
        &self.raw.body
    }

    /// Scheduling priority derived from the importance level.
    pub fn priority(&self) -> u8 {
        self.importance.get()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.raw.validate()
    }
}

/// Written once the publisher confirmed a successful send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedRecord {
    pub url: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub message_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(title: &str, url: &str) -> RawItem {
        RawItem::new(title, "body", url, "test", SourceKind::Feed, Utc::now())
    }

    #[test]
    fn validation_requires_title_and_http_url() {
        assert_eq!(
            raw("  ", "https://x.test/a").validate(),
            Err(ValidationError::MissingTitle)
        );
        assert_eq!(raw("t", "").validate(), Err(ValidationError::MissingUrl));
        assert!(matches!(
            raw("t", "ftp://x.test").validate(),
            Err(ValidationError::InvalidUrl(_))
        ));
        assert!(raw("t", "https://x.test/a").validate().is_ok());
    }

    #[test]
    fn importance_bounds() {
        assert!(ImportanceLevel::new(0).is_err());
        assert!(ImportanceLevel::new(6).is_err());
        assert_eq!(ImportanceLevel::new(3).unwrap().get(), 3);
        assert_eq!(ImportanceLevel::saturating(42).get(), 5);
        assert_eq!(ImportanceLevel::saturating(-1).get(), 1);
    }

    #[test]
    fn enriched_item_serializes_flat_and_rejects_bad_importance() {
        let mut e = EnrichedItem::from_raw(raw("Title here", "https://x.test/a"));
        e.importance = ImportanceLevel::new(4).unwrap();
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["url"], "https://x.test/a");
        assert_eq!(v["importance"], 4);
        assert_eq!(v["processed"], true);

        let mut bad = v.clone();
        bad["importance"] = serde_json::json!(9);
        assert!(serde_json::from_value::<EnrichedItem>(bad).is_err());
    }

    #[test]
    fn sentiment_labels_are_lenient() {
        assert_eq!(Sentiment::from_label(" Positive "), Sentiment::Positive);
        assert_eq!(Sentiment::from_label("NEGATIVE"), Sentiment::Negative);
        assert_eq!(Sentiment::from_label("mixed"), Sentiment::Neutral);
    }
}
