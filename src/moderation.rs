// src/moderation.rs
//! Moderation gate: spam filtering, quality scoring and the approval rules an
//! enriched item must pass before it may be scheduled.
//!
//! Rules run in a fixed order and all rejection reasons accumulate. Only the
//! spam check short-circuits. Suggestions never affect approval.

use std::fs;
use std::path::Path;

use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::logging::fingerprint;
use crate::model::{EnrichedItem, Sentiment, ValidationError};
use crate::relevance::KeywordTiers;

pub const MIN_QUALITY_SCORE: f32 = 0.3;
pub const MIN_TOPICAL_MATCHES: usize = 2;
pub const MIN_TITLE_WORDS: usize = 3;
pub const MIN_BODY_CHARS: usize = 50;

/// Reason and suggestion strings carried on a verdict.
pub mod reasons {
    pub const SPAM: &str = "spam content detected";
    pub const LOW_QUALITY: &str = "low quality content";
    pub const NOT_RELEVANT: &str = "not relevant";
    pub const DUPLICATE: &str = "duplicate content";
    pub const TOO_SHORT: &str = "content too short";
    pub const MODERATION_ERROR: &str = "moderation_error";

    pub const IMPROVE_FORMATTING: &str = "improve formatting";
    pub const PRIORITIZE: &str = "high importance content - prioritize";
}

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("item failed validation: {0}")]
    InvalidItem(#[from] ValidationError),
    #[error("quality score is not finite")]
    NonFiniteScore,
    #[error("invalid promo pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Bonus applied when the item's source contains `needle` (case-insensitive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReputation {
    pub needle: String,
    pub bonus: f32,
}

/// Word lists and patterns driving the moderator. Loaded from the
/// `[moderation]` table of the keywords file, or the built-in defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationRules {
    pub spam_keywords: Vec<String>,
    pub promo_patterns: Vec<String>,
    pub quality_keywords: Vec<String>,
    pub importance_boosters: Vec<String>,
    /// First matching entry wins.
    pub source_reputation: Vec<SourceReputation>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

impl Default for ModerationRules {
    fn default() -> Self {
        Self {
            spam_keywords: words(&[
                "spam",
                "scam",
                "fake",
                "clickbait",
                "advertisement",
                "promo",
                "buy now",
                "discount",
                "sale",
                "free money",
                "win big",
            ]),
            promo_patterns: words(&[
                r"(?i)\bclick here\b",
                r"(?i)\bbuy now\b",
                r"(?i)\blimited time\b",
                r"(?i)\bact now\b",
                r"(?i)\bguaranteed\b",
                r"100%",
                r"(?i)\bfree\b",
                r"(?i)\bdiscount\b",
            ]),
            quality_keywords: words(&[
                "breaking",
                "exclusive",
                "official",
                "confirmed",
                "report",
                "analysis",
                "insight",
                "update",
                "news",
                "announcement",
            ]),
            importance_boosters: words(&[
                "championship",
                "title",
                "pole position",
                "victory",
                "crash",
                "injury",
                "contract",
                "transfer",
                "retirement",
                "comeback",
            ]),
            source_reputation: vec![
                SourceReputation {
                    needle: "official".into(),
                    bonus: 0.2,
                },
                SourceReputation {
                    needle: "formula1.com".into(),
                    bonus: 0.15,
                },
                SourceReputation {
                    needle: "motorsport.com".into(),
                    bonus: 0.1,
                },
            ],
        }
    }
}

#[derive(Debug, Deserialize)]
struct RulesRoot {
    #[serde(default)]
    moderation: Option<ModerationRules>,
}

impl ModerationRules {
    /// Read the `[moderation]` table; a file without one yields the defaults.
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let root: RulesRoot = toml::from_str(toml_str).context("parse moderation rules")?;
        Ok(root.moderation.unwrap_or_default())
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read keywords config at {}", path.display()))?;
        Self::from_toml_str(&content)
    }
}

/// Outcome of moderating one item. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModerationVerdict {
    pub approved: bool,
    pub quality_score: f32,
    pub reasons: Vec<String>,
    pub suggestions: Vec<String>,
}

impl ModerationVerdict {
    fn failed() -> Self {
        Self {
            approved: false,
            quality_score: 0.0,
            reasons: vec![reasons::MODERATION_ERROR.to_string()],
            suggestions: Vec::new(),
        }
    }
}

/// Sizes of the active rule lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModerationStats {
    pub spam_keywords: usize,
    pub promo_patterns: usize,
    pub quality_keywords: usize,
    pub importance_boosters: usize,
    pub source_rules: usize,
    pub topical_keywords: usize,
    pub min_quality_score: f32,
}

#[derive(Debug, Clone)]
pub struct Moderator {
    rules: ModerationRules,
    promo: Vec<Regex>,
    topical: Vec<String>,
}

fn lower_all(list: &[String]) -> Vec<String> {
    list.iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>, ModerationError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|source| ModerationError::InvalidPattern {
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}

impl Default for Moderator {
    fn default() -> Self {
        Self::new(ModerationRules::default(), KeywordTiers::default().all())
            .expect("built-in promo patterns compile")
    }
}

impl Moderator {
    /// `topical` is the keyword list used by the relevance rule, usually every
    /// scorer tier merged.
    pub fn new(mut rules: ModerationRules, topical: Vec<String>) -> Result<Self, ModerationError> {
        let promo = compile(&rules.promo_patterns)?;
        rules.spam_keywords = lower_all(&rules.spam_keywords);
        rules.quality_keywords = lower_all(&rules.quality_keywords);
        rules.importance_boosters = lower_all(&rules.importance_boosters);
        for rep in &mut rules.source_reputation {
            rep.needle = rep.needle.trim().to_lowercase();
        }
        Ok(Self {
            rules,
            promo,
            topical: lower_all(&topical),
        })
    }

    /// Decide on one item. Never fails: an internal error becomes a rejection
    /// carrying `moderation_error`.
    pub fn moderate(&self, item: &EnrichedItem) -> ModerationVerdict {
        match self.evaluate(item) {
            Ok(v) => {
                debug!(
                    target: "moderation",
                    id = %fingerprint(item.title()),
                    approved = v.approved,
                    quality = v.quality_score,
                    reasons = ?v.reasons,
                    "moderated"
                );
                v
            }
            Err(e) => {
                warn!(
                    target: "moderation",
                    id = %fingerprint(item.title()),
                    error = %e,
                    "moderation failed; rejecting"
                );
                metrics::counter!("moderation_errors_total").increment(1);
                ModerationVerdict::failed()
            }
        }
    }

    fn evaluate(&self, item: &EnrichedItem) -> Result<ModerationVerdict, ModerationError> {
        item.validate()?;

        if self.is_spam(item) {
            return Ok(ModerationVerdict {
                approved: false,
                quality_score: 0.0,
                reasons: vec![reasons::SPAM.to_string()],
                suggestions: Vec::new(),
            });
        }

        let quality_score = self.quality_score(item);
        if !quality_score.is_finite() {
            return Err(ModerationError::NonFiniteScore);
        }

        let mut out = ModerationVerdict {
            approved: true,
            quality_score,
            reasons: Vec::new(),
            suggestions: Vec::new(),
        };
        let mut reject = |reason: &str| {
            out.approved = false;
            out.reasons.push(reason.to_string());
        };

        if quality_score < MIN_QUALITY_SCORE {
            reject(reasons::LOW_QUALITY);
        }
        if !self.is_relevant(item) {
            reject(reasons::NOT_RELEVANT);
        }
        if self.has_short_title(item) {
            reject(reasons::DUPLICATE);
        }
        if item.body().chars().count() < MIN_BODY_CHARS {
            reject(reasons::TOO_SHORT);
        }

        if !self.is_properly_formatted(item) {
            out.suggestions.push(reasons::IMPROVE_FORMATTING.to_string());
        }
        if self.has_important_keywords(item) {
            out.suggestions.push(reasons::PRIORITIZE.to_string());
        }
        Ok(out)
    }

    fn haystack(item: &EnrichedItem) -> String {
        format!("{} {}", item.title(), item.body()).to_lowercase()
    }

    /// Spam keyword substring or promotional pattern over title and body.
    pub fn is_spam(&self, item: &EnrichedItem) -> bool {
        let text = Self::haystack(item);
        self.rules
            .spam_keywords
            .iter()
            .any(|k| text.contains(k.as_str()))
            || self.promo.iter().any(|re| re.is_match(&text))
    }

    /// Weighted sum of relevance, length, quality keywords, importance,
    /// sentiment and source reputation, clamped to [0, 1].
    pub fn quality_score(&self, item: &EnrichedItem) -> f32 {
        let mut score = item.raw.relevance_score * 0.3;

        let body_len = item.body().chars().count();
        if body_len > 200 {
            score += 0.2;
        } else if body_len > 100 {
            score += 0.1;
        }

        let text = Self::haystack(item);
        let quality_hits = self
            .rules
            .quality_keywords
            .iter()
            .filter(|k| text.contains(k.as_str()))
            .count();
        score += (quality_hits as f32 * 0.1).min(0.3);

        score += item.importance.get() as f32 * 0.1;

        score += match item.sentiment {
            Sentiment::Positive => 0.1,
            Sentiment::Negative => 0.05,
            Sentiment::Neutral => 0.0,
        };

        let source = item.raw.source.to_lowercase();
        if let Some(rep) = self
            .rules
            .source_reputation
            .iter()
            .find(|r| !r.needle.is_empty() && source.contains(r.needle.as_str()))
        {
            score += rep.bonus;
        }

        score.clamp(0.0, 1.0)
    }

    pub fn topical_matches(&self, item: &EnrichedItem) -> usize {
        let text = Self::haystack(item);
        self.topical
            .iter()
            .filter(|k| text.contains(k.as_str()))
            .count()
    }

    pub fn is_relevant(&self, item: &EnrichedItem) -> bool {
        self.topical_matches(item) >= MIN_TOPICAL_MATCHES
    }

    /// Fewer than three distinct title words is treated as a duplicate marker.
    pub fn has_short_title(&self, item: &EnrichedItem) -> bool {
        let distinct: std::collections::HashSet<String> = item
            .title()
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        distinct.len() < MIN_TITLE_WORDS
    }

    pub fn is_properly_formatted(&self, item: &EnrichedItem) -> bool {
        let title = item.title();
        let shouting =
            title.chars().any(char::is_alphabetic) && !title.chars().any(char::is_lowercase);
        let body = item.body();
        let has_sentence_end = body.contains(['.', '!', '?']);
        !shouting && has_sentence_end && !body.starts_with("http")
    }

    pub fn has_important_keywords(&self, item: &EnrichedItem) -> bool {
        let text = Self::haystack(item);
        self.rules
            .importance_boosters
            .iter()
            .any(|k| text.contains(k.as_str()))
    }

    pub fn stats(&self) -> ModerationStats {
        ModerationStats {
            spam_keywords: self.rules.spam_keywords.len(),
            promo_patterns: self.promo.len(),
            quality_keywords: self.rules.quality_keywords.len(),
            importance_boosters: self.rules.importance_boosters.len(),
            source_rules: self.rules.source_reputation.len(),
            topical_keywords: self.topical.len(),
            min_quality_score: MIN_QUALITY_SCORE,
        }
    }

    /// Append extra words and patterns to the active lists. Nothing changes if
    /// any new pattern fails to compile.
    pub fn extend_rules(&mut self, extra: ModerationRules) -> Result<(), ModerationError> {
        let new_promo = compile(&extra.promo_patterns)?;

        fn merge(into: &mut Vec<String>, more: &[String]) {
            for w in lower_all(more) {
                if !into.contains(&w) {
                    into.push(w);
                }
            }
        }
        merge(&mut self.rules.spam_keywords, &extra.spam_keywords);
        merge(&mut self.rules.quality_keywords, &extra.quality_keywords);
        merge(
            &mut self.rules.importance_boosters,
            &extra.importance_boosters,
        );
        self.rules.promo_patterns.extend(extra.promo_patterns);
        self.promo.extend(new_promo);
        for mut rep in extra.source_reputation {
            rep.needle = rep.needle.trim().to_lowercase();
            self.rules.source_reputation.push(rep);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImportanceLevel, RawItem, SourceKind};
    use chrono::Utc;

    fn item(title: &str, body: &str) -> EnrichedItem {
        let raw = RawItem::new(
            title,
            body,
            "https://news.test/a",
            "feed",
            SourceKind::Feed,
            Utc::now(),
        );
        EnrichedItem::from_raw(raw)
    }

    #[test]
    fn shouting_title_only_adds_a_suggestion() {
        let m = Moderator::default();
        let it = item("FERRARI TAKE POLE", "Short body.");
        assert!(!m.is_properly_formatted(&it));
        assert!(m.is_properly_formatted(&item("Ferrari take pole", "Body.")));
        assert!(!m.is_properly_formatted(&item("Ferrari take pole", "http://x")));
    }

    #[test]
    fn quality_score_sums_components() {
        let m = Moderator::default();
        let mut it = item("Race report", &"x".repeat(150));
        it.raw.relevance_score = 0.5;
        it.importance = ImportanceLevel::new(2).unwrap();
        it.sentiment = Sentiment::Negative;
        it.raw.source = "Motorsport.com".into();
        // 0.15 + 0.1 (len) + 0.1 (report) + 0.2 + 0.05 + 0.1
        assert!((m.quality_score(&it) - 0.7).abs() < 1e-5);
    }

    #[test]
    fn bad_extra_pattern_leaves_rules_untouched() {
        let mut m = Moderator::default();
        let before = m.stats();
        let extra = ModerationRules {
            spam_keywords: vec!["lottery".into()],
            promo_patterns: vec!["(unclosed".into()],
            quality_keywords: vec![],
            importance_boosters: vec![],
            source_reputation: vec![],
        };
        assert!(m.extend_rules(extra).is_err());
        assert_eq!(m.stats(), before);
    }

    #[test]
    fn rules_table_is_optional() {
        let r = ModerationRules::from_toml_str("[tiers]\ngeneral = []\n").unwrap();
        assert_eq!(r, ModerationRules::default());
        let r = ModerationRules::from_toml_str("[moderation]\nspam_keywords = [\"x\"]\n").unwrap();
        assert_eq!(r.spam_keywords, vec!["x"]);
        // unspecified lists keep their defaults
        assert_eq!(
            r.quality_keywords,
            ModerationRules::default().quality_keywords
        );
    }
}
