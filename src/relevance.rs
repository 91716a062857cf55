// src/relevance.rs
//! Topical relevance scorer: four keyword tiers plus a title boost, summed and
//! clamped into [0, 1]. Tiers come from TOML (`[tiers]`, optional `[weights]`)
//! or from the built-in motorsport seed.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::logging::fingerprint;
use crate::model::RawItem;

pub const DEFAULT_KEYWORDS_PATH: &str = "config/keywords.toml";
pub const ENV_KEYWORDS_PATH: &str = "KEYWORDS_CONFIG_PATH";

/// Scores below this are dropped before persistence.
pub const PERSIST_FLOOR: f32 = 0.1;

/// Result of scoring one item.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Relevance {
    pub score: f32,
    pub keywords: BTreeSet<String>,
}

/* ----------------------------
Config schema (from TOML)
---------------------------- */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordTiers {
    #[serde(default)]
    pub general: Vec<String>,
    #[serde(default)]
    pub high_priority: Vec<String>,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub special: Vec<String>,
}

/// Per-hit increment and cap for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierWeight {
    pub per_hit: f32,
    pub cap: f32,
}

impl TierWeight {
    const fn new(per_hit: f32, cap: f32) -> Self {
        Self { per_hit, cap }
    }

    fn apply(&self, hits: usize) -> f32 {
        (hits as f32 * self.per_hit).min(self.cap)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierWeights {
    pub general: TierWeight,
    pub high_priority: TierWeight,
    pub entities: TierWeight,
    pub title: TierWeight,
    pub special: TierWeight,
    /// Minimum score once any general keyword matched.
    pub general_floor: f32,
}

impl Default for TierWeights {
    fn default() -> Self {
        Self {
            general: TierWeight::new(0.1, 0.6),
            high_priority: TierWeight::new(0.2, 0.8),
            entities: TierWeight::new(0.15, 0.6),
            title: TierWeight::new(0.15, 0.9),
            special: TierWeight::new(0.15, 0.3),
            general_floor: 0.1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct KeywordsRoot {
    tiers: KeywordTiers,
    #[serde(default)]
    weights: TierWeights,
}

fn seed(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl Default for KeywordTiers {
    fn default() -> Self {
        Self {
            general: seed(&[
                "racing",
                "motorsport",
                "race",
                "practice",
                "qualifying",
                "points",
                "podium",
                "pit stop",
                "circuit",
                "paddock",
                "monaco",
                "silverstone",
                "monza",
                "interlagos",
                "suzuka",
            ]),
            high_priority: seed(&[
                "formula 1",
                "formula one",
                "f1",
                "grand prix",
                "championship",
                "pole position",
            ]),
            entities: seed(&[
                "ferrari",
                "mercedes",
                "red bull",
                "mclaren",
                "alpine",
                "aston martin",
                "haas",
                "williams",
                "sauber",
                "hamilton",
                "verstappen",
                "leclerc",
                "sainz",
                "norris",
                "russell",
                "alonso",
                "piastri",
                "perez",
                "ocon",
                "gasly",
                "stroll",
                "albon",
                "tsunoda",
                "hulkenberg",
            ]),
            special: seed(&["fia", "drs", "safety car", "red flag", "parc ferme"]),
        }
    }
}

impl KeywordTiers {
    fn normalized(mut self) -> Self {
        for list in [
            &mut self.general,
            &mut self.high_priority,
            &mut self.entities,
            &mut self.special,
        ] {
            *list = list
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect();
            list.sort();
            list.dedup();
        }
        self
    }

    /// Every keyword across all tiers, deduplicated. Used as the topical list
    /// by moderation.
    pub fn all(&self) -> Vec<String> {
        let set: BTreeSet<&String> = self
            .general
            .iter()
            .chain(&self.high_priority)
            .chain(&self.entities)
            .chain(&self.special)
            .collect();
        set.into_iter().cloned().collect()
    }
}

/* ----------------------------
Scorer
---------------------------- */

#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    tiers: KeywordTiers,
    weights: TierWeights,
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self::new(KeywordTiers::default(), TierWeights::default())
    }
}

impl RelevanceScorer {
    pub fn new(tiers: KeywordTiers, weights: TierWeights) -> Self {
        Self {
            tiers: tiers.normalized(),
            weights,
        }
    }

    /// Load `[tiers]` and optional `[weights]` from a TOML string. Other tables
    /// in the same file are ignored.
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let root: KeywordsRoot = toml::from_str(toml_str).context("parse keyword tiers")?;
        Ok(Self::new(root.tiers, root.weights))
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read keywords config at {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn tiers(&self) -> &KeywordTiers {
        &self.tiers
    }

    /// Score a title/body pair. One pass per keyword over the lowercased text,
    /// so cost is linear in body length.
    pub fn score(&self, title: &str, body: &str) -> Relevance {
        let title_lc = title.to_lowercase();
        let body_lc = body.to_lowercase();
        let mut keywords = BTreeSet::new();

        let mut tier_hits = |list: &[String]| -> (usize, usize) {
            let mut hits = 0usize;
            let mut in_title = 0usize;
            for k in list {
                let t = title_lc.contains(k.as_str());
                if t || body_lc.contains(k.as_str()) {
                    hits += 1;
                    keywords.insert(k.clone());
                }
                if t {
                    in_title += 1;
                }
            }
            (hits, in_title)
        };

        let (general, general_t) = tier_hits(&self.tiers.general);
        let (high, high_t) = tier_hits(&self.tiers.high_priority);
        let (entities, entities_t) = tier_hits(&self.tiers.entities);
        let (special, _) = tier_hits(&self.tiers.special);

        let w = &self.weights;
        let mut score = w.general.apply(general)
            + w.high_priority.apply(high)
            + w.entities.apply(entities)
            + w.title.apply(general_t + high_t + entities_t)
            + w.special.apply(special);
        score = score.clamp(0.0, 1.0);
        if general > 0 && score < w.general_floor {
            score = w.general_floor;
        }

        debug!(
            target: "relevance",
            id = %fingerprint(title),
            score,
            general, high, entities, special,
            "scored"
        );

        Relevance { score, keywords }
    }

    /// Write score and keywords onto the item.
    pub fn apply(&self, item: &mut RawItem) -> f32 {
        let rel = self.score(&item.title, &item.body);
        item.relevance_score = rel.score;
        item.keywords = rel.keywords;
        rel.score
    }

    pub fn extract_keywords(&self, title: &str, body: &str) -> BTreeSet<String> {
        self.score(title, body).keywords
    }
}
