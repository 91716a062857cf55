// src/config.rs
//! Runtime settings for both processes.
//!
//! Precedence: built-in defaults, then the TOML file at `$PIPELINE_CONFIG_PATH`
//! (or `config/pipeline.toml` when present), then individual env overrides.
//! A `.env` file is loaded first so its values count as env.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::moderation::{ModerationRules, Moderator};
use crate::relevance::{RelevanceScorer, DEFAULT_KEYWORDS_PATH, ENV_KEYWORDS_PATH};
use crate::worker::RetryPolicy;

pub const ENV_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";

pub const DEFAULT_MAX_POSTS_PER_HOUR: usize = 5;
pub const DEFAULT_MIN_RELEVANCE: f32 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Intervals {
    pub collect_secs: u64,
    pub enrich_secs: u64,
    pub moderate_secs: u64,
    pub publish_secs: u64,
    pub reconcile_secs: u64,
    pub sync_secs: u64,
    /// First back-off delay after a failed iteration.
    pub retry_secs: u64,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            collect_secs: 15 * 60,
            enrich_secs: 300,
            moderate_secs: 300,
            publish_secs: 60,
            reconcile_secs: 60,
            sync_secs: 30,
            retry_secs: 60,
        }
    }
}

impl Intervals {
    /// Loop policy for a task that normally runs every `secs`.
    pub fn policy(&self, secs: u64) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_secs(secs.max(1)),
            Duration::from_secs(self.retry_secs.max(1)),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub enrich_batch: usize,
    pub moderation_batch: usize,
    pub sync_batch: usize,
    pub reconcile_batch: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            enrich_batch: 10,
            moderation_batch: 10,
            sync_batch: 5,
            reconcile_batch: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaSettings {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "llama2".into(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    pub bot_token: Option<String>,
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_posts_per_hour: usize,
    pub min_relevance_score: f32,
    pub redis_url: String,
    pub rss_feeds: Vec<String>,
    /// Keyword tiers and moderation lists; built-ins when unset and the
    /// default path does not exist.
    pub keywords_path: Option<PathBuf>,
    /// Publisher publishes every synced item without waiting for a reviewer.
    pub auto_publish: bool,
    pub intervals: Intervals,
    pub limits: Limits,
    pub ollama: OllamaSettings,
    pub telegram: TelegramSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_posts_per_hour: DEFAULT_MAX_POSTS_PER_HOUR,
            min_relevance_score: DEFAULT_MIN_RELEVANCE,
            redis_url: "redis://127.0.0.1:6379".into(),
            rss_feeds: Vec::new(),
            keywords_path: None,
            auto_publish: false,
            intervals: Intervals::default(),
            limits: Limits::default(),
            ollama: OllamaSettings::default(),
            telegram: TelegramSettings::default(),
        }
    }
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: Settings = toml::from_str(s).context("parse pipeline settings")?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    /// Apply env overrides through `lookup`, so tests can pass a map instead
    /// of touching the process env.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("MAX_POSTS_PER_HOUR") {
            match v.parse::<usize>() {
                Ok(n) => self.max_posts_per_hour = n,
                Err(_) => warn!(target: "config", value = %v, "ignoring bad MAX_POSTS_PER_HOUR"),
            }
        }
        if let Some(v) = get("MIN_RELEVANCE_SCORE") {
            match v.parse::<f32>() {
                Ok(x) => self.min_relevance_score = x,
                Err(_) => warn!(target: "config", value = %v, "ignoring bad MIN_RELEVANCE_SCORE"),
            }
        }
        if let Some(v) = get("CHECK_INTERVAL_MINUTES") {
            match v.parse::<u64>() {
                Ok(m) => self.intervals.collect_secs = m * 60,
                Err(_) => {
                    warn!(target: "config", value = %v, "ignoring bad CHECK_INTERVAL_MINUTES")
                }
            }
        }
        if let Some(v) = get("REDIS_URL") {
            self.redis_url = v;
        }
        if let Some(v) = get("OLLAMA_BASE_URL") {
            self.ollama.base_url = v;
        }
        if let Some(v) = get("OLLAMA_MODEL") {
            self.ollama.model = v;
        }
        if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(v);
        }
        if let Some(v) = get("TELEGRAM_CHANNEL_ID") {
            self.telegram.channel_id = Some(v);
        }
        if let Some(v) = get("RSS_FEEDS") {
            self.rss_feeds = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = get("AUTO_PUBLISH") {
            self.auto_publish = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = get(ENV_KEYWORDS_PATH) {
            self.keywords_path = Some(PathBuf::from(v));
        }
        self.sanitize();
    }

    fn sanitize(&mut self) {
        if !self.min_relevance_score.is_finite() {
            self.min_relevance_score = DEFAULT_MIN_RELEVANCE;
        }
        self.min_relevance_score = self.min_relevance_score.clamp(0.0, 1.0);
        self.ollama.base_url = self.ollama.base_url.trim_end_matches('/').to_string();
        if self.limits.sync_batch == 0 {
            self.limits.sync_batch = 1;
        }
    }

    fn keywords_file(&self) -> Option<PathBuf> {
        match &self.keywords_path {
            Some(p) => Some(p.clone()),
            None => {
                let p = PathBuf::from(DEFAULT_KEYWORDS_PATH);
                p.exists().then_some(p)
            }
        }
    }

    /// Build the scorer and moderator from the keywords file, or the built-ins.
    pub fn build_gates(&self) -> Result<(RelevanceScorer, Moderator)> {
        let Some(path) = self.keywords_file() else {
            let scorer = RelevanceScorer::default();
            let moderator = Moderator::new(ModerationRules::default(), scorer.tiers().all())?;
            return Ok((scorer, moderator));
        };
        let scorer = RelevanceScorer::from_path(&path)?;
        let rules = ModerationRules::from_path(&path)?;
        let moderator = Moderator::new(rules, scorer.tiers().all())
            .with_context(|| format!("moderation rules in {}", path.display()))?;
        Ok((scorer, moderator))
    }

    pub fn telegram_credentials(&self) -> Result<(String, String)> {
        let token = self
            .telegram
            .bot_token
            .clone()
            .ok_or_else(|| anyhow!("TELEGRAM_BOT_TOKEN is not set"))?;
        let channel = self
            .telegram
            .channel_id
            .clone()
            .ok_or_else(|| anyhow!("TELEGRAM_CHANNEL_ID is not set"))?;
        Ok((token, channel))
    }
}

/// Load settings:
/// 1) `.env` (never overrides real env)
/// 2) `$PIPELINE_CONFIG_PATH`, which must exist when set
/// 3) `config/pipeline.toml` when present, otherwise defaults
/// 4) env overrides
pub fn load_settings() -> Result<Settings> {
    let _ = dotenvy::dotenv();

    let mut settings = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        Settings::load_from_file(&pb)?
    } else {
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            Settings::load_from_file(&default)?
        } else {
            Settings::default()
        }
    };

    settings.apply_env(|k| std::env::var(k).ok());
    Ok(settings)
}
