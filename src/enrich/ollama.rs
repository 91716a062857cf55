// src/enrich/ollama.rs
//! Enricher backed by a local Ollama model (`POST /api/generate`).

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{build_enriched, fallback_fields, parse_model_response, Enricher};
use crate::logging::fingerprint;
use crate::model::{EnrichedItem, RawItem};

/// Body text sent to the model is cut to this many characters.
const PROMPT_BODY_CHARS: usize = 3000;

pub struct OllamaEnricher {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaEnricher {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("f1-news-pipeline/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("build ollama http client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    fn prompt(item: &RawItem) -> String {
        let body: String = item.body.chars().take(PROMPT_BODY_CHARS).collect();
        format!(
            "You are an editor for a Formula 1 news channel. Analyse the article below and \
             answer with a single JSON object and nothing else, using these keys:\n\
             \"summary\" (2-3 sentences), \"key_points\" (up to 5 short strings), \
             \"sentiment\" (\"positive\", \"negative\" or \"neutral\"), \
             \"importance\" (integer 1-5, 5 = major championship news), \
             \"tags\" (up to 5 single words), \
             \"translated_title\", \"translated_summary\", \"translated_key_points\" \
             (only when the article is not in English).\n\n\
             Title: {}\nSource: {}\n\n{}",
            item.title, item.source, body
        )
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            prompt: &'a str,
            stream: bool,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            response: String,
        }

        let url = format!("{}/api/generate", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&Req {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .context("ollama request")?;
        if !resp.status().is_success() {
            return Err(anyhow!("ollama HTTP {}", resp.status()));
        }
        let body: Resp = resp.json().await.context("ollama response body")?;
        Ok(body.response)
    }
}

#[async_trait]
impl Enricher for OllamaEnricher {
    /// Transport failures are errors (the item stays unprocessed and is retried).
    /// An unusable reply is not: the item is enriched from the fallback.
    async fn enrich(&self, item: &RawItem) -> Result<EnrichedItem> {
        let reply = self.generate(&Self::prompt(item)).await?;
        let fields = match parse_model_response(&reply) {
            Some(f) => f,
            None => {
                warn!(
                    target: "enrich",
                    id = %fingerprint(&item.title),
                    "model reply had no usable JSON; using fallback"
                );
                counter!("enrich_fallback_total").increment(1);
                fallback_fields(item)
            }
        };
        let enriched = build_enriched(item, fields);
        debug!(
            target: "enrich",
            id = %fingerprint(&item.title),
            importance = enriched.importance.get(),
            "enriched"
        );
        Ok(enriched)
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceKind;
    use chrono::Utc;

    #[test]
    fn prompt_truncates_body() {
        let item = RawItem::new(
            "Title",
            "Q".repeat(PROMPT_BODY_CHARS + 500),
            "https://x.test/a",
            "feed",
            SourceKind::Feed,
            Utc::now(),
        );
        let p = OllamaEnricher::prompt(&item);
        assert!(p.contains("Title: Title"));
        assert_eq!(p.matches('Q').count(), PROMPT_BODY_CHARS);
    }
}
