//! Ingestion process entrypoint.
//! Collects feeds, enriches, moderates and hands approved items to the
//! durable queue under the hourly quota. Runs until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use f1_news_pipeline::collect::{rss::RssCollector, Collector};
use f1_news_pipeline::config::load_settings;
use f1_news_pipeline::enrich::ollama::OllamaEnricher;
use f1_news_pipeline::logging::init_tracing;
use f1_news_pipeline::queue::{redis_store::RedisListStore, DurableQueue};
use f1_news_pipeline::scheduler::PublicationScheduler;
use f1_news_pipeline::store::MemoryItemStore;
use f1_news_pipeline::worker::{
    self,
    ingest::{spawn_loops, IngestSettings, IngestionWorker},
};

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so RUST_LOG / LOG_FORMAT from it apply to tracing
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = load_settings()?;
    let (scorer, moderator) = settings.build_gates()?;

    let redis = RedisListStore::connect(&settings.redis_url).await?;
    let queue = DurableQueue::new(Arc::new(redis));
    queue.health_check().await?;

    let collectors = settings
        .rss_feeds
        .iter()
        .map(|url| RssCollector::from_url(url.as_str()).map(|c| Box::new(c) as Box<dyn Collector>))
        .collect::<Result<Vec<_>>>()?;
    if collectors.is_empty() {
        tracing::warn!("no RSS_FEEDS configured; collect loop will find nothing");
    }

    let enricher = OllamaEnricher::new(
        &settings.ollama.base_url,
        &settings.ollama.model,
        Duration::from_secs(settings.ollama.timeout_secs),
    )
    .context("init enricher")?;

    let worker = Arc::new(IngestionWorker::new(
        collectors,
        scorer,
        moderator,
        Arc::new(MemoryItemStore::new()),
        Arc::new(enricher),
        queue,
        PublicationScheduler::new(settings.max_posts_per_hour),
        IngestSettings {
            min_relevance: settings.min_relevance_score,
            limits: settings.limits.clone(),
        },
    ));

    info!(
        feeds = settings.rss_feeds.len(),
        max_per_hour = settings.max_posts_per_hour,
        min_relevance = settings.min_relevance_score,
        "ingestion starting"
    );

    let (tx, rx) = worker::shutdown_channel();
    let handles = spawn_loops(worker, &settings.intervals, rx);
    worker::wait_for_shutdown_signal(tx).await;
    worker::join_all(handles).await;

    info!("ingestion stopped");
    Ok(())
}
