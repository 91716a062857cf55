//! Publisher process entrypoint.
//! Mirrors the durable queue into a pending set and, with `auto_publish`,
//! sends each item to the Telegram channel. Runs until Ctrl-C.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use f1_news_pipeline::config::load_settings;
use f1_news_pipeline::logging::init_tracing;
use f1_news_pipeline::publish::telegram::TelegramPublisher;
use f1_news_pipeline::queue::{redis_store::RedisListStore, DurableQueue};
use f1_news_pipeline::worker::{
    self,
    publisher::{spawn_sync_loop, PublisherWorker},
};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = load_settings()?;
    let (token, channel) = settings.telegram_credentials()?;

    let redis = RedisListStore::connect(&settings.redis_url).await?;
    let queue = DurableQueue::new(Arc::new(redis));
    queue.health_check().await?;

    let publisher = TelegramPublisher::new(token, channel);
    let worker = Arc::new(PublisherWorker::new(
        queue,
        Arc::new(publisher),
        settings.limits.sync_batch,
    ));

    info!(auto_publish = settings.auto_publish, "publisher starting");
    if !settings.auto_publish {
        warn!(
            sync_batch = settings.limits.sync_batch,
            "auto_publish is off: items are synced into the pending set but never sent; \
             set AUTO_PUBLISH=true to publish"
        );
    }

    let (tx, rx) = worker::shutdown_channel();
    let policy = settings.intervals.policy(settings.intervals.sync_secs);
    let handle = spawn_sync_loop(worker.clone(), policy, settings.auto_publish, rx);
    worker::wait_for_shutdown_signal(tx).await;
    worker::join_all(vec![handle]).await;

    info!(pending = worker.pending().len(), "publisher stopped");
    Ok(())
}
