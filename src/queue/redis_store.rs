// src/queue/redis_store.rs
//! Redis-backed [`ListStore`] over a multiplexed async connection.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Duration;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use super::store::ListStore;

#[derive(Clone)]
pub struct RedisListStore {
    conn: MultiplexedConnection,
}

impl RedisListStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid redis url")?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .context("connect to redis")?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl ListStore for RedisListStore {
    async fn push_back(&self, key: &str, value: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let n: usize = conn.rpush(key, value).await.context("RPUSH")?;
        Ok(n)
    }

    async fn range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let values: Vec<String> = conn.lrange(key, start, stop).await.context("LRANGE")?;
        Ok(values)
    }

    async fn remove_first(&self, key: &str, value: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let n: usize = conn.lrem(key, 1, value).await.context("LREM")?;
        Ok(n)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let secs = ttl.num_seconds().max(1);
        let set: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(secs)
            .query_async(&mut conn)
            .await
            .context("EXPIRE")?;
        Ok(set == 1)
    }

    async fn len(&self, key: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let n: usize = conn.llen(key).await.context("LLEN")?;
        Ok(n)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let n: i64 = conn.del(key).await.context("DEL")?;
        Ok(n > 0)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("PING")?;
        Ok(())
    }
}
