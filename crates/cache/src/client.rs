//! Redis-backed CPC history.
//!
//! Each campaign is a sorted set `{prefix}:cpc:{campaign_id}` scored by the
//! sample timestamp in milliseconds, with the JSON-encoded sample as member.
//! `{prefix}:cpc:campaigns` indexes campaigns that have samples.

use crate::store::HistoryBackend;
use async_trait::async_trait;
use campaign_core::config::RedisConfig;
use campaign_core::error::{CampaignError, CampaignResult};
use campaign_core::types::CpcHistorySample;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{info, warn};

pub struct RedisHistory {
    client: redis::Client,
    prefix: String,
    connect_timeout: Duration,
}

fn persistence(e: redis::RedisError) -> CampaignError {
    metrics::counter!("history.redis.error").increment(1);
    CampaignError::Persistence(e.to_string())
}

impl RedisHistory {
    /// Connect to the first configured Redis node and verify with PING.
    pub async fn connect(config: &RedisConfig, prefix: &str) -> CampaignResult<Self> {
        let url = config
            .urls
            .first()
            .cloned()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        info!(url = %url, "Connecting to Redis for CPC history");

        let history = Self {
            client: redis::Client::open(url.as_str()).map_err(persistence)?,
            prefix: prefix.to_string(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms.max(1)),
        };

        let ping = async {
            let mut conn = history.conn().await?;
            redis::cmd("PING").query_async::<_, String>(&mut conn).await.map_err(persistence)
        };
        let pong = tokio::time::timeout(history.connect_timeout, ping)
            .await
            .map_err(|_| timed_out("PING", history.connect_timeout))??;
        info!(response = %pong, "Redis connection established");

        Ok(history)
    }

    fn series_key(&self, campaign_id: &str) -> String {
        series_key(&self.prefix, campaign_id)
    }

    fn index_key(&self) -> String {
        index_key(&self.prefix)
    }

    async fn conn(&self) -> CampaignResult<redis::aio::MultiplexedConnection> {
        tokio::time::timeout(self.connect_timeout, self.client.get_multiplexed_async_connection())
            .await
            .map_err(|_| timed_out("connect", self.connect_timeout))?
            .map_err(persistence)
    }
}

fn timed_out(op: &str, after: Duration) -> CampaignError {
    metrics::counter!("history.redis.error").increment(1);
    CampaignError::Persistence(format!("redis {op} timed out after {after:?}"))
}

fn series_key(prefix: &str, campaign_id: &str) -> String {
    format!("{prefix}:cpc:{campaign_id}")
}

fn index_key(prefix: &str) -> String {
    format!("{prefix}:cpc:campaigns")
}

/// Exclusive score bound in ZRANGEBYSCORE syntax.
fn exclusive(ts: DateTime<Utc>) -> String {
    format!("({}", ts.timestamp_millis())
}

fn decode(campaign_id: &str, members: Vec<String>) -> Vec<CpcHistorySample> {
    members
        .into_iter()
        .filter_map(|json| match serde_json::from_str::<CpcHistorySample>(&json) {
            Ok(sample) => Some(sample),
            Err(e) => {
                warn!(campaign_id, error = %e, "Skipping undecodable CPC sample");
                None
            }
        })
        .collect()
}

#[async_trait]
impl HistoryBackend for RedisHistory {
    async fn insert(&self, sample: &CpcHistorySample) -> CampaignResult<()> {
        let json = serde_json::to_string(sample)?;
        let mut conn = self.conn().await?;
        redis::pipe()
            .atomic()
            .zadd(self.series_key(&sample.campaign_id), json, sample.timestamp.timestamp_millis())
            .ignore()
            .sadd(self.index_key(), &sample.campaign_id)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(persistence)
    }

    async fn delete_older_than(&self, campaign_id: &str, cutoff: DateTime<Utc>) -> CampaignResult<usize> {
        let mut conn = self.conn().await?;
        conn.zrembyscore(self.series_key(campaign_id), "-inf", exclusive(cutoff))
            .await
            .map_err(persistence)
    }

    async fn window_query(
        &self,
        campaign_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CampaignResult<Vec<CpcHistorySample>> {
        let mut conn = self.conn().await?;
        let members: Vec<String> = conn
            .zrangebyscore(self.series_key(campaign_id), from.timestamp_millis(), exclusive(to))
            .await
            .map_err(persistence)?;
        Ok(decode(campaign_id, members))
    }

    async fn latest_before(
        &self,
        campaign_id: &str,
        before: DateTime<Utc>,
    ) -> CampaignResult<Option<CpcHistorySample>> {
        let mut conn = self.conn().await?;
        let members: Vec<String> = redis::cmd("ZREVRANGEBYSCORE")
            .arg(self.series_key(campaign_id))
            .arg(exclusive(before))
            .arg("-inf")
            .arg("LIMIT")
            .arg(0)
            .arg(1)
            .query_async(&mut conn)
            .await
            .map_err(persistence)?;
        Ok(decode(campaign_id, members).into_iter().next())
    }

    async fn campaign_ids(&self) -> CampaignResult<Vec<String>> {
        let mut conn = self.conn().await?;
        conn.smembers(self.index_key()).await.map_err(persistence)
    }

    /// One pipelined trim across all campaigns, then unindex emptied series.
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> CampaignResult<usize> {
        let ids = self.campaign_ids().await?;
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;

        let mut trim = redis::pipe();
        for id in &ids {
            trim.zrembyscore(self.series_key(id), "-inf", exclusive(cutoff));
        }
        let removed: Vec<usize> = trim.query_async(&mut conn).await.map_err(persistence)?;

        let mut card = redis::pipe();
        for id in &ids {
            card.zcard(self.series_key(id));
        }
        let sizes: Vec<usize> = card.query_async(&mut conn).await.map_err(persistence)?;

        let emptied: Vec<&String> = ids.iter().zip(sizes).filter(|(_, n)| *n == 0).map(|(id, _)| id).collect();
        if !emptied.is_empty() {
            conn.srem::<_, _, ()>(self.index_key(), emptied).await.map_err(persistence)?;
        }

        Ok(removed.into_iter().sum())
    }
}
