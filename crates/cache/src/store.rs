//! Time-series store of CPC samples per campaign.
//!
//! Samples are appended once per observed campaign on every aggregation
//! cycle. Each append also prunes everything older than the retention
//! horizon for every campaign the backend knows about.

use async_trait::async_trait;
use campaign_core::error::{CampaignError, CampaignResult};
use campaign_core::types::{CpcHistorySample, HourlyCpc};
use chrono::{DateTime, Duration, DurationRound, Utc};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{debug, warn};

/// Persistence interface for CPC samples.
///
/// Range queries are half-open: `[from, to)`.
#[async_trait]
pub trait HistoryBackend: Send + Sync {
    async fn insert(&self, sample: &CpcHistorySample) -> CampaignResult<()>;

    /// Delete one campaign's samples with `timestamp < cutoff`.
    async fn delete_older_than(&self, campaign_id: &str, cutoff: DateTime<Utc>) -> CampaignResult<usize>;

    async fn window_query(
        &self,
        campaign_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CampaignResult<Vec<CpcHistorySample>>;

    /// Most recent sample with `timestamp < before`.
    async fn latest_before(&self, campaign_id: &str, before: DateTime<Utc>)
        -> CampaignResult<Option<CpcHistorySample>>;

    /// Every campaign with at least one stored sample.
    async fn campaign_ids(&self) -> CampaignResult<Vec<String>>;

    /// Delete samples older than `cutoff` across all campaigns.
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> CampaignResult<usize> {
        let mut removed = 0;
        for campaign_id in self.campaign_ids().await? {
            removed += self.delete_older_than(&campaign_id, cutoff).await?;
        }
        Ok(removed)
    }
}

/// Averages over one trend window, computed from samples with `cpc > 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowAverage {
    pub avg_cpc: f64,
    pub avg_cost: f64,
    pub last_timestamp: DateTime<Utc>,
    pub samples: usize,
}

impl WindowAverage {
    pub fn from_samples(samples: &[CpcHistorySample]) -> Option<Self> {
        let mut count = 0usize;
        let mut cpc_sum = 0.0;
        let mut cost_sum = 0.0;
        let mut last: Option<DateTime<Utc>> = None;
        for s in samples.iter().filter(|s| s.cpc > 0.0) {
            count += 1;
            cpc_sum += s.cpc;
            cost_sum += s.cost;
            last = Some(last.map_or(s.timestamp, |t| t.max(s.timestamp)));
        }
        let last_timestamp = last?;
        Some(Self {
            avg_cpc: cpc_sum / count as f64,
            avg_cost: cost_sum / count as f64,
            last_timestamp,
            samples: count,
        })
    }
}

/// Bound applied to each backend call unless configured otherwise.
pub const DEFAULT_OP_TIMEOUT: StdDuration = StdDuration::from_millis(2_000);

/// Append-and-query facade over a [`HistoryBackend`].
///
/// Every backend call is bounded by `op_timeout`; an elapsed call surfaces
/// as [`CampaignError::Persistence`].
#[derive(Clone)]
pub struct CpcHistoryStore {
    backend: Arc<dyn HistoryBackend>,
    retention: Duration,
    op_timeout: StdDuration,
}

impl CpcHistoryStore {
    pub fn new(backend: Arc<dyn HistoryBackend>, retention_hours: i64) -> Self {
        Self {
            backend,
            retention: Duration::hours(retention_hours.max(1)),
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    pub fn with_op_timeout(mut self, op_timeout: StdDuration) -> Self {
        self.op_timeout = op_timeout.max(StdDuration::from_millis(1));
        self
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    async fn bounded<T>(&self, op: &'static str, call: impl Future<Output = CampaignResult<T>>) -> CampaignResult<T> {
        match tokio::time::timeout(self.op_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                metrics::counter!("history.timeout", "op" => op).increment(1);
                Err(CampaignError::Persistence(format!(
                    "history {op} timed out after {:?}",
                    self.op_timeout
                )))
            }
        }
    }

    pub async fn append(&self, sample: CpcHistorySample) -> CampaignResult<()> {
        self.append_at(sample, Utc::now()).await
    }

    /// Insert `sample`, then drop every sample older than `now - retention`.
    ///
    /// Once the insert succeeds the append is reported as done; a failed
    /// prune is only logged and retried on the next append.
    pub async fn append_at(&self, sample: CpcHistorySample, now: DateTime<Utc>) -> CampaignResult<()> {
        if let Err(e) = self.bounded("insert", self.backend.insert(&sample)).await {
            metrics::counter!("history.append.error").increment(1);
            return Err(e);
        }
        metrics::counter!("history.append").increment(1);

        if let Err(e) = self.prune_expired(now).await {
            metrics::counter!("history.prune.error").increment(1);
            warn!(campaign_id = %sample.campaign_id, error = %e, "Pruning after append failed");
        }
        Ok(())
    }

    /// Drop every sample older than `now - retention` across all campaigns.
    pub async fn prune_expired(&self, now: DateTime<Utc>) -> CampaignResult<usize> {
        let cutoff = now - self.retention;
        let pruned = self.bounded("prune", self.backend.prune_older_than(cutoff)).await?;
        if pruned > 0 {
            metrics::counter!("history.pruned").increment(pruned as u64);
            debug!(pruned, cutoff = %cutoff, "Pruned expired CPC samples");
        }
        Ok(pruned)
    }

    /// Average over `[from, to)`; `None` when no sample with `cpc > 0` falls inside.
    pub async fn window_average(
        &self,
        campaign_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CampaignResult<Option<WindowAverage>> {
        let samples = self
            .bounded("window_query", self.backend.window_query(campaign_id, from, to))
            .await?;
        Ok(WindowAverage::from_samples(&samples))
    }

    pub async fn latest_before(
        &self,
        campaign_id: &str,
        before: DateTime<Utc>,
    ) -> CampaignResult<Option<CpcHistorySample>> {
        self.bounded("latest_before", self.backend.latest_before(campaign_id, before))
            .await
    }

    /// Hour-bucketed averages over the last `hours`, newest bucket first.
    pub async fn hourly(&self, campaign_id: &str, hours: i64, now: DateTime<Utc>) -> CampaignResult<Vec<HourlyCpc>> {
        let from = now - Duration::hours(hours.max(1));
        let to = now + Duration::milliseconds(1);
        let samples = self
            .bounded("window_query", self.backend.window_query(campaign_id, from, to))
            .await?;

        let mut buckets: BTreeMap<DateTime<Utc>, (f64, f64, usize)> = BTreeMap::new();
        for sample in &samples {
            let hour = match sample.timestamp.duration_trunc(Duration::hours(1)) {
                Ok(hour) => hour,
                Err(e) => {
                    warn!(campaign_id, error = %e, "Skipping sample with untruncatable timestamp");
                    continue;
                }
            };
            let bucket = buckets.entry(hour).or_insert((0.0, 0.0, 0));
            bucket.0 += sample.cpc;
            bucket.1 += sample.cost;
            bucket.2 += 1;
        }

        Ok(buckets
            .into_iter()
            .rev()
            .map(|(hour, (cpc, cost, n))| HourlyCpc {
                hour,
                avg_cpc: cpc / n as f64,
                avg_cost: cost / n as f64,
                samples: n,
            })
            .collect())
    }

    /// Campaigns with at least one sample in `[since, until)`.
    pub async fn active_campaigns(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> CampaignResult<Vec<String>> {
        let mut active = Vec::new();
        for campaign_id in self.bounded("campaign_ids", self.backend.campaign_ids()).await? {
            let samples = self
                .bounded("window_query", self.backend.window_query(&campaign_id, since, until))
                .await?;
            if !samples.is_empty() {
                active.push(campaign_id);
            }
        }
        active.sort();
        Ok(active)
    }
}
