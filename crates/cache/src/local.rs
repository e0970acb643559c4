//! In-process CPC history backed by DashMap.
//! Used when no Redis is configured and in tests.

use crate::store::HistoryBackend;
use async_trait::async_trait;
use campaign_core::error::CampaignResult;
use campaign_core::types::CpcHistorySample;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// Per-campaign sample vectors kept sorted by timestamp.
#[derive(Default, Clone)]
pub struct LocalHistory {
    store: Arc<DashMap<String, Vec<CpcHistorySample>>>,
}

impl LocalHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.store.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistoryBackend for LocalHistory {
    async fn insert(&self, sample: &CpcHistorySample) -> CampaignResult<()> {
        let mut samples = self.store.entry(sample.campaign_id.clone()).or_default();
        let pos = samples.partition_point(|s| s.timestamp <= sample.timestamp);
        samples.insert(pos, sample.clone());
        Ok(())
    }

    async fn delete_older_than(&self, campaign_id: &str, cutoff: DateTime<Utc>) -> CampaignResult<usize> {
        let removed = match self.store.get_mut(campaign_id) {
            Some(mut samples) => {
                let before = samples.len();
                samples.retain(|s| s.timestamp >= cutoff);
                before - samples.len()
            }
            None => 0,
        };
        self.store.remove_if(campaign_id, |_, samples| samples.is_empty());
        Ok(removed)
    }

    async fn window_query(
        &self,
        campaign_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CampaignResult<Vec<CpcHistorySample>> {
        Ok(self
            .store
            .get(campaign_id)
            .map(|samples| {
                samples
                    .iter()
                    .filter(|s| s.timestamp >= from && s.timestamp < to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn latest_before(
        &self,
        campaign_id: &str,
        before: DateTime<Utc>,
    ) -> CampaignResult<Option<CpcHistorySample>> {
        Ok(self
            .store
            .get(campaign_id)
            .and_then(|samples| samples.iter().rev().find(|s| s.timestamp < before).cloned()))
    }

    async fn campaign_ids(&self) -> CampaignResult<Vec<String>> {
        Ok(self.store.iter().map(|entry| entry.key().clone()).collect())
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> CampaignResult<usize> {
        let before = self.len();
        self.store.alter_all(|_, mut samples| {
            samples.retain(|s| s.timestamp >= cutoff);
            samples
        });
        self.store.retain(|_, samples| !samples.is_empty());
        Ok(before.saturating_sub(self.len()))
    }
}
