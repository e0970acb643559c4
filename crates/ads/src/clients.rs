//! Client seams for the advertising platform and the local-services channel.
//!
//! The aggregation engine and the mutation orchestrator only see these
//! traits; [`crate::GoogleAdsClient`] is the production implementation and
//! tests substitute in-process stubs.

use crate::query;
use crate::rows::SearchRow;
use async_trait::async_trait;
use campaign_core::error::CampaignResult;
use campaign_core::strategy::micros_to_units;
use campaign_core::types::{DateRange, DelegatedCredential};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, warn};

/// One field written by a campaign mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    /// `customers/{account}/campaigns/{id}`
    pub resource_name: String,
    /// Dotted snake_case path, e.g. `maximize_conversions.target_cpa_micros`.
    pub field_path: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutateAck {
    pub resource_names: Vec<String>,
}

/// Search and mutate against the advertising platform.
#[async_trait]
pub trait AdsPlatformClient: Send + Sync {
    /// Run a search query and return every result row.
    async fn query(
        &self,
        credential: &DelegatedCredential,
        account_id: &str,
        query: &str,
    ) -> CampaignResult<Vec<serde_json::Value>>;

    /// Apply field updates to campaigns in one request.
    async fn mutate(
        &self,
        credential: &DelegatedCredential,
        account_id: &str,
        updates: Vec<FieldUpdate>,
    ) -> CampaignResult<MutateAck>;
}

/// One campaign-day of the local-services channel. The feed carries only a
/// combined conversion count.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalServicesDay {
    pub campaign_id: String,
    pub date: Option<NaiveDate>,
    pub cost_micros: f64,
    pub all_conversions: f64,
    pub status: String,
    pub active: bool,
    pub budget_micros: f64,
}

impl LocalServicesDay {
    pub fn cost(&self) -> f64 {
        micros_to_units(self.cost_micros)
    }

    pub fn budget(&self) -> f64 {
        micros_to_units(self.budget_micros)
    }
}

#[async_trait]
pub trait LocalServicesClient: Send + Sync {
    async fn query(&self, credential: &DelegatedCredential, range: DateRange) -> CampaignResult<Vec<LocalServicesDay>>;
}

/// Local-services feed read through the platform search endpoint of a
/// dedicated account.
pub struct LocalServicesFeed {
    client: Arc<dyn AdsPlatformClient>,
    account_id: String,
}

impl LocalServicesFeed {
    pub fn new(client: Arc<dyn AdsPlatformClient>, account_id: impl Into<String>) -> Self {
        Self {
            client,
            account_id: account_id.into(),
        }
    }
}

#[async_trait]
impl LocalServicesClient for LocalServicesFeed {
    async fn query(&self, credential: &DelegatedCredential, range: DateRange) -> CampaignResult<Vec<LocalServicesDay>> {
        let rows = self
            .client
            .query(credential, &self.account_id, &query::local_services(range))
            .await?;
        debug!(account_id = %self.account_id, rows = rows.len(), "Local services rows fetched");

        Ok(rows
            .into_iter()
            .filter_map(SearchRow::parse)
            .filter_map(|row| {
                let Some(campaign) = row.campaign else {
                    warn!("Skipping local services row without campaign");
                    return None;
                };
                let metrics = row.metrics.unwrap_or_default();
                Some(LocalServicesDay {
                    campaign_id: campaign.id.clone().unwrap_or_default(),
                    date: row.segments.as_ref().and_then(|s| s.parsed_date()),
                    cost_micros: metrics.cost_micros.unwrap_or(0.0),
                    all_conversions: metrics.all_conversions.unwrap_or(0.0),
                    status: campaign.normalized_status(),
                    active: campaign.is_enabled(),
                    budget_micros: row.campaign_budget.and_then(|b| b.amount_micros).unwrap_or(0.0),
                })
            })
            .collect())
    }
}
