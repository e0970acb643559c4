//! Facade wiring the aggregator, orchestrator, trend calculator and state
//! container behind the operations the HTTP layer exposes.

use crate::aggregator::{AggregateOutcome, CampaignAggregator};
use crate::mutation::{MutationOrchestrator, MutationReceipt};
use crate::state::{DashboardSnapshot, DashboardState};
use campaign_analytics::CampaignTrend;
use campaign_core::error::{CampaignError, CampaignResult};
use campaign_core::types::{CpcHistorySample, DashboardFilters, DelegatedCredential, HourlyCpc, TargetChange};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

/// Largest `hours` accepted by the CPC history read.
pub const MAX_HISTORY_HOURS: i64 = 24 * 7;

pub struct DashboardService {
    aggregator: CampaignAggregator,
    orchestrator: MutationOrchestrator,
    state: Arc<DashboardState>,
}

impl DashboardService {
    pub fn new(aggregator: CampaignAggregator, orchestrator: MutationOrchestrator, state: Arc<DashboardState>) -> Self {
        Self {
            aggregator,
            orchestrator,
            state,
        }
    }

    pub fn state(&self) -> &Arc<DashboardState> {
        &self.state
    }

    /// Run one aggregation cycle and publish it unless a newer cycle has
    /// started meanwhile. The caller always receives its own result.
    pub async fn refresh(
        &self,
        credential: Option<&DelegatedCredential>,
        filters: DashboardFilters,
    ) -> CampaignResult<AggregateOutcome> {
        let credential = credential.ok_or(CampaignError::AuthenticationRequired)?;
        let ticket = self.state.begin_cycle();
        let outcome = self.aggregator.aggregate(credential, &filters).await?;

        if self.state.publish(ticket, filters, outcome.clone()) {
            debug!(generation = ticket.generation(), "Snapshot published");
        } else {
            info!(generation = ticket.generation(), "Cycle superseded; result not published");
        }
        Ok(outcome)
    }

    pub fn snapshot(&self) -> CampaignResult<Arc<DashboardSnapshot>> {
        self.state
            .latest()
            .ok_or_else(|| CampaignError::NotFound("no aggregation cycle has completed".to_string()))
    }

    pub async fn apply_target(
        &self,
        credential: Option<&DelegatedCredential>,
        change: TargetChange,
    ) -> CampaignResult<MutationReceipt> {
        let request = change.validate()?;
        self.orchestrator.apply_target(credential, &request).await
    }

    pub async fn cpc_history(&self, campaign_id: &str, hours: i64) -> CampaignResult<Vec<HourlyCpc>> {
        if campaign_id.trim().is_empty() {
            return Err(CampaignError::InvalidRequest("campaignId is required".to_string()));
        }
        if !(1..=MAX_HISTORY_HOURS).contains(&hours) {
            return Err(CampaignError::InvalidRequest(format!(
                "hours must be between 1 and {MAX_HISTORY_HOURS}, got {hours}"
            )));
        }
        self.aggregator
            .trends()
            .store()
            .hourly(campaign_id, hours, Utc::now())
            .await
    }

    /// Record a sample outside the aggregation cycle.
    pub async fn record_sample(
        &self,
        campaign_id: String,
        account_id: String,
        cpc: f64,
        cost: f64,
    ) -> CampaignResult<CpcHistorySample> {
        if campaign_id.trim().is_empty() || account_id.trim().is_empty() {
            return Err(CampaignError::InvalidRequest("campaignId and accountId are required".to_string()));
        }
        if !cpc.is_finite() || cpc < 0.0 || !cost.is_finite() || cost < 0.0 {
            return Err(CampaignError::InvalidRequest("cpc and cost must be non-negative numbers".to_string()));
        }
        let sample = CpcHistorySample::new(campaign_id, account_id, cpc, cost);
        self.aggregator.trends().store().append(sample.clone()).await?;
        Ok(sample)
    }

    pub async fn active_trends(&self) -> CampaignResult<Vec<CampaignTrend>> {
        self.aggregator.trends().active_trends(Utc::now()).await
    }
}
