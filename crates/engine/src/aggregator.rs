//! Campaign aggregation across accounts and channels.
//!
//! One cycle fans out a query per selected account in parallel, optionally
//! reads the local-services channel, attaches CPC trends, merges everything
//! into per-date points, and finally records one CPC sample per platform
//! campaign. Account failures and timeouts are absorbed; the cycle only
//! fails when every selected account failed.

use campaign_ads::clients::{AdsPlatformClient, LocalServicesClient, LocalServicesDay};
use campaign_ads::query;
use campaign_ads::rows::{ConversionActionRow, SearchRow};
use campaign_analytics::TrendCalculator;
use campaign_core::conversation::ConversationEstimator;
use campaign_core::error::{CampaignError, CampaignResult};
use campaign_core::types::{
    normalize_account_id, Campaign, CampaignRecord, ConversionAction, CpcHistorySample, DashboardFilters,
    DateRange, DelegatedCredential, SecondaryChannel, SecondaryChannelSummary, SyntheticChannelCampaign,
    TrendResult, UnifiedDayPoint,
};
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

/// An account whose contribution is missing from this cycle.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountFailure {
    pub account_id: String,
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AggregateOutcome {
    #[schema(value_type = Vec<Object>)]
    pub campaigns: Vec<CampaignRecord>,
    pub daily_points: Vec<UnifiedDayPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_summary: Option<SecondaryChannelSummary>,
    pub failed_accounts: Vec<AccountFailure>,
    pub generated_at: DateTime<Utc>,
}

/// Secondary channel after estimation, ready for merging.
struct SecondaryChannelData {
    days: Vec<LocalServicesDay>,
    summary: SecondaryChannelSummary,
}

pub struct CampaignAggregator {
    ads: Arc<dyn AdsPlatformClient>,
    local_services: Option<Arc<dyn LocalServicesClient>>,
    trends: TrendCalculator,
    estimator: ConversationEstimator,
    account_timeout: Duration,
    secondary_name: String,
    secondary_account: Option<String>,
}

impl CampaignAggregator {
    pub fn new(
        ads: Arc<dyn AdsPlatformClient>,
        trends: TrendCalculator,
        estimator: ConversationEstimator,
        account_timeout: Duration,
    ) -> Self {
        Self {
            ads,
            local_services: None,
            trends,
            estimator,
            account_timeout,
            secondary_name: "Local Services".to_string(),
            secondary_account: None,
        }
    }

    /// Enable the local-services channel.
    pub fn with_local_services(
        mut self,
        client: Arc<dyn LocalServicesClient>,
        display_name: impl Into<String>,
        account_id: Option<String>,
    ) -> Self {
        self.local_services = Some(client);
        self.secondary_name = display_name.into();
        self.secondary_account = account_id;
        self
    }

    pub fn trends(&self) -> &TrendCalculator {
        &self.trends
    }

    pub async fn aggregate(
        &self,
        credential: &DelegatedCredential,
        filters: &DashboardFilters,
    ) -> CampaignResult<AggregateOutcome> {
        self.aggregate_at(credential, filters, Utc::now()).await
    }

    pub async fn aggregate_at(
        &self,
        credential: &DelegatedCredential,
        filters: &DashboardFilters,
        now: DateTime<Utc>,
    ) -> CampaignResult<AggregateOutcome> {
        let start = Instant::now();
        let accounts = dedupe_accounts(&filters.account_ids)?;
        metrics::counter!("aggregate.cycles").increment(1);

        let account_fetches = join_all(accounts.iter().map(|account_id| async move {
            let result = match tokio::time::timeout(
                self.account_timeout,
                self.fetch_account(credential, account_id, filters.date_range),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(CampaignError::UpstreamUnavailable(format!(
                    "account {account_id} timed out after {:?}",
                    self.account_timeout
                ))),
            };
            (account_id.clone(), result)
        }));
        let secondary_fetch = async {
            if filters.include_secondary_channel {
                self.fetch_secondary(credential, filters.date_range).await
            } else {
                None
            }
        };
        let (results, secondary) = tokio::join!(account_fetches, secondary_fetch);

        let mut campaigns: Vec<Campaign> = Vec::new();
        let mut failures: Vec<(String, CampaignError)> = Vec::new();
        for (account_id, result) in results {
            match result {
                Ok(mut rows) => campaigns.append(&mut rows),
                Err(e) => {
                    metrics::counter!("aggregate.accounts.failed", "kind" => e.kind()).increment(1);
                    warn!(account_id = %account_id, error = %e, "Account fetch failed; excluded from this cycle");
                    failures.push((account_id, e));
                }
            }
        }

        if !accounts.is_empty() && failures.len() == accounts.len() {
            error!(accounts = accounts.len(), "Every selected account failed");
            if let Some((_, first)) = failures.into_iter().next() {
                return Err(first);
            }
            return Err(CampaignError::UpstreamUnavailable("no account returned data".to_string()));
        }

        let campaigns = self.attach_trends(campaigns, now).await;
        let daily_points = merge_days(&campaigns, secondary.as_ref().map(|s| s.days.as_slice()), &self.estimator, now);

        let mut records: Vec<CampaignRecord> = campaigns.into_iter().map(CampaignRecord::Platform).collect();
        let secondary_summary = secondary.map(|s| {
            records.push(CampaignRecord::SyntheticChannel(self.synthetic_record(&s.summary, now)));
            s.summary
        });

        self.record_history(&records, now).await;

        metrics::histogram!("aggregate.duration_ms").record(start.elapsed().as_secs_f64() * 1000.0);
        info!(
            accounts = accounts.len(),
            failed = failures.len(),
            campaigns = records.len(),
            days = daily_points.len(),
            "Aggregation cycle complete"
        );

        Ok(AggregateOutcome {
            campaigns: records,
            daily_points,
            secondary_summary,
            failed_accounts: failures
                .into_iter()
                .map(|(account_id, e)| AccountFailure {
                    account_id,
                    error: e.kind().to_string(),
                    message: e.to_string(),
                })
                .collect(),
            generated_at: now,
        })
    }

    async fn fetch_account(
        &self,
        credential: &DelegatedCredential,
        account_id: &str,
        range: DateRange,
    ) -> CampaignResult<Vec<Campaign>> {
        let rows = self.ads.query(credential, account_id, &query::campaign_metrics(range)).await?;
        let total = rows.len();
        let mut campaigns: Vec<Campaign> = rows
            .into_iter()
            .filter_map(SearchRow::parse)
            .filter_map(|row| {
                let campaign = row.into_campaign(account_id);
                if campaign.is_none() {
                    warn!(account_id, "Skipping malformed campaign row");
                }
                campaign
            })
            .collect();
        debug!(account_id, rows = total, campaigns = campaigns.len(), "Account campaigns fetched");

        let breakdown = match self
            .ads
            .query(credential, account_id, &query::conversion_actions(range))
            .await
        {
            Ok(rows) => group_conversion_actions(rows),
            Err(e) => {
                warn!(account_id, error = %e, "Conversion action breakdown unavailable");
                HashMap::new()
            }
        };
        for campaign in &mut campaigns {
            if let Some(actions) = breakdown.get(&(campaign.id.clone(), campaign.date)) {
                campaign.conversion_actions = actions.clone();
            }
        }
        Ok(campaigns)
    }

    async fn fetch_secondary(&self, credential: &DelegatedCredential, range: DateRange) -> Option<SecondaryChannelData> {
        let client = self.local_services.as_ref()?;
        match tokio::time::timeout(self.account_timeout, client.query(credential, range)).await {
            Ok(Ok(days)) => {
                let summary = summarize_secondary(&days, &self.estimator);
                Some(SecondaryChannelData { days, summary })
            }
            Ok(Err(e)) => {
                metrics::counter!("aggregate.secondary.failed").increment(1);
                warn!(error = %e, "Local services fetch failed; channel omitted");
                None
            }
            Err(_) => {
                metrics::counter!("aggregate.secondary.failed").increment(1);
                warn!(timeout = ?self.account_timeout, "Local services fetch timed out; channel omitted");
                None
            }
        }
    }

    /// One trend per distinct campaign id, computed from history recorded
    /// before this cycle.
    async fn attach_trends(&self, campaigns: Vec<Campaign>, now: DateTime<Utc>) -> Vec<Campaign> {
        let ids: HashSet<&str> = campaigns.iter().map(|c| c.id.as_str()).collect();
        let computed = join_all(ids.into_iter().map(|id| async move {
            let result = self.trends.trend(id, now).await;
            (id.to_string(), result)
        }))
        .await;

        let mut trends: HashMap<String, TrendResult> = HashMap::new();
        for (id, result) in computed {
            match result {
                Ok(trend) => {
                    trends.insert(id, trend);
                }
                Err(e) => warn!(campaign_id = %id, error = %e, "Trend unavailable; reporting stable"),
            }
        }

        campaigns
            .into_iter()
            .map(|c| match trends.get(&c.id) {
                Some(trend) => c.with_trend(*trend),
                None => {
                    let cpc = c.cpc;
                    c.with_trend(TrendResult::stable(cpc, now))
                }
            })
            .collect()
    }

    async fn record_history(&self, records: &[CampaignRecord], now: DateTime<Utc>) {
        let store = self.trends.store();
        let writes = records.iter().filter_map(CampaignRecord::as_platform).map(|c| {
            let sample = CpcHistorySample::at(c.id.clone(), c.account_id.clone(), c.cpc, c.cost, now);
            async move {
                if let Err(e) = store.append_at(sample, now).await {
                    metrics::counter!("aggregate.history.skipped").increment(1);
                    warn!(campaign_id = %c.id, error = %e, "CPC sample not recorded");
                }
            }
        });
        join_all(writes).await;
    }

    fn synthetic_record(&self, summary: &SecondaryChannelSummary, now: DateTime<Utc>) -> SyntheticChannelCampaign {
        let channel = SecondaryChannel::LocalServices;
        SyntheticChannelCampaign {
            channel,
            id: channel.record_id().to_string(),
            name: self.secondary_name.clone(),
            status: "enabled".to_string(),
            account_id: self.secondary_account.clone(),
            date: now.date_naive(),
            cost: summary.total_spend,
            clicks: 0,
            impressions: 0,
            conversions: summary.total_leads,
            cpc: 0.0,
            conversion_actions: vec![
                ConversionAction {
                    name: "Message Leads".to_string(),
                    value: summary.message_leads,
                    category: Some("LSA".to_string()),
                },
                ConversionAction {
                    name: "Call Leads".to_string(),
                    value: summary.call_leads,
                    category: Some("LSA".to_string()),
                },
            ],
        }
    }
}

fn dedupe_accounts(raw: &[String]) -> CampaignResult<Vec<String>> {
    let mut seen = HashSet::new();
    let mut accounts = Vec::with_capacity(raw.len());
    for account in raw {
        let id = normalize_account_id(account)?;
        if seen.insert(id.clone()) {
            accounts.push(id);
        }
    }
    Ok(accounts)
}

/// Conversion actions keyed by (campaign id, date), largest first.
fn group_conversion_actions(rows: Vec<serde_json::Value>) -> HashMap<(String, NaiveDate), Vec<ConversionAction>> {
    let mut grouped: HashMap<(String, NaiveDate), Vec<ConversionAction>> = HashMap::new();
    for row in rows.into_iter().filter_map(SearchRow::parse) {
        if let Some(parsed) = ConversionActionRow::from_row(row) {
            grouped.entry((parsed.campaign_id, parsed.date)).or_default().push(parsed.action);
        }
    }
    for actions in grouped.values_mut() {
        actions.sort_by(|a, b| b.value.total_cmp(&a.value));
    }
    grouped
}

fn summarize_secondary(days: &[LocalServicesDay], estimator: &ConversationEstimator) -> SecondaryChannelSummary {
    let mut summary = SecondaryChannelSummary::default();
    let mut campaigns = HashSet::new();
    let mut active = HashSet::new();
    let mut budgets: HashMap<&str, f64> = HashMap::new();

    for day in days {
        let split = estimator.split(day.all_conversions);
        summary.total_leads += day.all_conversions;
        summary.call_leads += split.calls;
        summary.message_leads += split.messages;
        summary.total_spend += day.cost();
        campaigns.insert(day.campaign_id.as_str());
        if day.active {
            active.insert(day.campaign_id.as_str());
        }
        if day.budget_micros > 0.0 {
            budgets.insert(day.campaign_id.as_str(), day.budget());
        }
    }

    summary.total_campaigns = campaigns.len();
    summary.active_campaigns = active.len();
    summary.budget = budgets.values().sum();
    summary
}

/// Merge platform campaigns and estimated secondary-channel days into one
/// point per calendar date, ascending.
pub fn merge_days(
    campaigns: &[Campaign],
    secondary: Option<&[LocalServicesDay]>,
    estimator: &ConversationEstimator,
    now: DateTime<Utc>,
) -> Vec<UnifiedDayPoint> {
    let mut points: BTreeMap<NaiveDate, UnifiedDayPoint> = BTreeMap::new();

    for campaign in campaigns {
        let point = points
            .entry(campaign.date)
            .or_insert_with(|| UnifiedDayPoint::empty(campaign.date));
        point.cost += campaign.cost;
        point.clicks += campaign.clicks;
        point.conversions += campaign.conversions;
        point.impressions += campaign.impressions;
        point.channels.primary.cost += campaign.cost;
        point.channels.primary.conversions += campaign.conversions;
        // Platform conversions are attributed to calls.
        point.conversion_types.calls += campaign.conversions;
    }

    if let Some(days) = secondary {
        let mut per_date: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
        let mut undated = (0.0, 0.0);
        for day in days {
            let slot = match day.date {
                Some(date) => per_date.entry(date).or_insert((0.0, 0.0)),
                None => &mut undated,
            };
            slot.0 += day.cost();
            slot.1 += day.all_conversions;
        }
        if per_date.is_empty() && undated.0 > 0.0 {
            per_date.insert(now.date_naive(), undated);
        }

        for (date, (cost, conversions)) in per_date {
            let estimated = estimator.estimate_day(date, cost, conversions);
            let point = points.entry(date).or_insert_with(|| UnifiedDayPoint::empty(date));
            point.cost += estimated.cost;
            point.conversions += estimated.conversions;
            point.channels.secondary.cost += estimated.cost;
            point.channels.secondary.conversions += estimated.conversions;
            point.conversion_types.calls += estimated.estimated.calls;
            point.conversion_types.messages += estimated.estimated.messages;
        }
    }

    points.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use campaign_core::strategy::BiddingStrategy;
    use campaign_core::types::CampaignMetrics;
    use chrono::TimeZone;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn campaign(id: &str, day: u32, cost: f64, conversions: f64) -> Campaign {
        Campaign::new(
            id.to_string(),
            format!("Campaign {id}"),
            "enabled".to_string(),
            "1112223333".to_string(),
            date(day),
            CampaignMetrics {
                cost,
                clicks: 10,
                impressions: 100,
                conversions,
            },
            BiddingStrategy::Unknown,
        )
    }

    fn lsa_day(day: Option<u32>, cost: f64, conversions: f64) -> LocalServicesDay {
        LocalServicesDay {
            campaign_id: "900".to_string(),
            date: day.map(date),
            cost_micros: cost * 1_000_000.0,
            all_conversions: conversions,
            status: "enabled".to_string(),
            active: true,
            budget_micros: 25_000_000.0,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn days_merge_per_channel_and_sort_ascending() {
        let campaigns = vec![campaign("1", 2, 10.0, 2.0), campaign("2", 1, 5.0, 1.0), campaign("3", 2, 4.0, 0.0)];
        let lsa = vec![lsa_day(Some(2), 30.0, 20.0)];
        let points = merge_days(&campaigns, Some(&lsa), &ConversationEstimator::default(), now());

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, date(1));
        let day2 = &points[1];
        assert!((day2.cost - 44.0).abs() < 1e-9);
        assert_eq!(day2.clicks, 20);
        assert!((day2.channels.primary.cost - 14.0).abs() < 1e-9);
        assert!((day2.channels.secondary.cost - 30.0).abs() < 1e-9);
        assert!((day2.conversions - 22.0).abs() < 1e-9);
        // 2 platform conversions plus round(20 * 0.95) = 19 estimated calls
        assert!((day2.conversion_types.calls - 21.0).abs() < 1e-9);
        assert!((day2.conversion_types.messages - 1.0).abs() < 1e-9);
    }

    #[test]
    fn undated_secondary_spend_lands_on_today() {
        let lsa = vec![lsa_day(None, 12.0, 3.0)];
        let points = merge_days(&[], Some(&lsa), &ConversationEstimator::default(), now());
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].date, now().date_naive());
        assert!((points[0].channels.secondary.cost - 12.0).abs() < 1e-9);
    }

    #[test]
    fn secondary_summary_counts_distinct_campaigns() {
        let days = vec![lsa_day(Some(1), 10.0, 20.0), lsa_day(Some(2), 5.0, 3.0)];
        let summary = summarize_secondary(&days, &ConversationEstimator::default());
        assert!((summary.total_leads - 23.0).abs() < 1e-9);
        assert!((summary.call_leads - 22.0).abs() < 1e-9);
        assert!((summary.message_leads - 1.0).abs() < 1e-9);
        assert!((summary.total_spend - 15.0).abs() < 1e-9);
        assert_eq!(summary.total_campaigns, 1);
        assert_eq!(summary.active_campaigns, 1);
        assert!((summary.budget - 25.0).abs() < 1e-9);
    }

    #[test]
    fn duplicate_and_dashed_accounts_collapse() {
        let accounts = dedupe_accounts(&["111-222-3333".to_string(), "1112223333".to_string()]).unwrap();
        assert_eq!(accounts, vec!["1112223333".to_string()]);
        assert!(dedupe_accounts(&["abc".to_string()]).is_err());
    }
}
