use crate::error::{CampaignError, CampaignResult};
use crate::strategy::{BiddingStrategy, TargetField};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// ─── Filters ────────────────────────────────────────────────────────────────

/// Reporting window, in the platform's predefined-range vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DateRange {
    #[serde(alias = "today")]
    Today,
    #[serde(alias = "yesterday")]
    Yesterday,
    #[serde(rename = "LAST_7_DAYS", alias = "last7", alias = "last_7_days")]
    Last7Days,
    #[serde(alias = "this_month")]
    ThisMonth,
    #[serde(rename = "LAST_30_DAYS", alias = "last30", alias = "last_30_days")]
    Last30Days,
}

impl DateRange {
    /// Literal used in `segments.date DURING <range>`.
    pub fn as_query_literal(&self) -> &'static str {
        match self {
            DateRange::Today => "TODAY",
            DateRange::Yesterday => "YESTERDAY",
            DateRange::Last7Days => "LAST_7_DAYS",
            DateRange::ThisMonth => "THIS_MONTH",
            DateRange::Last30Days => "LAST_30_DAYS",
        }
    }
}

/// What the operator selected on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardFilters {
    #[serde(default)]
    pub account_ids: Vec<String>,
    pub date_range: DateRange,
    #[serde(default, alias = "isLSAEnabled")]
    pub include_secondary_channel: bool,
}

// ─── Campaigns ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConversionAction {
    pub name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

/// Rolling-window CPC trend; derived per request, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrendResult {
    pub current_value: f64,
    pub previous_value: f64,
    pub direction: TrendDirection,
    /// Percentage change from previous to current.
    pub change_pct: f64,
    pub last_updated: DateTime<Utc>,
}

impl TrendResult {
    pub fn stable(value: f64, last_updated: DateTime<Utc>) -> Self {
        Self {
            current_value: value,
            previous_value: value,
            direction: TrendDirection::Stable,
            change_pct: 0.0,
            last_updated,
        }
    }
}

/// Raw per-row platform metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CampaignMetrics {
    pub cost: f64,
    pub clicks: u64,
    pub impressions: u64,
    pub conversions: f64,
}

/// One platform campaign for one reporting date. Rebuilt every aggregation
/// cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub status: String,
    pub account_id: String,
    pub date: NaiveDate,
    pub cost: f64,
    pub clicks: u64,
    pub impressions: u64,
    pub conversions: f64,
    #[schema(value_type = Object)]
    pub bidding_strategy: BiddingStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_cpa: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_roas: Option<f64>,
    pub cpc: f64,
    pub cpc_trend: TrendResult,
    #[serde(default)]
    pub conversion_actions: Vec<ConversionAction>,
}

impl Campaign {
    pub fn new(
        id: String,
        name: String,
        status: String,
        account_id: String,
        date: NaiveDate,
        metrics: CampaignMetrics,
        bidding_strategy: BiddingStrategy,
    ) -> Self {
        let cpc = cost_per_click(metrics.cost, metrics.clicks);
        Self {
            id,
            name,
            status,
            account_id,
            date,
            cost: metrics.cost,
            clicks: metrics.clicks,
            impressions: metrics.impressions,
            conversions: metrics.conversions,
            target_cpa: bidding_strategy.target_cpa(),
            target_roas: bidding_strategy.target_roas(),
            bidding_strategy,
            cpc,
            cpc_trend: TrendResult::stable(cpc, Utc::now()),
            conversion_actions: Vec::new(),
        }
    }

    pub fn with_trend(mut self, trend: TrendResult) -> Self {
        self.cpc_trend = trend;
        self
    }

    pub fn with_conversion_actions(mut self, actions: Vec<ConversionAction>) -> Self {
        self.conversion_actions = actions;
        self
    }
}

pub fn cost_per_click(cost: f64, clicks: u64) -> f64 {
    if clicks == 0 {
        0.0
    } else {
        cost / clicks as f64
    }
}

/// Non-platform channels folded into the campaign list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SecondaryChannel {
    LocalServices,
}

impl SecondaryChannel {
    pub fn record_id(&self) -> &'static str {
        match self {
            SecondaryChannel::LocalServices => "local-services",
        }
    }

    pub fn from_record_id(id: &str) -> Option<Self> {
        match id {
            "local-services" => Some(SecondaryChannel::LocalServices),
            _ => None,
        }
    }
}

/// A record fabricated to represent a secondary channel's aggregate spend.
/// It has no bidding strategy and no mutable resource upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyntheticChannelCampaign {
    pub channel: SecondaryChannel,
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    pub date: NaiveDate,
    pub cost: f64,
    pub clicks: u64,
    pub impressions: u64,
    pub conversions: f64,
    pub cpc: f64,
    pub conversion_actions: Vec<ConversionAction>,
}

/// Either a real platform campaign or a synthetic channel record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CampaignRecord {
    Platform(Campaign),
    SyntheticChannel(SyntheticChannelCampaign),
}

impl CampaignRecord {
    pub fn id(&self) -> &str {
        match self {
            CampaignRecord::Platform(c) => &c.id,
            CampaignRecord::SyntheticChannel(s) => &s.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CampaignRecord::Platform(c) => &c.name,
            CampaignRecord::SyntheticChannel(s) => &s.name,
        }
    }

    pub fn cost(&self) -> f64 {
        match self {
            CampaignRecord::Platform(c) => c.cost,
            CampaignRecord::SyntheticChannel(s) => s.cost,
        }
    }

    pub fn conversions(&self) -> f64 {
        match self {
            CampaignRecord::Platform(c) => c.conversions,
            CampaignRecord::SyntheticChannel(s) => s.conversions,
        }
    }

    pub fn as_platform(&self) -> Option<&Campaign> {
        match self {
            CampaignRecord::Platform(c) => Some(c),
            CampaignRecord::SyntheticChannel(_) => None,
        }
    }

    pub fn key(&self) -> CampaignKey {
        match self {
            CampaignRecord::Platform(c) => CampaignKey::Platform { id: c.id.clone() },
            CampaignRecord::SyntheticChannel(s) => CampaignKey::SyntheticChannel { channel: s.channel },
        }
    }

    /// Build a mutation request addressed at this record.
    pub fn mutation_request(&self, field: TargetField, value: f64) -> MutationRequest {
        let account_id = match self {
            CampaignRecord::Platform(c) => c.account_id.clone(),
            CampaignRecord::SyntheticChannel(s) => s.account_id.clone().unwrap_or_default(),
        };
        MutationRequest {
            campaign: self.key(),
            account_id,
            field,
            value,
        }
    }
}

/// Identity of a campaign record as far as mutation is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CampaignKey {
    Platform { id: String },
    SyntheticChannel { channel: SecondaryChannel },
}

// ─── Channel metrics ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSplit {
    pub calls: f64,
    pub messages: f64,
}

/// One secondary-channel day with its estimated call/message split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDailyMetric {
    pub date: NaiveDate,
    pub cost: f64,
    pub conversions: f64,
    pub estimated: ConversationSplit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChannelTotals {
    pub cost: f64,
    pub conversions: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChannelBreakdown {
    pub primary: ChannelTotals,
    pub secondary: ChannelTotals,
}

/// All channels merged for one calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedDayPoint {
    pub date: NaiveDate,
    pub cost: f64,
    pub clicks: u64,
    pub conversions: f64,
    pub impressions: u64,
    pub channels: ChannelBreakdown,
    pub conversion_types: ConversationSplit,
}

impl UnifiedDayPoint {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            cost: 0.0,
            clicks: 0,
            conversions: 0.0,
            impressions: 0,
            channels: ChannelBreakdown::default(),
            conversion_types: ConversationSplit::default(),
        }
    }
}

/// Headline figures for the secondary channel over the selected range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecondaryChannelSummary {
    pub total_leads: f64,
    pub call_leads: f64,
    pub message_leads: f64,
    pub total_spend: f64,
    pub total_campaigns: usize,
    pub active_campaigns: usize,
    pub budget: f64,
}

// ─── CPC history ────────────────────────────────────────────────────────────

/// One CPC observation. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpcHistorySample {
    pub id: Uuid,
    pub campaign_id: String,
    pub account_id: String,
    pub cpc: f64,
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
}

impl CpcHistorySample {
    pub fn new(campaign_id: impl Into<String>, account_id: impl Into<String>, cpc: f64, cost: f64) -> Self {
        Self::at(campaign_id, account_id, cpc, cost, Utc::now())
    }

    pub fn at(
        campaign_id: impl Into<String>,
        account_id: impl Into<String>,
        cpc: f64,
        cost: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id: campaign_id.into(),
            account_id: account_id.into(),
            cpc,
            cost,
            timestamp,
        }
    }
}

/// Hour-truncated CPC averages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HourlyCpc {
    pub hour: DateTime<Utc>,
    pub avg_cpc: f64,
    pub avg_cost: f64,
    pub samples: usize,
}

// ─── Mutation ───────────────────────────────────────────────────────────────

/// A validated request to change one campaign's bidding target.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRequest {
    pub campaign: CampaignKey,
    pub account_id: String,
    pub field: TargetField,
    pub value: f64,
}

impl MutationRequest {
    pub fn platform(
        campaign_id: impl Into<String>,
        account_id: impl Into<String>,
        field: TargetField,
        value: f64,
    ) -> Self {
        Self {
            campaign: CampaignKey::Platform { id: campaign_id.into() },
            account_id: account_id.into(),
            field,
            value,
        }
    }
}

/// Loosely-typed inbound form of a target change, validated into a
/// [`MutationRequest`] before anything else happens.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetChange {
    pub campaign_id: Option<String>,
    pub account_id: Option<String>,
    /// `platform` (default) or `synthetic_channel`.
    pub kind: Option<String>,
    pub field: Option<String>,
    #[schema(value_type = Object)]
    pub value: Option<serde_json::Value>,
}

impl TargetChange {
    pub fn validate(self) -> CampaignResult<MutationRequest> {
        let campaign_id = non_blank(self.campaign_id, "campaignId")?;

        let campaign = match self.kind.as_deref().map(str::trim) {
            Some("synthetic_channel") => CampaignKey::SyntheticChannel {
                channel: SecondaryChannel::from_record_id(&campaign_id)
                    .unwrap_or(SecondaryChannel::LocalServices),
            },
            None | Some("") | Some("platform") => match SecondaryChannel::from_record_id(&campaign_id) {
                Some(channel) => CampaignKey::SyntheticChannel { channel },
                None => {
                    if !campaign_id.chars().all(|c| c.is_ascii_digit()) {
                        return Err(CampaignError::InvalidRequest(format!(
                            "campaignId must be numeric, got '{campaign_id}'"
                        )));
                    }
                    CampaignKey::Platform { id: campaign_id }
                }
            },
            Some(other) => {
                return Err(CampaignError::InvalidRequest(format!("unknown campaign kind '{other}'")));
            }
        };

        let account_id = match &campaign {
            CampaignKey::Platform { .. } => normalize_account_id(&non_blank(self.account_id, "accountId")?)?,
            CampaignKey::SyntheticChannel { .. } => self.account_id.unwrap_or_default(),
        };

        let raw_field = non_blank(self.field, "field")?;
        let field = TargetField::parse(&raw_field)
            .ok_or_else(|| CampaignError::InvalidRequest(format!("unsupported target field '{raw_field}'")))?;

        let value = match self.value {
            Some(serde_json::Value::Number(n)) => n.as_f64(),
            Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| CampaignError::InvalidRequest("value must be numeric".to_string()))?;

        if !value.is_finite() || value <= 0.0 {
            return Err(CampaignError::InvalidRequest(format!(
                "value must be a positive number, got {value}"
            )));
        }

        Ok(MutationRequest {
            campaign,
            account_id,
            field,
            value,
        })
    }
}

fn non_blank(value: Option<String>, name: &str) -> CampaignResult<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(CampaignError::InvalidRequest(format!("missing required field '{name}'"))),
    }
}

/// Strip the dashes operators paste from the platform UI (`123-456-7890`).
pub fn normalize_account_id(raw: &str) -> CampaignResult<String> {
    let digits: String = raw.chars().filter(|c| *c != '-').collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(CampaignError::InvalidRequest(format!("invalid account id '{raw}'")));
    }
    Ok(digits)
}

// ─── Credentials ────────────────────────────────────────────────────────────

/// The operator's delegated OAuth refresh token for the advertising platform.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DelegatedCredential(String);

impl DelegatedCredential {
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    pub fn refresh_token(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for DelegatedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DelegatedCredential(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::BiddingStrategy;
    use serde_json::json;

    fn change(value: serde_json::Value) -> TargetChange {
        TargetChange {
            campaign_id: Some("1234".into()),
            account_id: Some("111-222-3333".into()),
            kind: None,
            field: Some("targetCpa".into()),
            value: Some(value),
        }
    }

    #[test]
    fn cpc_is_zero_without_clicks() {
        let metrics = CampaignMetrics {
            cost: 50.0,
            clicks: 0,
            impressions: 10,
            conversions: 1.0,
        };
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let c = Campaign::new("1".into(), "A".into(), "enabled".into(), "9".into(), date, metrics, BiddingStrategy::Unknown);
        assert_eq!(c.cpc, 0.0);

        assert!((cost_per_click(10.0, 4) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn campaign_targets_follow_strategy_variant() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let c = Campaign::new(
            "1".into(),
            "A".into(),
            "enabled".into(),
            "9".into(),
            date,
            CampaignMetrics::default(),
            BiddingStrategy::MaximizeConversionValue(Some(4.0)),
        );
        assert_eq!(c.target_roas, Some(4.0));
        assert_eq!(c.target_cpa, None);
    }

    #[test]
    fn target_change_validates_into_platform_request() {
        let req = change(json!(25.5)).validate().unwrap();
        assert_eq!(req.campaign, CampaignKey::Platform { id: "1234".into() });
        assert_eq!(req.account_id, "1112223333");
        assert_eq!(req.field, TargetField::TargetCpa);
        assert_eq!(req.value, 25.5);

        let req = change(json!("4.25")).validate().unwrap();
        assert_eq!(req.value, 4.25);
    }

    #[test]
    fn target_change_rejects_malformed_input() {
        let cases = [
            change(json!("abc")),
            change(json!(-3)),
            change(json!(0)),
            change(serde_json::Value::Null),
            TargetChange {
                field: Some("bid".into()),
                ..change(json!(1))
            },
            TargetChange {
                campaign_id: None,
                ..change(json!(1))
            },
            TargetChange {
                campaign_id: Some("abc".into()),
                ..change(json!(1))
            },
            TargetChange {
                account_id: Some("  ".into()),
                ..change(json!(1))
            },
        ];
        for case in cases {
            let err = case.clone().validate().unwrap_err();
            assert_eq!(err.kind(), "invalid_request", "{case:?}");
        }
    }

    #[test]
    fn synthetic_record_id_maps_to_synthetic_key() {
        let req = TargetChange {
            campaign_id: Some("local-services".into()),
            account_id: None,
            ..change(json!(10))
        }
        .validate()
        .unwrap();
        assert_eq!(
            req.campaign,
            CampaignKey::SyntheticChannel {
                channel: SecondaryChannel::LocalServices
            }
        );
    }

    #[test]
    fn record_serializes_with_kind_tag() {
        let record = CampaignRecord::SyntheticChannel(SyntheticChannelCampaign {
            channel: SecondaryChannel::LocalServices,
            id: "local-services".into(),
            name: "Local Services".into(),
            status: "enabled".into(),
            account_id: None,
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            cost: 10.0,
            clicks: 0,
            impressions: 0,
            conversions: 2.0,
            cpc: 0.0,
            conversion_actions: Vec::new(),
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "synthetic_channel");
        assert_eq!(json["channel"], "local_services");
        assert_eq!(json["date"], "2024-05-01");
    }

    #[test]
    fn date_range_accepts_aliases() {
        let r: DateRange = serde_json::from_value(json!("last7")).unwrap();
        assert_eq!(r, DateRange::Last7Days);
        let r: DateRange = serde_json::from_value(json!("THIS_MONTH")).unwrap();
        assert_eq!(r.as_query_literal(), "THIS_MONTH");
    }

    #[test]
    fn credential_debug_is_redacted() {
        let cred = DelegatedCredential::new("1//secret").unwrap();
        assert_eq!(format!("{cred:?}"), "DelegatedCredential(***)");
        assert!(DelegatedCredential::new("  ").is_none());
    }
}
