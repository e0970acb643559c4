//! Typed decoding of search result rows.
//!
//! The REST transport emits camelCase keys, reports int64 values as JSON
//! strings and enums by name. Every numeric field here accepts either a
//! number or a numeric string.

use campaign_core::strategy::{self, BiddingStrategy, StrategyFields};
use campaign_core::types::{Campaign, CampaignMetrics, ConversionAction};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use tracing::warn;

#[derive(Deserialize)]
#[serde(untagged)]
enum Flex {
    Num(f64),
    Text(String),
}

fn flex_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Flex>::deserialize(d)? {
        Some(Flex::Num(n)) => Some(n),
        Some(Flex::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

fn flex_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Flex>::deserialize(d)? {
        Some(Flex::Num(n)) if n.fract() == 0.0 => Some(format!("{}", n as i64)),
        Some(Flex::Num(n)) => Some(n.to_string()),
        Some(Flex::Text(s)) => Some(s),
        None => None,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetCpaFields {
    #[serde(default, deserialize_with = "flex_f64")]
    pub target_cpa_micros: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRoasFields {
    #[serde(default, deserialize_with = "flex_f64")]
    pub target_roas: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignResource {
    #[serde(default)]
    pub resource_name: Option<String>,
    #[serde(default, deserialize_with = "flex_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "flex_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "flex_string")]
    pub bidding_strategy_type: Option<String>,
    #[serde(default)]
    pub target_cpa: Option<TargetCpaFields>,
    #[serde(default)]
    pub target_roas: Option<TargetRoasFields>,
    #[serde(default)]
    pub maximize_conversions: Option<TargetCpaFields>,
    #[serde(default)]
    pub maximize_conversion_value: Option<TargetRoasFields>,
}

impl CampaignResource {
    pub fn strategy_fields(&self) -> StrategyFields {
        StrategyFields {
            target_cpa_micros: self.target_cpa.as_ref().and_then(|f| f.target_cpa_micros),
            target_roas_ratio: self.target_roas.as_ref().and_then(|f| f.target_roas),
            maximize_conversions_target_cpa_micros: self.maximize_conversions.as_ref().and_then(|f| f.target_cpa_micros),
            maximize_conversion_value_target_roas: self.maximize_conversion_value.as_ref().and_then(|f| f.target_roas),
        }
    }

    /// Strategy type arrives either as the enum name or its numeric code.
    pub fn bidding_strategy(&self) -> BiddingStrategy {
        let fields = self.strategy_fields();
        match self.bidding_strategy_type.as_deref() {
            Some(raw) => match raw.trim().parse::<i32>() {
                Ok(code) => strategy::resolve(code, &fields),
                Err(_) => strategy::resolve_named(raw, &fields),
            },
            None => BiddingStrategy::Unknown,
        }
    }

    pub fn normalized_status(&self) -> String {
        normalize_status(self.status.as_deref())
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.status.as_deref().map(str::trim), Some("ENABLED") | Some("enabled") | Some("2"))
    }
}

pub fn normalize_status(status: Option<&str>) -> String {
    match status.map(str::trim) {
        Some(s) if !s.is_empty() => s.to_lowercase(),
        _ => "unknown".to_string(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsFields {
    #[serde(default, deserialize_with = "flex_f64")]
    pub cost_micros: Option<f64>,
    #[serde(default, deserialize_with = "flex_f64")]
    pub clicks: Option<f64>,
    #[serde(default, deserialize_with = "flex_f64")]
    pub conversions: Option<f64>,
    #[serde(default, deserialize_with = "flex_f64")]
    pub impressions: Option<f64>,
    #[serde(default, deserialize_with = "flex_f64")]
    pub all_conversions: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentsFields {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub conversion_action_name: Option<String>,
    #[serde(default, deserialize_with = "flex_string")]
    pub conversion_action_category: Option<String>,
}

impl SegmentsFields {
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        self.date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetFields {
    #[serde(default, deserialize_with = "flex_f64")]
    pub amount_micros: Option<f64>,
}

/// One search result row. Which parts are populated depends on the query.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRow {
    #[serde(default)]
    pub campaign: Option<CampaignResource>,
    #[serde(default)]
    pub metrics: Option<MetricsFields>,
    #[serde(default)]
    pub segments: Option<SegmentsFields>,
    #[serde(default)]
    pub campaign_budget: Option<BudgetFields>,
}

impl SearchRow {
    pub fn parse(value: serde_json::Value) -> Option<Self> {
        match serde_json::from_value(value) {
            Ok(row) => Some(row),
            Err(e) => {
                warn!(error = %e, "Skipping undecodable search row");
                None
            }
        }
    }

    /// Build a [`Campaign`]; `None` when id, name, metrics or date is missing.
    pub fn into_campaign(self, account_id: &str) -> Option<Campaign> {
        let campaign = self.campaign?;
        let metrics = self.metrics?;
        let date = self.segments.as_ref().and_then(SegmentsFields::parsed_date)?;
        let id = campaign.id.clone().filter(|id| !id.is_empty())?;
        let name = campaign.name.clone()?;

        let strategy = campaign.bidding_strategy();
        let metrics = CampaignMetrics {
            cost: strategy::micros_to_units(metrics.cost_micros.unwrap_or(0.0)),
            clicks: count(metrics.clicks),
            impressions: count(metrics.impressions),
            conversions: metrics.conversions.unwrap_or(0.0),
        };
        Some(Campaign::new(
            id,
            name,
            campaign.normalized_status(),
            account_id.to_string(),
            date,
            metrics,
            strategy,
        ))
    }
}

fn count(value: Option<f64>) -> u64 {
    value.filter(|v| v.is_finite() && *v > 0.0).map_or(0, |v| v.round() as u64)
}

/// Conversion-action breakdown row keyed by campaign and date.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionActionRow {
    pub campaign_id: String,
    pub date: NaiveDate,
    pub action: ConversionAction,
}

impl ConversionActionRow {
    pub fn from_row(row: SearchRow) -> Option<Self> {
        let campaign_id = row.campaign.and_then(|c| c.id)?;
        let segments = row.segments?;
        let date = segments.parsed_date()?;
        let name = segments.conversion_action_name?;
        let value = row.metrics.and_then(|m| m.all_conversions).unwrap_or(0.0);
        Some(Self {
            campaign_id,
            date,
            action: ConversionAction {
                name,
                value,
                category: segments.conversion_action_category,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rest_row_with_string_int64s_decodes() {
        let row = SearchRow::parse(json!({
            "campaign": {
                "resourceName": "customers/111/campaigns/222",
                "id": "222",
                "name": "Brand",
                "status": "ENABLED",
                "biddingStrategyType": "MAXIMIZE_CONVERSIONS",
                "maximizeConversions": { "targetCpaMicros": "45000000" }
            },
            "metrics": { "costMicros": "12500000", "clicks": "10", "conversions": 2.0, "impressions": "300" },
            "segments": { "date": "2024-06-01" }
        }))
        .unwrap();

        let campaign = row.into_campaign("1112223333").unwrap();
        assert_eq!(campaign.id, "222");
        assert_eq!(campaign.status, "enabled");
        assert_eq!(campaign.clicks, 10);
        assert!((campaign.cost - 12.5).abs() < 1e-9);
        assert!((campaign.cpc - 1.25).abs() < 1e-9);
        assert_eq!(campaign.bidding_strategy, BiddingStrategy::MaximizeConversions(Some(45.0)));
        assert_eq!(campaign.target_cpa, Some(45.0));
    }

    #[test]
    fn numeric_strategy_codes_are_accepted() {
        let row = SearchRow::parse(json!({
            "campaign": { "id": 5, "name": "Roas", "biddingStrategyType": 8, "targetRoas": { "targetRoas": 3.5 } },
            "metrics": {},
            "segments": { "date": "2024-06-02" }
        }))
        .unwrap();
        let campaign = row.into_campaign("1").unwrap();
        assert_eq!(campaign.id, "5");
        assert_eq!(campaign.status, "unknown");
        assert_eq!(campaign.bidding_strategy, BiddingStrategy::TargetRoas(3.5));
        assert_eq!(campaign.cpc, 0.0);
    }

    #[test]
    fn rows_without_date_are_malformed() {
        let row = SearchRow::parse(json!({
            "campaign": { "id": "9", "name": "x" },
            "metrics": {}
        }))
        .unwrap();
        assert!(row.into_campaign("1").is_none());
    }

    #[test]
    fn conversion_action_rows_decode() {
        let row = SearchRow::parse(json!({
            "campaign": { "id": "9" },
            "segments": {
                "date": "2024-06-01",
                "conversionActionName": "Calls from ads",
                "conversionActionCategory": "PHONE_CALL_LEAD"
            },
            "metrics": { "allConversions": 4.0 }
        }))
        .unwrap();
        let parsed = ConversionActionRow::from_row(row).unwrap();
        assert_eq!(parsed.campaign_id, "9");
        assert_eq!(parsed.action.name, "Calls from ads");
        assert_eq!(parsed.action.category.as_deref(), Some("PHONE_CALL_LEAD"));
        assert!((parsed.action.value - 4.0).abs() < 1e-9);
    }
}
