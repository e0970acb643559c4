//! Query-language builders for the advertising platform's search endpoint.

use campaign_core::types::DateRange;

/// Per-campaign, per-day metrics with bidding strategy sub-fields.
pub fn campaign_metrics(range: DateRange) -> String {
    format!(
        "SELECT \
            campaign.id, \
            campaign.name, \
            campaign.status, \
            campaign.bidding_strategy_type, \
            campaign.target_cpa.target_cpa_micros, \
            campaign.target_roas.target_roas, \
            campaign.maximize_conversion_value.target_roas, \
            campaign.maximize_conversions.target_cpa_micros, \
            metrics.cost_micros, \
            metrics.clicks, \
            metrics.conversions, \
            metrics.impressions, \
            segments.date \
        FROM campaign \
        WHERE segments.date DURING {}",
        range.as_query_literal()
    )
}

/// Conversions split by conversion action, largest first.
pub fn conversion_actions(range: DateRange) -> String {
    format!(
        "SELECT \
            campaign.id, \
            segments.conversion_action_name, \
            segments.conversion_action_category, \
            segments.date, \
            metrics.all_conversions \
        FROM campaign \
        WHERE segments.date DURING {} \
        ORDER BY metrics.all_conversions DESC",
        range.as_query_literal()
    )
}

/// Current strategy of a single campaign. `campaign_id` must be numeric.
pub fn campaign_strategy(campaign_id: &str) -> String {
    format!(
        "SELECT \
            campaign.resource_name, \
            campaign.id, \
            campaign.bidding_strategy_type, \
            campaign.target_cpa.target_cpa_micros, \
            campaign.target_roas.target_roas, \
            campaign.maximize_conversions.target_cpa_micros, \
            campaign.maximize_conversion_value.target_roas \
        FROM campaign \
        WHERE campaign.id = {campaign_id}"
    )
}

/// Local-services campaigns with daily spend and lead counts.
pub fn local_services(range: DateRange) -> String {
    format!(
        "SELECT \
            campaign.id, \
            campaign.name, \
            campaign.status, \
            campaign_budget.amount_micros, \
            metrics.cost_micros, \
            metrics.all_conversions, \
            segments.date \
        FROM campaign \
        WHERE campaign.advertising_channel_type = 'LOCAL_SERVICES' \
        AND campaign.status != 'REMOVED' \
        AND segments.date DURING {}",
        range.as_query_literal()
    )
}
