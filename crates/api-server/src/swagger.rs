//! OpenAPI specification served through Swagger UI.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Campaign Dashboard API",
        version = "0.1.0",
        description = "Campaign metrics reconciliation across advertising accounts and the local-services channel, CPC trend tracking, and bidding-target mutation.",
        license(name = "MIT"),
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Campaigns", description = "Aggregation cycles, published snapshots and bidding-target changes"),
        (name = "History", description = "Hourly CPC history and rolling-window trends"),
        (name = "Operations", description = "Health, readiness, and liveness probes"),
    ),
    paths(
        // Campaigns
        crate::rest::handle_aggregate,
        crate::rest::handle_snapshot,
        crate::rest::handle_target,
        // History
        crate::rest::handle_cpc_history,
        crate::rest::handle_record_sample,
        crate::rest::handle_trends,
        // Operations
        crate::rest::health_check,
        crate::rest::readiness,
        crate::rest::liveness,
    ),
    components(schemas(
        // Filters and results
        campaign_core::types::DashboardFilters,
        campaign_core::types::DateRange,
        campaign_core::types::Campaign,
        campaign_core::types::ConversionAction,
        campaign_core::types::SyntheticChannelCampaign,
        campaign_core::types::SecondaryChannel,
        campaign_core::types::UnifiedDayPoint,
        campaign_core::types::ChannelBreakdown,
        campaign_core::types::ChannelTotals,
        campaign_core::types::ChannelDailyMetric,
        campaign_core::types::ConversationSplit,
        campaign_core::types::SecondaryChannelSummary,
        campaign_engine::AggregateOutcome,
        campaign_engine::AccountFailure,
        campaign_engine::DashboardSnapshot,
        // Trends and history
        campaign_core::types::TrendResult,
        campaign_core::types::TrendDirection,
        campaign_core::types::HourlyCpc,
        crate::rest::RecordSampleRequest,
        crate::rest::RecordSampleResponse,
        crate::rest::TrendsResponse,
        // Mutations
        campaign_core::types::TargetChange,
        campaign_core::strategy::TargetField,
        campaign_engine::MutationReceipt,
        // REST error/health types
        crate::rest::ErrorResponse,
        crate::rest::HealthResponse,
    ))
)]
pub struct ApiDoc;

/// Declares the bearer scheme carrying the delegated refresh token.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in [
            "/v1/campaigns/aggregate",
            "/v1/campaigns/snapshot",
            "/v1/campaigns/target",
            "/v1/campaigns/{campaign_id}/cpc-history",
            "/v1/campaigns/cpc-history",
            "/v1/campaigns/trends",
            "/health",
        ] {
            assert!(paths.iter().any(|p| p.as_str() == expected), "missing {expected}");
        }
        assert!(doc.components.unwrap().security_schemes.contains_key("bearer"));
    }
}
