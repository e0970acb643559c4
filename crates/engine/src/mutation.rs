//! Bidding-target mutations.
//!
//! Each request runs fetch → resolve → validate → build → submit against
//! the platform. Nothing is cached locally afterwards; the next aggregation
//! cycle reads the authoritative value back. Submissions are never retried:
//! a lost acknowledgement followed by a resubmission could apply a change
//! twice.

use campaign_ads::clients::{AdsPlatformClient, FieldUpdate};
use campaign_ads::query;
use campaign_ads::rows::SearchRow;
use campaign_core::error::{CampaignError, CampaignResult};
use campaign_core::strategy::{BiddingStrategy, TargetField};
use campaign_core::types::{CampaignKey, DelegatedCredential, MutationRequest};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};
use utoipa::ToSchema;

/// Acknowledged target change.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MutationReceipt {
    pub ok: bool,
    pub campaign_id: String,
    pub account_id: String,
    pub field: TargetField,
    /// Provider field that was written.
    pub field_path: String,
    pub value: f64,
    pub resource_names: Vec<String>,
}

/// Bound on reading a campaign's current strategy before a mutation.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

type LockTable = DashMap<String, Arc<Mutex<()>>>;

/// Holds one `{account}:{campaign}` entry of the lock table and removes it
/// on drop once no other request references it, including when the
/// request future is cancelled mid-flight.
struct InFlight<'a> {
    table: &'a LockTable,
    key: String,
    lock: Arc<Mutex<()>>,
}

impl<'a> InFlight<'a> {
    fn enter(table: &'a LockTable, key: String) -> Self {
        let lock = table.entry(key.clone()).or_default().clone();
        Self { table, key, lock }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        // The table's reference plus ours: nobody else is queued.
        self.table.remove_if(&self.key, |_, l| Arc::strong_count(l) == 2);
    }
}

pub struct MutationOrchestrator {
    ads: Arc<dyn AdsPlatformClient>,
    /// One lock per `{account}:{campaign}`; entries are dropped when idle.
    in_flight: LockTable,
    fetch_timeout: Duration,
}

impl MutationOrchestrator {
    pub fn new(ads: Arc<dyn AdsPlatformClient>) -> Self {
        Self {
            ads,
            in_flight: DashMap::new(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub async fn apply_target(
        &self,
        credential: Option<&DelegatedCredential>,
        request: &MutationRequest,
    ) -> CampaignResult<MutationReceipt> {
        let result = self.run(credential, request).await;
        match &result {
            Ok(_) => metrics::counter!("mutation.submitted").increment(1),
            Err(e) => {
                metrics::counter!("mutation.rejected", "kind" => e.kind()).increment(1);
                warn!(
                    campaign = ?request.campaign,
                    account_id = %request.account_id,
                    field = request.field.as_str(),
                    error = %e,
                    "Target mutation rejected"
                );
            }
        }
        result
    }

    async fn run(
        &self,
        credential: Option<&DelegatedCredential>,
        request: &MutationRequest,
    ) -> CampaignResult<MutationReceipt> {
        let campaign_id = match &request.campaign {
            CampaignKey::Platform { id } => id.as_str(),
            CampaignKey::SyntheticChannel { channel } => {
                return Err(CampaignError::UnsupportedStrategy(format!(
                    "{} is a synthetic channel record with no bidding strategy",
                    channel.record_id()
                )));
            }
        };
        let credential = credential.ok_or(CampaignError::AuthenticationRequired)?;
        validate_request(campaign_id, request)?;

        let slot = InFlight::enter(&self.in_flight, format!("{}:{}", request.account_id, campaign_id));
        let _serialized = slot.lock.lock().await;
        self.fetch_and_submit(credential, campaign_id, request).await
    }

    async fn fetch_and_submit(
        &self,
        credential: &DelegatedCredential,
        campaign_id: &str,
        request: &MutationRequest,
    ) -> CampaignResult<MutationReceipt> {
        // Fetch
        let strategy_query = query::campaign_strategy(campaign_id);
        let rows = tokio::time::timeout(
            self.fetch_timeout,
            self.ads.query(credential, &request.account_id, &strategy_query),
        )
        .await
        .map_err(|_| {
            CampaignError::UpstreamUnavailable(format!(
                "strategy lookup for campaign {campaign_id} timed out after {:?}",
                self.fetch_timeout
            ))
        })??;
        let resource = rows
            .into_iter()
            .filter_map(SearchRow::parse)
            .find_map(|row| row.campaign)
            .ok_or_else(|| {
                CampaignError::NotFound(format!("campaign {campaign_id} in account {}", request.account_id))
            })?;

        // Resolve and validate
        let strategy = resource.bidding_strategy();
        let slot = strategy
            .slot_for(request.field)
            .ok_or_else(|| unsupported(campaign_id, &strategy, request.field))?;

        // Build
        let resource_name = resource
            .resource_name
            .clone()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| format!("customers/{}/campaigns/{}", request.account_id, campaign_id));
        let update = FieldUpdate {
            resource_name,
            field_path: slot.field_path().to_string(),
            value: slot.encode(request.value),
        };

        // Submit
        let ack = self.ads.mutate(credential, &request.account_id, vec![update]).await?;
        info!(
            campaign_id,
            account_id = %request.account_id,
            field_path = slot.field_path(),
            value = request.value,
            strategy = strategy.provider_name(),
            "Bidding target updated"
        );

        Ok(MutationReceipt {
            ok: true,
            campaign_id: campaign_id.to_string(),
            account_id: request.account_id.clone(),
            field: request.field,
            field_path: slot.field_path().to_string(),
            value: request.value,
            resource_names: ack.resource_names,
        })
    }
}

fn validate_request(campaign_id: &str, request: &MutationRequest) -> CampaignResult<()> {
    if campaign_id.is_empty() || !campaign_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(CampaignError::InvalidRequest(format!("campaignId must be numeric, got '{campaign_id}'")));
    }
    if request.account_id.is_empty() || !request.account_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(CampaignError::InvalidRequest(format!(
            "accountId must be numeric, got '{}'",
            request.account_id
        )));
    }
    if !request.value.is_finite() || request.value <= 0.0 {
        return Err(CampaignError::InvalidRequest(format!(
            "value must be a positive number, got {}",
            request.value
        )));
    }
    Ok(())
}

fn unsupported(campaign_id: &str, strategy: &BiddingStrategy, field: TargetField) -> CampaignError {
    CampaignError::UnsupportedStrategy(format!(
        "campaign {campaign_id} uses {} which does not accept {}",
        strategy.provider_name(),
        field.as_str()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use campaign_ads::clients::MutateAck;
    use serde_json::Value;

    /// Strategy lookups never answer.
    struct StalledAds;

    #[async_trait]
    impl AdsPlatformClient for StalledAds {
        async fn query(&self, _: &DelegatedCredential, _: &str, _: &str) -> CampaignResult<Vec<Value>> {
            std::future::pending().await
        }

        async fn mutate(&self, _: &DelegatedCredential, _: &str, _: Vec<FieldUpdate>) -> CampaignResult<MutateAck> {
            Err(CampaignError::UpstreamRejected("mutate not expected".to_string()))
        }
    }

    fn cpa_request() -> MutationRequest {
        MutationRequest::platform("555", "1112223333", TargetField::TargetCpa, 20.0)
    }

    #[tokio::test]
    async fn stalled_strategy_lookup_times_out() {
        let orchestrator = MutationOrchestrator::new(Arc::new(StalledAds)).with_fetch_timeout(Duration::from_millis(50));
        let credential = DelegatedCredential::new("token").unwrap();

        let result = orchestrator.apply_target(Some(&credential), &cpa_request()).await;
        assert!(matches!(result, Err(CampaignError::UpstreamUnavailable(_))));
        assert!(orchestrator.in_flight.is_empty());
    }

    #[tokio::test]
    async fn cancelled_request_releases_its_lock_entry() {
        let orchestrator = MutationOrchestrator::new(Arc::new(StalledAds));
        let credential = DelegatedCredential::new("token").unwrap();

        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            orchestrator.apply_target(Some(&credential), &cpa_request()),
        )
        .await;
        assert!(cancelled.is_err());
        assert!(orchestrator.in_flight.is_empty());
    }

    #[test]
    fn request_validation() {
        let ok = MutationRequest::platform("123", "4445556666", TargetField::TargetCpa, 12.5);
        assert!(validate_request("123", &ok).is_ok());

        let bad_value = MutationRequest::platform("123", "4445556666", TargetField::TargetCpa, f64::NAN);
        assert!(matches!(validate_request("123", &bad_value), Err(CampaignError::InvalidRequest(_))));

        let bad_account = MutationRequest::platform("123", "", TargetField::TargetRoas, 2.0);
        assert!(matches!(validate_request("123", &bad_account), Err(CampaignError::InvalidRequest(_))));

        assert!(matches!(validate_request("12a", &ok), Err(CampaignError::InvalidRequest(_))));
    }

    #[test]
    fn unsupported_message_names_strategy_and_field() {
        let err = unsupported("9", &BiddingStrategy::TargetRoas(4.0), TargetField::TargetCpa);
        assert_eq!(
            err.to_string(),
            "Unsupported bidding strategy: campaign 9 uses TARGET_ROAS which does not accept targetCpa"
        );
    }
}
