//! REST client for the Google Ads API.
//!
//! Searches page through `googleAds:search`; mutations go through
//! `campaigns:mutate`. The operator's delegated refresh token is exchanged
//! for a short-lived access token which is cached until shortly before it
//! expires.

use crate::clients::{AdsPlatformClient, FieldUpdate, MutateAck};
use async_trait::async_trait;
use campaign_core::config::AdsPlatformConfig;
use campaign_core::error::{CampaignError, CampaignResult};
use campaign_core::types::DelegatedCredential;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Hard stop for paginated searches; one search never needs more.
const MAX_SEARCH_PAGES: usize = 200;

/// Renew this long before the provider-reported expiry.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPage {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MutateResponse {
    #[serde(default)]
    results: Vec<MutateResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MutateResult {
    #[serde(default)]
    resource_name: String,
}

pub struct GoogleAdsClient {
    http: reqwest::Client,
    config: AdsPlatformConfig,
    base: Url,
    tokens: DashMap<String, CachedToken>,
}

impl GoogleAdsClient {
    pub fn new(config: AdsPlatformConfig) -> CampaignResult<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| CampaignError::Config(format!("ads.base_url {:?}: {e}", config.base_url)))?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| CampaignError::Config(format!("http client: {e}")))?;

        info!(base_url = %base, api_version = %config.api_version, "Ads platform client initialized");

        Ok(Self {
            http,
            config,
            base,
            tokens: DashMap::new(),
        })
    }

    fn endpoint(&self, account_id: &str, method: &str) -> CampaignResult<Url> {
        let path = format!("{}/customers/{}/{}", self.config.api_version, account_id, method);
        self.base
            .join(&path)
            .map_err(|e| CampaignError::Config(format!("endpoint {path}: {e}")))
    }

    async fn access_token(&self, credential: &DelegatedCredential) -> CampaignResult<String> {
        if let Some(cached) = self.tokens.get(credential.refresh_token()) {
            if cached.expires_at > Instant::now() {
                return Ok(cached.access_token.clone());
            }
        }

        metrics::counter!("ads.token.refresh").increment(1);
        let response = self
            .http
            .post(&self.config.token_uri)
            .timeout(Duration::from_millis(self.config.query_timeout_ms))
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", credential.refresh_token()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Delegated credential refresh rejected");
            // invalid_grant and friends all mean the operator must sign in again
            return Err(if status.is_server_error() {
                CampaignError::UpstreamUnavailable(format!("token endpoint returned {status}: {body}"))
            } else {
                CampaignError::AuthenticationRequired
            });
        }

        let token: TokenResponse = response.json().await.map_err(transport_error)?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        self.tokens.insert(
            credential.refresh_token().to_string(),
            CachedToken {
                access_token: token.access_token.clone(),
                expires_at: Instant::now() + lifetime,
            },
        );
        self.tokens.retain(|_, t| t.expires_at > Instant::now());
        Ok(token.access_token)
    }

    async fn post(
        &self,
        credential: &DelegatedCredential,
        url: Url,
        body: Value,
        timeout: Duration,
    ) -> CampaignResult<Value> {
        let token = self.access_token(credential).await?;
        let mut request = self
            .http
            .post(url)
            .timeout(timeout)
            .bearer_auth(token)
            .header("developer-token", &self.config.developer_token)
            .json(&body);
        if let Some(login) = self.config.login_customer_id.as_deref().filter(|l| !l.is_empty()) {
            request = request.header("login-customer-id", login.replace('-', ""));
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        if status.is_success() {
            return Ok(serde_json::from_str(&text)?);
        }

        metrics::counter!("ads.request.errors", "status" => status.as_u16().to_string()).increment(1);
        Err(status_error(status.as_u16(), &text))
    }
}

fn transport_error(e: reqwest::Error) -> CampaignError {
    if e.is_timeout() {
        CampaignError::UpstreamUnavailable("advertising platform timed out".to_string())
    } else if e.is_connect() {
        CampaignError::UpstreamUnavailable(format!("advertising platform unreachable: {e}"))
    } else if e.is_decode() {
        CampaignError::UpstreamRejected(format!("undecodable response: {e}"))
    } else {
        CampaignError::UpstreamUnavailable(e.to_string())
    }
}

/// Most specific message in a provider error body, or the raw body.
fn provider_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };
    let error = &value["error"];
    error["details"]
        .as_array()
        .into_iter()
        .flatten()
        .flat_map(|d| d["errors"].as_array().into_iter().flatten())
        .find_map(|e| e["message"].as_str())
        .or_else(|| error["message"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

fn status_error(status: u16, body: &str) -> CampaignError {
    match status {
        401 | 403 => CampaignError::AuthenticationRequired,
        404 => CampaignError::NotFound(provider_message(body)),
        400..=499 => CampaignError::UpstreamRejected(provider_message(body)),
        _ => CampaignError::UpstreamUnavailable(format!("status {status}: {}", provider_message(body))),
    }
}

fn camel_case(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut upper = false;
    for c in segment.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// `maximize_conversions.target_cpa_micros` -> `maximizeConversions.targetCpaMicros`
fn update_mask(field_path: &str) -> String {
    field_path.split('.').map(camel_case).collect::<Vec<_>>().join(".")
}

/// Build the update operation for one field, nesting the value along the
/// camelCase path.
fn update_operation(update: &FieldUpdate) -> Value {
    let mut resource = Map::new();
    resource.insert("resourceName".to_string(), Value::String(update.resource_name.clone()));

    let segments: Vec<String> = update.field_path.split('.').map(camel_case).collect();
    let mut nested = update.value.clone();
    for segment in segments.iter().skip(1).rev() {
        let mut map = Map::new();
        map.insert(segment.clone(), nested);
        nested = Value::Object(map);
    }
    if let Some(head) = segments.first() {
        resource.insert(head.clone(), nested);
    }

    json!({
        "update": Value::Object(resource),
        "updateMask": update_mask(&update.field_path),
    })
}

/// Token for the next page, or `None` when the search is complete. A
/// provider that repeats its token or never stops paging is an error.
fn next_page(current: Option<&str>, next: Option<String>, pages: usize) -> CampaignResult<Option<String>> {
    let Some(next) = next.filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    if current == Some(next.as_str()) {
        return Err(CampaignError::UpstreamUnavailable("search returned the same page token twice".to_string()));
    }
    if pages >= MAX_SEARCH_PAGES {
        warn!(pages, "Search exceeded page limit");
        return Err(CampaignError::UpstreamUnavailable(format!(
            "search did not finish within {MAX_SEARCH_PAGES} pages"
        )));
    }
    Ok(Some(next))
}

#[async_trait]
impl AdsPlatformClient for GoogleAdsClient {
    async fn query(
        &self,
        credential: &DelegatedCredential,
        account_id: &str,
        query: &str,
    ) -> CampaignResult<Vec<Value>> {
        let url = self.endpoint(account_id, "googleAds:search")?;
        let timeout = Duration::from_millis(self.config.query_timeout_ms);
        let mut rows = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let mut body = json!({ "query": query });
            if let Some(token) = &page_token {
                body["pageToken"] = Value::String(token.clone());
            }
            let page: SearchPage = serde_json::from_value(self.post(credential, url.clone(), body, timeout).await?)?;
            rows.extend(page.results);
            pages += 1;
            match next_page(page_token.as_deref(), page.next_page_token, pages)? {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        metrics::counter!("ads.query.rows").increment(rows.len() as u64);
        debug!(account_id, rows = rows.len(), "Search completed");
        Ok(rows)
    }

    async fn mutate(
        &self,
        credential: &DelegatedCredential,
        account_id: &str,
        updates: Vec<FieldUpdate>,
    ) -> CampaignResult<MutateAck> {
        let url = self.endpoint(account_id, "campaigns:mutate")?;
        let operations: Vec<Value> = updates.iter().map(update_operation).collect();
        let timeout = Duration::from_millis(self.config.mutate_timeout_ms);

        let response: MutateResponse =
            serde_json::from_value(self.post(credential, url, json!({ "operations": operations }), timeout).await?)?;

        Ok(MutateAck {
            resource_names: response.results.into_iter().map(|r| r.resource_name).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maximize_slot_is_nested_camel_case() {
        let op = update_operation(&FieldUpdate {
            resource_name: "customers/123/campaigns/456".to_string(),
            field_path: "maximize_conversions.target_cpa_micros".to_string(),
            value: Value::String("45000000".to_string()),
        });
        assert_eq!(
            op,
            json!({
                "update": {
                    "resourceName": "customers/123/campaigns/456",
                    "maximizeConversions": { "targetCpaMicros": "45000000" }
                },
                "updateMask": "maximizeConversions.targetCpaMicros"
            })
        );
    }

    #[test]
    fn pagination_stops_on_runaway_tokens() {
        assert_eq!(next_page(None, None, 1).unwrap(), None);
        assert_eq!(next_page(None, Some(String::new()), 1).unwrap(), None);
        assert_eq!(next_page(None, Some("p2".to_string()), 1).unwrap(), Some("p2".to_string()));
        assert!(matches!(
            next_page(Some("p2"), Some("p2".to_string()), 2),
            Err(CampaignError::UpstreamUnavailable(_))
        ));
        assert!(matches!(
            next_page(Some("p199"), Some("p200".to_string()), MAX_SEARCH_PAGES),
            Err(CampaignError::UpstreamUnavailable(_))
        ));
    }

    #[test]
    fn roas_value_stays_numeric() {
        let op = update_operation(&FieldUpdate {
            resource_name: "customers/1/campaigns/2".to_string(),
            field_path: "target_roas.target_roas".to_string(),
            value: json!(3.5),
        });
        assert_eq!(op["update"]["targetRoas"]["targetRoas"], json!(3.5));
        assert_eq!(op["updateMask"], "targetRoas.targetRoas");
    }

    #[test]
    fn status_codes_map_to_taxonomy() {
        let body = r#"{"error":{"code":400,"message":"Request contains an invalid argument.",
            "details":[{"errors":[{"message":"Target CPA is below the minimum."}]}]}}"#;
        match status_error(400, body) {
            CampaignError::UpstreamRejected(msg) => assert_eq!(msg, "Target CPA is below the minimum."),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(status_error(401, ""), CampaignError::AuthenticationRequired));
        assert!(matches!(status_error(404, "{}"), CampaignError::NotFound(_)));
        assert!(matches!(status_error(503, "oops"), CampaignError::UpstreamUnavailable(_)));
    }

    #[test]
    fn provider_message_falls_back_to_body() {
        assert_eq!(provider_message("plain failure"), "plain failure");
        assert_eq!(provider_message(r#"{"error":{"message":"quota"}}"#), "quota");
    }

    #[test]
    fn endpoints_are_versioned_per_account() {
        let client = GoogleAdsClient::new(AdsPlatformConfig::default()).unwrap();
        let url = client.endpoint("1234567890", "googleAds:search").unwrap();
        assert_eq!(url.as_str(), "https://googleads.googleapis.com/v17/customers/1234567890/googleAds:search");
    }

    #[test]
    fn bad_base_url_is_a_config_error() {
        let config = AdsPlatformConfig {
            base_url: "not a url".to_string(),
            ..AdsPlatformConfig::default()
        };
        assert!(matches!(GoogleAdsClient::new(config), Err(CampaignError::Config(_))));
    }
}
