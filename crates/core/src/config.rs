use crate::error::{CampaignError, CampaignResult};
use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `CAMPAIGN_DASHBOARD__` and an optional TOML file at
/// `config/campaign-dashboard.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub ads: AdsPlatformConfig,
    #[serde(default)]
    pub local_services: LocalServicesConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub trend: TrendConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Advertising platform REST connection.
#[derive(Debug, Clone, Deserialize)]
pub struct AdsPlatformConfig {
    #[serde(default = "default_ads_base_url")]
    pub base_url: String,
    #[serde(default = "default_ads_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub developer_token: String,
    /// Manager account the delegated credential logs in through.
    #[serde(default)]
    pub login_customer_id: Option<String>,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    #[serde(default = "default_mutate_timeout_ms")]
    pub mutate_timeout_ms: u64,
}

/// Local-services lead channel (the secondary channel).
#[derive(Debug, Clone, Deserialize)]
pub struct LocalServicesConfig {
    #[serde(default = "default_local_services_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default = "default_local_services_name")]
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackendKind {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_backend")]
    pub backend: HistoryBackendKind,
    #[serde(default = "default_retention_hours")]
    pub retention_hours: i64,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Upper bound on any single history read or write.
    #[serde(default = "default_history_op_timeout_ms")]
    pub op_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_urls")]
    pub urls: Vec<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrendConfig {
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,
    #[serde(default = "default_noise_threshold_pct")]
    pub noise_threshold_pct: f64,
    /// Lookback used by the all-campaign trend snapshot.
    #[serde(default = "default_active_lookback_minutes")]
    pub active_lookback_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationConfig {
    #[serde(default = "default_call_ratio")]
    pub call_ratio: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    #[serde(default = "default_account_timeout_ms")]
    pub account_timeout_ms: u64,
}

// Default functions
fn default_node_id() -> String {
    "dashboard-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_ads_base_url() -> String {
    "https://googleads.googleapis.com".to_string()
}
fn default_ads_api_version() -> String {
    "v17".to_string()
}
fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}
fn default_query_timeout_ms() -> u64 {
    10_000
}
fn default_mutate_timeout_ms() -> u64 {
    15_000
}
fn default_local_services_enabled() -> bool {
    true
}
fn default_local_services_name() -> String {
    "Local Services".to_string()
}
fn default_history_backend() -> HistoryBackendKind {
    HistoryBackendKind::Memory
}
fn default_retention_hours() -> i64 {
    24
}
fn default_key_prefix() -> String {
    "campaign-dashboard".to_string()
}
fn default_history_op_timeout_ms() -> u64 {
    2_000
}
fn default_redis_urls() -> Vec<String> {
    vec!["redis://localhost:6379".to_string()]
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_window_minutes() -> i64 {
    15
}
fn default_noise_threshold_pct() -> f64 {
    2.0
}
fn default_active_lookback_minutes() -> i64 {
    30
}
fn default_call_ratio() -> f64 {
    0.95
}
fn default_account_timeout_ms() -> u64 {
    12_000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for AdsPlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_ads_base_url(),
            api_version: default_ads_api_version(),
            developer_token: String::new(),
            login_customer_id: None,
            client_id: String::new(),
            client_secret: String::new(),
            token_uri: default_token_uri(),
            query_timeout_ms: default_query_timeout_ms(),
            mutate_timeout_ms: default_mutate_timeout_ms(),
        }
    }
}

impl Default for LocalServicesConfig {
    fn default() -> Self {
        Self {
            enabled: default_local_services_enabled(),
            account_id: None,
            display_name: default_local_services_name(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: default_history_backend(),
            retention_hours: default_retention_hours(),
            key_prefix: default_key_prefix(),
            op_timeout_ms: default_history_op_timeout_ms(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            urls: default_redis_urls(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window_minutes: default_window_minutes(),
            noise_threshold_pct: default_noise_threshold_pct(),
            active_lookback_minutes: default_active_lookback_minutes(),
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            call_ratio: default_call_ratio(),
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            account_timeout_ms: default_account_timeout_ms(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            ads: AdsPlatformConfig::default(),
            local_services: LocalServicesConfig::default(),
            history: HistoryConfig::default(),
            redis: RedisConfig::default(),
            trend: TrendConfig::default(),
            conversation: ConversationConfig::default(),
            aggregation: AggregationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the optional config file, then environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/campaign-dashboard").required(false))
            .add_source(
                config::Environment::with_prefix("CAMPAIGN_DASHBOARD")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("redis.urls"),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Reject values that would silently corrupt derived figures.
    pub fn validate(&self) -> CampaignResult<()> {
        let invalid = |msg: String| -> CampaignResult<()> { Err(CampaignError::Config(msg)) };
        if !(0.0..=1.0).contains(&self.conversation.call_ratio) {
            return invalid(format!(
                "conversation.call_ratio must be within [0, 1], got {}",
                self.conversation.call_ratio
            ));
        }
        if self.trend.window_minutes <= 0 {
            return invalid("trend.window_minutes must be positive".to_string());
        }
        if self.trend.noise_threshold_pct < 0.0 {
            return invalid("trend.noise_threshold_pct must not be negative".to_string());
        }
        if self.history.retention_hours <= 0 {
            return invalid("history.retention_hours must be positive".to_string());
        }
        if self.history.op_timeout_ms == 0 {
            return invalid("history.op_timeout_ms must be positive".to_string());
        }
        if self.aggregation.account_timeout_ms == 0 {
            return invalid("aggregation.account_timeout_ms must be positive".to_string());
        }
        if self.redis.connect_timeout_ms == 0 {
            return invalid("redis.connect_timeout_ms must be positive".to_string());
        }
        Ok(())
    }
}
