//! Campaign Dashboard: campaign metrics reconciliation and bidding-target
//! mutation service.
//!
//! Main entry point that wires the history store, platform clients and
//! engine, then starts the servers.

use campaign_ads::{GoogleAdsClient, LocalServicesFeed};
use campaign_analytics::TrendCalculator;
use campaign_api::ApiServer;
use campaign_cache::{CpcHistoryStore, HistoryBackend, LocalHistory, RedisHistory};
use campaign_core::config::{AppConfig, HistoryBackendKind};
use campaign_core::ConversationEstimator;
use campaign_engine::{CampaignAggregator, DashboardService, DashboardState, MutationOrchestrator};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "campaign-dashboard")]
#[command(about = "Campaign metrics reconciliation and bidding-target mutation service")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "CAMPAIGN_DASHBOARD__NODE_ID")]
    node_id: Option<String>,

    /// Bind address (overrides config)
    #[arg(long, env = "CAMPAIGN_DASHBOARD__API__HOST")]
    host: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "CAMPAIGN_DASHBOARD__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// CPC history backend (overrides config)
    #[arg(long, value_parser = ["memory", "redis"])]
    history_backend: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campaign_dashboard=info,campaign_engine=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Campaign Dashboard starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(host) = cli.host {
        config.api.host = host;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    match cli.history_backend.as_deref() {
        Some("redis") => config.history.backend = HistoryBackendKind::Redis,
        Some("memory") => config.history.backend = HistoryBackendKind::Memory,
        _ => {}
    }
    config.validate()?;

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        history_backend = ?config.history.backend,
        local_services = config.local_services.enabled,
        "Configuration loaded"
    );

    // CPC history
    let backend: Arc<dyn HistoryBackend> = match config.history.backend {
        HistoryBackendKind::Memory => Arc::new(LocalHistory::new()),
        HistoryBackendKind::Redis => Arc::new(
            RedisHistory::connect(&config.redis, &config.history.key_prefix)
                .await
                .inspect_err(|e| error!(error = %e, "Redis connection required for the redis history backend"))?,
        ),
    };
    let store = CpcHistoryStore::new(backend, config.history.retention_hours)
        .with_op_timeout(Duration::from_millis(config.history.op_timeout_ms));

    // Advertising platform
    let ads = Arc::new(GoogleAdsClient::new(config.ads.clone())?);

    let mut aggregator = CampaignAggregator::new(
        ads.clone(),
        TrendCalculator::new(store.clone(), &config.trend),
        ConversationEstimator::new(config.conversation.call_ratio),
        Duration::from_millis(config.aggregation.account_timeout_ms),
    );
    match (config.local_services.enabled, config.local_services.account_id.clone()) {
        (true, Some(account_id)) => {
            let feed = Arc::new(LocalServicesFeed::new(ads.clone(), account_id.clone()));
            aggregator = aggregator.with_local_services(feed, config.local_services.display_name.clone(), Some(account_id));
            info!("Local services channel enabled");
        }
        (true, None) => warn!("Local services enabled without local_services.account_id; channel disabled"),
        (false, _) => info!("Local services channel disabled"),
    }

    let service = Arc::new(DashboardService::new(
        aggregator,
        MutationOrchestrator::new(ads).with_fetch_timeout(Duration::from_millis(config.ads.query_timeout_ms)),
        Arc::new(DashboardState::new()),
    ));

    // Start API server
    let api_server = ApiServer::new(config.clone(), service);

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    // Spawn history maintenance task
    let store_for_maintenance = store.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            if let Err(e) = store_for_maintenance.prune_expired(chrono::Utc::now()).await {
                warn!(error = %e, "History maintenance failed");
            }
        }
    });

    info!("Campaign Dashboard is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
