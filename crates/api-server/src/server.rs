//! API server: the REST router and the Prometheus exporter.

use crate::rest::{self, AppState};
use crate::swagger::ApiDoc;
use axum::routing::{get, post};
use axum::Router;
use campaign_core::config::AppConfig;
use campaign_engine::DashboardService;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub struct ApiServer {
    config: AppConfig,
    service: Arc<DashboardService>,
}

impl ApiServer {
    pub fn new(config: AppConfig, service: Arc<DashboardService>) -> Self {
        Self { config, service }
    }

    /// Build the application router with all routes and middleware.
    pub fn router(&self) -> Router {
        let state = AppState {
            service: self.service.clone(),
            node_id: self.config.node_id.clone(),
            start_time: Instant::now(),
        };

        Router::new()
            // Campaigns
            .route("/v1/campaigns/aggregate", post(rest::handle_aggregate))
            .route("/v1/campaigns/snapshot", get(rest::handle_snapshot))
            .route("/v1/campaigns/target", post(rest::handle_target))
            // History
            .route("/v1/campaigns/trends", get(rest::handle_trends))
            .route("/v1/campaigns/cpc-history", post(rest::handle_record_sample))
            .route("/v1/campaigns/:campaign_id/cpc-history", get(rest::handle_cpc_history))
            // Operational endpoints
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
            // Middleware
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = self.router();
        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Install the global recorder and spawn the Prometheus scrape listener
    /// on the metrics port. Must run inside the Tokio runtime.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.metrics.port);
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;

        info!(addr = %addr, "Metrics exporter started");
        Ok(())
    }
}
