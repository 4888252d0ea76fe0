//! API server: HTTP routes and the Prometheus exporter.

use crate::rest::{self, AppState};
use axum::routing::{delete, get, post, put};
use axum::Router;
use redirect_core::config::AppConfig;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the full router over shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Page-view evaluation
        .route("/v1/page-views", post(rest::handle_page_view))
        // Rule administration
        .route("/v1/rules", get(rest::list_rules).put(rest::replace_rules))
        .route("/v1/rules/drafts", post(rest::save_rule_drafts))
        .route("/v1/pages", get(rest::list_pages))
        .route("/v1/pages/:id", put(rest::upsert_page))
        .route("/v1/visits", delete(rest::reset_visits))
        .route("/v1/time", get(rest::server_time))
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        // Middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Main API server.
pub struct ApiServer {
    config: AppConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: AppConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = router(self.state.clone());

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics server on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
