//! Offer Redirects: time-windowed redirect rules for promoted pages.
//!
//! Main entry point that wires the stores and evaluator and starts the server.

use clap::Parser;
use redirect_api::{ApiServer, AppState};
use redirect_core::config::AppConfig;
use redirect_core::{PageDirectory, PageResolver};
use redirect_engine::{RedirectEvaluator, VisitorIdentityProvider};
use redirect_rules::RuleStore;
use redirect_visits::{LocalVisitStore, RedisVisitStore, VisitTracker};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "offer-redirects")]
#[command(about = "Time-windowed redirect rules for promoted pages")]
#[command(version)]
struct Cli {
    /// Config file (TOML), optional
    #[arg(long, default_value = "offer-redirects.toml")]
    config: String,

    /// Node identifier (overrides config)
    #[arg(long, env = "OFFER_REDIRECTS__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "OFFER_REDIRECTS__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Keep visit records in process memory even if Redis is configured
    #[arg(long, default_value_t = false)]
    memory_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "offer_redirects=info,redirect_engine=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Offer Redirects starting up");

    // Load configuration
    let mut config = AppConfig::load(Some(&cli.config)).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        redis = config.redis.enabled && !cli.memory_only,
        rules_path = ?config.rules.path,
        "Configuration loaded"
    );

    let pages = Arc::new(PageDirectory::from_config(&config.pages));
    let resolver: Arc<dyn PageResolver> = pages.clone();

    let rules = Arc::new(match &config.rules.path {
        Some(path) => RuleStore::open(path, resolver.clone())?,
        None => RuleStore::in_memory(resolver.clone()),
    });

    // Visit store: Redis when configured, otherwise process memory.
    let visits: Arc<dyn VisitTracker> = if config.redis.enabled && !cli.memory_only {
        match RedisVisitStore::new(&config.redis).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!(error = %e, "Failed to connect to Redis, keeping visit records in memory");
                Arc::new(LocalVisitStore::new())
            }
        }
    } else {
        Arc::new(LocalVisitStore::new())
    };

    let evaluator = Arc::new(RedirectEvaluator::new(
        rules.clone(),
        visits.clone(),
        resolver,
        &config.evaluator,
    ));

    let state = AppState {
        evaluator,
        rules,
        pages,
        visits,
        identity: Arc::new(VisitorIdentityProvider::new(config.identity.clone())),
        node_id: config.node_id.clone(),
        exempt_admins: config.evaluator.exempt_admins,
        start_time: Instant::now(),
    };

    let api_server = ApiServer::new(config.clone(), state);

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Offer Redirects is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
