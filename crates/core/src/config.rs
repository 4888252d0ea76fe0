use crate::pages::PageStatus;
use serde::Deserialize;

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `OFFER_REDIRECTS__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub pages: Vec<PageConfig>,
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

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Lifetime of an L1 entry; bounds how long a reset on another node
    /// takes to reach this one.
    #[serde(default = "default_l1_ttl_secs")]
    pub l1_ttl_secs: u64,
    #[serde(default = "default_l1_max_entries")]
    pub l1_max_entries: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvaluatorConfig {
    /// Upper bound on a single visit-store call before failing open.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    #[serde(default = "default_exempt_admins")]
    pub exempt_admins: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "default_token_prefix")]
    pub token_prefix: String,
    #[serde(default = "default_token_length")]
    pub token_length: usize,
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RulesConfig {
    /// JSON file holding both rule lists. In-memory only when unset.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageConfig {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    pub permalink: String,
    #[serde(default)]
    pub status: PageStatus,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
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
fn default_redis_enabled() -> bool {
    false
}
fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}
fn default_key_prefix() -> String {
    "offer_redirect_visit".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_l1_ttl_secs() -> u64 {
    30
}
fn default_l1_max_entries() -> usize {
    100_000
}
fn default_store_timeout_ms() -> u64 {
    50
}
fn default_exempt_admins() -> bool {
    true
}
fn default_cookie_name() -> String {
    "offer_redirect_uid".to_string()
}
fn default_token_prefix() -> String {
    "anon_".to_string()
}
fn default_token_length() -> usize {
    32
}
fn default_token_ttl_days() -> u32 {
    3650
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

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
            connect_timeout_ms: default_connect_timeout_ms(),
            l1_ttl_secs: default_l1_ttl_secs(),
            l1_max_entries: default_l1_max_entries(),
        }
    }
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: default_store_timeout_ms(),
            exempt_admins: default_exempt_admins(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            token_prefix: default_token_prefix(),
            token_length: default_token_length(),
            token_ttl_days: default_token_ttl_days(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            redis: RedisConfig::default(),
            evaluator: EvaluatorConfig::default(),
            identity: IdentityConfig::default(),
            rules: RulesConfig::default(),
            pages: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional config file, then environment variables.
    pub fn load(file: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("OFFER_REDIRECTS")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
