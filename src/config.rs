use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
///
/// Built once at startup and shared by reference afterwards; nothing mutates it.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub lineage: LineageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Authoritative catalog store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Traversal and validation bounds
#[derive(Debug, Clone, Deserialize)]
pub struct LineageConfig {
    #[serde(default = "default_max_depth")]
    pub default_max_depth: usize,
    #[serde(default = "default_max_depth_limit")]
    pub max_depth_limit: usize,
    #[serde(default = "default_max_search_limit")]
    pub max_search_limit: usize,
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            default_max_depth: default_max_depth(),
            max_depth_limit: default_max_depth_limit(),
            max_search_limit: default_max_search_limit(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_max_depth() -> usize {
    5
}

fn default_max_depth_limit() -> usize {
    20
}

fn default_max_search_limit() -> usize {
    100
}

fn default_page_size() -> usize {
    50
}

fn default_max_page_size() -> usize {
    500
}

/// Which cache store backs the cache-aside layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Memory,
    None,
}

/// Cache-aside configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_backend")]
    pub backend: CacheBackendKind,
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default)]
    pub ttl: TtlConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            backend: default_cache_backend(),
            capacity: default_cache_capacity(),
            key_prefix: default_key_prefix(),
            ttl: TtlConfig::default(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_backend() -> CacheBackendKind {
    CacheBackendKind::Memory
}

fn default_cache_capacity() -> usize {
    10_000
}

fn default_key_prefix() -> String {
    "ol".to_string()
}

/// Expiry per TTL class, in seconds
#[derive(Debug, Clone, Deserialize)]
pub struct TtlConfig {
    #[serde(default = "default_lineage_graph_ttl")]
    pub lineage_graph_secs: u64,
    #[serde(default = "default_entity_listing_ttl")]
    pub entity_listing_secs: u64,
    #[serde(default = "default_statistics_ttl")]
    pub statistics_secs: u64,
    #[serde(default = "default_schema_definition_ttl")]
    pub schema_definition_secs: u64,
    #[serde(default = "default_search_result_ttl")]
    pub search_result_secs: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            lineage_graph_secs: default_lineage_graph_ttl(),
            entity_listing_secs: default_entity_listing_ttl(),
            statistics_secs: default_statistics_ttl(),
            schema_definition_secs: default_schema_definition_ttl(),
            search_result_secs: default_search_result_ttl(),
        }
    }
}

fn default_lineage_graph_ttl() -> u64 {
    300
}

fn default_entity_listing_ttl() -> u64 {
    600
}

fn default_statistics_ttl() -> u64 {
    60
}

fn default_schema_definition_ttl() -> u64 {
    1800
}

fn default_search_result_ttl() -> u64 {
    120
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in LINEAGE_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("LINEAGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::from_toml_str(&config_str)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).context("Failed to parse config.toml")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        let lineage = &self.lineage;
        if lineage.max_depth_limit == 0 {
            anyhow::bail!("lineage.max_depth_limit must be greater than 0");
        }
        if lineage.default_max_depth == 0 || lineage.default_max_depth > lineage.max_depth_limit {
            anyhow::bail!(
                "lineage.default_max_depth must be between 1 and max_depth_limit ({})",
                lineage.max_depth_limit
            );
        }
        if lineage.max_search_limit == 0 {
            anyhow::bail!("lineage.max_search_limit must be greater than 0");
        }
        if lineage.default_page_size == 0 || lineage.default_page_size > lineage.max_page_size {
            anyhow::bail!("lineage.default_page_size must be between 1 and max_page_size");
        }

        let cache = &self.cache;
        if cache.key_prefix.is_empty() {
            anyhow::bail!("cache.key_prefix must not be empty");
        }
        if cache.key_prefix.contains(':') || cache.key_prefix.contains('|') {
            anyhow::bail!("cache.key_prefix must not contain ':' or '|'");
        }
        if cache.enabled && cache.backend == CacheBackendKind::Memory && cache.capacity == 0 {
            anyhow::bail!("cache.capacity must be greater than 0 for the memory backend");
        }

        let ttl = &cache.ttl;
        for (name, secs) in [
            ("lineage_graph_secs", ttl.lineage_graph_secs),
            ("entity_listing_secs", ttl.entity_listing_secs),
            ("statistics_secs", ttl.statistics_secs),
            ("schema_definition_secs", ttl.schema_definition_secs),
            ("search_result_secs", ttl.search_result_secs),
        ] {
            if secs == 0 {
                anyhow::bail!("cache.ttl.{} must be greater than 0", name);
            }
        }

        if self.http_server.request_timeout_ms == 0 {
            anyhow::bail!("http_server.request_timeout_ms must be greater than 0");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.catalog.db_path
    }

    /// Per-request deadline applied at the HTTP boundary
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.http_server.request_timeout_ms)
    }
}
