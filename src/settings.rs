use config::{Config, ConfigError, File};
use ethers::types::Address;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Rpc {
    #[serde(default = "default_rpc_http_url")]
    pub http_url: String,
    #[serde(default = "default_rpc_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Requests per second allowed against the node; unlimited when unset.
    #[serde(default)]
    pub qps_limit: Option<u32>,
}

fn default_rpc_http_url() -> String {
    "http://localhost:18545".to_string()
}
fn default_rpc_timeout_seconds() -> u64 {
    10
}

impl Default for Rpc {
    fn default() -> Self {
        Self {
            http_url: default_rpc_http_url(),
            timeout_seconds: default_rpc_timeout_seconds(),
            qps_limit: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Contracts {
    #[serde(default)]
    pub uniswap_factory: String,
    #[serde(default)]
    pub uniswap_router: String,
    #[serde(default)]
    pub fmint_address_provider: String,
}

impl Contracts {
    pub fn uniswap_factory_address(&self) -> Result<Address, ConfigError> {
        parse_contract("contracts.uniswap_factory", &self.uniswap_factory)
    }

    pub fn uniswap_router_address(&self) -> Result<Address, ConfigError> {
        parse_contract("contracts.uniswap_router", &self.uniswap_router)
    }

    pub fn fmint_address_provider_address(&self) -> Result<Address, ConfigError> {
        parse_contract(
            "contracts.fmint_address_provider",
            &self.fmint_address_provider,
        )
    }
}

fn parse_contract(key: &str, raw: &str) -> Result<Address, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::NotFound(key.to_string()));
    }
    trimmed
        .parse()
        .map_err(|e| ConfigError::Message(format!("{} is not an address: {}", key, e)))
}

#[derive(Debug, Deserialize, Clone)]
pub struct Database {
    /// Falls back to the `DATABASE_URL` environment variable.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_db_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_seconds")]
    pub acquire_timeout_seconds: u64,
    #[serde(default = "default_db_connect_attempts")]
    pub connect_attempts: u32,
}

fn default_db_max_connections() -> u32 {
    5
}
fn default_db_acquire_timeout_seconds() -> u64 {
    5
}
fn default_db_connect_attempts() -> u32 {
    10
}

impl Default for Database {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_db_max_connections(),
            acquire_timeout_seconds: default_db_acquire_timeout_seconds(),
            connect_attempts: default_db_connect_attempts(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    #[serde(default = "default_cache_max_accounts")]
    pub max_accounts: usize,
    #[serde(default = "default_cache_max_known_flags")]
    pub max_known_flags: usize,
}

fn default_cache_max_accounts() -> usize {
    20_000
}
fn default_cache_max_known_flags() -> usize {
    100_000
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_accounts: default_cache_max_accounts(),
            max_known_flags: default_cache_max_known_flags(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisSettings {
    /// Use Redis instead of the in-process cache (requires the `redis` feature).
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_redis_account_ttl_seconds")]
    pub account_ttl_seconds: u64,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}
fn default_redis_account_ttl_seconds() -> u64 {
    3_600
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_redis_url(),
            account_ttl_seconds: default_redis_account_ttl_seconds(),
        }
    }
}

/// Deadlines and limits applied by the repository to every tier call.
#[derive(Debug, Deserialize, Clone)]
pub struct RepositorySettings {
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    #[serde(default = "default_node_timeout_ms")]
    pub node_timeout_ms: u64,
    #[serde(default = "default_cache_timeout_ms")]
    pub cache_timeout_ms: u64,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: i32,
}

fn default_store_timeout_ms() -> u64 {
    2_000
}
fn default_node_timeout_ms() -> u64 {
    5_000
}
fn default_cache_timeout_ms() -> u64 {
    250
}
fn default_max_page_size() -> i32 {
    100
}

impl RepositorySettings {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout_ms)
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            store_timeout_ms: default_store_timeout_ms(),
            node_timeout_ms: default_node_timeout_ms(),
            cache_timeout_ms: default_cache_timeout_ms(),
            max_page_size: default_max_page_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines (requires the `observability` feature).
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub rpc: Rpc,
    #[serde(default)]
    pub contracts: Contracts,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub redis: RedisSettings,
    #[serde(default)]
    pub repository: RepositorySettings,
    #[serde(default)]
    pub log: LogSettings,
}

impl Settings {
    /// Loads `Config.toml` from the working directory if present, then applies
    /// environment overrides.
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("Config").required(false))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Loads settings from an explicit file; the file must exist.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let name = path
            .to_str()
            .ok_or_else(|| ConfigError::Message(format!("non UTF-8 path {:?}", path)))?;
        let s = Config::builder()
            .add_source(File::with_name(name).required(true))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env("REPO_RPC_HTTP_URL") {
            self.rpc.http_url = url;
        }
        if let Some(url) = non_empty_env("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(url) = non_empty_env("REPO_REDIS_URL") {
            self.redis.url = url;
        }
        if let Some(raw) = non_empty_env("REPO_NODE_TIMEOUT_MS") {
            match raw.parse() {
                Ok(ms) => self.repository.node_timeout_ms = ms,
                Err(e) => eprintln!("Failed to parse REPO_NODE_TIMEOUT_MS '{}': {}", raw, e),
            }
        }
    }

    pub fn database_url(&self) -> Result<String, ConfigError> {
        self.database
            .url
            .clone()
            .ok_or_else(|| ConfigError::NotFound("database.url / DATABASE_URL".to_string()))
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
