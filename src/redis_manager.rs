// Redis Manager - shared account cache for multi-instance deployments
// Implements the AccountCache tier on top of Redis with per-key TTL

use crate::settings::RedisSettings;
use crate::types::conversions::address_to_string;
use anyhow::Result;
#[cfg(feature = "redis")]
use anyhow::Context;
use ethers::types::Address;
#[cfg(feature = "redis")]
use log::{debug, info};
#[cfg(feature = "redis")]
use redis::aio::ConnectionManager;
#[cfg(feature = "redis")]
use redis::{AsyncCommands, Client};

#[cfg(feature = "redis")]
use crate::cache::AccountCache;
#[cfg(feature = "redis")]
use crate::types::Account;
#[cfg(feature = "redis")]
use async_trait::async_trait;

/// Configuration for Redis connection and caching behavior.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub account_ttl: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            account_ttl: 3_600,
        }
    }
}

impl From<&RedisSettings> for RedisConfig {
    fn from(settings: &RedisSettings) -> Self {
        Self {
            url: settings.url.clone(),
            account_ttl: settings.account_ttl_seconds,
        }
    }
}

fn account_key(address: &Address) -> String {
    format!("account:{}", address_to_string(*address))
}

fn known_key(address: &Address) -> String {
    format!("account:known:{}", address_to_string(*address))
}

/// Redis-backed account cache.
#[cfg(feature = "redis")]
pub struct RedisManager {
    conn: ConnectionManager,
    config: RedisConfig,
}

#[cfg(not(feature = "redis"))]
pub struct RedisManager {
    config: RedisConfig,
    // NOTE: conn field removed when redis feature is disabled
    _phantom: std::marker::PhantomData<()>,
}

impl RedisManager {
    #[cfg(feature = "redis")]
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str()).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        info!("✅ Redis Manager connected to {}", config.url);

        Ok(Self { conn, config })
    }

    #[cfg(not(feature = "redis"))]
    pub async fn new(_config: RedisConfig) -> Result<Self> {
        Err(anyhow::anyhow!(
            "Redis feature not enabled. Enable with 'redis' feature flag."
        ))
    }

    /// Create with default localhost config
    pub async fn new_default() -> Result<Self> {
        Self::new(RedisConfig::default()).await
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Test Redis connection
    #[cfg(feature = "redis")]
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis health check failed")?;

        if pong == "PONG" {
            Ok(())
        } else {
            anyhow::bail!("Unexpected Redis response: {}", pong)
        }
    }

    #[cfg(not(feature = "redis"))]
    pub async fn health_check(&self) -> Result<()> {
        Err(anyhow::anyhow!("Redis feature not enabled"))
    }

    /// Remove every cached account copy and known flag.
    #[cfg(feature = "redis")]
    pub async fn clear_account_cache(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn
            .keys("account:*")
            .await
            .context("Failed to get account cache keys")?;

        if !keys.is_empty() {
            conn.del::<_, ()>(keys)
                .await
                .context("Failed to clear account cache")?;
            info!("🗑️  Cleared account cache");
        }
        Ok(())
    }

    #[cfg(not(feature = "redis"))]
    pub async fn clear_account_cache(&self) -> Result<()> {
        Ok(()) // Redis not available - no-op
    }
}

#[cfg(feature = "redis")]
#[async_trait]
impl AccountCache for RedisManager {
    async fn pull_account(&self, address: &Address) -> Result<Option<Account>> {
        let mut conn = self.conn.clone();
        let bytes: Option<Vec<u8>> = conn
            .get(account_key(address))
            .await
            .context("Failed to get account from cache")?;

        match bytes {
            Some(bytes) => {
                let account: Account = bincode::deserialize(bytes.as_slice())
                    .context("Failed to deserialize account with bincode")?;
                crate::metrics::increment_cache_hit("redis_account");
                Ok(Some(account))
            }
            None => {
                crate::metrics::increment_cache_miss("redis_account");
                Ok(None)
            }
        }
    }

    async fn push_account(&self, account: &Account) -> Result<()> {
        let mut merged = account.clone();
        // a corrupt or expired copy is simply overwritten
        if let Ok(Some(cached)) = self.pull_account(&account.address).await {
            merged = cached;
            merged.merge_from(account);
        }
        let bytes = bincode::serialize(&merged).context("Failed to serialize account with bincode")?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(account_key(&account.address), bytes, self.config.account_ttl)
            .await
            .context("Failed to cache account")?;
        debug!("💾 Cached account {:?}", account.address);
        Ok(())
    }

    async fn check_account_known(&self, address: &Address) -> Result<Option<bool>> {
        let mut conn = self.conn.clone();
        let flag: Option<u8> = conn
            .get(known_key(address))
            .await
            .context("Failed to get known flag from cache")?;
        Ok(flag.map(|_| true))
    }

    async fn push_account_known(&self, address: &Address) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(known_key(address), 1u8, self.config.account_ttl)
            .await
            .context("Failed to cache known flag")?;
        Ok(())
    }
}
