//! # Tiered Repository
//!
//! Single query interface over the three backing tiers:
//!
//! ```text
//! caller ──> TieredRepository ──> AccountCache   (copies, may evict at any time)
//!                              ├─> Store          (durable facts, swaps, volumes)
//!                              └─> NodeClient     (live chain state)
//! ```
//!
//! ## Resolution policy
//!
//! - **Accounts**: Cache, then Store, then a synthesized stub. Resolved
//!   accounts are written back to the cache.
//! - **Pool state**: always live from the node, never cached.
//! - **Swaps and volumes**: Store only; the store keeps the aggregates.
//! - **DeFi / ERC20**: node pass-through.
//!
//! Tiers are consulted strictly in that order inside one call. Cache failures
//! are logged and treated as misses. Store failures surface on primary reads
//! and on every write. Node failures always surface.
//!
//! Every Store and Node call is bounded by the deadline in
//! [`RepositoryConfig`]; an expired deadline surfaces as
//! [`RepositoryError::DeadlineExceeded`].

mod account;
mod defi;
mod uniswap;

use crate::cache::AccountCache;
use crate::error::{RepositoryError, RepositoryResult, Tier};
use crate::metrics;
use crate::node_client::NodeClient;
use crate::settings::RepositorySettings;
use crate::store::Store;
use ethers::types::Address;
use log::warn;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Deadlines and limits applied by [`TieredRepository`].
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    pub store_timeout: Duration,
    pub node_timeout: Duration,
    pub cache_timeout: Duration,
    /// Largest page `account_transactions` hands out.
    pub max_page_size: i32,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self::from(&RepositorySettings::default())
    }
}

impl From<&RepositorySettings> for RepositoryConfig {
    fn from(settings: &RepositorySettings) -> Self {
        Self {
            store_timeout: settings.store_timeout(),
            node_timeout: settings.node_timeout(),
            cache_timeout: settings.cache_timeout(),
            max_page_size: settings.max_page_size.max(1),
        }
    }
}

/// A resolved value with where it came from.
///
/// `degraded` is set when an optional enrichment step failed and the value is
/// a best-effort answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub value: T,
    pub source: Tier,
    pub degraded: bool,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: Tier, degraded: bool) -> Self {
        Self {
            value,
            source,
            degraded,
        }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

#[derive(Clone)]
pub struct TieredRepository {
    node: Arc<dyn NodeClient>,
    store: Arc<dyn Store>,
    cache: Arc<dyn AccountCache>,
    config: RepositoryConfig,
}

impl TieredRepository {
    pub fn new(
        node: Arc<dyn NodeClient>,
        store: Arc<dyn Store>,
        cache: Arc<dyn AccountCache>,
        config: RepositoryConfig,
    ) -> Self {
        metrics::describe_metrics();
        Self {
            node,
            store,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    async fn node_call<T, F>(&self, op: &'static str, call: F) -> RepositoryResult<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        self.tier_call(Tier::Node, self.config.node_timeout, op, call)
            .await
    }

    async fn store_call<T, F>(&self, op: &'static str, call: F) -> RepositoryResult<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        self.tier_call(Tier::Store, self.config.store_timeout, op, call)
            .await
    }

    async fn tier_call<T, F>(
        &self,
        tier: Tier,
        timeout: Duration,
        op: &'static str,
        call: F,
    ) -> RepositoryResult<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, call).await;
        metrics::record_tier_call(tier, op, started.elapsed());

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => {
                metrics::increment_tier_error(tier, op, "error");
                Err(RepositoryError::TierUnavailable { tier, op, source })
            }
            Err(_) => {
                metrics::increment_tier_error(tier, op, "timeout");
                Err(RepositoryError::DeadlineExceeded { tier, op, timeout })
            }
        }
    }

    /// Runs a cache call; failures and timeouts come back as `None`.
    async fn cache_call<T, F>(&self, op: &'static str, call: F) -> Option<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.config.cache_timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                metrics::increment_tier_error(Tier::Cache, op, "error");
                warn!("cache {} failed, falling through: {:#}", op, e);
                None
            }
            Err(_) => {
                metrics::increment_tier_error(Tier::Cache, op, "timeout");
                warn!(
                    "cache {} did not answer within {:?}, falling through",
                    op, self.config.cache_timeout
                );
                None
            }
        }
    }
}

/// Rejects the zero address, which callers use for "no address".
fn require_address(address: &Address, what: &str) -> RepositoryResult<()> {
    if address.is_zero() {
        return Err(RepositoryError::invalid(format!("{} must not be empty", what)));
    }
    Ok(())
}
