use crate::metrics;
use crate::settings::CacheSettings;
use crate::types::Account;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use ethers::types::Address;
use log::debug;
use std::sync::Arc;

/// Fast tier holding copies of accounts and known-address flags.
///
/// Implementations may evict at any time. Errors are reported to the caller,
/// which treats them as misses; the cache is never the only copy of anything.
#[async_trait]
pub trait AccountCache: Send + Sync {
    async fn pull_account(&self, address: &Address) -> Result<Option<Account>>;

    /// Store a copy, merging into any cached one: contract classification is
    /// sticky and activity only moves forward.
    async fn push_account(&self, account: &Account) -> Result<()>;

    /// `Some(true)` when the address is known, `None` when the cache cannot
    /// tell. A cached `Some(false)` is never produced by the in-process cache.
    async fn check_account_known(&self, address: &Address) -> Result<Option<bool>>;

    async fn push_account_known(&self, address: &Address) -> Result<()>;
}

#[derive(Debug, Clone)]
/// In-process cache for account resolution.
///
/// ## Features
///
/// - **Lock-Free**: `DashMap` shards instead of a global lock
/// - **Bounded**: manual eviction once a map outgrows its configured size
/// - **Thread-Safe**: concurrent access via `Arc`
pub struct CacheManager {
    pub account_cache: Arc<DashMap<Address, Account>>,
    // presence means known; addresses never become unknown again
    pub known_cache: Arc<DashMap<Address, ()>>,
    account_cache_max_size: usize,
    known_cache_max_size: usize,
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(&CacheSettings::default())
    }
}

impl CacheManager {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            account_cache: Arc::new(DashMap::new()),
            known_cache: Arc::new(DashMap::new()),
            account_cache_max_size: settings.max_accounts.max(1),
            known_cache_max_size: settings.max_known_flags.max(1),
        }
    }

    pub fn get_account(&self, address: &Address) -> Option<Account> {
        match self.account_cache.get(address) {
            Some(acc) => {
                metrics::increment_cache_hit("account");
                Some(acc.clone())
            }
            None => {
                metrics::increment_cache_miss("account");
                None
            }
        }
    }

    /// Store or merge an account copy. A cached contract is never replaced by
    /// a wallet view of the same address; see [`Account::merge_from`].
    pub fn put_account(&self, account: Account) {
        self.account_cache
            .entry(account.address)
            .and_modify(|cached| cached.merge_from(&account))
            .or_insert(account);
        self.maybe_evict_accounts();
        self.record_cache_sizes();
    }

    pub fn is_known(&self, address: &Address) -> bool {
        let known = self.known_cache.contains_key(address);
        if known {
            metrics::increment_cache_hit("account_known");
        } else {
            metrics::increment_cache_miss("account_known");
        }
        known
    }

    pub fn mark_known(&self, address: Address) {
        self.known_cache.insert(address, ());
        self.maybe_evict_known();
        self.record_cache_sizes();
    }

    /// Drop a cached account copy. The known flag is left alone.
    pub fn evict_account(&self, address: &Address) -> bool {
        self.account_cache.remove(address).is_some()
    }

    pub fn account_count(&self) -> usize {
        self.account_cache.len()
    }

    pub fn known_count(&self) -> usize {
        self.known_cache.len()
    }

    fn record_cache_sizes(&self) {
        metrics::set_cache_size("account", self.account_cache.len() as f64);
        metrics::set_cache_size("account_known", self.known_cache.len() as f64);
    }

    fn maybe_evict_accounts(&self) {
        let removed = evict_overflow(&self.account_cache, self.account_cache_max_size);
        if removed > 0 {
            debug!(
                "Evicted {} entries from account_cache (size: {})",
                removed,
                self.account_cache.len()
            );
        }
    }

    fn maybe_evict_known(&self) {
        let removed = evict_overflow(&self.known_cache, self.known_cache_max_size);
        if removed > 0 {
            debug!(
                "Evicted {} entries from known_cache (size: {})",
                removed,
                self.known_cache.len()
            );
        }
    }
}

// Removes arbitrary entries until the map is back under `max_size`.
fn evict_overflow<V>(map: &DashMap<Address, V>, max_size: usize) -> usize {
    if map.len() <= max_size {
        return 0;
    }
    let to_remove = map.len() - max_size;
    // collect first: removing while iterating a DashMap shard deadlocks
    let victims: Vec<Address> = map.iter().take(to_remove).map(|e| *e.key()).collect();
    let mut removed = 0;
    for key in victims {
        if map.remove(&key).is_some() {
            removed += 1;
        }
    }
    removed
}

#[async_trait]
impl AccountCache for CacheManager {
    async fn pull_account(&self, address: &Address) -> Result<Option<Account>> {
        Ok(self.get_account(address))
    }

    async fn push_account(&self, account: &Account) -> Result<()> {
        self.put_account(account.clone());
        Ok(())
    }

    async fn check_account_known(&self, address: &Address) -> Result<Option<bool>> {
        Ok(self.is_known(address).then_some(true))
    }

    async fn push_account_known(&self, address: &Address) -> Result<()> {
        self.mark_known(*address);
        Ok(())
    }
}
