use super::{require_address, Resolved, TieredRepository};
use crate::error::{RepositoryError, RepositoryResult, Tier};
use crate::metrics;
use crate::types::conversions::decode_cursor;
use crate::types::{Account, TransactionHashList};
use ethers::types::{Address, U256};
use log::{debug, warn};

impl TieredRepository {
    /// Resolve an account: Cache, then Store, then a synthesized stub.
    ///
    /// An address nobody has recorded yet is not an error; it resolves to a
    /// wallet stub, enriched with contract creation evidence when the store
    /// has it. If that enrichment lookup fails the stub is still returned,
    /// flagged `degraded`. A synthesized stub reports [`Tier::Store`], the
    /// last tier consulted.
    pub async fn account(&self, address: &Address) -> RepositoryResult<Resolved<Account>> {
        require_address(address, "account address")?;

        if let Some(Some(account)) = self
            .cache_call("pull_account", self.cache.pull_account(address))
            .await
        {
            return Ok(Resolved::new(account, Tier::Cache, false));
        }

        let stored = self
            .store_call("account", self.store.account(address))
            .await?;

        let (account, degraded) = match stored {
            Some(account) => (account, false),
            None => self.synthesize_account(address).await,
        };

        // best effort; the next call falls through to the store again.
        // A degraded stub may be missing contract evidence, so it stays uncached.
        if !degraded {
            self.cache_call("push_account", self.cache.push_account(&account))
                .await;
        }

        Ok(Resolved::new(account, Tier::Store, degraded))
    }

    async fn synthesize_account(&self, address: &Address) -> (Account, bool) {
        let stub = Account::stub(*address);
        match self
            .store_call(
                "contract_transaction",
                self.store.contract_transaction(address),
            )
            .await
        {
            Ok(Some(tx)) => {
                debug!("Classified {:?} as contract created by {:?}", address, tx);
                (stub.with_contract_tx(tx), false)
            }
            Ok(None) => (stub, false),
            Err(e) => {
                warn!(
                    "Contract lookup for {:?} failed, serving wallet stub: {}",
                    address, e
                );
                metrics::increment_degraded("account");
                (stub, true)
            }
        }
    }

    /// Whether the address has ever been recorded.
    ///
    /// Fails closed: a store error answers `false`.
    pub async fn account_is_known(&self, address: &Address) -> bool {
        if address.is_zero() {
            return false;
        }

        if let Some(Some(true)) = self
            .cache_call("check_account_known", self.cache.check_account_known(address))
            .await
        {
            return true;
        }

        match self
            .store_call("is_account_known", self.store.is_account_known(address))
            .await
        {
            Ok(true) => {
                self.cache_call("push_account_known", self.cache.push_account_known(address))
                    .await;
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!("Known-account check for {:?} failed: {}", address, e);
                false
            }
        }
    }

    /// Record an account. The store write completes before the cache is touched.
    ///
    /// The cache is refreshed with the record read back from the store, which
    /// already holds the merged view. Caches merge on push, so a concurrent
    /// reader writing back an older copy cannot demote a contract.
    pub async fn add_account(&self, account: &Account) -> RepositoryResult<()> {
        require_address(&account.address, "account address")?;

        self.store_call("add_account", self.store.add_account(account))
            .await?;

        self.cache_call(
            "push_account_known",
            self.cache.push_account_known(&account.address),
        )
        .await;

        match self
            .store_call("account", self.store.account(&account.address))
            .await
        {
            Ok(Some(stored)) => {
                self.cache_call("push_account", self.cache.push_account(&stored))
                    .await;
            }
            Ok(None) => {}
            Err(e) => warn!(
                "Read-back of {:?} after write failed, cache left as is: {}",
                account.address, e
            ),
        }
        Ok(())
    }

    pub async fn account_mark_activity(&self, account: &Account, ts: u64) -> RepositoryResult<()> {
        require_address(&account.address, "account address")?;
        self.store_call(
            "account_mark_activity",
            self.store.account_mark_activity(&account.address, ts),
        )
        .await
    }

    /// Native balance, live from the node.
    pub async fn account_balance(&self, account: &Account) -> RepositoryResult<U256> {
        require_address(&account.address, "account address")?;
        self.node_call("account_balance", self.node.account_balance(account.address))
            .await
    }

    pub async fn account_nonce(&self, account: &Account) -> RepositoryResult<u64> {
        require_address(&account.address, "account address")?;
        self.node_call("account_nonce", self.node.account_nonce(account.address))
            .await
    }

    /// One page of the account's transaction hashes.
    ///
    /// `count > 0` pages newest-first and `count < 0` oldest-first; the
    /// magnitude is capped at `max_page_size`.
    pub async fn account_transactions(
        &self,
        account: &Account,
        cursor: Option<&str>,
        count: i32,
    ) -> RepositoryResult<TransactionHashList> {
        require_address(&account.address, "account address")?;
        if count == 0 {
            return Err(RepositoryError::invalid("page size must not be zero"));
        }
        if let Some(cursor) = cursor {
            decode_cursor(cursor).map_err(|e| RepositoryError::invalid(e.to_string()))?;
        }

        let count = clamp_page(count, self.config.max_page_size);
        self.store_call(
            "account_transactions",
            self.store
                .account_transactions(&account.address, cursor, count),
        )
        .await
    }

    /// Number of accounts recorded in the store.
    pub async fn accounts_active(&self) -> RepositoryResult<u64> {
        self.store_call("account_count", self.store.account_count())
            .await
    }
}

fn clamp_page(count: i32, max: i32) -> i32 {
    let magnitude = count.unsigned_abs().min(max.max(1) as u32) as i32;
    if count < 0 {
        -magnitude
    } else {
        magnitude
    }
}
