//! # Store Trait
//!
//! Durable tier. The store owns every fact that cannot be recomputed cheaply
//! from the node: known accounts, contract creation evidence, per-account
//! transaction indices, swap history and the volume aggregates derived from
//! it.
//!
//! ## Implementations
//!
//! - [`crate::database::PgStore`]: PostgreSQL via `sqlx`.
//!
//! ## Swap recording
//!
//! `add_swap` must be idempotent on the swap's natural key
//! `(pair, tx_hash, log_index)`: a second delivery of the same swap returns
//! `Ok(false)` and leaves the volume aggregates untouched.

use anyhow::Result;
use async_trait::async_trait;
use ethers::types::{Address, H256};

use crate::types::{Account, Swap, SwapVolume, TransactionHashList};
use crate::volume::{VolumeResolution, VolumeWindow};

#[async_trait]
pub trait Store: Send + Sync {
    /// Stored account record, `None` if the address was never added.
    async fn account(&self, address: &Address) -> Result<Option<Account>>;

    /// Hash of the transaction that deployed a contract at `address`.
    async fn contract_transaction(&self, address: &Address) -> Result<Option<H256>>;

    /// Insert or refresh an account. A stored contract stays a contract.
    async fn add_account(&self, account: &Account) -> Result<()>;

    async fn is_account_known(&self, address: &Address) -> Result<bool>;

    async fn account_count(&self) -> Result<u64>;

    /// Move the account's last activity forward to `ts` (unix seconds).
    async fn account_mark_activity(&self, address: &Address, ts: u64) -> Result<()>;

    /// One page of the account's transaction hashes.
    ///
    /// `cursor` is the opaque token from a previous page. A positive `count`
    /// pages newest-first, a negative one oldest-first.
    async fn account_transactions(
        &self,
        address: &Address,
        cursor: Option<&str>,
        count: i32,
    ) -> Result<TransactionHashList>;

    /// Append a swap and fold it into the volume aggregates.
    ///
    /// Returns `false` when the swap was already recorded.
    async fn add_swap(&self, swap: &Swap) -> Result<bool>;

    /// Highest block with a recorded swap, `0` when none.
    async fn last_known_swap_block(&self) -> Result<u64>;

    /// Total volume of a pair inside the window.
    async fn swap_volume(&self, pair: &Address, window: VolumeWindow) -> Result<SwapVolume>;

    /// Per-bucket volumes of a pair inside the window, oldest bucket first.
    /// Buckets without swaps are omitted.
    async fn swap_time_volumes(
        &self,
        pair: &Address,
        resolution: VolumeResolution,
        window: VolumeWindow,
    ) -> Result<Vec<SwapVolume>>;
}
