//! In-memory tiers with call counters and failure switches.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chain_state_repository::types::conversions::{decode_cursor, encode_cursor};
use chain_state_repository::types::{
    Account, DefiSettings, DefiToken, DefiTokenType, Erc20Token, FMintAccount, Swap, SwapVolume,
    TransactionHashList,
};
use chain_state_repository::{
    AccountCache, CacheManager, NodeClient, PairSnapshot, RepositoryConfig, Store, TieredRepository,
    VolumeResolution, VolumeWindow,
};
use ethers::types::{Address, H256, U256};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn addr(s: &str) -> Address {
    Address::from_str(s).unwrap()
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

async fn hang_if(flag: &AtomicBool) {
    if flag.load(Ordering::SeqCst) {
        std::future::pending::<()>().await;
    }
}

// --- Store ---

#[derive(Default)]
pub struct FakeStore {
    pub accounts: Mutex<HashMap<Address, Account>>,
    pub contracts: Mutex<HashMap<Address, H256>>,
    pub transactions: Mutex<HashMap<Address, Vec<(i64, H256)>>>,
    pub swaps: Mutex<BTreeMap<(Address, H256, u64), Swap>>,
    pub last_swap_block: Mutex<u64>,

    pub calls: AtomicUsize,
    pub account_reads: AtomicUsize,
    pub enrichment_calls: AtomicUsize,
    /// Fails `account` and `is_account_known`.
    pub fail_reads: AtomicBool,
    /// Fails `contract_transaction`.
    pub fail_enrichment: AtomicBool,
    /// Fails every write.
    pub fail_writes: AtomicBool,
    pub hang: AtomicBool,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn insert_contract(&self, address: Address, tx: H256) {
        self.contracts.lock().unwrap().insert(address, tx);
    }

    pub fn insert_transaction(&self, address: Address, ordinal: i64, tx: H256) {
        self.transactions
            .lock()
            .unwrap()
            .entry(address)
            .or_default()
            .push((ordinal, tx));
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        hang_if(&self.hang).await;
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("store write failed"));
        }
        Ok(())
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("store read failed"));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn account(&self, address: &Address) -> Result<Option<Account>> {
        self.enter().await;
        self.account_reads.fetch_add(1, Ordering::SeqCst);
        self.check_read()?;
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }

    async fn contract_transaction(&self, address: &Address) -> Result<Option<H256>> {
        self.enter().await;
        self.enrichment_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_enrichment.load(Ordering::SeqCst) {
            return Err(anyhow!("contract index unavailable"));
        }
        Ok(self.contracts.lock().unwrap().get(address).copied())
    }

    async fn add_account(&self, account: &Account) -> Result<()> {
        self.enter().await;
        self.check_write()?;
        let mut accounts = self.accounts.lock().unwrap();
        accounts
            .entry(account.address)
            .and_modify(|stored| stored.merge_from(account))
            .or_insert_with(|| account.clone());
        Ok(())
    }

    async fn is_account_known(&self, address: &Address) -> Result<bool> {
        self.enter().await;
        self.check_read()?;
        Ok(self.accounts.lock().unwrap().contains_key(address))
    }

    async fn account_count(&self) -> Result<u64> {
        self.enter().await;
        Ok(self.accounts.lock().unwrap().len() as u64)
    }

    async fn account_mark_activity(&self, address: &Address, ts: u64) -> Result<()> {
        self.enter().await;
        self.check_write()?;
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .entry(*address)
            .or_insert_with(|| Account::stub(*address));
        account.last_activity = Some(account.last_activity.unwrap_or(0).max(ts));
        Ok(())
    }

    async fn account_transactions(
        &self,
        address: &Address,
        cursor: Option<&str>,
        count: i32,
    ) -> Result<TransactionHashList> {
        self.enter().await;
        let mut history = self
            .transactions
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default();
        let total = history.len() as u64;
        let after = cursor.map(decode_cursor).transpose()?;

        history.sort_by_key(|(ordinal, _)| *ordinal);
        if count > 0 {
            history.reverse();
        }
        let remaining: Vec<(i64, H256)> = history
            .into_iter()
            .filter(|(ordinal, _)| match after {
                Some(after) if count > 0 => *ordinal < after,
                Some(after) => *ordinal > after,
                None => true,
            })
            .collect();

        let limit = count.unsigned_abs() as usize;
        let has_more = remaining.len() > limit;
        let page: Vec<(i64, H256)> = remaining.into_iter().take(limit).collect();
        Ok(TransactionHashList {
            hashes: page.iter().map(|(_, hash)| *hash).collect(),
            cursor: if has_more {
                page.last().map(|(ordinal, _)| encode_cursor(*ordinal))
            } else {
                None
            },
            total,
            has_more,
        })
    }

    async fn add_swap(&self, swap: &Swap) -> Result<bool> {
        self.enter().await;
        self.check_write()?;
        let key = (swap.pair, swap.tx_hash, swap.log_index);
        let mut swaps = self.swaps.lock().unwrap();
        if swaps.contains_key(&key) {
            return Ok(false);
        }
        swaps.insert(key, swap.clone());
        let mut last = self.last_swap_block.lock().unwrap();
        *last = (*last).max(swap.block_number);
        Ok(true)
    }

    async fn last_known_swap_block(&self) -> Result<u64> {
        self.enter().await;
        Ok(*self.last_swap_block.lock().unwrap())
    }

    async fn swap_volume(&self, pair: &Address, window: VolumeWindow) -> Result<SwapVolume> {
        self.enter().await;
        let now = now();
        let mut total = SwapVolume::empty(*pair, None, window.from);
        for swap in self.swaps.lock().unwrap().values() {
            if swap.pair == *pair && window.contains(swap.timestamp, now) {
                total.add(swap.volume(), 1);
            }
        }
        Ok(total)
    }

    async fn swap_time_volumes(
        &self,
        pair: &Address,
        resolution: VolumeResolution,
        window: VolumeWindow,
    ) -> Result<Vec<SwapVolume>> {
        self.enter().await;
        let now = now();
        let mut buckets: BTreeMap<i64, SwapVolume> = BTreeMap::new();
        for swap in self.swaps.lock().unwrap().values() {
            if swap.pair == *pair && window.contains(swap.timestamp, now) {
                let start = resolution.bucket_start(swap.timestamp);
                buckets
                    .entry(start)
                    .or_insert_with(|| SwapVolume::empty(*pair, Some(resolution), start))
                    .add(swap.volume(), 1);
            }
        }
        Ok(buckets.into_values().collect())
    }
}

// --- Node ---

pub struct FakeNode {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    pub hang: AtomicBool,
    pub balance: U256,
    pub nonce: u64,
    pub native_token: Address,
    pub pairs: HashMap<(Address, Address), Address>,
    pub tokens: Mutex<Vec<Address>>,
    pub reserves: Mutex<Vec<U256>>,
    pub cumulative_prices: Vec<U256>,
    pub reserves_timestamp: u64,
    pub last_k: U256,
    pub block: u64,
    pub defi_tokens: Vec<DefiToken>,
    pub token_price: U256,
    pub allowance: U256,
}

impl Default for FakeNode {
    fn default() -> Self {
        let token0 = addr("0x00000000000000000000000000000000000000a0");
        let token1 = addr("0x00000000000000000000000000000000000000a1");
        let pair = addr("0x00000000000000000000000000000000000000b0");
        let mut pairs = HashMap::new();
        pairs.insert((token0, token1), pair);
        pairs.insert((token1, token0), pair);

        Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            hang: AtomicBool::new(false),
            balance: U256::from(1_000_000_000_000_000_000u64),
            nonce: 7,
            native_token: addr("0x21be370d5312f44cb42ce377bc9b8a0cef1a4c83"),
            pairs,
            tokens: Mutex::new(vec![token0, token1]),
            reserves: Mutex::new(vec![U256::from(5_000u64), U256::from(10_000u64)]),
            cumulative_prices: vec![U256::from(11u64), U256::from(22u64)],
            reserves_timestamp: 1_700_000_000,
            last_k: U256::from(49_000_000u64),
            block: 64_000_000,
            defi_tokens: vec![DefiToken {
                address: token0,
                name: "Wrapped Fantom".to_string(),
                symbol: "wFTM".to_string(),
                decimals: 18,
                logo_url: String::new(),
                price_oracle: addr("0x00000000000000000000000000000000000000c0"),
                price_decimals: 18,
                is_active: true,
                can_deposit: true,
                can_mint: false,
                can_trade: true,
            }],
            token_price: U256::from(250_000u64),
            allowance: U256::from(77u64),
        }
    }
}

impl FakeNode {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        hang_if(&self.hang).await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("node unreachable"));
        }
        Ok(())
    }
}

#[async_trait]
impl NodeClient for FakeNode {
    async fn account_balance(&self, _address: Address) -> Result<U256> {
        self.enter().await?;
        Ok(self.balance)
    }

    async fn account_nonce(&self, _address: Address) -> Result<u64> {
        self.enter().await?;
        Ok(self.nonce)
    }

    async fn native_token_address(&self) -> Result<Address> {
        self.enter().await?;
        Ok(self.native_token)
    }

    async fn uniswap_pairs(&self) -> Result<Vec<Address>> {
        self.enter().await?;
        let mut pairs: Vec<Address> = self.pairs.values().copied().collect();
        pairs.sort();
        pairs.dedup();
        Ok(pairs)
    }

    async fn uniswap_pair(&self, token_a: Address, token_b: Address) -> Result<Address> {
        self.enter().await?;
        Ok(self
            .pairs
            .get(&(token_a, token_b))
            .copied()
            .unwrap_or_else(Address::zero))
    }

    async fn uniswap_amounts_out(&self, amount_in: U256, path: &[Address]) -> Result<Vec<U256>> {
        self.enter().await?;
        // every hop halves the amount
        let mut amounts = vec![amount_in];
        for _ in 1..path.len() {
            let last = *amounts.last().unwrap_or(&amount_in);
            amounts.push(last / 2);
        }
        Ok(amounts)
    }

    async fn uniswap_amounts_in(&self, amount_out: U256, path: &[Address]) -> Result<Vec<U256>> {
        self.enter().await?;
        let mut amounts = vec![amount_out];
        for _ in 1..path.len() {
            let first = amounts[0];
            amounts.insert(0, first * 2);
        }
        Ok(amounts)
    }

    async fn uniswap_quote_input(
        &self,
        amount_in: U256,
        reserve_my: U256,
        reserve_sibling: U256,
    ) -> Result<U256> {
        self.enter().await?;
        Ok(amount_in * reserve_sibling / reserve_my)
    }

    async fn uniswap_tokens(&self, _pair: Address) -> Result<Vec<Address>> {
        self.enter().await?;
        Ok(self.tokens.lock().unwrap().clone())
    }

    async fn uniswap_reserves(&self, _pair: Address) -> Result<Vec<U256>> {
        self.enter().await?;
        Ok(self.reserves.lock().unwrap().clone())
    }

    async fn uniswap_reserves_timestamp(&self, _pair: Address) -> Result<u64> {
        self.enter().await?;
        Ok(self.reserves_timestamp)
    }

    async fn uniswap_cumulative_prices(&self, _pair: Address) -> Result<Vec<U256>> {
        self.enter().await?;
        Ok(self.cumulative_prices.clone())
    }

    async fn uniswap_last_k_value(&self, _pair: Address) -> Result<U256> {
        self.enter().await?;
        Ok(self.last_k)
    }

    async fn uniswap_pair_snapshot(&self, _pair: Address) -> Result<PairSnapshot> {
        self.enter().await?;
        Ok(PairSnapshot {
            block: self.block,
            tokens: self.tokens.lock().unwrap().clone(),
            reserves: self.reserves.lock().unwrap().clone(),
            reserves_timestamp: self.reserves_timestamp,
            cumulative_prices: self.cumulative_prices.clone(),
            last_k: self.last_k,
        })
    }

    async fn defi_token(&self, token: Address) -> Result<Option<DefiToken>> {
        self.enter().await?;
        Ok(self.defi_tokens.iter().find(|t| t.address == token).cloned())
    }

    async fn defi_tokens(&self) -> Result<Vec<DefiToken>> {
        self.enter().await?;
        Ok(self.defi_tokens.clone())
    }

    async fn defi_configuration(&self) -> Result<DefiSettings> {
        self.enter().await?;
        Ok(DefiSettings {
            mint_fee_4dec: U256::from(25u64),
            min_collateral_ratio_4dec: U256::from(30_000u64),
            reward_collateral_ratio_4dec: U256::from(50_000u64),
            fmint_contract: addr("0x00000000000000000000000000000000000000d0"),
            address_provider: addr("0x00000000000000000000000000000000000000d1"),
            token_registry: addr("0x00000000000000000000000000000000000000d2"),
            collateral_pool: addr("0x00000000000000000000000000000000000000d3"),
            debt_pool: addr("0x00000000000000000000000000000000000000d4"),
            price_oracle: addr("0x00000000000000000000000000000000000000d5"),
        })
    }

    async fn fmint_token_price(&self, _token: Address) -> Result<U256> {
        self.enter().await?;
        Ok(self.token_price)
    }

    async fn fmint_account(&self, owner: Address) -> Result<FMintAccount> {
        self.enter().await?;
        Ok(FMintAccount {
            address: owner,
            collateral_list: self.defi_tokens.iter().map(|t| t.address).collect(),
            debt_list: Vec::new(),
            collateral_value: U256::from(1_000u64),
            debt_value: U256::zero(),
        })
    }

    async fn fmint_token_balance(
        &self,
        _owner: Address,
        _token: Address,
        token_type: DefiTokenType,
    ) -> Result<U256> {
        self.enter().await?;
        Ok(match token_type {
            DefiTokenType::Collateral => U256::from(40u64),
            DefiTokenType::Debt => U256::from(4u64),
        })
    }

    async fn fmint_token_value(
        &self,
        owner: Address,
        token: Address,
        token_type: DefiTokenType,
    ) -> Result<U256> {
        let balance = self.fmint_token_balance(owner, token, token_type).await?;
        Ok(balance * self.token_price)
    }

    async fn erc20_token(&self, token: Address) -> Result<Erc20Token> {
        self.enter().await?;
        Ok(Erc20Token {
            address: token,
            name: "fUSD".to_string(),
            symbol: "FUSD".to_string(),
            decimals: 18,
            total_supply: U256::from(1_000_000u64),
        })
    }

    async fn erc20_balance(&self, _owner: Address, _token: Address) -> Result<U256> {
        self.enter().await?;
        Ok(U256::from(12u64))
    }

    async fn erc20_allowance(&self, _owner: Address, _token: Address) -> Result<U256> {
        self.enter().await?;
        Ok(self.allowance)
    }
}

// --- Cache ---

#[derive(Default)]
pub struct CountingCache {
    pub inner: CacheManager,
    pub pulls: AtomicUsize,
    pub pushes: AtomicUsize,
    pub fail: AtomicBool,
    pub hang: AtomicBool,
}

impl CountingCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn evict(&self, address: &Address) {
        self.inner.evict_account(address);
    }

    async fn enter(&self) -> Result<()> {
        hang_if(&self.hang).await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("cache down"));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountCache for CountingCache {
    async fn pull_account(&self, address: &Address) -> Result<Option<Account>> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        self.inner.pull_account(address).await
    }

    async fn push_account(&self, account: &Account) -> Result<()> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        self.inner.push_account(account).await
    }

    async fn check_account_known(&self, address: &Address) -> Result<Option<bool>> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        self.inner.check_account_known(address).await
    }

    async fn push_account_known(&self, address: &Address) -> Result<()> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        self.inner.push_account_known(address).await
    }
}

// --- Wiring ---

pub struct Harness {
    pub node: Arc<FakeNode>,
    pub store: Arc<FakeStore>,
    pub cache: Arc<CountingCache>,
    pub repository: TieredRepository,
}

pub fn test_config() -> RepositoryConfig {
    RepositoryConfig {
        store_timeout: Duration::from_millis(200),
        node_timeout: Duration::from_millis(200),
        cache_timeout: Duration::from_millis(50),
        max_page_size: 10,
    }
}

pub fn harness() -> Harness {
    harness_with(FakeNode::new(), FakeStore::new(), CountingCache::new())
}

pub fn harness_with(node: Arc<FakeNode>, store: Arc<FakeStore>, cache: Arc<CountingCache>) -> Harness {
    let repository = TieredRepository::new(
        node.clone(),
        store.clone(),
        cache.clone(),
        test_config(),
    );
    Harness {
        node,
        store,
        cache,
        repository,
    }
}

pub fn swap(pair: Address, log_index: u64, timestamp: i64, amount0_in: u64) -> Swap {
    Swap {
        pair,
        block_number: 1_000 + log_index,
        tx_hash: H256::from_low_u64_be(log_index + 1),
        log_index,
        timestamp,
        sender: addr("0x0000000000000000000000000000000000000001"),
        recipient: addr("0x0000000000000000000000000000000000000002"),
        amount0_in: U256::from(amount0_in),
        amount1_in: U256::zero(),
        amount0_out: U256::zero(),
        amount1_out: U256::from(1u64),
    }
}
