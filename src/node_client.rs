//! # Node Client Trait
//!
//! Query-only façade over the blockchain node. The node is the source of truth
//! for everything that changes block to block (balances, nonces, pool
//! reserves, oracle prices), so the repository never caches what it returns
//! past the current request.
//!
//! ## Implementations
//!
//! - [`crate::rpc_client::RpcNodeClient`]: JSON-RPC over any `ethers`
//!   middleware, using the contract bindings in [`crate::contracts`].
//!
//! Retries, if any, are the implementation's business; the repository issues
//! each call once and bounds it with its own deadline.

use anyhow::Result;
use async_trait::async_trait;
use ethers::types::{Address, U256};

use crate::types::{DefiSettings, DefiToken, DefiTokenType, Erc20Token, FMintAccount};

/// Every live field of a pair, read at one block.
///
/// List fields are in pair order and unchecked; the repository validates
/// their length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairSnapshot {
    pub block: u64,
    pub tokens: Vec<Address>,
    pub reserves: Vec<U256>,
    pub reserves_timestamp: u64,
    pub cumulative_prices: Vec<U256>,
    pub last_k: U256,
}

/// Read access to live on-chain state.
///
/// All methods must be safe to call concurrently from many request handlers.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Native balance of an address, in wei.
    async fn account_balance(&self, address: Address) -> Result<U256>;

    /// Number of transactions sent from an address.
    async fn account_nonce(&self, address: Address) -> Result<u64>;

    /// Wrapped native token used by the Uniswap router.
    async fn native_token_address(&self) -> Result<Address>;

    /// All pairs registered with the Uniswap factory.
    async fn uniswap_pairs(&self) -> Result<Vec<Address>>;

    /// Pair address for two tokens; the zero address when no pair exists.
    async fn uniswap_pair(&self, token_a: Address, token_b: Address) -> Result<Address>;

    /// Output amounts along `path` for an exact input.
    async fn uniswap_amounts_out(&self, amount_in: U256, path: &[Address]) -> Result<Vec<U256>>;

    /// Input amounts along `path` for an exact output.
    async fn uniswap_amounts_in(&self, amount_out: U256, path: &[Address]) -> Result<Vec<U256>>;

    /// Amount of the sibling token matching `amount_in` at the given reserves.
    async fn uniswap_quote_input(
        &self,
        amount_in: U256,
        reserve_my: U256,
        reserve_sibling: U256,
    ) -> Result<U256>;

    /// Tokens of a pair, in pair order.
    async fn uniswap_tokens(&self, pair: Address) -> Result<Vec<Address>>;

    /// Reserves of a pair, in pair order.
    async fn uniswap_reserves(&self, pair: Address) -> Result<Vec<U256>>;

    /// Block timestamp of the last reserve update.
    async fn uniswap_reserves_timestamp(&self, pair: Address) -> Result<u64>;

    /// Cumulative price accumulators, in pair order.
    async fn uniswap_cumulative_prices(&self, pair: Address) -> Result<Vec<U256>>;

    /// Last value of the pool control coefficient (`kLast`).
    async fn uniswap_last_k_value(&self, pair: Address) -> Result<U256>;

    /// All pair fields pinned to a single block, so reserves, their timestamp
    /// and the price accumulators describe the same pool state.
    async fn uniswap_pair_snapshot(&self, pair: Address) -> Result<PairSnapshot>;

    /// Token registered with fMint; `None` when the registry does not know it.
    async fn defi_token(&self, token: Address) -> Result<Option<DefiToken>>;

    /// All tokens registered with fMint.
    async fn defi_tokens(&self) -> Result<Vec<DefiToken>>;

    /// Current fMint settings.
    async fn defi_configuration(&self) -> Result<DefiSettings>;

    /// Oracle price of a token.
    async fn fmint_token_price(&self, token: Address) -> Result<U256>;

    /// Collateral and debt position of an owner.
    async fn fmint_account(&self, owner: Address) -> Result<FMintAccount>;

    /// Balance of `token` on the given side of the owner's position.
    async fn fmint_token_balance(
        &self,
        owner: Address,
        token: Address,
        token_type: DefiTokenType,
    ) -> Result<U256>;

    /// fUSD value of `token` on the given side of the owner's position.
    async fn fmint_token_value(
        &self,
        owner: Address,
        token: Address,
        token_type: DefiTokenType,
    ) -> Result<U256>;

    /// ERC20 metadata.
    async fn erc20_token(&self, token: Address) -> Result<Erc20Token>;

    /// ERC20 balance of an owner.
    async fn erc20_balance(&self, owner: Address, token: Address) -> Result<U256>;

    /// Amount the owner has approved for the fMint contract.
    async fn erc20_allowance(&self, owner: Address, token: Address) -> Result<U256>;
}
