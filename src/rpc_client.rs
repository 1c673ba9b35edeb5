//! JSON-RPC implementation of [`NodeClient`].
//!
//! Every request passes through an optional `governor` rate limiter and a
//! per-request timeout before it reaches the middleware. Multi-value reads
//! (pair tokens, ERC20 metadata, fMint settings) are issued concurrently.

use crate::contracts::fmint::{
    GET_COLLATERAL_LOWEST_DEBT_RATIO_4DEC, GET_FMINT_FEE_4DEC, GET_REWARD_ELIGIBILITY_RATIO_4DEC,
};
use crate::contracts::{
    Erc20, IFantomDeFiTokenStorage, IFantomMint, IFantomMintAddressProvider,
    IFantomMintTokenRegistry, IPriceOracleProxy, IUniswapV2Factory, IUniswapV2Pair,
    IUniswapV2Router,
};
use crate::node_client::{NodeClient, PairSnapshot};
use crate::settings::Settings;
use crate::types::{DefiSettings, DefiToken, DefiTokenType, Erc20Token, FMintAccount};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ethers::prelude::*;
use futures::future::try_join_all;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

type DefaultDirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Addresses of the fMint contracts, resolved through the address provider.
#[derive(Debug, Clone, Copy)]
struct FMintContracts {
    fmint: Address,
    token_registry: Address,
    collateral_pool: Address,
    debt_pool: Address,
    price_oracle: Address,
}

pub struct RpcNodeClient<M> {
    provider: Arc<M>,
    uniswap_factory: Address,
    uniswap_router: Address,
    fmint_address_provider: Address,
    request_timeout: Duration,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl RpcNodeClient<Provider<Http>> {
    /// HTTP client for `rpc.http_url` with the configured contracts.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let provider = Provider::<Http>::try_from(settings.rpc.http_url.as_str())
            .with_context(|| format!("invalid RPC url {}", settings.rpc.http_url))?;

        let mut client = Self::new(
            Arc::new(provider),
            settings.contracts.uniswap_factory_address()?,
            settings.contracts.uniswap_router_address()?,
            settings.contracts.fmint_address_provider_address()?,
        )
        .with_request_timeout(Duration::from_secs(settings.rpc.timeout_seconds.max(1)));

        if let Some(qps) = settings.rpc.qps_limit {
            client = client.with_qps_limit(qps)?;
        }
        Ok(client)
    }
}

impl<M: Middleware + 'static> RpcNodeClient<M> {
    pub fn new(
        provider: Arc<M>,
        uniswap_factory: Address,
        uniswap_router: Address,
        fmint_address_provider: Address,
    ) -> Self {
        Self {
            provider,
            uniswap_factory,
            uniswap_router,
            fmint_address_provider,
            request_timeout: Duration::from_secs(10),
            limiter: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_qps_limit(mut self, qps: u32) -> Result<Self> {
        let quota = Quota::per_second(
            NonZeroU32::new(qps).ok_or_else(|| anyhow!("QPS must be non-zero"))?,
        );
        self.limiter = Some(Arc::new(RateLimiter::direct(quota)));
        Ok(self)
    }

    pub fn provider(&self) -> Arc<M> {
        self.provider.clone()
    }

    /// Waits for a rate-limit permit, then runs `request` under the request timeout.
    async fn guarded<T, F>(&self, op: &'static str, request: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
        debug!(op, "rpc request");
        match tokio::time::timeout(self.request_timeout, request).await {
            Ok(result) => result.with_context(|| format!("rpc {} failed", op)),
            Err(_) => {
                warn!(op, timeout = ?self.request_timeout, "rpc request timed out");
                Err(anyhow!("rpc {} timed out after {:?}", op, self.request_timeout))
            }
        }
    }

    fn factory(&self) -> IUniswapV2Factory<M> {
        IUniswapV2Factory::new(self.uniswap_factory, self.provider.clone())
    }

    fn router(&self) -> IUniswapV2Router<M> {
        IUniswapV2Router::new(self.uniswap_router, self.provider.clone())
    }

    fn pair(&self, pair: Address) -> IUniswapV2Pair<M> {
        IUniswapV2Pair::new(pair, self.provider.clone())
    }

    fn erc20(&self, token: Address) -> Erc20<M> {
        Erc20::new(token, self.provider.clone())
    }

    async fn fmint_contracts(&self) -> Result<FMintContracts> {
        let ap = IFantomMintAddressProvider::new(self.fmint_address_provider, self.provider.clone());
        let (fmint, token_registry, collateral_pool, debt_pool, price_oracle) = tokio::try_join!(
            self.guarded("fmint_address", async { Ok(ap.get_fantom_mint().call().await?) }),
            self.guarded("fmint_token_registry", async {
                Ok(ap.get_token_registry().call().await?)
            }),
            self.guarded("fmint_collateral_pool", async {
                Ok(ap.get_collateral_pool().call().await?)
            }),
            self.guarded("fmint_debt_pool", async { Ok(ap.get_debt_pool().call().await?) }),
            self.guarded("fmint_price_oracle", async {
                Ok(ap.get_price_oracle_proxy().call().await?)
            }),
        )?;
        Ok(FMintContracts {
            fmint,
            token_registry,
            collateral_pool,
            debt_pool,
            price_oracle,
        })
    }

    fn token_pool(&self, contracts: &FMintContracts, token_type: DefiTokenType) -> IFantomDeFiTokenStorage<M> {
        let address = match token_type {
            DefiTokenType::Collateral => contracts.collateral_pool,
            DefiTokenType::Debt => contracts.debt_pool,
        };
        IFantomDeFiTokenStorage::new(address, self.provider.clone())
    }

    async fn registry_token(&self, registry: &IFantomMintTokenRegistry<M>, token: Address) -> Result<Option<DefiToken>> {
        let (
            id,
            name,
            symbol,
            decimals,
            logo_url,
            price_oracle,
            price_decimals,
            is_active,
            can_deposit,
            can_mint,
            can_trade,
        ) = self
            .guarded("defi_token", async { Ok(registry.tokens(token).call().await?) })
            .await?;

        // unregistered tokens come back zeroed
        if id.is_zero() {
            return Ok(None);
        }
        Ok(Some(DefiToken {
            address: token,
            name,
            symbol,
            decimals,
            logo_url,
            price_oracle,
            price_decimals,
            is_active,
            can_deposit,
            can_mint,
            can_trade,
        }))
    }

    /// Tokens held by `owner` in a collateral or debt pool.
    async fn pool_positions(&self, pool: &IFantomDeFiTokenStorage<M>, owner: Address) -> Result<Vec<Address>> {
        let count = self
            .guarded("fmint_pool_tokens_count", async { Ok(pool.tokens_count().call().await?) })
            .await?;
        let count = to_u64(count, "pool token count")?;

        let tokens = try_join_all((0..count).map(|i| {
            self.guarded("fmint_pool_token", async move {
                Ok(pool.tokens(U256::from(i)).call().await?)
            })
        }))
        .await?;

        let balances = try_join_all(tokens.iter().map(|token| {
            let token = *token;
            self.guarded("fmint_pool_balance", async move {
                Ok(pool.balance_of(owner, token).call().await?)
            })
        }))
        .await?;

        Ok(tokens
            .into_iter()
            .zip(balances)
            .filter(|(_, balance)| !balance.is_zero())
            .map(|(token, _)| token)
            .collect())
    }
}

// Counts and nonces come back as U256; anything past u64 is a broken node
// or contract, not something to truncate.
fn to_u64(value: U256, what: &str) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        anyhow::bail!("{} {} does not fit in u64", what, value);
    }
    Ok(value.low_u64())
}

#[async_trait]
impl<M: Middleware + 'static> NodeClient for RpcNodeClient<M> {
    async fn account_balance(&self, address: Address) -> Result<U256> {
        self.guarded("eth_getBalance", async {
            self.provider
                .get_balance(address, None)
                .await
                .map_err(|e| anyhow!("{}", e))
        })
        .await
    }

    async fn account_nonce(&self, address: Address) -> Result<u64> {
        let nonce = self
            .guarded("eth_getTransactionCount", async {
                self.provider
                    .get_transaction_count(address, None)
                    .await
                    .map_err(|e| anyhow!("{}", e))
            })
            .await?;
        to_u64(nonce, "nonce")
    }

    async fn native_token_address(&self) -> Result<Address> {
        let router = self.router();
        self.guarded("uniswap_weth", async { Ok(router.weth().call().await?) })
            .await
    }

    async fn uniswap_pairs(&self) -> Result<Vec<Address>> {
        let factory = self.factory();
        let count = self
            .guarded("uniswap_pairs_length", async {
                Ok(factory.all_pairs_length().call().await?)
            })
            .await?;
        debug!(pairs = %count, "loading uniswap pairs");

        let count = to_u64(count, "pair count")?;
        let factory = &factory;
        try_join_all((0..count).map(|i| {
            self.guarded("uniswap_all_pairs", async move {
                Ok(factory.all_pairs(U256::from(i)).call().await?)
            })
        }))
        .await
    }

    async fn uniswap_pair(&self, token_a: Address, token_b: Address) -> Result<Address> {
        let factory = self.factory();
        self.guarded("uniswap_get_pair", async {
            Ok(factory.get_pair(token_a, token_b).call().await?)
        })
        .await
    }

    async fn uniswap_amounts_out(&self, amount_in: U256, path: &[Address]) -> Result<Vec<U256>> {
        let router = self.router();
        let path = path.to_vec();
        self.guarded("uniswap_amounts_out", async {
            Ok(router.get_amounts_out(amount_in, path).call().await?)
        })
        .await
    }

    async fn uniswap_amounts_in(&self, amount_out: U256, path: &[Address]) -> Result<Vec<U256>> {
        let router = self.router();
        let path = path.to_vec();
        self.guarded("uniswap_amounts_in", async {
            Ok(router.get_amounts_in(amount_out, path).call().await?)
        })
        .await
    }

    async fn uniswap_quote_input(
        &self,
        amount_in: U256,
        reserve_my: U256,
        reserve_sibling: U256,
    ) -> Result<U256> {
        let router = self.router();
        self.guarded("uniswap_quote", async {
            Ok(router.quote(amount_in, reserve_my, reserve_sibling).call().await?)
        })
        .await
    }

    async fn uniswap_tokens(&self, pair: Address) -> Result<Vec<Address>> {
        let pair = self.pair(pair);
        let (token0, token1) = tokio::try_join!(
            self.guarded("uniswap_token0", async { Ok(pair.token_0().call().await?) }),
            self.guarded("uniswap_token1", async { Ok(pair.token_1().call().await?) }),
        )?;
        Ok(vec![token0, token1])
    }

    async fn uniswap_reserves(&self, pair: Address) -> Result<Vec<U256>> {
        let pair = self.pair(pair);
        let (reserve0, reserve1, _) = self
            .guarded("uniswap_reserves", async { Ok(pair.get_reserves().call().await?) })
            .await?;
        Ok(vec![U256::from(reserve0), U256::from(reserve1)])
    }

    async fn uniswap_reserves_timestamp(&self, pair: Address) -> Result<u64> {
        let pair = self.pair(pair);
        let (_, _, timestamp) = self
            .guarded("uniswap_reserves", async { Ok(pair.get_reserves().call().await?) })
            .await?;
        Ok(u64::from(timestamp))
    }

    async fn uniswap_cumulative_prices(&self, pair: Address) -> Result<Vec<U256>> {
        let pair = self.pair(pair);
        let (price0, price1) = tokio::try_join!(
            self.guarded("uniswap_price0_cumulative", async {
                Ok(pair.price_0_cumulative_last().call().await?)
            }),
            self.guarded("uniswap_price1_cumulative", async {
                Ok(pair.price_1_cumulative_last().call().await?)
            }),
        )?;
        Ok(vec![price0, price1])
    }

    async fn uniswap_last_k_value(&self, pair: Address) -> Result<U256> {
        let pair = self.pair(pair);
        self.guarded("uniswap_k_last", async { Ok(pair.k_last().call().await?) })
            .await
    }

    async fn uniswap_pair_snapshot(&self, pair: Address) -> Result<PairSnapshot> {
        let block = self
            .guarded("eth_blockNumber", async {
                self.provider
                    .get_block_number()
                    .await
                    .map_err(|e| anyhow!("{}", e))
            })
            .await?
            .as_u64();

        let pair = self.pair(pair);
        let (token0, token1, (reserve0, reserve1, timestamp), price0, price1, last_k) = tokio::try_join!(
            self.guarded("uniswap_token0", async {
                Ok(pair.token_0().block(block).call().await?)
            }),
            self.guarded("uniswap_token1", async {
                Ok(pair.token_1().block(block).call().await?)
            }),
            self.guarded("uniswap_reserves", async {
                Ok(pair.get_reserves().block(block).call().await?)
            }),
            self.guarded("uniswap_price0_cumulative", async {
                Ok(pair.price_0_cumulative_last().block(block).call().await?)
            }),
            self.guarded("uniswap_price1_cumulative", async {
                Ok(pair.price_1_cumulative_last().block(block).call().await?)
            }),
            self.guarded("uniswap_k_last", async {
                Ok(pair.k_last().block(block).call().await?)
            }),
        )?;
        debug!(block, "pair snapshot");

        Ok(PairSnapshot {
            block,
            tokens: vec![token0, token1],
            reserves: vec![U256::from(reserve0), U256::from(reserve1)],
            reserves_timestamp: u64::from(timestamp),
            cumulative_prices: vec![price0, price1],
            last_k,
        })
    }

    async fn defi_token(&self, token: Address) -> Result<Option<DefiToken>> {
        let contracts = self.fmint_contracts().await?;
        let registry = IFantomMintTokenRegistry::new(contracts.token_registry, self.provider.clone());
        self.registry_token(&registry, token).await
    }

    async fn defi_tokens(&self) -> Result<Vec<DefiToken>> {
        let contracts = self.fmint_contracts().await?;
        let registry = IFantomMintTokenRegistry::new(contracts.token_registry, self.provider.clone());
        let count = self
            .guarded("defi_tokens_count", async { Ok(registry.tokens_count().call().await?) })
            .await?;

        let count = to_u64(count, "defi token count")?;
        let registry = &registry;
        let addresses = try_join_all((0..count).map(|i| {
            self.guarded("defi_tokens_list", async move {
                Ok(registry.tokens_list(U256::from(i)).call().await?)
            })
        }))
        .await?;

        let tokens = try_join_all(
            addresses
                .into_iter()
                .map(|address| self.registry_token(registry, address)),
        )
        .await?;
        Ok(tokens.into_iter().flatten().collect())
    }

    async fn defi_configuration(&self) -> Result<DefiSettings> {
        let contracts = self.fmint_contracts().await?;
        let mint = IFantomMint::new(contracts.fmint, self.provider.clone());

        let (mint_fee_4dec, min_collateral_ratio_4dec, reward_collateral_ratio_4dec) = tokio::try_join!(
            self.guarded("fmint_fee", async {
                Ok(mint.method::<_, U256>(GET_FMINT_FEE_4DEC, ())?.call().await?)
            }),
            self.guarded("fmint_min_collateral_ratio", async {
                Ok(mint
                    .method::<_, U256>(GET_COLLATERAL_LOWEST_DEBT_RATIO_4DEC, ())?
                    .call()
                    .await?)
            }),
            self.guarded("fmint_reward_collateral_ratio", async {
                Ok(mint
                    .method::<_, U256>(GET_REWARD_ELIGIBILITY_RATIO_4DEC, ())?
                    .call()
                    .await?)
            }),
        )?;

        Ok(DefiSettings {
            mint_fee_4dec,
            min_collateral_ratio_4dec,
            reward_collateral_ratio_4dec,
            fmint_contract: contracts.fmint,
            address_provider: self.fmint_address_provider,
            token_registry: contracts.token_registry,
            collateral_pool: contracts.collateral_pool,
            debt_pool: contracts.debt_pool,
            price_oracle: contracts.price_oracle,
        })
    }

    async fn fmint_token_price(&self, token: Address) -> Result<U256> {
        let contracts = self.fmint_contracts().await?;
        let oracle = IPriceOracleProxy::new(contracts.price_oracle, self.provider.clone());
        self.guarded("fmint_token_price", async { Ok(oracle.get_price(token).call().await?) })
            .await
    }

    async fn fmint_account(&self, owner: Address) -> Result<FMintAccount> {
        let contracts = self.fmint_contracts().await?;
        let mint = IFantomMint::new(contracts.fmint, self.provider.clone());
        let collateral_pool = self.token_pool(&contracts, DefiTokenType::Collateral);
        let debt_pool = self.token_pool(&contracts, DefiTokenType::Debt);

        let (collateral_list, debt_list, collateral_value, debt_value) = tokio::try_join!(
            self.pool_positions(&collateral_pool, owner),
            self.pool_positions(&debt_pool, owner),
            self.guarded("fmint_collateral_value", async {
                Ok(mint.collateral_value_of(owner).call().await?)
            }),
            self.guarded("fmint_debt_value", async {
                Ok(mint.debt_value_of(owner).call().await?)
            }),
        )?;

        Ok(FMintAccount {
            address: owner,
            collateral_list,
            debt_list,
            collateral_value,
            debt_value,
        })
    }

    async fn fmint_token_balance(
        &self,
        owner: Address,
        token: Address,
        token_type: DefiTokenType,
    ) -> Result<U256> {
        let contracts = self.fmint_contracts().await?;
        let pool = self.token_pool(&contracts, token_type);
        self.guarded("fmint_token_balance", async {
            Ok(pool.balance_of(owner, token).call().await?)
        })
        .await
    }

    async fn fmint_token_value(
        &self,
        owner: Address,
        token: Address,
        token_type: DefiTokenType,
    ) -> Result<U256> {
        let contracts = self.fmint_contracts().await?;
        let pool = self.token_pool(&contracts, token_type);
        let balance = self
            .guarded("fmint_token_balance", async {
                Ok(pool.balance_of(owner, token).call().await?)
            })
            .await?;
        if balance.is_zero() {
            return Ok(U256::zero());
        }

        let mint = IFantomMint::new(contracts.fmint, self.provider.clone());
        self.guarded("fmint_token_value", async {
            Ok(mint.token_value(token, balance).call().await?)
        })
        .await
    }

    async fn erc20_token(&self, token: Address) -> Result<Erc20Token> {
        let erc20 = self.erc20(token);
        let (name, symbol, decimals, total_supply) = tokio::try_join!(
            self.guarded("erc20_name", async { Ok(erc20.name().call().await?) }),
            self.guarded("erc20_symbol", async { Ok(erc20.symbol().call().await?) }),
            self.guarded("erc20_decimals", async { Ok(erc20.decimals().call().await?) }),
            self.guarded("erc20_total_supply", async { Ok(erc20.total_supply().call().await?) }),
        )?;
        Ok(Erc20Token {
            address: token,
            name,
            symbol,
            decimals,
            total_supply,
        })
    }

    async fn erc20_balance(&self, owner: Address, token: Address) -> Result<U256> {
        let erc20 = self.erc20(token);
        self.guarded("erc20_balance", async { Ok(erc20.balance_of(owner).call().await?) })
            .await
    }

    async fn erc20_allowance(&self, owner: Address, token: Address) -> Result<U256> {
        let contracts = self.fmint_contracts().await?;
        let erc20 = self.erc20(token);
        self.guarded("erc20_allowance", async {
            Ok(erc20.allowance(owner, contracts.fmint).call().await?)
        })
        .await
    }
}
