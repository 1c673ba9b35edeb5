// DeFi / fMint / ERC20 reads. All live node pass-throughs; nothing is cached.

use super::{require_address, TieredRepository};
use crate::error::{RepositoryError, RepositoryResult};
use crate::types::{DefiSettings, DefiToken, DefiTokenType, Erc20Token, FMintAccount};
use ethers::types::{Address, U256};

impl TieredRepository {
    pub async fn defi_token(&self, token: &Address) -> RepositoryResult<DefiToken> {
        require_address(token, "token address")?;
        self.node_call("defi_token", self.node.defi_token(*token))
            .await?
            .ok_or_else(|| RepositoryError::not_found("defi token", format!("{:?}", token)))
    }

    pub async fn defi_tokens(&self) -> RepositoryResult<Vec<DefiToken>> {
        self.node_call("defi_tokens", self.node.defi_tokens()).await
    }

    pub async fn defi_configuration(&self) -> RepositoryResult<DefiSettings> {
        self.node_call("defi_configuration", self.node.defi_configuration())
            .await
    }

    /// Oracle price of a token.
    pub async fn defi_token_price(&self, token: &Address) -> RepositoryResult<U256> {
        require_address(token, "token address")?;
        self.node_call("defi_token_price", self.node.fmint_token_price(*token))
            .await
    }

    pub async fn fmint_account(&self, owner: &Address) -> RepositoryResult<FMintAccount> {
        require_address(owner, "owner address")?;
        self.node_call("fmint_account", self.node.fmint_account(*owner))
            .await
    }

    pub async fn fmint_token_balance(
        &self,
        owner: &Address,
        token: &Address,
        token_type: DefiTokenType,
    ) -> RepositoryResult<U256> {
        require_address(owner, "owner address")?;
        require_address(token, "token address")?;
        self.node_call(
            "fmint_token_balance",
            self.node.fmint_token_balance(*owner, *token, token_type),
        )
        .await
    }

    /// fUSD value of the owner's `token` position.
    pub async fn fmint_token_value(
        &self,
        owner: &Address,
        token: &Address,
        token_type: DefiTokenType,
    ) -> RepositoryResult<U256> {
        require_address(owner, "owner address")?;
        require_address(token, "token address")?;
        self.node_call(
            "fmint_token_value",
            self.node.fmint_token_value(*owner, *token, token_type),
        )
        .await
    }

    pub async fn erc20_token(&self, token: &Address) -> RepositoryResult<Erc20Token> {
        require_address(token, "token address")?;
        self.node_call("erc20_token", self.node.erc20_token(*token))
            .await
    }

    pub async fn erc20_balance(&self, owner: &Address, token: &Address) -> RepositoryResult<U256> {
        require_address(owner, "owner address")?;
        require_address(token, "token address")?;
        self.node_call("erc20_balance", self.node.erc20_balance(*owner, *token))
            .await
    }

    /// Amount of `token` the owner has unlocked for the fMint contract.
    pub async fn erc20_allowance(&self, owner: &Address, token: &Address) -> RepositoryResult<U256> {
        require_address(owner, "owner address")?;
        require_address(token, "token address")?;
        self.node_call("erc20_allowance", self.node.erc20_allowance(*owner, *token))
            .await
    }
}
