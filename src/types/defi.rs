use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// Side of the fMint books a token balance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefiTokenType {
    Collateral,
    Debt,
}

/// Token registered with the fMint token registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefiToken {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub logo_url: String,
    /// Oracle used to price the token.
    pub price_oracle: Address,
    pub price_decimals: u8,
    pub is_active: bool,
    pub can_deposit: bool,
    pub can_mint: bool,
    pub can_trade: bool,
}

/// Current fMint protocol configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefiSettings {
    /// Mint fee, 4 decimals (`25` = 0.25%).
    pub mint_fee_4dec: U256,
    pub min_collateral_ratio_4dec: U256,
    pub reward_collateral_ratio_4dec: U256,
    pub fmint_contract: Address,
    pub address_provider: Address,
    pub token_registry: Address,
    pub collateral_pool: Address,
    pub debt_pool: Address,
    pub price_oracle: Address,
}

/// Collateral and debt position of an fMint account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FMintAccount {
    pub address: Address,
    pub collateral_list: Vec<Address>,
    pub debt_list: Vec<Address>,
    /// Total collateral value in fUSD.
    pub collateral_value: U256,
    /// Total debt value in fUSD.
    pub debt_value: U256,
}

impl FMintAccount {
    pub fn has_position(&self) -> bool {
        !self.collateral_list.is_empty() || !self.debt_list.is_empty()
    }
}

/// ERC20 token metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Erc20Token {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,
}
