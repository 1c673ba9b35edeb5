//! Entity shapes shared by the tiers and the repository.

pub mod account;
pub mod conversions;
pub mod defi;
pub mod uniswap;

pub use account::{Account, AccountType, TransactionHashList};
pub use defi::{DefiSettings, DefiToken, DefiTokenType, Erc20Token, FMintAccount};
pub use uniswap::{Swap, SwapDirection, SwapVolume, TokenPairState};
