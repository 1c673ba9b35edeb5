// Contracts Module - Public ABIs Only

pub mod erc20;
pub mod fmint;
pub mod i_uniswap_v2_factory;
pub mod i_uniswap_v2_pair;
pub mod i_uniswap_v2_router;

// Public exports
pub use erc20::Erc20;
pub use fmint::{
    IFantomDeFiTokenStorage, IFantomMint, IFantomMintAddressProvider, IFantomMintTokenRegistry,
    IPriceOracleProxy,
};
pub use i_uniswap_v2_factory::IUniswapV2Factory;
pub use i_uniswap_v2_pair::IUniswapV2Pair;
pub use i_uniswap_v2_router::IUniswapV2Router;
