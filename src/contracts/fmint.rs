// fMint protocol contracts, reached through the address provider.

use ethers::prelude::abigen;

abigen!(
    IFantomMintAddressProvider,
    r#"[
        function getFantomMint() external view returns (address)
        function getTokenRegistry() external view returns (address)
        function getCollateralPool() external view returns (address)
        function getDebtPool() external view returns (address)
        function getPriceOracleProxy() external view returns (address)
    ]"#
);

abigen!(
    IFantomMint,
    r#"[
        function getFMintFee4dec() external view returns (uint256)
        function getCollateralLowestDebtRatio4dec() external view returns (uint256)
        function getRewardEligibilityRatio4dec() external view returns (uint256)
        function collateralValueOf(address account) external view returns (uint256)
        function debtValueOf(address account) external view returns (uint256)
        function tokenValue(address token, uint256 amount) external view returns (uint256)
    ]"#
);

abigen!(
    IFantomMintTokenRegistry,
    r#"[
        function tokensCount() external view returns (uint256)
        function tokensList(uint256 index) external view returns (address)
        function tokens(address token) external view returns (uint256 id, string name, string symbol, uint8 decimals, string logo, address oracle, uint8 priceDecimals, bool isActive, bool canDeposit, bool canMint, bool canTrade)
    ]"#
);

// Shared by the collateral and the debt pool.
abigen!(
    IFantomDeFiTokenStorage,
    r#"[
        function tokensCount() external view returns (uint256)
        function tokens(uint256 index) external view returns (address)
        function balanceOf(address account, address token) external view returns (uint256)
    ]"#
);

abigen!(
    IPriceOracleProxy,
    r#"[
        function getPrice(address token) external view returns (uint256)
    ]"#
);

/// Selectors whose snake-cased binding names are awkward; called by name.
pub const GET_FMINT_FEE_4DEC: &str = "getFMintFee4dec";
pub const GET_COLLATERAL_LOWEST_DEBT_RATIO_4DEC: &str = "getCollateralLowestDebtRatio4dec";
pub const GET_REWARD_ELIGIBILITY_RATIO_4DEC: &str = "getRewardEligibilityRatio4dec";
