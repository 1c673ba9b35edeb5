use ethers::prelude::abigen;

abigen!(
    IUniswapV2Factory,
    r#"[
        function allPairsLength() external view returns (uint256)
        function allPairs(uint256 index) external view returns (address)
        function getPair(address tokenA, address tokenB) external view returns (address)
    ]"#
);
