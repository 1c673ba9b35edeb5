use ethers::prelude::abigen;

abigen!(
    IUniswapV2Router,
    r#"[
        function WETH() external view returns (address)
        function getAmountsOut(uint256 amountIn, address[] path) external view returns (uint256[] amounts)
        function getAmountsIn(uint256 amountOut, address[] path) external view returns (uint256[] amounts)
        function quote(uint256 amountA, uint256 reserveA, uint256 reserveB) external pure returns (uint256 amountB)
    ]"#
);
