use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

use crate::volume::VolumeResolution;

/// Live state of a Uniswap V2-style pair.
///
/// Tokens, reserves and cumulative prices share the pair's token ordering
/// (`token0`, `token1`). The state is read from the node on every request and
/// never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPairState {
    pub pair: Address,
    /// Block every field was read at.
    pub block: u64,
    pub tokens: [Address; 2],
    pub reserves: [U256; 2],
    pub cumulative_prices: [U256; 2],
    /// Block timestamp of the last reserve update.
    pub reserves_timestamp: u64,
    /// Product of reserves as of the most recent liquidity event (`kLast`).
    pub last_k: U256,
}

impl TokenPairState {
    /// Reserve held for `token`, if it belongs to the pair.
    pub fn reserve_of(&self, token: &Address) -> Option<U256> {
        self.tokens
            .iter()
            .position(|t| t == token)
            .map(|i| self.reserves[i])
    }

    /// Current reserve product, `reserve0 * reserve1`, saturating on overflow.
    pub fn k(&self) -> U256 {
        self.reserves[0].saturating_mul(self.reserves[1])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapDirection {
    Token0ToToken1,
    Token1ToToken0,
}

/// One executed trade on a pair, as emitted by its `Swap` event.
///
/// Natural key: `(pair, tx_hash, log_index)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Swap {
    pub pair: Address,
    pub block_number: u64,
    pub tx_hash: H256,
    pub log_index: u64,
    /// Block timestamp, unix seconds.
    pub timestamp: i64,
    pub sender: Address,
    pub recipient: Address,
    pub amount0_in: U256,
    pub amount1_in: U256,
    pub amount0_out: U256,
    pub amount1_out: U256,
}

impl Swap {
    pub fn direction(&self) -> SwapDirection {
        if self.amount0_in > self.amount1_in {
            SwapDirection::Token0ToToken1
        } else {
            SwapDirection::Token1ToToken0
        }
    }

    /// Token0-denominated amount that changed hands.
    pub fn volume(&self) -> U256 {
        self.amount0_in.saturating_add(self.amount0_out)
    }
}

/// Swap volume aggregated over a window or a single bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapVolume {
    pub pair: Address,
    /// Bucket size; `None` for an arbitrary window total.
    pub resolution: Option<VolumeResolution>,
    /// Start of the bucket or window, unix seconds.
    pub bucket_start: i64,
    pub volume: U256,
    pub swaps: u64,
}

impl SwapVolume {
    pub fn empty(pair: Address, resolution: Option<VolumeResolution>, bucket_start: i64) -> Self {
        Self {
            pair,
            resolution,
            bucket_start,
            volume: U256::zero(),
            swaps: 0,
        }
    }

    pub fn add(&mut self, volume: U256, swaps: u64) {
        self.volume = self.volume.saturating_add(volume);
        self.swaps += swaps;
    }
}
