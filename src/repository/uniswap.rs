use super::{require_address, TieredRepository};
use crate::error::{RepositoryError, RepositoryResult};
use crate::metrics;
use crate::types::{Swap, SwapVolume, TokenPairState};
use crate::volume::{VolumeResolution, VolumeWindow};
use ethers::types::{Address, U256};
use log::{debug, error, info};
use std::str::FromStr;

// Pair reads come back as lists; anything but two entries means the node and
// the pair ABI disagree.
fn pair_of<T: Copy>(values: Vec<T>, what: &str, pair: &Address) -> RepositoryResult<[T; 2]> {
    match values.as_slice() {
        [a, b] => Ok([*a, *b]),
        other => {
            error!(
                "Pair {:?} reported {} {} values, expected 2",
                pair,
                other.len(),
                what
            );
            Err(RepositoryError::Inconsistent(format!(
                "pair {:?} reported {} {} values",
                pair,
                other.len(),
                what
            )))
        }
    }
}

fn require_path(path: &[Address]) -> RepositoryResult<()> {
    if path.len() < 2 {
        return Err(RepositoryError::invalid(
            "swap path needs at least two tokens",
        ));
    }
    if path.iter().any(|token| token.is_zero()) {
        return Err(RepositoryError::invalid("swap path contains an empty token"));
    }
    Ok(())
}

fn volume_window(from: i64, to: i64) -> RepositoryResult<VolumeWindow> {
    let window = VolumeWindow::from_legacy(from, to);
    window.validate().map_err(RepositoryError::InvalidArgument)?;
    Ok(window)
}

impl TieredRepository {
    /// Wrapped native token used by the router.
    pub async fn native_token_address(&self) -> RepositoryResult<Address> {
        self.node_call("native_token_address", self.node.native_token_address())
            .await
    }

    pub async fn uniswap_pairs(&self) -> RepositoryResult<Vec<Address>> {
        self.node_call("uniswap_pairs", self.node.uniswap_pairs())
            .await
    }

    /// Pair trading `token_a` against `token_b`.
    pub async fn uniswap_pair(&self, token_a: &Address, token_b: &Address) -> RepositoryResult<Address> {
        require_address(token_a, "token A")?;
        require_address(token_b, "token B")?;
        if token_a == token_b {
            return Err(RepositoryError::invalid("a pair needs two distinct tokens"));
        }

        let pair = self
            .node_call("uniswap_pair", self.node.uniswap_pair(*token_a, *token_b))
            .await?;
        if pair.is_zero() {
            return Err(RepositoryError::not_found(
                "uniswap pair",
                format!("{:?}/{:?}", token_a, token_b),
            ));
        }
        Ok(pair)
    }

    pub async fn uniswap_amounts_out(&self, amount_in: U256, path: &[Address]) -> RepositoryResult<Vec<U256>> {
        require_path(path)?;
        self.node_call(
            "uniswap_amounts_out",
            self.node.uniswap_amounts_out(amount_in, path),
        )
        .await
    }

    pub async fn uniswap_amounts_in(&self, amount_out: U256, path: &[Address]) -> RepositoryResult<Vec<U256>> {
        require_path(path)?;
        self.node_call(
            "uniswap_amounts_in",
            self.node.uniswap_amounts_in(amount_out, path),
        )
        .await
    }

    pub async fn uniswap_quote_input(
        &self,
        amount_in: U256,
        reserve_my: U256,
        reserve_sibling: U256,
    ) -> RepositoryResult<U256> {
        self.node_call(
            "uniswap_quote_input",
            self.node
                .uniswap_quote_input(amount_in, reserve_my, reserve_sibling),
        )
        .await
    }

    pub async fn uniswap_tokens(&self, pair: &Address) -> RepositoryResult<[Address; 2]> {
        require_address(pair, "pair address")?;
        let tokens = self
            .node_call("uniswap_tokens", self.node.uniswap_tokens(*pair))
            .await?;
        pair_of(tokens, "token", pair)
    }

    pub async fn uniswap_reserves(&self, pair: &Address) -> RepositoryResult<[U256; 2]> {
        require_address(pair, "pair address")?;
        let reserves = self
            .node_call("uniswap_reserves", self.node.uniswap_reserves(*pair))
            .await?;
        pair_of(reserves, "reserve", pair)
    }

    pub async fn uniswap_reserves_timestamp(&self, pair: &Address) -> RepositoryResult<u64> {
        require_address(pair, "pair address")?;
        self.node_call(
            "uniswap_reserves_timestamp",
            self.node.uniswap_reserves_timestamp(*pair),
        )
        .await
    }

    pub async fn uniswap_cumulative_prices(&self, pair: &Address) -> RepositoryResult<[U256; 2]> {
        require_address(pair, "pair address")?;
        let prices = self
            .node_call(
                "uniswap_cumulative_prices",
                self.node.uniswap_cumulative_prices(*pair),
            )
            .await?;
        pair_of(prices, "cumulative price", pair)
    }

    pub async fn uniswap_last_k_value(&self, pair: &Address) -> RepositoryResult<U256> {
        require_address(pair, "pair address")?;
        self.node_call("uniswap_last_k_value", self.node.uniswap_last_k_value(*pair))
            .await
    }

    /// Full live state of a pair, every field read at the same block. Read
    /// from the node on every call.
    pub async fn uniswap_pair_state(&self, pair: &Address) -> RepositoryResult<TokenPairState> {
        require_address(pair, "pair address")?;
        let snapshot = self
            .node_call("uniswap_pair_snapshot", self.node.uniswap_pair_snapshot(*pair))
            .await?;

        Ok(TokenPairState {
            pair: *pair,
            block: snapshot.block,
            tokens: pair_of(snapshot.tokens, "token", pair)?,
            reserves: pair_of(snapshot.reserves, "reserve", pair)?,
            cumulative_prices: pair_of(snapshot.cumulative_prices, "cumulative price", pair)?,
            reserves_timestamp: snapshot.reserves_timestamp,
            last_k: snapshot.last_k,
        })
    }

    /// Append a swap to the store.
    ///
    /// Re-delivering an already recorded swap is harmless: the store keys swaps
    /// by `(pair, tx_hash, log_index)` and leaves aggregates alone on a repeat.
    pub async fn record_swap(&self, swap: &Swap) -> RepositoryResult<()> {
        require_address(&swap.pair, "pair address")?;

        let inserted = self
            .store_call("add_swap", self.store.add_swap(swap))
            .await?;
        if inserted {
            metrics::increment_swaps_recorded("new");
        } else {
            metrics::increment_swaps_recorded("duplicate");
            info!(
                "Swap {:?}#{} on {:?} was already recorded",
                swap.tx_hash, swap.log_index, swap.pair
            );
        }
        Ok(())
    }

    /// Highest block with a recorded swap; ingesters resume after it.
    pub async fn last_known_swap_block(&self) -> RepositoryResult<u64> {
        self.store_call("last_known_swap_block", self.store.last_known_swap_block())
            .await
    }

    /// Total swap volume of a pair in `[from, to]`, unix seconds.
    ///
    /// `to == 0` means "up to now".
    pub async fn uniswap_volume(&self, pair: &Address, from: i64, to: i64) -> RepositoryResult<SwapVolume> {
        require_address(pair, "pair address")?;
        let window = volume_window(from, to)?;
        debug!("Volume of {:?} over {:?}", pair, window);

        self.store_call("swap_volume", self.store.swap_volume(pair, window))
            .await
    }

    /// Swap volume of a pair per `resolution` bucket, oldest first.
    ///
    /// `resolution` accepts `1h`, `4h`, `1d` and `1w` (or `hour`, `day`,
    /// `week`); `to == 0` means "up to now".
    pub async fn uniswap_time_volumes(
        &self,
        pair: &Address,
        resolution: &str,
        from: i64,
        to: i64,
    ) -> RepositoryResult<Vec<SwapVolume>> {
        require_address(pair, "pair address")?;
        let resolution =
            VolumeResolution::from_str(resolution).map_err(RepositoryError::InvalidArgument)?;
        let window = volume_window(from, to)?;

        self.store_call(
            "swap_time_volumes",
            self.store.swap_time_volumes(pair, resolution, window),
        )
        .await
    }
}
