//! # Chain State Repository
//!
//! A read-through, write-through data access layer for EVM chain state. One
//! query interface, [`TieredRepository`], sits in front of three backing
//! tiers so API resolvers never talk to them directly:
//!
//! - **Cache** ([`cache::AccountCache`]): bounded copies of accounts and
//!   known-address flags. In-process ([`cache::CacheManager`]) or Redis
//!   ([`redis_manager::RedisManager`], `redis` feature).
//! - **Store** ([`store::Store`]): durable facts. Accounts, contract creation
//!   evidence, transaction indices, swaps and their volume aggregates.
//!   PostgreSQL implementation in [`database::PgStore`].
//! - **Node** ([`node_client::NodeClient`]): live chain state over JSON-RPC,
//!   [`rpc_client::RpcNodeClient`].
//!
//! ## Entity policies
//!
//! ### Accounts
//! Cache, then Store, then a synthesized wallet stub. A failed enrichment
//! lookup yields a stub flagged `degraded` rather than an error.
//!
//! ### Uniswap pairs and swaps
//! Pair state is always read live from the node. Swaps are appended to the
//! store, which maintains hourly, 4-hourly, daily and weekly volume buckets.
//!
//! ### DeFi / fMint / ERC20
//! Node pass-through.
//!
//! ## Example
//!
//! ```no_run
//! use chain_state_repository::{
//!     CacheManager, PgStore, RepositoryConfig, RpcNodeClient, Settings, TieredRepository,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let settings = Settings::new()?;
//! let repository = TieredRepository::new(
//!     Arc::new(RpcNodeClient::from_settings(&settings)?),
//!     Arc::new(PgStore::connect(&settings).await?),
//!     Arc::new(CacheManager::new(&settings.cache)),
//!     RepositoryConfig::from(&settings.repository),
//! );
//!
//! let address = "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1".parse()?;
//! let account = repository.account(&address).await?;
//! println!("{:?} (degraded: {})", account.value, account.degraded);
//! # Ok(())
//! # }
//! ```

// Core
/// Tiered resolution policies
pub mod repository;
/// Repository error types
pub mod error;
/// Entity types shared by every tier
pub mod types;
/// Swap volume windows and buckets
pub mod volume;

// Tiers
/// Cache tier trait and in-process implementation
pub mod cache;
/// Redis cache tier
pub mod redis_manager;
/// Store tier trait
pub mod store;
/// PostgreSQL store
pub mod database;
/// Node tier trait
pub mod node_client;
/// JSON-RPC node client
pub mod rpc_client;

// Infrastructure
/// Contract ABIs
pub mod contracts;
/// Metrics hooks
pub mod metrics;
/// Configuration
pub mod settings;

// Re-exports
pub use cache::{AccountCache, CacheManager};
pub use database::PgStore;
pub use error::{RepositoryError, RepositoryResult, Tier};
pub use node_client::{NodeClient, PairSnapshot};
pub use redis_manager::RedisManager;
pub use repository::{RepositoryConfig, Resolved, TieredRepository};
pub use rpc_client::RpcNodeClient;
pub use settings::Settings;
pub use store::Store;
pub use volume::{VolumeResolution, VolumeWindow};
