//! # Account Probe
//!
//! Resolves one address through the full repository stack and prints what
//! each tier knows about it: the resolved account, live balance and nonce,
//! and whether the address has been recorded before.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin account_probe -- 0x82aF49447D8a07e3bd95BD0d56f35241523fBab1
//! cargo run --bin account_probe -- --config ./Config.toml --json <address>
//! ```

use anyhow::Result;
use chain_state_repository::{
    AccountCache, CacheManager, PgStore, RepositoryConfig, RpcNodeClient, Settings,
    TieredRepository,
};
use clap::Parser;
use ethers::types::Address;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "account_probe", about = "Resolve an address through the tiered repository")]
struct Args {
    /// Address to resolve
    address: Address,

    /// Settings file; defaults to ./Config.toml when present
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print a single JSON document instead of text
    #[arg(long)]
    json: bool,

    /// Also list the newest transaction hashes
    #[arg(long, default_value_t = 0)]
    transactions: i32,

    /// Serve Prometheus metrics on this address
    #[cfg(feature = "observability")]
    #[arg(long)]
    metrics_addr: Option<std::net::SocketAddr>,
}

fn init_logging(settings: &Settings) {
    #[cfg(feature = "observability")]
    if settings.log.json {
        let level = settings
            .log
            .level
            .parse::<tracing::Level>()
            .unwrap_or(tracing::Level::INFO);
        tracing_subscriber::fmt().json().with_max_level(level).init();
        return;
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&settings.log.level))
        .init();
}

async fn build_cache(settings: &Settings) -> Result<Arc<dyn AccountCache>> {
    #[cfg(feature = "redis")]
    if settings.redis.enabled {
        use chain_state_repository::redis_manager::{RedisConfig, RedisManager};
        let redis = RedisManager::new(RedisConfig::from(&settings.redis)).await?;
        redis.health_check().await?;
        return Ok(Arc::new(redis));
    }

    #[cfg(not(feature = "redis"))]
    if settings.redis.enabled {
        log::warn!("redis.enabled is set but the `redis` feature is off; using the in-process cache");
    }
    Ok(Arc::new(CacheManager::new(&settings.cache)))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let args = Args::parse();
    let settings = match &args.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::new()?,
    };
    init_logging(&settings);

    #[cfg(feature = "observability")]
    if let Some(addr) = args.metrics_addr {
        chain_state_repository::metrics::install_prometheus_exporter(addr)?;
        log::info!("📈 Metrics exporter listening on {}", addr);
    }

    let node = Arc::new(RpcNodeClient::from_settings(&settings)?);
    let store = Arc::new(PgStore::connect(&settings).await?);
    let cache = build_cache(&settings).await?;
    let repository = TieredRepository::new(
        node,
        store,
        cache,
        RepositoryConfig::from(&settings.repository),
    );

    let resolved = repository.account(&args.address).await?;
    let account = &resolved.value;
    let (balance, nonce) = tokio::try_join!(
        repository.account_balance(account),
        repository.account_nonce(account),
    )?;
    let known = repository.account_is_known(&args.address).await;
    let transactions = if args.transactions != 0 {
        Some(
            repository
                .account_transactions(account, None, args.transactions)
                .await?,
        )
    } else {
        None
    };

    if args.json {
        let doc = json!({
            "account": account,
            "source": resolved.source.as_str(),
            "degraded": resolved.degraded,
            "known": known,
            "balance": balance.to_string(),
            "nonce": nonce,
            "transactions": transactions,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("🔎 {:?}", account.address);
    println!("   type:      {}", account.account_type);
    if let Some(tx) = account.contract_tx {
        println!("   created:   {:?}", tx);
    }
    println!(
        "   source:    {}{}",
        resolved.source,
        if resolved.degraded { " (degraded)" } else { "" }
    );
    println!("   known:     {}", known);
    println!("   balance:   {} wei", balance);
    println!("   nonce:     {}", nonce);
    if let Some(page) = transactions {
        println!("   transactions ({} total):", page.total);
        for hash in &page.hashes {
            println!("     {:?}", hash);
        }
    }
    Ok(())
}
