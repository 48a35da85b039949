//! Round-Up Trader
//!
//! Standalone runner for the round-up strategy. Stands in for the wallet host:
//! seed entropy from a JSON file, confirmations on the terminal, state in a
//! JSON file. SIGINT/SIGTERM stop the monitoring loop (the current swap, if
//! any, finishes first).
//!
//! Usage:
//!   roundup-trader --token-a 0x... --token-b 0x...
//!   roundup-trader --env-file .env.rinkeby --token-a 0x... --token-b 0x... --yes
//!   roundup-trader --token-a 0x... --token-b 0x... --dry-run
//!
//! A signal before monitoring has started (connecting, prompting) exits
//! immediately with status 130.
//!
//! Author: AI-Generated
//! Created: 2026-10-16

use alloy::primitives::Address;
use anyhow::Result;
use clap::Parser;
use roundup_trader::config::{display_url, load_config, load_config_from_file};
use roundup_trader::dex::AlloyConnector;
use roundup_trader::host::{JsonFileStore, LocalHost};
use roundup_trader::router::{CommandRouter, RpcRequest};
use roundup_trader::trader::RoundupTrader;
use serde_json::json;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Origin reported to the router for terminal requests
const CLI_ORIGIN: &str = "roundup-trader-cli";

/// Round-up trader for a Uniswap V2 token pair
#[derive(Parser)]
#[command(name = "roundup-trader")]
struct Args {
    /// Env file to load instead of ./.env
    #[arg(long, env = "ENV_FILE")]
    env_file: Option<PathBuf>,

    /// Token sold on each round-up
    #[arg(long, env = "TOKEN_A")]
    token_a: Address,

    /// Token bought on each round-up
    #[arg(long, env = "TOKEN_B")]
    token_b: Address,

    /// Answer yes to every confirmation prompt
    #[arg(long)]
    yes: bool,

    /// Quote and log only, never send transactions (same as LIVE_MODE=false)
    #[arg(long)]
    dry_run: bool,
}

/// Exit status after an interrupt (128 + SIGINT)
const INTERRUPTED_EXIT: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    let mut config = match &args.env_file {
        Some(path) => load_config_from_file(path)?,
        None => load_config()?,
    };
    if args.dry_run {
        config.live_mode = false;
    }
    info!("Round-Up Trader starting (network: {})", config.required_network);
    info!("RPC URL: {}", display_url(&config.rpc_url));
    info!("Router: {:?} | Factory: {:?}", config.uniswap_router, config.uniswap_factory);
    if config.live_mode {
        warn!("LIVE MODE: round-ups send real transactions");
    } else {
        info!("Dry run: quotes are logged, no transactions are sent");
    }

    let host = Arc::new(LocalHost::new(&config.seed_file, args.yes));
    let store = Arc::new(JsonFileStore::new(&config.state_file));
    let connector = Arc::new(AlloyConnector::new(
        config.rpc_url.clone(),
        config.uniswap_factory,
        config.uniswap_router,
    ));
    let trader = Arc::new(RoundupTrader::new(config, host.clone(), connector, store));
    let router = CommandRouter::new(Arc::clone(&trader), host);

    // SIGINT/SIGTERM → stop (or abandon, before monitoring)
    let signals = Signals::new([SIGINT, SIGTERM])?;
    let signals_handle = signals.handle();

    let request = RpcRequest::new(
        "execute",
        json!({ "tokenA": args.token_a, "tokenB": args.token_b }),
    );
    let outcome = router.handle_until_signal(CLI_ORIGIN, request, signals).await;
    signals_handle.close();

    match outcome {
        Ok(None) => {
            warn!("Interrupted before monitoring started - exiting");
            // A pending stdin prompt would otherwise keep the runtime alive
            std::process::exit(INTERRUPTED_EXIT);
        }
        Ok(Some(result)) => {
            info!("Execution finished: {}", result);
            let executed = router.get_executed().await?;
            info!("{} round-ups recorded", executed.len());
            Ok(())
        }
        Err(e) => {
            error!("Execution failed: {:#}", e);
            Err(e)
        }
    }
}
