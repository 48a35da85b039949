//! Configuration management
//! Load settings from a .env file (or the process environment)
//!
//! Author: AI-Generated
//! Created: 2026-10-16

use alloy::primitives::{address, Address};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Uniswap V2 factory (same address on mainnet and the classic testnets)
pub const DEFAULT_UNISWAP_FACTORY: Address = address!("5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f");

/// Uniswap V2 Router02
pub const DEFAULT_UNISWAP_ROUTER: Address = address!("7a250d5630B4cF539739dF2C5dAcb4c659F2488D");

pub const DEFAULT_REQUIRED_NETWORK: &str = "rinkeby";

/// Swap must execute within this many seconds of submission
pub const DEFAULT_SWAP_DEADLINE_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct BotConfig {
    // Network
    pub rpc_url: String,
    /// Network name the trader refuses to run without
    pub required_network: String,

    // DEX addresses
    pub uniswap_factory: Address,
    pub uniswap_router: Address,

    // Host stand-ins
    pub seed_file: PathBuf,
    pub state_file: PathBuf,

    // Execution
    pub swap_deadline_secs: u64,
    pub call_timeout_secs: u64,
    pub confirmation_timeout_secs: u64,
    /// Placeholder eligibility flag; there is no threshold rule yet
    pub roundup_enabled: bool,
    /// false = dry run: quote and log, never send transactions (opt-in)
    pub live_mode: bool,
    /// Append executed round-ups to the state store
    pub persist_roundups: bool,
}

impl BotConfig {
    /// Defaults for everything except the RPC endpoint
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            required_network: DEFAULT_REQUIRED_NETWORK.to_string(),
            uniswap_factory: DEFAULT_UNISWAP_FACTORY,
            uniswap_router: DEFAULT_UNISWAP_ROUTER,
            seed_file: PathBuf::from("seed_entropy.json"),
            state_file: PathBuf::from("data/trader_state.json"),
            swap_deadline_secs: DEFAULT_SWAP_DEADLINE_SECS,
            call_timeout_secs: 30,
            confirmation_timeout_secs: 180,
            roundup_enabled: true,
            live_mode: true,
            persist_roundups: false,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

/// First 40 characters of an RPC URL, for logs (API keys usually come later)
pub fn display_url(url: &str) -> String {
    url.chars().take(40).collect()
}

/// Load from `.env` in the working directory, if present, then the environment
pub fn load_config() -> Result<BotConfig> {
    dotenv::dotenv().ok();
    config_from_env()
}

/// Load from a specific env file (e.g. `.env.rinkeby`)
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> Result<BotConfig> {
    dotenv::from_path(path.as_ref())
        .with_context(|| format!("Failed to load env file: {}", path.as_ref().display()))?;
    config_from_env()
}

fn config_from_env() -> Result<BotConfig> {
    from_lookup(|key| std::env::var(key).ok())
}

/// Builds the config from any key lookup (environment, map in tests)
pub fn from_lookup<F>(lookup: F) -> Result<BotConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let rpc_url = lookup("RPC_URL").context("RPC_URL not set")?;
    let mut config = BotConfig::new(rpc_url);

    if let Some(network) = lookup("REQUIRED_NETWORK") {
        config.required_network = network.trim().to_lowercase();
    }
    config.uniswap_factory = parse_or(&lookup, "UNISWAP_FACTORY", config.uniswap_factory)?;
    config.uniswap_router = parse_or(&lookup, "UNISWAP_ROUTER", config.uniswap_router)?;
    if let Some(path) = lookup("SEED_FILE") {
        config.seed_file = PathBuf::from(path);
    }
    if let Some(path) = lookup("STATE_FILE") {
        config.state_file = PathBuf::from(path);
    }
    config.swap_deadline_secs = parse_or(&lookup, "SWAP_DEADLINE_SECS", config.swap_deadline_secs)?;
    config.call_timeout_secs = parse_or(&lookup, "CALL_TIMEOUT_SECS", config.call_timeout_secs)?;
    config.confirmation_timeout_secs =
        parse_or(&lookup, "CONFIRMATION_TIMEOUT_SECS", config.confirmation_timeout_secs)?;
    config.roundup_enabled = parse_or(&lookup, "ROUNDUP_ENABLED", config.roundup_enabled)?;
    config.live_mode = parse_or(&lookup, "LIVE_MODE", config.live_mode)?;
    config.persist_roundups = parse_or(&lookup, "PERSIST_ROUNDUPS", config.persist_roundups)?;

    Ok(config)
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: {}", key, raw)),
        None => Ok(default),
    }
}
