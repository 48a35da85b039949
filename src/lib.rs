//! Round-Up Trader Library
//!
//! Event-driven Uniswap V2 trader that "rounds up" a token pair: every pool
//! `Sync` event swaps half of the token A balance into token B, until stopped.
//! The account is derived from host-provided BIP-44 entropy and the operator
//! confirms it before any trading starts.
//!
//! Author: AI-Generated
//! Created: 2026-10-16

pub mod config;
pub mod contracts;
pub mod dex;
pub mod gate;
pub mod host;
pub mod pair;
pub mod router;
pub mod signer;
pub mod trader;
pub mod types;

// Re-export commonly used types
pub use config::{load_config, BotConfig};
pub use dex::{AlloyConnector, DexClient, DexConnector};
pub use gate::{CancellationGate, GateError};
pub use host::{HostRuntime, JsonFileStore, LocalHost, StateStore};
pub use pair::sort_addresses;
pub use router::{CommandRouter, RpcRequest};
pub use trader::RoundupTrader;
pub use types::{RoundupRecord, TradeResult};
