//! Core data structures for the round-up trader
//!
//! Author: AI-Generated
//! Created: 2026-10-16

use alloy::primitives::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal outcome of an execution request.
///
/// `Ok` means the run was stopped on request; `Fail` means a precondition was
/// not met (wrong network, operator declined). Crashes are `Err`, not `Fail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeResult {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "FAIL")]
    Fail,
}

impl fmt::Display for TradeResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TradeResult::Ok => write!(f, "OK"),
            TradeResult::Fail => write!(f, "FAIL"),
        }
    }
}

/// Connected network identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub chain_id: u64,
    pub name: String,
}

impl Network {
    pub fn from_chain_id(chain_id: u64) -> Self {
        Self {
            chain_id,
            name: network_name(chain_id).to_string(),
        }
    }
}

/// Canonical lowercase name for a chain id ("unknown" when not listed)
pub fn network_name(chain_id: u64) -> &'static str {
    match chain_id {
        1 => "mainnet",
        3 => "ropsten",
        4 => "rinkeby",
        5 => "goerli",
        42 => "kovan",
        137 => "polygon",
        8453 => "base",
        11155111 => "sepolia",
        31337 => "anvil",
        _ => "unknown",
    }
}

/// ERC20 display metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub name: String,
    pub symbol: String,
}

/// Token pair plus its resolved pool and router. Immutable once built.
#[derive(Debug, Clone)]
pub struct TokenPairHandle {
    /// Token sold on each round-up (caller order, not canonical order)
    pub token_a: Address,
    /// Token bought on each round-up
    pub token_b: Address,
    pub token_a_info: TokenInfo,
    pub token_b_info: TokenInfo,
    /// Pair contract, looked up with canonically ordered tokens
    pub pair: Address,
    pub router: Address,
}

impl TokenPairHandle {
    /// Swap path for a round-up: A -> B
    pub fn path(&self) -> Vec<Address> {
        vec![self.token_a, self.token_b]
    }

    /// "SYMA/SYMB"
    pub fn symbol(&self) -> String {
        format!("{}/{}", self.token_a_info.symbol, self.token_b_info.symbol)
    }
}

/// Decoded `Sync(reserve0, reserve1)` notification from a pair contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    pub reserve0: U256,
    pub reserve1: U256,
    pub block_number: Option<u64>,
}

/// One executed round-up swap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundupRecord {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub pair: String,
    pub token_a: Address,
    pub token_b: Address,
    pub amount_in: U256,
    pub expected_out: U256,
    pub spent: U256,
    pub gained: U256,
    pub approve_tx: TxHash,
    pub swap_tx: TxHash,
}
