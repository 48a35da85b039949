//! Canonical token ordering
//!
//! Uniswap V2 pairs are keyed by (token0, token1) with token0 < token1 as
//! 160-bit integers. Ordering before `getPair` keeps lookups stable whatever
//! order the caller passes the tokens in.
//!
//! Author: AI-Generated
//! Created: 2026-10-16

use alloy::primitives::{Address, U160};

/// Returns `(low, high)` by numeric value. Equal inputs keep their order.
pub fn sort_addresses(a: Address, b: Address) -> (Address, Address) {
    if address_value(b) < address_value(a) {
        (b, a)
    } else {
        (a, b)
    }
}

fn address_value(address: Address) -> U160 {
    U160::from_be_bytes(address.0 .0)
}
