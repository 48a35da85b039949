//! Round-Up Trader
//!
//! Event-driven executor for one token pair:
//!
//!   IDLE → CHECKING_NETWORK → AWAITING_CONSENT → MONITORING ⇄ EXECUTING_SWAP
//!                    │                 │               │
//!                  FAIL              FAIL           OK (stop)
//!
//! - Signer: derived once per run from host entropy (m/44'/60'/0'/0/0)
//! - Pool: Uniswap V2 pair, looked up with canonically ordered tokens
//! - Monitoring: race between the cancellation gate and the next pair `Sync`
//!   event. Stop wins when both are ready in the same poll.
//! - Round-up: swap half of the token A balance into token B
//!   (approve → wait → swap → wait), then report balances spent/gained.
//!
//! A stop request only interrupts MONITORING. A swap that has started runs
//! to completion (or failure) first. Any RPC failure, revert, timeout or
//! malformed response ends the run with an error; nothing is retried here.
//!
//! Author: AI-Generated
//! Created: 2026-10-16

use crate::config::BotConfig;
use crate::dex::{DexClient, DexConnector, SyncStream};
use crate::gate::{CancellationGate, GateError, StopSignal};
use crate::host::{append_record, ConfirmRequest, HostRuntime, StateStore};
use crate::pair::sort_addresses;
use crate::signer::{derivation_path, derive_signer, ACCOUNT_INDEX, ETH_COIN_TYPE};
use crate::types::{RoundupRecord, TokenPairHandle, TradeResult};
use alloy::primitives::{Address, TxHash, U256};
use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use futures::stream::Fuse;
use futures::{FutureExt, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Share of the token A balance traded per round-up (1/2)
pub const ROUNDUP_DIVISOR: u64 = 2;

/// Minimum output accepted by the swap
pub const MIN_AMOUNT_OUT: u64 = 1;

type SyncEvents = Fuse<SyncStream>;

/// Amount of token A to trade for a given balance
pub fn trade_amount(balance_a: U256) -> U256 {
    balance_a / U256::from(ROUNDUP_DIVISOR)
}

pub struct RoundupTrader {
    config: BotConfig,
    host: Arc<dyn HostRuntime>,
    connector: Arc<dyn DexConnector>,
    store: Arc<dyn StateStore>,
    gate: CancellationGate,
}

impl RoundupTrader {
    pub fn new(
        config: BotConfig,
        host: Arc<dyn HostRuntime>,
        connector: Arc<dyn DexConnector>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            config,
            host,
            connector,
            store,
            gate: CancellationGate::new(),
        }
    }

    /// Handle for stopping this trader from elsewhere
    pub fn gate(&self) -> CancellationGate {
        self.gate.clone()
    }

    pub fn is_running(&self) -> bool {
        self.gate.is_running()
    }

    /// Ends the monitoring loop; the running `execute` returns `OK`.
    pub fn stop(&self) -> Result<(), GateError> {
        self.gate.trigger()
    }

    pub fn store(&self) -> Arc<dyn StateStore> {
        Arc::clone(&self.store)
    }

    /// Runs the round-up strategy for `token_a → token_b` until stopped.
    ///
    /// Returns `FAIL` on an unmet precondition (wrong network, declined),
    /// `OK` when stopped, and `Err` on anything else.
    pub async fn execute(&self, token_a: Address, token_b: Address) -> Result<TradeResult> {
        let entropy = self
            .host
            .get_bip44_entropy(ETH_COIN_TYPE)
            .await
            .context("Failed to get BIP-44 entropy from host")?;
        let signer = derive_signer(&entropy, ACCOUNT_INDEX)?;
        let owner = signer.address();
        info!("TRADER | account {:?} ({})", owner, derivation_path(ACCOUNT_INDEX));

        let client = self.call("connect", self.connector.connect(&signer)).await?;

        // CHECKING_NETWORK
        let network = self.call("network", client.network()).await?;
        if network.name != self.config.required_network {
            warn!(
                "TRADER | connected to {} (chain {}), {} required",
                network.name, network.chain_id, self.config.required_network
            );
            return Ok(TradeResult::Fail);
        }

        let (token_a_info, token_b_info) = tokio::try_join!(
            self.call("token A metadata", client.token_info(token_a)),
            self.call("token B metadata", client.token_info(token_b)),
        )?;

        let (token0, token1) = sort_addresses(token_a, token_b);
        let pair = self.call("getPair", client.get_pair(token0, token1)).await?;
        if pair == Address::ZERO {
            bail!("No Uniswap V2 pair for {:?} / {:?}", token0, token1);
        }
        let handle = TokenPairHandle {
            token_a,
            token_b,
            token_a_info,
            token_b_info,
            pair,
            router: self.config.uniswap_router,
        };
        info!("TRADER | {} pair {:?}", handle.symbol(), pair);

        // AWAITING_CONSENT
        let request = ConfirmRequest {
            prompt: "Do you want to use this account?".to_string(),
            description: None,
            text_area_content: Some(format!(
                "Do you want to use the account \"{:?}\" for algorithmic trading between \"{}\" and \"{}\"?",
                owner, handle.token_a_info.name, handle.token_b_info.name
            )),
        };
        if !self.host.confirm(request).await? {
            info!("TRADER | operator declined");
            return Ok(TradeResult::Fail);
        }

        // MONITORING
        let signal = self.gate.start()?;
        let mut events = self
            .call("subscribe", client.subscribe_sync(pair))
            .await?
            .fuse();

        let result = self
            .monitor(client.as_ref(), owner, &handle, signal, &mut events)
            .await;
        drop(signer);
        result
    }

    /// MONITORING ⇄ EXECUTING_SWAP until the gate fires or something fails.
    async fn monitor(
        &self,
        client: &dyn DexClient,
        owner: Address,
        handle: &TokenPairHandle,
        mut signal: StopSignal,
        events: &mut SyncEvents,
    ) -> Result<TradeResult> {
        let mut cycles = 0u64;

        loop {
            info!("TRADER | listening for {} Sync events", handle.symbol());

            let next = tokio::select! {
                biased;

                result = &mut signal => {
                    info!("TRADER | requested to stop after {} cycles", cycles);
                    return Ok(result);
                }
                next = events.next() => next,
            };

            let sync = match next {
                Some(Ok(sync)) => sync,
                Some(Err(e)) => return Err(e.context("Sync subscription failed")),
                None => bail!("Sync subscription closed"),
            };
            cycles += 1;
            debug!(
                "TRADER | Sync #{} block={:?} reserves=({}, {})",
                cycles, sync.block_number, sync.reserve0, sync.reserve1
            );
            info!("TRADER | sync happened, calculating trade");

            // EXECUTING_SWAP
            self.roundup(client, owner, handle).await?;

            // The swap's own Sync (and anything else that arrived meanwhile)
            // must not trigger the next cycle
            let skipped = drain_buffered(events)?;
            if skipped > 0 {
                debug!("TRADER | skipped {} Sync events received during the swap", skipped);
            }
        }
    }

    /// One round-up. Returns the record when a swap was executed.
    async fn roundup(
        &self,
        client: &dyn DexClient,
        owner: Address,
        handle: &TokenPairHandle,
    ) -> Result<Option<RoundupRecord>> {
        let symbol_a = &handle.token_a_info.symbol;
        let symbol_b = &handle.token_b_info.symbol;

        let (balance_a, balance_b) = tokio::try_join!(
            self.call("token A balance", client.balance_of(handle.token_a, owner)),
            self.call("token B balance", client.balance_of(handle.token_b, owner)),
        )?;

        let amount_in = trade_amount(balance_a);
        if amount_in.is_zero() {
            info!("TRADER | no {} to round up (balance {})", symbol_a, balance_a);
            return Ok(None);
        }

        let amounts = self
            .call("getAmountsOut", client.amounts_out(amount_in, &handle.path()))
            .await?;
        let expected_out = *amounts.get(1).ok_or_else(|| {
            anyhow!("Malformed getAmountsOut response: {} amounts for a 2-token path", amounts.len())
        })?;
        info!("TRADER | expected amount gained {}{}", expected_out, symbol_b);

        if !self.is_eligible() {
            debug!("TRADER | round-up disabled, skipping");
            return Ok(None);
        }

        if !self.config.live_mode {
            info!(
                "TRADER | DRY RUN: would approve and swap {}{} for ~{}{}",
                amount_in, symbol_a, expected_out, symbol_b
            );
            return Ok(None);
        }

        info!("TRADER | round-up eligible, swapping {}{}", amount_in, symbol_a);
        let approve_tx = self
            .confirm_tx("approve", client.approve(handle.token_a, handle.router, amount_in))
            .await?;
        debug!("TRADER | approval confirmed: {:?}", approve_tx);

        let deadline = deadline_after(unix_now(), self.config.swap_deadline_secs);
        let swap_tx = self
            .confirm_tx(
                "swap",
                client.swap_exact_tokens_for_tokens(
                    amount_in,
                    U256::from(MIN_AMOUNT_OUT),
                    &handle.path(),
                    owner,
                    deadline,
                ),
            )
            .await?;

        let (end_balance_a, end_balance_b) = tokio::try_join!(
            self.call("token A balance", client.balance_of(handle.token_a, owner)),
            self.call("token B balance", client.balance_of(handle.token_b, owner)),
        )?;

        let record = RoundupRecord {
            timestamp: Utc::now(),
            pair: handle.symbol(),
            token_a: handle.token_a,
            token_b: handle.token_b,
            amount_in,
            expected_out,
            spent: balance_a.saturating_sub(end_balance_a),
            gained: end_balance_b.saturating_sub(balance_b),
            approve_tx,
            swap_tx,
        };
        info!(
            "TRADER | executed roundup: spent {}{}, gained {}{} | tx {:?}",
            record.spent, symbol_a, record.gained, symbol_b, swap_tx
        );

        if self.config.persist_roundups {
            append_record(self.store.as_ref(), record.clone()).await?;
        }

        Ok(Some(record))
    }

    /// Placeholder policy: there is no threshold rule yet, only the switch
    fn is_eligible(&self) -> bool {
        self.config.roundup_enabled
    }

    async fn call<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        with_timeout(self.config.call_timeout(), what, fut).await
    }

    async fn confirm_tx(&self, what: &str, fut: impl Future<Output = Result<TxHash>>) -> Result<TxHash> {
        with_timeout(self.config.confirmation_timeout(), what, fut).await
    }
}

async fn with_timeout<T>(limit: Duration, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| anyhow!("{} timed out after {:?}", what, limit))?
}

/// Consumes notifications that are already buffered, without waiting.
fn drain_buffered(events: &mut SyncEvents) -> Result<usize> {
    let mut skipped = 0;
    while let Some(item) = events.next().now_or_never() {
        match item {
            Some(Ok(_)) => skipped += 1,
            Some(Err(e)) => return Err(e.context("Sync subscription failed")),
            // Closed: the next wait reports it
            None => break,
        }
    }
    Ok(skipped)
}

/// Swap deadline `secs` after `now`, clamped instead of overflowing
fn deadline_after(now: u64, secs: u64) -> U256 {
    U256::from(now.saturating_add(secs))
}

fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}
