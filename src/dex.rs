//! DEX Client
//!
//! Everything the trader needs from the chain, behind one trait so the trading
//! loop can run against alloy in production and against a scripted client in
//! tests:
//! - network identity
//! - ERC20 metadata / balances / approvals
//! - Uniswap V2 factory `getPair`, router `getAmountsOut` and swaps
//! - pair `Sync` event subscription (WS)
//!
//! Transactions wait for their receipt and fail on revert. Timeouts are the
//! caller's concern.
//!
//! Author: AI-Generated
//! Created: 2026-10-16

use crate::config::display_url;
use crate::contracts::{IUniswapV2Factory, IUniswapV2Pair, IUniswapV2Router02, IERC20};
use crate::types::{Network, SyncEvent, TokenInfo};
use alloy::network::EthereumWallet;
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::Filter;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolEvent;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{debug, info};

/// Lazy, unbounded sequence of pair `Sync` notifications
pub type SyncStream = BoxStream<'static, Result<SyncEvent>>;

#[async_trait]
pub trait DexClient: Send + Sync {
    async fn network(&self) -> Result<Network>;

    async fn token_info(&self, token: Address) -> Result<TokenInfo>;

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256>;

    /// Factory lookup. Returns `Address::ZERO` when no pair exists.
    async fn get_pair(&self, token0: Address, token1: Address) -> Result<Address>;

    async fn amounts_out(&self, amount_in: U256, path: &[Address]) -> Result<Vec<U256>>;

    /// Sends `approve` and waits for a successful receipt
    async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<TxHash>;

    /// Sends `swapExactTokensForTokens` and waits for a successful receipt
    async fn swap_exact_tokens_for_tokens(
        &self,
        amount_in: U256,
        amount_out_min: U256,
        path: &[Address],
        to: Address,
        deadline: U256,
    ) -> Result<TxHash>;

    async fn subscribe_sync(&self, pair: Address) -> Result<SyncStream>;
}

/// Builds a `DexClient` that signs with the given account
#[async_trait]
pub trait DexConnector: Send + Sync {
    async fn connect(&self, signer: &PrivateKeySigner) -> Result<Box<dyn DexClient>>;
}

/// Connects alloy WebSocket providers with a wallet filler
pub struct AlloyConnector {
    rpc_url: String,
    factory: Address,
    router: Address,
}

impl AlloyConnector {
    pub fn new(rpc_url: impl Into<String>, factory: Address, router: Address) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            factory,
            router,
        }
    }
}

#[async_trait]
impl DexConnector for AlloyConnector {
    async fn connect(&self, signer: &PrivateKeySigner) -> Result<Box<dyn DexClient>> {
        let wallet = EthereumWallet::from(signer.clone());
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_ws(WsConnect::new(self.rpc_url.as_str()))
            .await
            .context("WS connect failed")?;
        info!(
            "Connected to {} as {:?}",
            display_url(&self.rpc_url),
            signer.address()
        );

        Ok(Box::new(AlloyDex::new(provider, self.factory, self.router)))
    }
}

/// `DexClient` over any alloy provider that can sign and subscribe
pub struct AlloyDex<P> {
    provider: P,
    factory: Address,
    router: Address,
}

impl<P: Provider + Clone + 'static> AlloyDex<P> {
    pub fn new(provider: P, factory: Address, router: Address) -> Self {
        Self {
            provider,
            factory,
            router,
        }
    }
}

#[async_trait]
impl<P: Provider + Clone + 'static> DexClient for AlloyDex<P> {
    async fn network(&self) -> Result<Network> {
        let chain_id = self
            .provider
            .get_chain_id()
            .await
            .context("Failed to get chain id")?;
        Ok(Network::from_chain_id(chain_id))
    }

    async fn token_info(&self, token: Address) -> Result<TokenInfo> {
        let erc20 = IERC20::new(token, self.provider.clone());
        let name_call = erc20.name();
        let symbol_call = erc20.symbol();
        let (name, symbol) = tokio::try_join!(name_call.call(), symbol_call.call())
            .with_context(|| format!("Failed to get metadata for token {:?}", token))?;
        Ok(TokenInfo { name, symbol })
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256> {
        IERC20::new(token, self.provider.clone())
            .balanceOf(owner)
            .call()
            .await
            .with_context(|| format!("Failed to get balance of {:?} for {:?}", token, owner))
    }

    async fn get_pair(&self, token0: Address, token1: Address) -> Result<Address> {
        IUniswapV2Factory::new(self.factory, self.provider.clone())
            .getPair(token0, token1)
            .call()
            .await
            .context("Failed to get pair address")
    }

    async fn amounts_out(&self, amount_in: U256, path: &[Address]) -> Result<Vec<U256>> {
        IUniswapV2Router02::new(self.router, self.provider.clone())
            .getAmountsOut(amount_in, path.to_vec())
            .call()
            .await
            .context("getAmountsOut failed")
    }

    async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<TxHash> {
        let pending = IERC20::new(token, self.provider.clone())
            .approve(spender, amount)
            .send()
            .await
            .map_err(|e| anyhow!("Approve send failed: {}", e))?;
        debug!("Approve tx submitted: {:?}", pending.tx_hash());

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| anyhow!("Approve confirmation failed: {}", e))?;
        if !receipt.status() {
            bail!("Approval transaction reverted: {:?}", receipt.transaction_hash);
        }
        Ok(receipt.transaction_hash)
    }

    async fn swap_exact_tokens_for_tokens(
        &self,
        amount_in: U256,
        amount_out_min: U256,
        path: &[Address],
        to: Address,
        deadline: U256,
    ) -> Result<TxHash> {
        let pending = IUniswapV2Router02::new(self.router, self.provider.clone())
            .swapExactTokensForTokens(amount_in, amount_out_min, path.to_vec(), to, deadline)
            .send()
            .await
            .map_err(|e| anyhow!("Swap send failed: {}", e))?;
        info!("V2 swap tx submitted: {:?}", pending.tx_hash());

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| anyhow!("Swap confirmation failed: {}", e))?;
        if !receipt.status() {
            bail!("Swap transaction reverted: {:?}", receipt.transaction_hash);
        }
        Ok(receipt.transaction_hash)
    }

    async fn subscribe_sync(&self, pair: Address) -> Result<SyncStream> {
        let filter = Filter::new()
            .address(pair)
            .event_signature(IUniswapV2Pair::Sync::SIGNATURE_HASH);
        let subscription = self
            .provider
            .subscribe_logs(&filter)
            .await
            .context("Failed to subscribe to pair Sync events")?;
        debug!("Subscribed to Sync events of {:?}", pair);

        let stream = subscription.into_stream().map(|log| {
            let block_number = log.block_number;
            let decoded = log
                .log_decode::<IUniswapV2Pair::Sync>()
                .context("Malformed Sync log")?;
            Ok(SyncEvent {
                reserve0: U256::from(decoded.inner.data.reserve0),
                reserve1: U256::from(decoded.inner.data.reserve1),
                block_number,
            })
        });
        Ok(stream.boxed())
    }
}
