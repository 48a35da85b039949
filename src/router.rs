//! Command Router
//!
//! JSON-RPC-style entry point. A caller (wallet page, CLI) names a method and
//! passes JSON params; the router maps it onto the trader:
//! - `hello`        greeting confirmation, returns the operator's choice
//! - `execute`      `{ tokenA, tokenB }`, runs until stopped
//! - `stop`         ends the running loop
//! - `get_executed` persisted round-up records
//!
//! Author: AI-Generated
//! Created: 2026-10-16

use crate::gate::GateError;
use crate::host::{ConfirmRequest, HostRuntime};
use crate::trader::RoundupTrader;
use crate::types::{RoundupRecord, TradeResult};
use alloy::primitives::Address;
use anyhow::{Context, Result};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params for {method}: {source}")]
    InvalidParams {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteParams {
    pub token_a: Address,
    pub token_b: Address,
}

pub struct CommandRouter {
    trader: Arc<RoundupTrader>,
    host: Arc<dyn HostRuntime>,
}

impl CommandRouter {
    pub fn new(trader: Arc<RoundupTrader>, host: Arc<dyn HostRuntime>) -> Self {
        Self { trader, host }
    }

    /// Dispatches one request from `origin`
    pub async fn handle(&self, origin: &str, request: RpcRequest) -> Result<Value> {
        info!("RPC | {} from {}", request.method, origin);
        match request.method.as_str() {
            "hello" => Ok(Value::Bool(self.hello(origin).await?)),
            "execute" => {
                let params: ExecuteParams =
                    serde_json::from_value(request.params).map_err(|source| RouterError::InvalidParams {
                        method: request.method.clone(),
                        source,
                    })?;
                let result = self.execute(params).await?;
                Ok(serde_json::to_value(result)?)
            }
            "stop" => Ok(serde_json::to_value(self.stop())?),
            "get_executed" => Ok(serde_json::to_value(self.get_executed().await?)?),
            other => Err(RouterError::MethodNotFound(other.to_string()).into()),
        }
    }

    /// Like `handle`, but reacts to OS signals while the request runs.
    ///
    /// A signal during monitoring stops the loop and the request finishes
    /// normally. A signal before monitoring has started (connecting, fetching
    /// metadata, waiting on the prompt) abandons the request: returns `None`.
    pub async fn handle_until_signal<S>(
        &self,
        origin: &str,
        request: RpcRequest,
        signals: S,
    ) -> Result<Option<Value>>
    where
        S: Stream<Item = i32> + Unpin,
    {
        let method = request.method.clone();
        let mut signals = signals.fuse();
        let run = self.handle(origin, request);
        tokio::pin!(run);

        loop {
            tokio::select! {
                result = &mut run => return result.map(Some),
                Some(signal) = signals.next() => {
                    if self.stop() == TradeResult::Ok {
                        info!("RPC | signal {}: stopping, current cycle finishes first", signal);
                    } else {
                        warn!("RPC | signal {} before monitoring started, abandoning {}", signal, method);
                        return Ok(None);
                    }
                }
            }
        }
    }

    pub async fn hello(&self, origin: &str) -> Result<bool> {
        self.host
            .confirm(ConfirmRequest {
                prompt: format!("Hello, {}!", origin),
                description: Some("This custom confirmation is just for display purposes.".to_string()),
                text_area_content: Some(
                    "Approving does nothing; use execute to start trading.".to_string(),
                ),
            })
            .await
    }

    /// `FAIL` when a loop is already running, else the loop's own result
    pub async fn execute(&self, params: ExecuteParams) -> Result<TradeResult> {
        if self.trader.is_running() {
            warn!("RPC | execute rejected, a trading loop is already running");
            return Ok(TradeResult::Fail);
        }

        match self.trader.execute(params.token_a, params.token_b).await {
            Ok(result) => Ok(result),
            // Lost the race against another execute
            Err(e) if e.downcast_ref::<GateError>() == Some(&GateError::AlreadyRunning) => {
                warn!("RPC | execute rejected: {}", e);
                Ok(TradeResult::Fail)
            }
            Err(e) => Err(e),
        }
    }

    pub fn stop(&self) -> TradeResult {
        match self.trader.stop() {
            Ok(()) => TradeResult::Ok,
            Err(e) => {
                warn!("RPC | stop: {}", e);
                TradeResult::Fail
            }
        }
    }

    pub async fn get_executed(&self) -> Result<Vec<RoundupRecord>> {
        let state = self
            .trader
            .store()
            .get()
            .await
            .context("Failed to read trader state")?;
        Ok(state.map(|s| s.logs).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BotConfig;
    use crate::dex::{DexClient, DexConnector};
    use crate::host::{append_record, MemoryStateStore, StateStore};
    use crate::signer::SeedEntropy;
    use alloy::primitives::{TxHash, U256};
    use alloy::signers::local::PrivateKeySigner;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedHost {
        answer: bool,
        prompts: Mutex<Vec<ConfirmRequest>>,
    }

    #[async_trait]
    impl HostRuntime for ScriptedHost {
        async fn get_bip44_entropy(&self, _coin_type: u32) -> Result<SeedEntropy> {
            Ok(SeedEntropy {
                depth: 2,
                coin_type: 60,
                private_key: "0x1f6f0b0b3c0a6c1f4b0d2a7a9e5d8c3b2a1f0e9d8c7b6a5f4e3d2c1b0a998877".into(),
                chain_code: "0x6b3c9a1e2d4f5a6b7c8d9e0f1a2b3c4d5e6f7a8b9c0d1e2f3a4b5c6d7e8f9a0b".into(),
            })
        }

        async fn confirm(&self, request: ConfirmRequest) -> Result<bool> {
            self.prompts.lock().unwrap().push(request);
            Ok(self.answer)
        }
    }

    /// No chain in these tests: every connection attempt fails
    #[derive(Default)]
    struct OfflineConnector {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl DexConnector for OfflineConnector {
        async fn connect(&self, _signer: &PrivateKeySigner) -> Result<Box<dyn DexClient>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("node unreachable"))
        }
    }

    struct HangingConnector;

    #[async_trait]
    impl DexConnector for HangingConnector {
        async fn connect(&self, _signer: &PrivateKeySigner) -> Result<Box<dyn DexClient>> {
            futures::future::pending::<Result<Box<dyn DexClient>>>().await
        }
    }

    struct Fixture {
        router: CommandRouter,
        trader: Arc<RoundupTrader>,
        host: Arc<ScriptedHost>,
        connector: Arc<OfflineConnector>,
        store: Arc<MemoryStateStore>,
    }

    fn fixture(answer: bool) -> Fixture {
        let host = Arc::new(ScriptedHost {
            answer,
            prompts: Mutex::new(Vec::new()),
        });
        let connector = Arc::new(OfflineConnector::default());
        let store = Arc::new(MemoryStateStore::new());
        let trader = Arc::new(RoundupTrader::new(
            BotConfig::new("ws://unused"),
            host.clone(),
            connector.clone(),
            store.clone(),
        ));
        let router = CommandRouter::new(Arc::clone(&trader), host.clone());
        Fixture {
            router,
            trader,
            host,
            connector,
            store,
        }
    }

    fn execute_params() -> Value {
        json!({
            "tokenA": "0x1111111111111111111111111111111111111111",
            "tokenB": "0x2222222222222222222222222222222222222222",
        })
    }

    #[tokio::test]
    async fn test_hello_greets_origin() {
        let f = fixture(true);
        let reply = f
            .router
            .handle("https://app.example", RpcRequest::new("hello", Value::Null))
            .await
            .unwrap();
        assert_eq!(reply, json!(true));

        let prompts = f.host.prompts.lock().unwrap();
        assert_eq!(prompts[0].prompt, "Hello, https://app.example!");
    }

    #[tokio::test]
    async fn test_hello_returns_refusal() {
        let f = fixture(false);
        assert!(!f.router.hello("localhost").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let f = fixture(true);
        let err = f
            .router
            .handle("localhost", RpcRequest::new("withdraw_all", Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RouterError>(),
            Some(RouterError::MethodNotFound(m)) if m == "withdraw_all"
        ));
    }

    #[tokio::test]
    async fn test_stop_when_idle_fails() {
        let f = fixture(true);
        let reply = f
            .router
            .handle("localhost", RpcRequest::new("stop", Value::Null))
            .await
            .unwrap();
        assert_eq!(reply, json!("FAIL"));
    }

    #[tokio::test]
    async fn test_stop_while_running() {
        let f = fixture(true);
        let mut signal = tokio_test::task::spawn(f.trader.gate().start().unwrap());

        assert_eq!(f.router.stop(), TradeResult::Ok);
        tokio_test::assert_ready_eq!(signal.poll(), TradeResult::Ok);
        assert_eq!(f.router.stop(), TradeResult::Fail);
    }

    #[tokio::test]
    async fn test_execute_while_running_fails_fast() {
        let f = fixture(true);
        let _running = f.trader.gate().start().unwrap();

        let reply = f
            .router
            .handle("localhost", RpcRequest::new("execute", execute_params()))
            .await
            .unwrap();
        assert_eq!(reply, json!("FAIL"));
        assert_eq!(f.connector.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_execute_propagates_errors() {
        let f = fixture(true);
        let err = f
            .router
            .handle("localhost", RpcRequest::new("execute", execute_params()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("node unreachable"));
        assert_eq!(f.connector.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_rejects_bad_params() {
        let f = fixture(true);
        let err = f
            .router
            .handle("localhost", RpcRequest::new("execute", json!({ "tokenA": "0x11" })))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RouterError>(),
            Some(RouterError::InvalidParams { method, .. }) if method == "execute"
        ));
    }

    #[tokio::test]
    async fn test_get_executed_reads_store() {
        let f = fixture(true);
        let empty = f
            .router
            .handle("localhost", RpcRequest::new("get_executed", Value::Null))
            .await
            .unwrap();
        assert_eq!(empty, json!([]));

        let record = RoundupRecord {
            timestamp: chrono::Utc::now(),
            pair: "AAA/BBB".to_string(),
            token_a: Address::repeat_byte(0x11),
            token_b: Address::repeat_byte(0x22),
            amount_in: U256::from(500),
            expected_out: U256::from(990),
            spent: U256::from(500),
            gained: U256::from(987),
            approve_tx: TxHash::repeat_byte(1),
            swap_tx: TxHash::repeat_byte(2),
        };
        append_record(f.store.as_ref() as &dyn StateStore, record.clone())
            .await
            .unwrap();

        assert_eq!(f.router.get_executed().await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn test_signal_before_monitoring_abandons_execute() {
        let host = Arc::new(ScriptedHost {
            answer: true,
            prompts: Mutex::new(Vec::new()),
        });
        let trader = Arc::new(RoundupTrader::new(
            BotConfig::new("ws://unused"),
            host.clone(),
            Arc::new(HangingConnector),
            Arc::new(MemoryStateStore::new()),
        ));
        let router = CommandRouter::new(Arc::clone(&trader), host.clone());

        let (signals, receiver) = tokio::sync::mpsc::unbounded_channel();
        signals.send(2).unwrap();
        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            router.handle_until_signal(
                "localhost",
                RpcRequest::new("execute", execute_params()),
                tokio_stream::wrappers::UnboundedReceiverStream::new(receiver),
            ),
        )
        .await
        .expect("signal was ignored")
        .unwrap();

        assert_eq!(outcome, None);
        assert!(host.prompts.lock().unwrap().is_empty());
        assert!(!trader.is_running());
    }

    #[tokio::test]
    async fn test_request_without_signal_completes() {
        let f = fixture(true);
        let outcome = f
            .router
            .handle_until_signal(
                "localhost",
                RpcRequest::new("stop", Value::Null),
                futures::stream::pending::<i32>(),
            )
            .await
            .unwrap();
        assert_eq!(outcome, Some(json!("FAIL")));

        let err = f
            .router
            .handle_until_signal(
                "localhost",
                RpcRequest::new("execute", execute_params()),
                futures::stream::pending::<i32>(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("node unreachable"));
    }

    #[test]
    fn test_request_wire_shape() {
        let request: RpcRequest = serde_json::from_str(r#"{"method":"stop"}"#).unwrap();
        assert_eq!(request.method, "stop");
        assert_eq!(request.params, Value::Null);
    }
}
