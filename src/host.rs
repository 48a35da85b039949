//! Host Runtime Capabilities
//!
//! The wallet host owns the seed, the operator's attention and a small JSON
//! state slot. The trader only sees them through these traits:
//! - `HostRuntime`: BIP-44 entropy and confirmation prompts
//! - `StateStore`: get/update of the persisted `TraderState`
//!
//! `LocalHost` and `JsonFileStore` stand in for the wallet when running as a
//! standalone binary: entropy comes from a JSON file, prompts go to the
//! terminal, state goes to a JSON file written atomically.
//!
//! Author: AI-Generated
//! Created: 2026-10-16

use crate::signer::SeedEntropy;
use crate::types::RoundupRecord;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Confirmation dialog shown to the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_area_content: Option<String>,
}

#[async_trait]
pub trait HostRuntime: Send + Sync {
    /// BIP-44 coin-type node `m/44'/{coin_type}'`
    async fn get_bip44_entropy(&self, coin_type: u32) -> Result<SeedEntropy>;

    /// Shows a confirmation dialog and returns the operator's choice
    async fn confirm(&self, request: ConfirmRequest) -> Result<bool>;
}

/// Persisted trader state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraderState {
    #[serde(default)]
    pub logs: Vec<RoundupRecord>,
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self) -> Result<Option<TraderState>>;

    async fn update(&self, state: TraderState) -> Result<()>;
}

/// Appends a record to the store's log list
pub async fn append_record(store: &dyn StateStore, record: RoundupRecord) -> Result<()> {
    let mut state = store.get().await?.unwrap_or_default();
    state.logs.push(record);
    store.update(state).await
}

/// In-process store (nothing survives a restart)
#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<TraderState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self) -> Result<Option<TraderState>> {
        Ok(self.state.lock().await.clone())
    }

    async fn update(&self, state: TraderState) -> Result<()> {
        *self.state.lock().await = Some(state);
        Ok(())
    }
}

/// JSON file store. Writes go to a temp file first, then rename (atomic).
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn get(&self) -> Result<Option<TraderState>> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read state file: {}", self.path.display()))
            }
        };
        let state = serde_json::from_str(&json).context("Failed to parse state JSON")?;
        Ok(Some(state))
    }

    async fn update(&self, state: TraderState) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let json = serde_json::to_string_pretty(&state).context("Failed to serialize state")?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create state dir: {}", parent.display()))?;
            }
        }

        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &json)
            .await
            .context("Failed to write temp file")?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .context("Failed to rename temp file")?;
        debug!("State written to {}", self.path.display());
        Ok(())
    }
}

/// Standalone host: entropy from a JSON file, prompts on the terminal
pub struct LocalHost {
    seed_file: PathBuf,
    auto_confirm: bool,
}

impl LocalHost {
    pub fn new(seed_file: impl Into<PathBuf>, auto_confirm: bool) -> Self {
        Self {
            seed_file: seed_file.into(),
            auto_confirm,
        }
    }
}

#[async_trait]
impl HostRuntime for LocalHost {
    async fn get_bip44_entropy(&self, coin_type: u32) -> Result<SeedEntropy> {
        let json = tokio::fs::read_to_string(&self.seed_file)
            .await
            .with_context(|| format!("Failed to read seed file: {}", self.seed_file.display()))?;
        let entropy: SeedEntropy =
            serde_json::from_str(&json).context("Failed to parse seed entropy JSON")?;
        if entropy.coin_type != coin_type {
            bail!(
                "Seed file holds coin type {}, requested {}",
                entropy.coin_type,
                coin_type
            );
        }
        Ok(entropy)
    }

    async fn confirm(&self, request: ConfirmRequest) -> Result<bool> {
        if self.auto_confirm {
            info!("Auto-confirmed: {}", request.prompt);
            return Ok(true);
        }

        let mut text = format!("\n{}\n", request.prompt);
        for line in [&request.description, &request.text_area_content].into_iter().flatten() {
            text.push_str(line);
            text.push('\n');
        }
        text.push_str("Approve? [y/N] ");

        let mut stdout = tokio::io::stdout();
        stdout.write_all(text.as_bytes()).await?;
        stdout.flush().await?;

        let mut answer = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut answer)
            .await
            .context("Failed to read confirmation")?;
        Ok(parse_answer(&answer))
    }
}

fn parse_answer(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
