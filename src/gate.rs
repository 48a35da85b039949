//! Cancellation Gate
//!
//! Single-slot stop signal for the monitoring loop. `start()` hands the loop a
//! `StopSignal` future; `trigger()` resolves it once with `TradeResult::Ok`.
//! At most one signal is outstanding per gate. The gate is owned by one
//! trader and cloned into whoever needs to stop it, so there is no
//! process-wide "current run" state.
//!
//! Author: AI-Generated
//! Created: 2026-10-16

use crate::types::TradeResult;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("trading loop already running")]
    AlreadyRunning,
    #[error("no trading loop running")]
    NotRunning,
}

struct ActiveSignal {
    id: u64,
    trigger: oneshot::Sender<TradeResult>,
}

#[derive(Default)]
struct Slot {
    next_id: u64,
    active: Option<ActiveSignal>,
}

/// Stop switch shared between a trader and its controllers
#[derive(Clone, Default)]
pub struct CancellationGate {
    slot: Arc<Mutex<Slot>>,
}

impl CancellationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new stop signal. Fails if one is already outstanding.
    pub fn start(&self) -> Result<StopSignal, GateError> {
        let mut slot = self.lock();
        if slot.active.is_some() {
            return Err(GateError::AlreadyRunning);
        }

        let (trigger, receiver) = oneshot::channel();
        slot.next_id += 1;
        let id = slot.next_id;
        slot.active = Some(ActiveSignal { id, trigger });
        debug!("Cancellation gate {} opened", id);

        Ok(StopSignal {
            id,
            receiver,
            slot: Arc::clone(&self.slot),
        })
    }

    /// Resolves the outstanding signal with `OK` and clears the slot.
    pub fn trigger(&self) -> Result<(), GateError> {
        let active = self.lock().active.take().ok_or(GateError::NotRunning)?;
        debug!("Cancellation gate {} triggered", active.id);
        // Receiver gone means the loop exited in the meantime; nothing to wake
        let _ = active.trigger.send(TradeResult::Ok);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.lock().active.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Resolves to `TradeResult::Ok` once the gate is triggered.
/// Dropping it clears the gate so a new run can start.
pub struct StopSignal {
    id: u64,
    receiver: oneshot::Receiver<TradeResult>,
    slot: Arc<Mutex<Slot>>,
}

impl Future for StopSignal {
    type Output = TradeResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Trigger dropped without firing: treat as a stop
            Poll::Ready(Err(_)) => Poll::Ready(TradeResult::Ok),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for StopSignal {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.active.as_ref().map(|a| a.id) == Some(self.id) {
            slot.active = None;
            debug!("Cancellation gate {} discarded", self.id);
        }
    }
}
