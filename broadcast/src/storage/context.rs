// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use tokio_util::sync::{CancellationToken, DropGuard};

use super::LedgerError;

/// Deadline and cancellation signal carried by every ledger call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl CallContext {
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            token: CancellationToken::new(),
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            token: CancellationToken::new(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancels this context once the returned guard is dropped.
    pub fn cancel_on_drop(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }

    pub fn is_done(&self) -> bool {
        self.token.is_cancelled()
            || self
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub fn check(&self) -> Result<(), LedgerError> {
        if self.is_done() {
            return Err(LedgerError::Canceled);
        }
        Ok(())
    }

    /// Resolves when the deadline passes or the context is canceled.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => {}
                    () = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

const RUNNING: u8 = 0;
const COMMITTING: u8 = 1;
const ABANDONED: u8 = 2;

/// Per-operation handshake between the caller waiting on a deadline and the blocking
/// worker running the SQLite transaction. Exactly one side wins: either the worker
/// enters its commit, or the caller abandons the operation and reports `Canceled`.
#[derive(Debug, Clone)]
pub(crate) struct Checkpoint {
    ctx: CallContext,
    gate: Arc<AtomicU8>,
}

impl Checkpoint {
    pub(crate) fn new(ctx: CallContext) -> Self {
        Self {
            ctx,
            gate: Arc::new(AtomicU8::new(RUNNING)),
        }
    }

    #[cfg(test)]
    pub(crate) fn unbounded() -> Self {
        Self::new(CallContext::background())
    }

    pub(crate) fn check(&self) -> Result<(), LedgerError> {
        if self.gate.load(Ordering::Acquire) == ABANDONED {
            return Err(LedgerError::Canceled);
        }
        self.ctx.check()
    }

    pub(crate) fn begin_commit(&self) -> Result<(), LedgerError> {
        self.check()?;
        match self
            .gate
            .compare_exchange(RUNNING, COMMITTING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) | Err(COMMITTING) => Ok(()),
            Err(_) => Err(LedgerError::Canceled),
        }
    }

    /// Returns false when the worker already started committing.
    pub(crate) fn abandon(&self) -> bool {
        self.gate
            .compare_exchange(RUNNING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
