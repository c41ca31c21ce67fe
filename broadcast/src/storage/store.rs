// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::sync::{Arc, Mutex, MutexGuard};

use ledger_core::{
    Batch, CommittedBatch, ExecutionReceipt, ForcedBatch, L1Block, L2Block, MatchOutcome,
    Transaction,
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinError;
use tracing::{debug, info};

use super::context::{CallContext, Checkpoint};
use super::db::Ledger;
use super::{LedgerError, StorageOpenError};
use crate::config::Config;

/// Async handle to the ledger. Cloning is cheap; all clones share the same
/// writer connection and reader pool.
#[derive(Clone)]
pub struct LedgerStore {
    writer: Arc<Mutex<Ledger>>,
    readers: Arc<ReaderPool>,
}

struct ReaderPool {
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Ledger>>,
}

struct PooledReader {
    ledger: Option<Ledger>,
    pool: Arc<ReaderPool>,
    _permit: OwnedSemaphorePermit,
}

impl LedgerStore {
    /// Opens the writer (running migrations) before any reader, so readers always see
    /// the current schema.
    pub fn open(config: &Config) -> Result<Self, StorageOpenError> {
        let writer = Ledger::open(&config.connection_target, &config.sqlite_synchronous)?;
        let pool_size = config.pool_size.max(1);
        let readers = (0..pool_size)
            .map(|_| Ledger::open_read_only(&config.connection_target))
            .collect::<Result<Vec<_>, _>>()?;
        info!(
            path = %config.connection_target,
            pool_size,
            "ledger store opened"
        );

        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
            readers: Arc::new(ReaderPool {
                permits: Arc::new(Semaphore::new(pool_size)),
                idle: Mutex::new(readers),
            }),
        })
    }

    pub async fn append_l2_block(
        &self,
        ctx: &CallContext,
        number: u64,
        block: L2Block,
        receipt: Option<ExecutionReceipt>,
    ) -> Result<(), LedgerError> {
        self.write(ctx, "append_l2_block", move |ledger, checkpoint| {
            ledger.append_l2_block(checkpoint, number, &block, receipt.as_ref())
        })
        .await
    }

    pub async fn commit_batch(
        &self,
        ctx: &CallContext,
        batch: Batch,
        transactions: Vec<Transaction>,
    ) -> Result<(), LedgerError> {
        self.write(ctx, "commit_batch", move |ledger, checkpoint| {
            ledger.commit_batch(checkpoint, &batch, &transactions)
        })
        .await
    }

    pub async fn record_l1_block(
        &self,
        ctx: &CallContext,
        block: L1Block,
    ) -> Result<(), LedgerError> {
        self.write(ctx, "record_l1_block", move |ledger, checkpoint| {
            ledger.record_l1_block(checkpoint, &block)
        })
        .await
    }

    pub async fn record_forced_batch(
        &self,
        ctx: &CallContext,
        forced_batch: ForcedBatch,
    ) -> Result<(), LedgerError> {
        self.write(ctx, "record_forced_batch", move |ledger, checkpoint| {
            ledger.record_forced_batch(checkpoint, &forced_batch)
        })
        .await
    }

    pub async fn match_forced_batch(
        &self,
        ctx: &CallContext,
        forced_batch_number: u64,
        batch_number: u64,
    ) -> Result<MatchOutcome, LedgerError> {
        self.write(ctx, "match_forced_batch", move |ledger, checkpoint| {
            ledger.match_forced_batch(checkpoint, forced_batch_number, batch_number)
        })
        .await
    }

    pub async fn last_committed_batch_number(
        &self,
        ctx: &CallContext,
    ) -> Result<Option<u64>, LedgerError> {
        self.read(ctx, "last_committed_batch_number", |ledger, checkpoint| {
            ledger.last_committed_batch_number(checkpoint)
        })
        .await
    }

    pub async fn last_l2_block_number(
        &self,
        ctx: &CallContext,
    ) -> Result<Option<u64>, LedgerError> {
        self.read(ctx, "last_l2_block_number", |ledger, checkpoint| {
            ledger.last_l2_block_number(checkpoint)
        })
        .await
    }

    pub async fn get_batch(
        &self,
        ctx: &CallContext,
        batch_number: u64,
    ) -> Result<CommittedBatch, LedgerError> {
        self.read(ctx, "get_batch", move |ledger, checkpoint| {
            ledger.load_batch(checkpoint, batch_number)
        })
        .await
    }

    async fn write<T, F>(
        &self,
        ctx: &CallContext,
        operation: &'static str,
        work: F,
    ) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Ledger, &Checkpoint) -> Result<T, LedgerError> + Send + 'static,
    {
        let writer = Arc::clone(&self.writer);
        run_blocking(ctx, operation, move |checkpoint| {
            let mut ledger = lock_recover(&*writer);
            checkpoint.check()?;
            work(&mut ledger, checkpoint)
        })
        .await
    }

    async fn read<T, F>(
        &self,
        ctx: &CallContext,
        operation: &'static str,
        work: F,
    ) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Ledger, &Checkpoint) -> Result<T, LedgerError> + Send + 'static,
    {
        ctx.check()?;
        let mut reader = self.readers.acquire(ctx).await?;
        run_blocking(ctx, operation, move |checkpoint| {
            checkpoint.check()?;
            work(reader.ledger_mut()?, checkpoint)
        })
        .await
    }
}

impl ReaderPool {
    async fn acquire(self: &Arc<Self>, ctx: &CallContext) -> Result<PooledReader, LedgerError> {
        let permit = tokio::select! {
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|_| LedgerError::unavailable("reader pool closed"))?
            }
            () = ctx.done() => return Err(LedgerError::Canceled),
        };
        let ledger = lock_recover(&self.idle)
            .pop()
            .ok_or_else(|| LedgerError::unavailable("no idle reader connection"))?;

        Ok(PooledReader {
            ledger: Some(ledger),
            pool: Arc::clone(self),
            _permit: permit,
        })
    }
}

impl PooledReader {
    fn ledger_mut(&mut self) -> Result<&mut Ledger, LedgerError> {
        self.ledger
            .as_mut()
            .ok_or_else(|| LedgerError::unavailable("reader connection already returned"))
    }
}

impl Drop for PooledReader {
    fn drop(&mut self) {
        // Runs before the permit is released, so a permit always finds an idle connection.
        if let Some(ledger) = self.ledger.take() {
            lock_recover(&self.pool.idle).push(ledger);
        }
    }
}

/// Runs `work` on the blocking pool and races it against the caller's deadline. The
/// checkpoint gate decides the winner: a caller that abandons first reports `Canceled`
/// and the worker rolls back; a worker that already entered its commit is awaited.
async fn run_blocking<T, F>(
    ctx: &CallContext,
    operation: &'static str,
    work: F,
) -> Result<T, LedgerError>
where
    T: Send + 'static,
    F: FnOnce(&Checkpoint) -> Result<T, LedgerError> + Send + 'static,
{
    ctx.check()?;
    let checkpoint = Checkpoint::new(ctx.clone());
    let worker_checkpoint = checkpoint.clone();
    let mut handle = tokio::task::spawn_blocking(move || work(&worker_checkpoint));

    tokio::select! {
        biased;
        joined = &mut handle => flatten_join(joined),
        () = ctx.done() => {
            if checkpoint.abandon() {
                debug!(operation, "ledger call abandoned before commit");
                Err(LedgerError::Canceled)
            } else {
                flatten_join(handle.await)
            }
        }
    }
}

fn flatten_join<T>(joined: Result<Result<T, LedgerError>, JoinError>) -> Result<T, LedgerError> {
    joined.map_err(|err| LedgerError::unavailable(format!("ledger worker failed: {err}")))?
}

fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
