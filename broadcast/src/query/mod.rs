// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Read-only view of the ledger served to broadcast consumers.

use std::time::SystemTime;

use alloy_primitives::{Address, B256};
use ledger_core::{CommittedBatch, Transaction};
use tracing::error;

use crate::storage::{CallContext, ErrorKind, LedgerError, LedgerStore};

/// Reported by `get_last_batch` while no batch has been committed.
pub const NO_BATCH: u64 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionProjection {
    pub hash: B256,
    pub encoded: String,
    pub l2_block_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProjection {
    pub batch_number: u64,
    pub global_exit_root: B256,
    pub local_exit_root: B256,
    pub state_root: B256,
    pub sequencer: Address,
    pub timestamp: SystemTime,
    pub transactions: Vec<TransactionProjection>,
    /// `ledger_core::NO_FORCED_BATCH` when the batch incorporates no forced batch.
    pub forced_batch_number: u64,
}

impl From<Transaction> for TransactionProjection {
    fn from(value: Transaction) -> Self {
        Self {
            hash: value.hash,
            encoded: value.encoded,
            l2_block_number: value.l2_block_number,
        }
    }
}

impl From<CommittedBatch> for BatchProjection {
    fn from(value: CommittedBatch) -> Self {
        let forced_batch_number = value.forced_batch_number();
        let CommittedBatch {
            batch,
            transactions,
            ..
        } = value;
        Self {
            batch_number: batch.batch_number,
            global_exit_root: batch.global_exit_root,
            local_exit_root: batch.local_exit_root,
            state_root: batch.state_root,
            sequencer: batch.sequencer,
            timestamp: batch.timestamp,
            transactions: transactions.into_iter().map(Into::into).collect(),
            forced_batch_number,
        }
    }
}

#[derive(Clone)]
pub struct BroadcastQuery {
    store: LedgerStore,
}

impl BroadcastQuery {
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    pub async fn get_last_batch(&self, ctx: &CallContext) -> Result<u64, LedgerError> {
        let last = self
            .store
            .last_committed_batch_number(ctx)
            .await
            .inspect_err(report_corruption)?;
        Ok(last.unwrap_or(NO_BATCH))
    }

    pub async fn get_batch(
        &self,
        ctx: &CallContext,
        batch_number: u64,
    ) -> Result<BatchProjection, LedgerError> {
        let committed = self
            .store
            .get_batch(ctx, batch_number)
            .await
            .inspect_err(report_corruption)?;
        Ok(committed.into())
    }

    /// Succeeds when a reader connection can answer a query before the deadline.
    pub async fn check_health(&self, ctx: &CallContext) -> Result<(), LedgerError> {
        self.store.last_committed_batch_number(ctx).await.map(|_| ())
    }
}

fn report_corruption(err: &LedgerError) {
    if err.kind() == ErrorKind::DataCorruption {
        error!(error = %err, "ledger data corruption detected");
    }
}

#[cfg(test)]
mod tests {
    use super::{BatchProjection, BroadcastQuery, NO_BATCH};
    use crate::config::Config;
    use crate::storage::{CallContext, ErrorKind, LedgerStore};
    use alloy_primitives::{Address, B256, Bytes};
    use ledger_core::{
        Batch, CommittedBatch, ForcedBatch, L2Block, NO_FORCED_BATCH, Transaction, ZERO_HASH,
    };
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    use tempfile::TempDir;

    fn open_query() -> (TempDir, LedgerStore, BroadcastQuery) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config = Config {
            connection_target: dir.path().join("ledger.db").to_string_lossy().into_owned(),
            pool_size: 2,
            ..Config::default()
        };
        let store = LedgerStore::open(&config).expect("open ledger store");
        let query = BroadcastQuery::new(store.clone());
        (dir, store, query)
    }

    fn batch(batch_number: u64) -> Batch {
        Batch {
            batch_number,
            global_exit_root: B256::repeat_byte(0x10),
            local_exit_root: B256::repeat_byte(0x20),
            state_root: B256::repeat_byte(0x30),
            sequencer: Address::repeat_byte(0x40),
            timestamp: UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        }
    }

    fn tx(index: u8, l2_block_number: u64) -> Transaction {
        Transaction {
            hash: B256::repeat_byte(index),
            encoded: format!("encoded-{index}"),
            l2_block_number,
            received_at: SystemTime::now(),
        }
    }

    #[test]
    fn projection_keeps_order_and_reports_forced_batch() {
        let committed = CommittedBatch {
            batch: batch(2),
            transactions: vec![tx(1, 0), tx(2, 0), tx(3, 1)],
            forced_batch: Some(ForcedBatch {
                forced_batch_number: 18,
                global_exit_root: B256::ZERO,
                raw_tx_data: Bytes::new(),
                sequencer: Address::ZERO,
                timestamp: SystemTime::now(),
                l1_block_number: 1,
                batch_number: Some(2),
            }),
        };

        let projection = BatchProjection::from(committed);
        assert_eq!(projection.batch_number, 2);
        assert_eq!(projection.forced_batch_number, 18);
        let encoded: Vec<&str> = projection
            .transactions
            .iter()
            .map(|item| item.encoded.as_str())
            .collect();
        assert_eq!(encoded, ["encoded-1", "encoded-2", "encoded-3"]);
        assert_eq!(projection.transactions[2].l2_block_number, 1);
    }

    #[tokio::test]
    async fn empty_ledger_reports_no_batch() {
        let (_dir, _store, query) = open_query();
        let ctx = CallContext::background();
        assert_eq!(query.get_last_batch(&ctx).await.expect("last"), NO_BATCH);
        let err = query.get_batch(&ctx, 1).await.expect_err("no batches");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        query.check_health(&ctx).await.expect("healthy");
    }

    #[tokio::test]
    async fn unmatched_batch_has_no_forced_batch() {
        let (_dir, store, query) = open_query();
        let ctx = CallContext::background();
        store
            .append_l2_block(
                &ctx,
                1,
                L2Block {
                    hash: B256::repeat_byte(0xaa),
                    parent_hash: ZERO_HASH,
                    received_at: SystemTime::now(),
                },
                None,
            )
            .await
            .expect("append genesis");
        store
            .commit_batch(&ctx, batch(1), vec![tx(1, 1)])
            .await
            .expect("commit batch 1");

        assert_eq!(query.get_last_batch(&ctx).await.expect("last"), 1);
        let projection = query.get_batch(&ctx, 1).await.expect("batch 1");
        assert_eq!(projection.forced_batch_number, NO_FORCED_BATCH);
        assert_eq!(projection.state_root, B256::repeat_byte(0x30));
        assert_eq!(projection.transactions.len(), 1);
    }

    #[tokio::test]
    async fn expired_deadline_is_reported_as_canceled() {
        let (_dir, _store, query) = open_query();
        let ctx = CallContext::with_timeout(Duration::ZERO);
        let err = query.get_last_batch(&ctx).await.expect_err("expired");
        assert_eq!(err.kind(), ErrorKind::Canceled);
    }
}
