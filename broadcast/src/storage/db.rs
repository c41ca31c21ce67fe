// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy_primitives::{Address, B256, Bytes};
use ledger_core::{
    Batch, CommittedBatch, ExecutionReceipt, ForcedBatch, L1Block, L2Block, MatchOutcome,
    Transaction, is_canonically_ordered,
};
use rusqlite::{Connection, OpenFlags, TransactionBehavior};
use rusqlite_migration::{M, Migrations};
use tracing::{debug, warn};

use super::context::Checkpoint;
use super::sql::{
    BatchRow, ForcedBatchRow, NewL2BlockRow, NewTransactionRow, TransactionRow,
    sql_insert_batch, sql_insert_block, sql_insert_forced_batch, sql_insert_l2_block,
    sql_insert_transactions_batch, sql_select_batch, sql_select_batch_exists,
    sql_select_batch_transactions, sql_select_block_exists, sql_select_forced_batch,
    sql_select_forced_batch_for_batch, sql_select_l2_head, sql_select_max_batch_num,
    sql_select_max_block_num, sql_select_max_forced_batch_num, sql_update_forced_batch_link,
};
use super::{LedgerError, StorageOpenError};

const MIGRATION_0001_SCHEMA: &str = include_str!("migrations/0001_schema.sql");
const MIGRATION_0002_APPEND_ONLY: &str = include_str!("migrations/0002_append_only.sql");

/// Highest L2 block number accepted for the first block of an empty ledger.
const MAX_GENESIS_L2_BLOCK_NUMBER: u64 = 1;

const HASH_BYTES: usize = 32;
const ADDRESS_BYTES: usize = 20;

/// One SQLite connection plus the ledger rules enforced on top of it.
pub(crate) struct Ledger {
    conn: Connection,
}

impl Ledger {
    pub(crate) fn open(path: &str, synchronous: &str) -> Result<Self, StorageOpenError> {
        let mut conn = Self::open_connection(path, synchronous)?;
        Self::run_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    pub(crate) fn open_read_only(path: &str) -> Result<Self, StorageOpenError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        Ok(Self { conn })
    }

    pub(crate) fn open_connection(
        path: &str,
        synchronous: &str,
    ) -> Result<Connection, StorageOpenError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", synchronous)?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        Ok(conn)
    }

    pub(crate) fn run_migrations(conn: &mut Connection) -> Result<(), StorageOpenError> {
        Migrations::new(vec![
            M::up(MIGRATION_0001_SCHEMA),
            M::up(MIGRATION_0002_APPEND_ONLY),
        ])
        .to_latest(conn)?;
        Ok(())
    }

    pub(crate) fn record_l1_block(
        &mut self,
        checkpoint: &Checkpoint,
        block: &L1Block,
    ) -> Result<(), LedgerError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(last) = sql_select_max_block_num(&tx)?.map(i64_to_u64)
            && block.number <= last
        {
            return Err(reject(format!(
                "l1 block {} does not extend l1 head {last}",
                block.number
            )));
        }

        sql_insert_block(
            &tx,
            u64_to_i64(block.number, "l1 block number")?,
            block.hash.as_slice(),
            to_unix_ms(block.received_at),
        )?;

        checkpoint.begin_commit()?;
        tx.commit()?;
        debug!(l1_block_number = block.number, "l1 block recorded");
        Ok(())
    }

    pub(crate) fn append_l2_block(
        &mut self,
        checkpoint: &Checkpoint,
        number: u64,
        block: &L2Block,
        receipt: Option<&ExecutionReceipt>,
    ) -> Result<(), LedgerError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        match sql_select_l2_head(&tx)? {
            None => {
                if number > MAX_GENESIS_L2_BLOCK_NUMBER {
                    return Err(reject(format!(
                        "first l2 block must be number 0 or 1, got {number}"
                    )));
                }
                if !block.links_to(None) {
                    return Err(reject(format!(
                        "genesis l2 block {number} must have a zero parent hash, got {}",
                        block.parent_hash
                    )));
                }
            }
            Some(head) => {
                let head_number = i64_to_u64(head.l2_block_num);
                let expected = head_number.saturating_add(1);
                if number != expected {
                    return Err(reject(format!(
                        "l2 block {number} is not contiguous: expected {expected}"
                    )));
                }
                let head_hash = b256_from_column(&head.block_hash, "l2_blocks.block_hash")?;
                if !block.links_to(Some(&head_hash)) {
                    return Err(reject(format!(
                        "l2 block {number} parent hash {} does not match block {head_number} hash {head_hash}",
                        block.parent_hash
                    )));
                }
            }
        }

        checkpoint.check()?;
        sql_insert_l2_block(
            &tx,
            &NewL2BlockRow {
                l2_block_num: u64_to_i64(number, "l2 block number")?,
                block_hash: block.hash.as_slice(),
                parent_hash: block.parent_hash.as_slice(),
                received_at_ms: to_unix_ms(block.received_at),
                receipt: receipt.map(|value| &value.data[..]),
            },
        )?;

        checkpoint.begin_commit()?;
        tx.commit()?;
        debug!(l2_block_number = number, hash = %block.hash, "l2 block appended");
        Ok(())
    }

    pub(crate) fn commit_batch(
        &mut self,
        checkpoint: &Checkpoint,
        batch: &Batch,
        transactions: &[Transaction],
    ) -> Result<(), LedgerError> {
        let batch_number = batch.batch_number;
        if !is_canonically_ordered(transactions) {
            return Err(reject(format!(
                "batch {batch_number} transactions are not in ascending l2 block order"
            )));
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let last = sql_select_max_batch_num(&tx)?.map(i64_to_u64);
        let expected = last.map_or(Batch::FIRST_NUMBER, |value| value.saturating_add(1));
        if last.is_some_and(|value| batch_number <= value) {
            return Err(reject(format!("batch {batch_number} is already committed")));
        }
        if batch_number != expected {
            return Err(reject(format!(
                "batch {batch_number} is not contiguous: expected {expected}"
            )));
        }

        if let Some(highest_l2_block) = transactions.last().map(|item| item.l2_block_number) {
            let l2_head = sql_select_l2_head(&tx)?.map(|head| i64_to_u64(head.l2_block_num));
            if l2_head.is_none_or(|head| highest_l2_block > head) {
                return Err(reject(format!(
                    "batch {batch_number} references unknown l2 block {highest_l2_block}"
                )));
            }
        }

        let batch_num = u64_to_i64(batch_number, "batch number")?;
        checkpoint.check()?;
        sql_insert_batch(
            &tx,
            &BatchRow {
                batch_num,
                global_exit_root: batch.global_exit_root.to_vec(),
                local_exit_root: batch.local_exit_root.to_vec(),
                state_root: batch.state_root.to_vec(),
                sequencer: batch.sequencer.to_vec(),
                timestamp_ms: to_unix_ms(batch.timestamp),
                tx_count: u64_to_i64(transactions.len() as u64, "transaction count")?,
            },
        )?;

        let rows = transactions
            .iter()
            .map(|item| {
                Ok::<_, LedgerError>(NewTransactionRow {
                    tx_hash: item.hash.as_slice(),
                    l2_block_num: u64_to_i64(item.l2_block_number, "l2 block number")?,
                    encoded: item.encoded.as_str(),
                    received_at_ms: to_unix_ms(item.received_at),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        sql_insert_transactions_batch(&tx, batch_num, rows.as_slice())?;

        checkpoint.begin_commit()?;
        tx.commit()?;
        debug!(
            batch_number,
            tx_count = transactions.len(),
            "batch committed"
        );
        Ok(())
    }

    pub(crate) fn record_forced_batch(
        &mut self,
        checkpoint: &Checkpoint,
        forced_batch: &ForcedBatch,
    ) -> Result<(), LedgerError> {
        let forced_batch_number = forced_batch.forced_batch_number;
        if forced_batch_number == ledger_core::NO_FORCED_BATCH {
            return Err(reject(format!(
                "forced batch number {forced_batch_number} is reserved"
            )));
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(last) = sql_select_max_forced_batch_num(&tx)?.map(i64_to_u64)
            && forced_batch_number <= last
        {
            return Err(reject(format!(
                "forced batch {forced_batch_number} does not extend forced batch head {last}"
            )));
        }
        let l1_block_num = u64_to_i64(forced_batch.l1_block_number, "l1 block number")?;
        if !sql_select_block_exists(&tx, l1_block_num)? {
            return Err(reject(format!(
                "forced batch {forced_batch_number} references unknown l1 block {}",
                forced_batch.l1_block_number
            )));
        }

        checkpoint.check()?;
        sql_insert_forced_batch(
            &tx,
            &ForcedBatchRow {
                forced_batch_num: u64_to_i64(forced_batch_number, "forced batch number")?,
                global_exit_root: forced_batch.global_exit_root.to_vec(),
                raw_txs_data: forced_batch.raw_tx_data.to_vec(),
                sequencer: forced_batch.sequencer.to_vec(),
                timestamp_ms: to_unix_ms(forced_batch.timestamp),
                block_num: l1_block_num,
                batch_num: None,
            },
        )?;

        // A forced batch observed after the sequencer already incorporated it is recorded
        // and matched in the same transaction.
        if let Some(batch_number) = forced_batch.batch_number {
            link_forced_batch(&tx, forced_batch_number, batch_number)?;
        }

        checkpoint.begin_commit()?;
        tx.commit()?;
        debug!(
            forced_batch_number,
            l1_block_number = forced_batch.l1_block_number,
            "forced batch recorded"
        );
        Ok(())
    }

    pub(crate) fn match_forced_batch(
        &mut self,
        checkpoint: &Checkpoint,
        forced_batch_number: u64,
        batch_number: u64,
    ) -> Result<MatchOutcome, LedgerError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let row = match lookup_key(forced_batch_number) {
            Some(key) => sql_select_forced_batch(&tx, key)?,
            None => None,
        }
        .ok_or_else(|| LedgerError::not_found(format!("forced batch {forced_batch_number}")))?;
        let current = forced_batch_from_row(row)?;

        match current.state().transition(batch_number) {
            Ok(MatchOutcome::AlreadyLinked) => return Ok(MatchOutcome::AlreadyLinked),
            Ok(MatchOutcome::Linked) => {}
            Err(conflict) => {
                return Err(reject(format!(
                    "forced batch {forced_batch_number} is matched to batch {}, refusing batch {}",
                    conflict.existing, conflict.requested
                )));
            }
        }

        checkpoint.check()?;
        link_forced_batch(&tx, forced_batch_number, batch_number)?;

        checkpoint.begin_commit()?;
        tx.commit()?;
        debug!(forced_batch_number, batch_number, "forced batch matched");
        Ok(MatchOutcome::Linked)
    }

    pub(crate) fn last_committed_batch_number(
        &mut self,
        checkpoint: &Checkpoint,
    ) -> Result<Option<u64>, LedgerError> {
        checkpoint.check()?;
        let value = sql_select_max_batch_num(&self.conn)?;
        Ok(value.map(i64_to_u64))
    }

    pub(crate) fn last_l2_block_number(
        &mut self,
        checkpoint: &Checkpoint,
    ) -> Result<Option<u64>, LedgerError> {
        checkpoint.check()?;
        let head = sql_select_l2_head(&self.conn)?;
        Ok(head.map(|row| i64_to_u64(row.l2_block_num)))
    }

    pub(crate) fn load_batch(
        &mut self,
        checkpoint: &Checkpoint,
        batch_number: u64,
    ) -> Result<CommittedBatch, LedgerError> {
        // One read transaction so the batch row, its transactions and the forced-batch
        // link all come from the same snapshot.
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Deferred)?;
        let batch_num = lookup_key(batch_number)
            .ok_or_else(|| LedgerError::not_found(format!("batch {batch_number}")))?;

        let batch_row = sql_select_batch(&tx, batch_num)?
            .ok_or_else(|| LedgerError::not_found(format!("batch {batch_number}")))?;
        checkpoint.check()?;
        let tx_rows = sql_select_batch_transactions(&tx, batch_num)?;
        let forced_row = sql_select_forced_batch_for_batch(&tx, batch_num)?;
        tx.commit()?;

        let declared = i64_to_u64(batch_row.tx_count);
        if declared != tx_rows.len() as u64 {
            return Err(LedgerError::corruption(format!(
                "batch {batch_number} declares {declared} transactions, found {}",
                tx_rows.len()
            )));
        }

        let batch = batch_from_row(batch_row)?;
        let transactions = tx_rows
            .into_iter()
            .map(transaction_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        let forced_batch = forced_row.map(forced_batch_from_row).transpose()?;

        Ok(CommittedBatch {
            batch,
            transactions,
            forced_batch,
        })
    }
}

fn link_forced_batch(
    tx: &rusqlite::Transaction<'_>,
    forced_batch_number: u64,
    batch_number: u64,
) -> Result<(), LedgerError> {
    let batch_num = u64_to_i64(batch_number, "batch number")?;
    if !sql_select_batch_exists(tx, batch_num)? {
        return Err(reject(format!(
            "cannot match forced batch {forced_batch_number}: batch {batch_number} is not committed"
        )));
    }
    if let Some(other) = sql_select_forced_batch_for_batch(tx, batch_num)? {
        return Err(reject(format!(
            "batch {batch_number} already incorporates forced batch {}",
            other.forced_batch_num
        )));
    }

    let forced_batch_num = u64_to_i64(forced_batch_number, "forced batch number")?;
    let changed_rows = sql_update_forced_batch_link(tx, forced_batch_num, batch_num)?;
    if changed_rows != 1 {
        return Err(rusqlite::Error::StatementChangedRows(changed_rows).into());
    }
    Ok(())
}

fn reject(message: String) -> LedgerError {
    warn!(reason = %message, "ledger write rejected");
    LedgerError::integrity(message)
}

fn batch_from_row(row: BatchRow) -> Result<Batch, LedgerError> {
    Ok(Batch {
        batch_number: i64_to_u64(row.batch_num),
        global_exit_root: b256_from_column(&row.global_exit_root, "batches.global_exit_root")?,
        local_exit_root: b256_from_column(&row.local_exit_root, "batches.local_exit_root")?,
        state_root: b256_from_column(&row.state_root, "batches.state_root")?,
        sequencer: address_from_column(&row.sequencer, "batches.sequencer")?,
        timestamp: from_unix_ms(row.timestamp_ms),
    })
}

fn transaction_from_row(row: TransactionRow) -> Result<Transaction, LedgerError> {
    Ok(Transaction {
        hash: b256_from_column(&row.tx_hash, "transactions.tx_hash")?,
        encoded: row.encoded,
        l2_block_number: i64_to_u64(row.l2_block_num),
        received_at: from_unix_ms(row.received_at_ms),
    })
}

fn forced_batch_from_row(row: ForcedBatchRow) -> Result<ForcedBatch, LedgerError> {
    Ok(ForcedBatch {
        forced_batch_number: i64_to_u64(row.forced_batch_num),
        global_exit_root: b256_from_column(
            &row.global_exit_root,
            "forced_batches.global_exit_root",
        )?,
        raw_tx_data: Bytes::from(row.raw_txs_data),
        sequencer: address_from_column(&row.sequencer, "forced_batches.sequencer")?,
        timestamp: from_unix_ms(row.timestamp_ms),
        l1_block_number: i64_to_u64(row.block_num),
        batch_number: row.batch_num.map(i64_to_u64),
    })
}

fn b256_from_column(bytes: &[u8], column: &str) -> Result<B256, LedgerError> {
    if bytes.len() != HASH_BYTES {
        return Err(LedgerError::corruption(format!(
            "{column} holds {} bytes, expected {HASH_BYTES}",
            bytes.len()
        )));
    }
    Ok(B256::from_slice(bytes))
}

fn address_from_column(bytes: &[u8], column: &str) -> Result<Address, LedgerError> {
    if bytes.len() != ADDRESS_BYTES {
        return Err(LedgerError::corruption(format!(
            "{column} holds {} bytes, expected {ADDRESS_BYTES}",
            bytes.len()
        )));
    }
    Ok(Address::from_slice(bytes))
}

fn to_unix_ms(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(i64::MAX)
}

fn from_unix_ms(ms: i64) -> SystemTime {
    let clamped_ms = ms.max(0) as u64;
    UNIX_EPOCH + Duration::from_millis(clamped_ms)
}

/// SQLite integers are signed; larger values are refused rather than stored lossily.
fn u64_to_i64(value: u64, field: &str) -> Result<i64, LedgerError> {
    i64::try_from(value)
        .map_err(|_| reject(format!("{field} {value} exceeds the storable maximum {}", i64::MAX)))
}

/// Key for a lookup; `None` when no stored row can carry this number.
fn lookup_key(value: u64) -> Option<i64> {
    i64::try_from(value).ok()
}

fn i64_to_u64(value: i64) -> u64 {
    value.max(0) as u64
}
