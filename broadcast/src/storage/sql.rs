// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use rusqlite::{Connection, OptionalExtension, Result, Row, Transaction, params};

const SQL_SELECT_BATCH: &str = include_str!("queries/select_batch.sql");
const SQL_SELECT_BATCH_TRANSACTIONS: &str = include_str!("queries/select_batch_transactions.sql");
const SQL_SELECT_FORCED_BATCH: &str = include_str!("queries/select_forced_batch.sql");
const SQL_SELECT_FORCED_BATCH_FOR_BATCH: &str =
    include_str!("queries/select_forced_batch_for_batch.sql");
const SQL_SELECT_MAX_BATCH_NUM: &str = "SELECT MAX(batch_num) FROM batches";
const SQL_SELECT_MAX_BLOCK_NUM: &str = "SELECT MAX(block_num) FROM blocks";
const SQL_SELECT_MAX_FORCED_BATCH_NUM: &str = "SELECT MAX(forced_batch_num) FROM forced_batches";
const SQL_SELECT_L2_HEAD: &str =
    "SELECT l2_block_num, block_hash FROM l2_blocks ORDER BY l2_block_num DESC LIMIT 1";
const SQL_SELECT_BLOCK_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM blocks WHERE block_num = ?1)";
const SQL_SELECT_BATCH_EXISTS: &str =
    "SELECT EXISTS (SELECT 1 FROM batches WHERE batch_num = ?1)";
const SQL_INSERT_BLOCK: &str =
    "INSERT INTO blocks (block_num, block_hash, received_at_ms) VALUES (?1, ?2, ?3)";
const SQL_INSERT_L2_BLOCK: &str = "INSERT INTO l2_blocks \
     (l2_block_num, block_hash, parent_hash, received_at_ms, receipt) VALUES (?1, ?2, ?3, ?4, ?5)";
const SQL_INSERT_BATCH: &str = include_str!("queries/insert_batch.sql");
const SQL_INSERT_TRANSACTION: &str = include_str!("queries/insert_transaction.sql");
const SQL_INSERT_FORCED_BATCH: &str = include_str!("queries/insert_forced_batch.sql");
const SQL_UPDATE_FORCED_BATCH_LINK: &str =
    "UPDATE forced_batches SET batch_num = ?2 WHERE forced_batch_num = ?1 AND batch_num IS NULL";

#[derive(Debug, Clone)]
pub(super) struct L2HeadRow {
    pub l2_block_num: i64,
    pub block_hash: Vec<u8>,
}

#[derive(Debug, Clone)]
pub(super) struct BatchRow {
    pub batch_num: i64,
    pub global_exit_root: Vec<u8>,
    pub local_exit_root: Vec<u8>,
    pub state_root: Vec<u8>,
    pub sequencer: Vec<u8>,
    pub timestamp_ms: i64,
    pub tx_count: i64,
}

#[derive(Debug, Clone)]
pub(super) struct TransactionRow {
    pub tx_hash: Vec<u8>,
    pub encoded: String,
    pub l2_block_num: i64,
    pub received_at_ms: i64,
}

#[derive(Debug, Clone)]
pub(super) struct ForcedBatchRow {
    pub forced_batch_num: i64,
    pub global_exit_root: Vec<u8>,
    pub raw_txs_data: Vec<u8>,
    pub sequencer: Vec<u8>,
    pub timestamp_ms: i64,
    pub block_num: i64,
    pub batch_num: Option<i64>,
}

pub(super) struct NewL2BlockRow<'a> {
    pub l2_block_num: i64,
    pub block_hash: &'a [u8],
    pub parent_hash: &'a [u8],
    pub received_at_ms: i64,
    pub receipt: Option<&'a [u8]>,
}

pub(super) struct NewTransactionRow<'a> {
    pub tx_hash: &'a [u8],
    pub l2_block_num: i64,
    pub encoded: &'a str,
    pub received_at_ms: i64,
}

pub(super) fn sql_select_max_batch_num(conn: &Connection) -> Result<Option<i64>> {
    conn.query_row(SQL_SELECT_MAX_BATCH_NUM, [], convert_row_to_optional_i64)
}

pub(super) fn sql_select_max_block_num(conn: &Connection) -> Result<Option<i64>> {
    conn.query_row(SQL_SELECT_MAX_BLOCK_NUM, [], convert_row_to_optional_i64)
}

pub(super) fn sql_select_max_forced_batch_num(conn: &Connection) -> Result<Option<i64>> {
    conn.query_row(SQL_SELECT_MAX_FORCED_BATCH_NUM, [], convert_row_to_optional_i64)
}

pub(super) fn sql_select_l2_head(conn: &Connection) -> Result<Option<L2HeadRow>> {
    conn.query_row(SQL_SELECT_L2_HEAD, [], |row| {
        Ok(L2HeadRow {
            l2_block_num: row.get(0)?,
            block_hash: row.get(1)?,
        })
    })
    .optional()
}

pub(super) fn sql_select_block_exists(conn: &Connection, block_num: i64) -> Result<bool> {
    conn.query_row(SQL_SELECT_BLOCK_EXISTS, params![block_num], |row| row.get(0))
}

pub(super) fn sql_select_batch_exists(conn: &Connection, batch_num: i64) -> Result<bool> {
    conn.query_row(SQL_SELECT_BATCH_EXISTS, params![batch_num], |row| row.get(0))
}

pub(super) fn sql_select_batch(conn: &Connection, batch_num: i64) -> Result<Option<BatchRow>> {
    let mut stmt = conn.prepare_cached(SQL_SELECT_BATCH)?;
    stmt.query_row(params![batch_num], convert_row_to_batch_row)
        .optional()
}

pub(super) fn sql_select_batch_transactions(
    conn: &Connection,
    batch_num: i64,
) -> Result<Vec<TransactionRow>> {
    let mut stmt = conn.prepare_cached(SQL_SELECT_BATCH_TRANSACTIONS)?;
    let mapped = stmt.query_map(params![batch_num], convert_row_to_transaction_row)?;
    mapped.collect()
}

pub(super) fn sql_select_forced_batch(
    conn: &Connection,
    forced_batch_num: i64,
) -> Result<Option<ForcedBatchRow>> {
    let mut stmt = conn.prepare_cached(SQL_SELECT_FORCED_BATCH)?;
    stmt.query_row(params![forced_batch_num], convert_row_to_forced_batch_row)
        .optional()
}

pub(super) fn sql_select_forced_batch_for_batch(
    conn: &Connection,
    batch_num: i64,
) -> Result<Option<ForcedBatchRow>> {
    let mut stmt = conn.prepare_cached(SQL_SELECT_FORCED_BATCH_FOR_BATCH)?;
    stmt.query_row(params![batch_num], convert_row_to_forced_batch_row)
        .optional()
}

pub(super) fn sql_insert_block(
    tx: &Transaction<'_>,
    block_num: i64,
    block_hash: &[u8],
    received_at_ms: i64,
) -> Result<usize> {
    tx.execute(SQL_INSERT_BLOCK, params![block_num, block_hash, received_at_ms])
}

pub(super) fn sql_insert_l2_block(tx: &Transaction<'_>, row: &NewL2BlockRow<'_>) -> Result<usize> {
    tx.execute(
        SQL_INSERT_L2_BLOCK,
        params![
            row.l2_block_num,
            row.block_hash,
            row.parent_hash,
            row.received_at_ms,
            row.receipt,
        ],
    )
}

pub(super) fn sql_insert_batch(tx: &Transaction<'_>, row: &BatchRow) -> Result<usize> {
    let mut stmt = tx.prepare_cached(SQL_INSERT_BATCH)?;
    stmt.execute(params![
        row.batch_num,
        row.global_exit_root.as_slice(),
        row.local_exit_root.as_slice(),
        row.state_root.as_slice(),
        row.sequencer.as_slice(),
        row.timestamp_ms,
        row.tx_count,
    ])
}

pub(super) fn sql_insert_transactions_batch(
    tx: &Transaction<'_>,
    batch_num: i64,
    transactions: &[NewTransactionRow<'_>],
) -> Result<()> {
    if transactions.is_empty() {
        return Ok(());
    }

    let mut stmt = tx.prepare_cached(SQL_INSERT_TRANSACTION)?;
    for (position, item) in transactions.iter().enumerate() {
        stmt.execute(params![
            item.tx_hash,
            batch_num,
            item.l2_block_num,
            i64::try_from(position).unwrap_or(i64::MAX),
            item.encoded,
            item.received_at_ms,
        ])?;
    }
    Ok(())
}

pub(super) fn sql_insert_forced_batch(tx: &Transaction<'_>, row: &ForcedBatchRow) -> Result<usize> {
    let mut stmt = tx.prepare_cached(SQL_INSERT_FORCED_BATCH)?;
    stmt.execute(params![
        row.forced_batch_num,
        row.global_exit_root.as_slice(),
        row.raw_txs_data.as_slice(),
        row.sequencer.as_slice(),
        row.timestamp_ms,
        row.block_num,
    ])
}

pub(super) fn sql_update_forced_batch_link(
    tx: &Transaction<'_>,
    forced_batch_num: i64,
    batch_num: i64,
) -> Result<usize> {
    tx.execute(
        SQL_UPDATE_FORCED_BATCH_LINK,
        params![forced_batch_num, batch_num],
    )
}

fn convert_row_to_optional_i64(row: &Row<'_>) -> Result<Option<i64>> {
    row.get(0)
}

fn convert_row_to_batch_row(row: &Row<'_>) -> Result<BatchRow> {
    Ok(BatchRow {
        batch_num: row.get(0)?,
        global_exit_root: row.get(1)?,
        local_exit_root: row.get(2)?,
        state_root: row.get(3)?,
        sequencer: row.get(4)?,
        timestamp_ms: row.get(5)?,
        tx_count: row.get(6)?,
    })
}

fn convert_row_to_transaction_row(row: &Row<'_>) -> Result<TransactionRow> {
    Ok(TransactionRow {
        tx_hash: row.get(0)?,
        encoded: row.get(1)?,
        l2_block_num: row.get(2)?,
        received_at_ms: row.get(3)?,
    })
}

fn convert_row_to_forced_batch_row(row: &Row<'_>) -> Result<ForcedBatchRow> {
    Ok(ForcedBatchRow {
        forced_batch_num: row.get(0)?,
        global_exit_root: row.get(1)?,
        raw_txs_data: row.get(2)?,
        sequencer: row.get(3)?,
        timestamp_ms: row.get(4)?,
        block_num: row.get(5)?,
        batch_num: row.get(6)?,
    })
}
