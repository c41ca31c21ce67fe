// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Durable ledger of L1/L2 blocks, batches and forced batches.
//!
//! One writer connection applies every mutation inside an `IMMEDIATE` transaction;
//! a pool of read-only connections serves snapshot reads next to it (SQLite WAL).

mod context;
mod db;
mod error;
mod sql;
mod store;

use thiserror::Error;

pub use context::CallContext;
pub use error::{ErrorKind, LedgerError};
pub use store::LedgerStore;

#[derive(Debug, Error)]
pub enum StorageOpenError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Migration(#[from] rusqlite_migration::Error),
}
