// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::time::SystemTime;

use alloy_primitives::{Address, B256};

use crate::forced_batch::{ForcedBatch, NO_FORCED_BATCH};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub batch_number: u64,
    pub global_exit_root: B256,
    pub local_exit_root: B256,
    pub state_root: B256,
    pub sequencer: Address,
    pub timestamp: SystemTime,
}

impl Batch {
    /// Batch numbering starts here; 0 never names a committed batch.
    pub const FIRST_NUMBER: u64 = 1;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub hash: B256,
    // Opaque to the ledger: stored and served verbatim.
    pub encoded: String,
    pub l2_block_number: u64,
    pub received_at: SystemTime,
}

/// A batch as readers see it: the header, every transaction in canonical order, and the
/// forced batch it incorporated, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedBatch {
    pub batch: Batch,
    pub transactions: Vec<Transaction>,
    pub forced_batch: Option<ForcedBatch>,
}

impl CommittedBatch {
    pub fn batch_number(&self) -> u64 {
        self.batch.batch_number
    }

    /// Number of the correlated forced batch, or [`NO_FORCED_BATCH`] when unmatched.
    pub fn forced_batch_number(&self) -> u64 {
        self.forced_batch
            .as_ref()
            .map_or(NO_FORCED_BATCH, |forced| forced.forced_batch_number)
    }
}

/// Canonical in-batch order: ascending L2 block number, ties keep their relative order.
pub fn is_canonically_ordered(transactions: &[Transaction]) -> bool {
    transactions
        .windows(2)
        .all(|pair| pair[0].l2_block_number <= pair[1].l2_block_number)
}
