// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::time::SystemTime;

use alloy_primitives::{Address, B256, Bytes};

/// Reserved forced-batch number meaning "no forced batch". Real forced batches start at 1.
pub const NO_FORCED_BATCH: u64 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForcedBatch {
    pub forced_batch_number: u64,
    pub global_exit_root: B256,
    pub raw_tx_data: Bytes,
    pub sequencer: Address,
    pub timestamp: SystemTime,
    pub l1_block_number: u64,
    // Set exactly once, when the sequencer incorporates the forced batch.
    pub batch_number: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcedBatchState {
    Pending,
    Matched { batch_number: u64 },
}

impl ForcedBatch {
    pub fn state(&self) -> ForcedBatchState {
        match self.batch_number {
            Some(batch_number) => ForcedBatchState::Matched { batch_number },
            None => ForcedBatchState::Pending,
        }
    }
}

impl ForcedBatchState {
    /// Checks a match request against the current state. Re-matching the same batch is a
    /// no-op, any other transition out of `Matched` is rejected.
    pub fn transition(self, batch_number: u64) -> Result<MatchOutcome, MatchConflict> {
        match self {
            Self::Pending => Ok(MatchOutcome::Linked),
            Self::Matched {
                batch_number: existing,
            } if existing == batch_number => Ok(MatchOutcome::AlreadyLinked),
            Self::Matched {
                batch_number: existing,
            } => Err(MatchConflict {
                existing,
                requested: batch_number,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Linked,
    AlreadyLinked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchConflict {
    pub existing: u64,
    pub requested: u64,
}
