// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Data model of the rollup ledger: L1 anchors, chained L2 blocks, sealed batches and
//! the forced batches that L1 pushes onto the sequencer.
pub mod batch;
pub mod block;
pub mod forced_batch;

pub use batch::{Batch, CommittedBatch, Transaction, is_canonically_ordered};
pub use block::{ExecutionReceipt, L1Block, L2Block, ZERO_HASH};
pub use forced_batch::{
    ForcedBatch, ForcedBatchState, MatchConflict, MatchOutcome, NO_FORCED_BATCH,
};
