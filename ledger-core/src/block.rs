// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::time::SystemTime;

use alloy_primitives::{B256, Bytes};

/// Parent hash carried by the genesis L2 block.
pub const ZERO_HASH: B256 = B256::ZERO;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L1Block {
    pub number: u64,
    pub hash: B256,
    pub received_at: SystemTime,
}

/// An L2 block header as seen by the ledger. The number is assigned by the caller of
/// the append, the hash is computed upstream by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L2Block {
    pub hash: B256,
    pub parent_hash: B256,
    pub received_at: SystemTime,
}

impl L2Block {
    /// Whether this block extends `parent`; `None` means it is the genesis block.
    pub fn links_to(&self, parent: Option<&B256>) -> bool {
        match parent {
            Some(parent_hash) => self.parent_hash == *parent_hash,
            None => self.parent_hash == ZERO_HASH,
        }
    }
}

/// Opaque execution receipt stored alongside an L2 block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionReceipt {
    pub data: Bytes,
}
