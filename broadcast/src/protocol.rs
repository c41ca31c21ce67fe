// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! JSON wire format of the broadcast service.

use std::time::UNIX_EPOCH;

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

use crate::query::{BatchProjection, TransactionProjection};
use crate::rpc_client::{RpcMethod, ServiceContract};

pub struct BroadcastService;

impl ServiceContract for BroadcastService {
    const SERVICE: &'static str = "broadcast.v1.BroadcastService";
}

pub struct GetLastBatch;

impl RpcMethod for GetLastBatch {
    type Service = BroadcastService;
    type Request = GetLastBatchRequest;
    type Response = GetLastBatchResponse;

    const NAME: &'static str = "GetLastBatch";
}

pub struct GetBatch;

impl RpcMethod for GetBatch {
    type Service = BroadcastService;
    type Request = GetBatchRequest;
    type Response = GetBatchResponse;

    const NAME: &'static str = "GetBatch";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetLastBatchRequest {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetLastBatchResponse {
    /// 0 while the ledger holds no batch.
    pub batch_number: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetBatchRequest {
    pub batch_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTransaction {
    pub hash: B256,
    pub encoded: String,
    pub l2_block_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetBatchResponse {
    pub batch_number: u64,
    pub global_exit_root: B256,
    pub local_exit_root: B256,
    pub state_root: B256,
    pub sequencer: Address,
    /// Unix seconds.
    pub timestamp: u64,
    pub transactions: Vec<WireTransaction>,
    /// 0 when the batch incorporates no forced batch.
    pub forced_batch_number: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Serving,
    NotServing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub code: String,
    pub message: String,
}

impl From<TransactionProjection> for WireTransaction {
    fn from(value: TransactionProjection) -> Self {
        Self {
            hash: value.hash,
            encoded: value.encoded,
            l2_block_number: value.l2_block_number,
        }
    }
}

impl From<BatchProjection> for GetBatchResponse {
    fn from(value: BatchProjection) -> Self {
        Self {
            batch_number: value.batch_number,
            global_exit_root: value.global_exit_root,
            local_exit_root: value.local_exit_root,
            state_root: value.state_root,
            sequencer: value.sequencer,
            timestamp: value
                .timestamp
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            transactions: value.transactions.into_iter().map(Into::into).collect(),
            forced_batch_number: value.forced_batch_number,
        }
    }
}
