// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Request and response shapes of the executor and state-tree services.

use alloy_primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};

use super::{RpcMethod, ServiceContract};

pub struct ExecutorService;

impl ServiceContract for ExecutorService {
    const SERVICE: &'static str = "executor.v1.ExecutorService";
}

pub struct StateTreeService;

impl ServiceContract for StateTreeService {
    const SERVICE: &'static str = "statetree.v1.StateTreeService";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessBatchRequest {
    pub batch_number: u64,
    pub old_state_root: B256,
    pub global_exit_root: B256,
    pub coinbase: Address,
    /// Concatenated encoded transactions of the batch.
    pub batch_l2_data: Bytes,
    pub timestamp: u64,
    pub chain_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessBatchResponse {
    pub new_state_root: B256,
    pub new_local_exit_root: B256,
    pub cumulative_gas_used: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct ProcessBatch;

impl RpcMethod for ProcessBatch {
    type Service = ExecutorService;
    type Request = ProcessBatchRequest;
    type Response = ProcessBatchResponse;

    const NAME: &'static str = "ProcessBatch";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRootRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRootResponse {
    pub root: B256,
}

pub struct GetRoot;

impl RpcMethod for GetRoot {
    type Service = StateTreeService;
    type Request = GetRootRequest;
    type Response = GetRootResponse;

    const NAME: &'static str = "GetRoot";
}
