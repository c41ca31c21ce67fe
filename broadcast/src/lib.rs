// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Broadcast service over an append-only rollup ledger.
//!
//! Flow: synchronizer -> ledger store (writes) -> query engine (snapshot reads) -> API.
//! The store is the only shared state; every call carries a deadline.
pub mod api;
pub mod config;
pub mod protocol;
pub mod query;
pub mod rpc_client;
pub mod storage;
