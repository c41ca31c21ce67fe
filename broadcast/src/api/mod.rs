// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

mod error;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Json, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::protocol::{
    GetBatch, GetBatchRequest, GetBatchResponse, GetLastBatch, GetLastBatchRequest,
    GetLastBatchResponse, HealthResponse, HealthStatus,
};
use crate::query::BroadcastQuery;
use crate::rpc_client::{REQUEST_TIMEOUT_HEADER, RpcMethod};
use crate::storage::CallContext;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub query: BroadcastQuery,
    /// Upper bound on the deadline of every request.
    pub request_timeout: Duration,
}

pub fn router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route(&GetLastBatch::path(), post(get_last_batch))
        .route(&GetBatch::path(), post(get_batch))
        .route("/health", get(health))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
}

async fn get_last_batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    req: Result<Json<GetLastBatchRequest>, JsonRejection>,
) -> Result<Json<GetLastBatchResponse>, ApiError> {
    let Json(_) = req.map_err(|err| ApiError::bad_request(format!("invalid JSON: {err}")))?;
    let ctx = request_context(&headers, state.request_timeout)?;

    let batch_number = cancel_on_disconnect(ctx, |ctx| async move {
        state.query.get_last_batch(&ctx).await
    })
    .await?;
    Ok(Json(GetLastBatchResponse { batch_number }))
}

async fn get_batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    req: Result<Json<GetBatchRequest>, JsonRejection>,
) -> Result<Json<GetBatchResponse>, ApiError> {
    let Json(req) = req.map_err(|err| ApiError::bad_request(format!("invalid JSON: {err}")))?;
    let ctx = request_context(&headers, state.request_timeout)?;

    let batch = cancel_on_disconnect(ctx, |ctx| async move {
        state.query.get_batch(&ctx, req.batch_number).await
    })
    .await?;
    debug!(
        batch_number = batch.batch_number,
        tx_count = batch.transactions.len(),
        "batch served"
    );
    Ok(Json(batch.into()))
}

async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let ctx = CallContext::with_timeout(state.request_timeout);
    let checked = cancel_on_disconnect(ctx, |ctx| async move {
        state.query.check_health(&ctx).await
    })
    .await;
    let (status_code, status) = match checked {
        Ok(()) => (StatusCode::OK, HealthStatus::Serving),
        Err(err) => {
            warn!(error = %err, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, HealthStatus::NotServing)
        }
    };
    (
        status_code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Runs `call` under `ctx` and cancels `ctx` once this future is dropped, so a client
/// that disconnects mid-request also stops the ledger work started for it.
async fn cancel_on_disconnect<T, F, Fut>(ctx: CallContext, call: F) -> T
where
    F: FnOnce(CallContext) -> Fut,
    Fut: Future<Output = T>,
{
    let _cancel_on_drop = ctx.cancel_on_drop();
    call(ctx).await
}

fn request_context(headers: &HeaderMap, limit: Duration) -> Result<CallContext, ApiError> {
    Ok(CallContext::with_timeout(request_timeout(headers, limit)?))
}

/// The caller's deadline header, capped by the configured limit.
fn request_timeout(headers: &HeaderMap, limit: Duration) -> Result<Duration, ApiError> {
    let Some(value) = headers.get(REQUEST_TIMEOUT_HEADER) else {
        return Ok(limit);
    };
    let millis = value
        .to_str()
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .ok_or_else(|| {
            ApiError::bad_request(format!(
                "{REQUEST_TIMEOUT_HEADER} must be a number of milliseconds"
            ))
        })?;
    Ok(Duration::from_millis(millis).min(limit))
}
