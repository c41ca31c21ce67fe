// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! One JSON remote-procedure client for every service the node talks to.
//!
//! A `ServiceContract` names a service; each `RpcMethod` binds one of its methods to
//! request and response types. The route of a method is `/{SERVICE}/{NAME}`.

mod collaborators;

use std::marker::PhantomData;
use std::time::Duration;

use reqwest::Url;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::protocol::ErrorResponse;

pub use collaborators::{
    ExecutorService, GetRoot, GetRootRequest, GetRootResponse, ProcessBatch, ProcessBatchRequest,
    ProcessBatchResponse, StateTreeService,
};

/// Header carrying the caller's remaining budget in milliseconds.
pub const REQUEST_TIMEOUT_HEADER: &str = "x-request-timeout-ms";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Extra transport time past the deadline, so the server's own `CANCELED` reply arrives
/// before the HTTP client gives up.
const TRANSPORT_GRACE: Duration = Duration::from_secs(1);

pub trait ServiceContract: Send + Sync + 'static {
    /// Fully qualified service name, e.g. `broadcast.v1.BroadcastService`.
    const SERVICE: &'static str;
}

pub trait RpcMethod {
    type Service: ServiceContract;
    type Request: Serialize + Send + Sync;
    type Response: DeserializeOwned;

    const NAME: &'static str;

    fn path() -> String {
        format!("/{}/{}", <Self::Service as ServiceContract>::SERVICE, Self::NAME)
    }
}

#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub request_timeout: Duration,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Error)]
pub enum RpcClientError {
    #[error("invalid target address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("remote error {code} (HTTP {status}): {message}")]
    Remote {
        status: u16,
        code: String,
        message: String,
    },
}

impl RpcClientError {
    /// Stable error code reported by the remote service, if the call reached it.
    pub fn remote_code(&self) -> Option<&str> {
        match self {
            Self::Remote { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }
}

pub struct RpcClient<S: ServiceContract> {
    http: reqwest::Client,
    base_url: Url,
    config: RpcClientConfig,
    _service: PhantomData<fn() -> S>,
}

impl<S: ServiceContract> Clone for RpcClient<S> {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            config: self.config.clone(),
            _service: PhantomData,
        }
    }
}

impl<S: ServiceContract> RpcClient<S> {
    /// Accepts `host:port` as well as a full `http(s)://` URL.
    pub fn connect(address: &str, config: RpcClientConfig) -> Result<Self, RpcClientError> {
        let base_url = normalize_address(address)?;
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url,
            config,
            _service: PhantomData,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn call<M>(&self, request: &M::Request) -> Result<M::Response, RpcClientError>
    where
        M: RpcMethod<Service = S>,
    {
        self.call_with_timeout::<M>(request, self.config.request_timeout)
            .await
    }

    pub async fn call_with_timeout<M>(
        &self,
        request: &M::Request,
        timeout: Duration,
    ) -> Result<M::Response, RpcClientError>
    where
        M: RpcMethod<Service = S>,
    {
        let path = M::path();
        let url = self
            .base_url
            .join(&path)
            .map_err(|err| RpcClientError::InvalidAddress {
                address: format!("{}{path}", self.base_url),
                reason: err.to_string(),
            })?;

        debug!(method = %path, timeout_ms = timeout.as_millis() as u64, "rpc call");
        let response = self
            .http
            .post(url)
            .timeout(timeout.saturating_add(TRANSPORT_GRACE))
            .header(REQUEST_TIMEOUT_HEADER, timeout.as_millis().to_string())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<M::Response>().await?);
        }

        let body = response.text().await?;
        Err(remote_error(status.as_u16(), &body))
    }
}

fn remote_error(status: u16, body: &str) -> RpcClientError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(error) => RpcClientError::Remote {
            status,
            code: error.code,
            message: error.message,
        },
        Err(_) => RpcClientError::Remote {
            status,
            code: "UNKNOWN".to_string(),
            message: body.to_string(),
        },
    }
}

fn normalize_address(address: &str) -> Result<Url, RpcClientError> {
    let trimmed = address.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let url = Url::parse(&with_scheme).map_err(|err| RpcClientError::InvalidAddress {
        address: address.to_string(),
        reason: err.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(RpcClientError::InvalidAddress {
            address: address.to_string(),
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    Ok(url)
}
