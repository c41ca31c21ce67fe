// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::protocol::ErrorResponse;
use crate::storage::{ErrorKind, LedgerError};

#[derive(Debug, Error, Clone)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    IntegrityViolation(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Canceled(String),
    #[error("{0}")]
    DataCorruption(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::IntegrityViolation(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Canceled(_) => StatusCode::REQUEST_TIMEOUT,
            Self::DataCorruption(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::NotFound(_) => "NOT_FOUND",
            Self::IntegrityViolation(_) => "INTEGRITY_VIOLATION",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Canceled(_) => "CANCELED",
            Self::DataCorruption(_) => "DATA_CORRUPTION",
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(value: LedgerError) -> Self {
        let message = value.to_string();
        match value.kind() {
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::IntegrityViolation => Self::IntegrityViolation(message),
            ErrorKind::Unavailable => Self::Unavailable(message),
            ErrorKind::Canceled => Self::Canceled(message),
            ErrorKind::DataCorruption => Self::DataCorruption(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            ok: false,
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
