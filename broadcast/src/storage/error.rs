// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    IntegrityViolation,
    Unavailable,
    Canceled,
    DataCorruption,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),
    #[error("ledger unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("operation canceled")]
    Canceled,
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

impl LedgerError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::IntegrityViolation(message.into())
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn corruption(message: impl Into<String>) -> Self {
        Self::DataCorruption(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::IntegrityViolation(_) => ErrorKind::IntegrityViolation,
            Self::Unavailable { .. } => ErrorKind::Unavailable,
            Self::Canceled => ErrorKind::Canceled,
            Self::DataCorruption(_) => ErrorKind::DataCorruption,
        }
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                ErrorCode::ConstraintViolation => Self::IntegrityViolation(err.to_string()),
                ErrorCode::OperationInterrupted => Self::Canceled,
                ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase => {
                    Self::DataCorruption(err.to_string())
                }
                _ => Self::unavailable(err.to_string()),
            },
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..) => Self::DataCorruption(err.to_string()),
            _ => Self::unavailable(err.to_string()),
        }
    }
}
