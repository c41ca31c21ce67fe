// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::time::Duration;

use thiserror::Error;

const DEFAULT_DB_PATH: &str = "ledger.db";
const DEFAULT_POOL_SIZE: usize = 8;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);
const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:61090";
const DEFAULT_SQLITE_SYNCHRONOUS: &str = "NORMAL";
const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024;

const SQLITE_SYNCHRONOUS_LEVELS: [&str; 4] = ["OFF", "NORMAL", "FULL", "EXTRA"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}={value:?} is not a valid {expected}")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Service settings, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SQLite database file backing the ledger.
    pub connection_target: String,
    /// Number of read-only connections serving queries.
    pub pool_size: usize,
    /// Upper bound on every request deadline.
    pub request_timeout: Duration,
    pub http_addr: String,
    pub sqlite_synchronous: String,
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection_target: DEFAULT_DB_PATH.to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            sqlite_synchronous: DEFAULT_SQLITE_SYNCHRONOUS.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let sqlite_synchronous = lookup("BROADCAST_SQLITE_SYNCHRONOUS")
            .map(|value| parse_synchronous(&value))
            .transpose()?
            .unwrap_or(defaults.sqlite_synchronous);

        Ok(Self {
            connection_target: lookup("BROADCAST_DB_PATH").unwrap_or(defaults.connection_target),
            pool_size: parse_number(&lookup, "BROADCAST_POOL_SIZE", defaults.pool_size)?.max(1),
            request_timeout: Duration::from_millis(parse_number(
                &lookup,
                "BROADCAST_REQUEST_TIMEOUT_MS",
                defaults.request_timeout.as_millis() as u64,
            )?),
            http_addr: lookup("BROADCAST_HTTP_ADDR").unwrap_or(defaults.http_addr),
            sqlite_synchronous,
            max_body_bytes: parse_number(
                &lookup,
                "BROADCAST_MAX_BODY_BYTES",
                defaults.max_body_bytes,
            )?,
        })
    }
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            value,
            expected: "unsigned integer",
        }),
    }
}

fn parse_synchronous(value: &str) -> Result<String, ConfigError> {
    let level = value.trim().to_ascii_uppercase();
    if SQLITE_SYNCHRONOUS_LEVELS.contains(&level.as_str()) {
        return Ok(level);
    }
    Err(ConfigError::Invalid {
        key: "BROADCAST_SQLITE_SYNCHRONOUS",
        value: value.to_string(),
        expected: "sqlite synchronous level",
    })
}

#[cfg(test)]
mod tests {
    use super::{Config, ConfigError};
    use std::collections::HashMap;
    use std::time::Duration;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| values.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = Config::from_lookup(|_| None).expect("defaults");
        assert_eq!(config, Config::default());
        assert_eq!(config.connection_target, "ledger.db");
        assert_eq!(config.pool_size, 8);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.http_addr, "127.0.0.1:61090");
        assert_eq!(config.max_body_bytes, 16 * 1024);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("BROADCAST_DB_PATH", "/tmp/broadcast.db"),
            ("BROADCAST_POOL_SIZE", "0"),
            ("BROADCAST_REQUEST_TIMEOUT_MS", "250"),
            ("BROADCAST_SQLITE_SYNCHRONOUS", "full"),
        ]))
        .expect("parse overrides");
        assert_eq!(config.connection_target, "/tmp/broadcast.db");
        assert_eq!(config.pool_size, 1);
        assert_eq!(config.request_timeout, Duration::from_millis(250));
        assert_eq!(config.sqlite_synchronous, "FULL");
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = Config::from_lookup(lookup_from(&[("BROADCAST_POOL_SIZE", "many")]))
            .expect_err("non-numeric pool size");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "BROADCAST_POOL_SIZE",
                ..
            }
        ));

        let err = Config::from_lookup(lookup_from(&[(
            "BROADCAST_SQLITE_SYNCHRONOUS",
            "sometimes",
        )]))
        .expect_err("unknown synchronous level");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "BROADCAST_SQLITE_SYNCHRONOUS",
                ..
            }
        ));
    }
}
