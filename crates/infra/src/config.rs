//! Processor configuration, read once from the environment at startup.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration as StdDuration;

use agencyhub_scheduling::RetryPolicy;

use crate::jobs::DEFAULT_BATCH_LIMIT;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const MAX_BATCH_LIMIT: usize = 100;
pub const DEFAULT_BACKOFF_BASE_SECS: i64 = 60;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {var}={value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    pub bind_addr: SocketAddr,
    /// Unset means in-memory stores.
    pub database_url: Option<String>,
    /// Unset leaves the processing endpoint open.
    pub cron_secret: Option<String>,
    pub batch_limit: usize,
    pub backoff_base: chrono::Duration,
    pub decrypt_function_url: Option<String>,
    pub decrypt_service_key: Option<String>,
    pub http_timeout: StdDuration,
    pub apply_schema: bool,
}

impl fmt::Debug for ProcessorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[redacted]");
        f.debug_struct("ProcessorConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database_url", &redact(&self.database_url))
            .field("cron_secret", &redact(&self.cron_secret))
            .field("batch_limit", &self.batch_limit)
            .field("backoff_base", &self.backoff_base)
            .field("decrypt_function_url", &self.decrypt_function_url)
            .field("decrypt_service_key", &redact(&self.decrypt_service_key))
            .field("http_timeout", &self.http_timeout)
            .field("apply_schema", &self.apply_schema)
            .finish()
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            cron_secret: None,
            batch_limit: DEFAULT_BATCH_LIMIT,
            backoff_base: chrono::Duration::seconds(DEFAULT_BACKOFF_BASE_SECS),
            decrypt_function_url: None,
            decrypt_service_key: None,
            http_timeout: StdDuration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            apply_schema: false,
        }
    }
}

impl ProcessorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let bind_addr = match get("BIND_ADDR") {
            Some(raw) => raw
                .parse()
                .map_err(|e| ConfigError::invalid("BIND_ADDR", &raw, format!("{e}")))?,
            None => defaults.bind_addr,
        };

        let batch_limit = match get("JOB_BATCH_LIMIT") {
            Some(raw) => {
                let n: usize = raw
                    .parse()
                    .map_err(|e| ConfigError::invalid("JOB_BATCH_LIMIT", &raw, format!("{e}")))?;
                if !(1..=MAX_BATCH_LIMIT).contains(&n) {
                    return Err(ConfigError::invalid(
                        "JOB_BATCH_LIMIT",
                        &raw,
                        format!("must be between 1 and {MAX_BATCH_LIMIT}"),
                    ));
                }
                n
            }
            None => defaults.batch_limit,
        };

        let backoff_base = match get("JOB_BACKOFF_BASE_SECS") {
            Some(raw) => {
                let secs: i64 = raw
                    .parse()
                    .map_err(|e| ConfigError::invalid("JOB_BACKOFF_BASE_SECS", &raw, format!("{e}")))?;
                if secs <= 0 {
                    return Err(ConfigError::invalid("JOB_BACKOFF_BASE_SECS", &raw, "must be positive"));
                }
                chrono::Duration::seconds(secs)
            }
            None => defaults.backoff_base,
        };

        let http_timeout = match get("HTTP_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw
                    .parse()
                    .map_err(|e| ConfigError::invalid("HTTP_TIMEOUT_SECS", &raw, format!("{e}")))?;
                if secs == 0 {
                    return Err(ConfigError::invalid("HTTP_TIMEOUT_SECS", &raw, "must be positive"));
                }
                StdDuration::from_secs(secs)
            }
            None => defaults.http_timeout,
        };

        let apply_schema = match get("APPLY_SCHEMA") {
            Some(raw) => parse_bool(&raw)
                .ok_or_else(|| ConfigError::invalid("APPLY_SCHEMA", &raw, "expected true or false"))?,
            None => defaults.apply_schema,
        };

        Ok(Self {
            bind_addr,
            database_url: get("DATABASE_URL"),
            cron_secret: get("CRON_SECRET"),
            batch_limit,
            backoff_base,
            decrypt_function_url: get("DECRYPT_FUNCTION_URL"),
            decrypt_service_key: get("DECRYPT_SERVICE_KEY"),
            http_timeout,
            apply_schema,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_base_delay(self.backoff_base)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
