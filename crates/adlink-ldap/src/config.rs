//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use adlink_core::error::{DirectoryError, DirectoryResult};
use adlink_core::retry::RetryPolicy;

use crate::dn::parse_dn;

/// Configuration for a [`crate::client::DirectoryClient`].
///
/// Credentials never live here: binds are owned by the connection pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Default search base. May be left empty, in which case it is resolved
    /// from the directory root (rootDSE `defaultNamingContext`) on demand.
    pub base_dn: String,
    /// Retry policy applied to every remote operation.
    pub retry: RetryPolicy,
    /// Server-side time limit handed to each search request.
    pub operation_time_limit: Duration,
    /// Wall-time budget for a cache warming run. May tighten the built-in
    /// ceiling, never loosen it.
    pub warm_budget: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_dn: String::new(),
            retry: RetryPolicy::default(),
            operation_time_limit: Duration::from_secs(120),
            warm_budget: Duration::from_secs(10 * 60),
        }
    }
}

impl ClientConfig {
    /// Create a configuration rooted at the given base DN.
    pub fn new(base_dn: impl Into<String>) -> Self {
        Self {
            base_dn: base_dn.into(),
            ..Self::default()
        }
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> DirectoryResult<()> {
        if !self.base_dn.is_empty() {
            parse_dn(&self.base_dn)
                .map_err(|e| DirectoryError::validation(format!("base_dn: {}", e.message)))?;
        }
        if self.retry.backoff_factor < 1.0 {
            return Err(DirectoryError::validation(format!(
                "retry.backoff_factor must be at least 1.0, got {}",
                self.retry.backoff_factor
            )));
        }
        if self.retry.max_backoff < self.retry.initial_backoff {
            return Err(DirectoryError::validation(
                "retry.max_backoff must not be below retry.initial_backoff",
            ));
        }
        if self.operation_time_limit.is_zero() {
            return Err(DirectoryError::validation(
                "operation_time_limit must be non-zero",
            ));
        }
        if self.warm_budget.is_zero() {
            return Err(DirectoryError::validation("warm_budget must be non-zero"));
        }
        Ok(())
    }
}
