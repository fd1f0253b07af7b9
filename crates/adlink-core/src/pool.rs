//! Pooled-connection collaborator contracts.
//!
//! adlink never owns connection lifecycle: it acquires a connection, uses it
//! for one attempt, and releases it. A retried attempt may well receive a
//! different connection. The pool implementation itself lives outside this
//! library; tests supply in-memory mocks.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::DirectoryResult;
use crate::types::{AttributeChange, SearchPage, SearchRequest};

/// A connection checked out of the pool.
///
/// All remote operations may block for the configured timeout; callers
/// enforce promptness by racing the cancellation token around the acquire
/// and around retry backoffs.
#[async_trait]
pub trait PooledConnection: Send {
    /// Issue one search request, optionally continuing from a previous
    /// page's cursor. The returned page carries the next cursor while more
    /// results remain.
    async fn search_page(
        &mut self,
        request: &SearchRequest,
        cookie: Option<&[u8]>,
    ) -> DirectoryResult<SearchPage>;

    /// Add an entry at the given distinguished name.
    async fn add(&mut self, dn: &str, attributes: &[(String, Vec<String>)])
        -> DirectoryResult<()>;

    /// Apply attribute changes to the entry at the given distinguished name.
    async fn modify(&mut self, dn: &str, changes: &[AttributeChange]) -> DirectoryResult<()>;

    /// Delete the entry at the given distinguished name.
    async fn delete(&mut self, dn: &str) -> DirectoryResult<()>;

    /// Rename or move the entry at the given distinguished name.
    async fn rename(
        &mut self,
        dn: &str,
        new_rdn: &str,
        new_parent: Option<&str>,
    ) -> DirectoryResult<()>;

    /// Authenticated "who am I" query returning the authorization identity.
    async fn whoami(&mut self) -> DirectoryResult<String>;

    /// Return the connection to the pool.
    async fn release(self: Box<Self>);
}

/// Source of pooled connections.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Check out a connection, aborting early if the token fires.
    async fn acquire(
        &self,
        cancel: &CancellationToken,
    ) -> DirectoryResult<Box<dyn PooledConnection>>;

    /// Aggregate pool statistics.
    fn stats(&self) -> PoolStats;
}

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolStats {
    /// Connections currently owned by the pool.
    pub total: u32,
    /// Connections checked out.
    pub active: u32,
    /// Connections idle in the pool.
    pub idle: u32,
    /// Connections that failed their last health check.
    pub unhealthy: u32,
    /// Connections created over the pool's lifetime.
    pub created: u64,
    /// Acquire/health-check errors over the pool's lifetime.
    pub errors: u64,
    /// Time since the pool was created.
    pub uptime: Duration,
}
