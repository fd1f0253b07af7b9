//! # adlink-core
//!
//! Framework layer for the adlink Active Directory client.
//!
//! This crate is protocol-neutral: it defines the failure taxonomy and
//! classifier used everywhere in adlink, the retrying execution engine that
//! wraps every remote call, and the contracts a pooled-connection provider
//! must satisfy. The LDAP-specific pieces (codecs, search client, cache,
//! normalizer) live in `adlink-ldap`.
//!
//! ## Layers
//!
//! - [`error`] — `DirectoryError` with a closed category set and a
//!   retryability verdict, plus the protocol result-code and message
//!   classifiers.
//! - [`retry`] — `RetryPolicy` and [`retry::with_retry`], exponential
//!   backoff with cancellable sleeps.
//! - [`pool`] — `ConnectionPool` / `PooledConnection` collaborator traits
//!   and aggregate pool statistics.
//! - [`types`] — wire-neutral search and modify types shared across crates.

pub mod error;
pub mod pool;
pub mod retry;
pub mod types;

// Re-exports
pub use error::{DirectoryError, DirectoryResult, ErrorCategory};
pub use pool::{ConnectionPool, PoolStats, PooledConnection};
pub use retry::{with_retry, RetryPolicy};
pub use types::{AttributeChange, RawEntry, Scope, SearchPage, SearchRequest};
