//! Retrying, paginated directory client.
//!
//! Every remote call runs through the retry engine; a retried attempt
//! acquires a fresh connection from the pool, so no attempt assumes
//! exclusive ownership of a connection. Paginated search follows the
//! server's continuation cursor with hard ceilings on wall time and page
//! count so a misbehaving server cannot pin a worker forever.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use adlink_core::error::{DirectoryError, DirectoryResult};
use adlink_core::pool::{ConnectionPool, PoolStats};
use adlink_core::retry::with_retry;
use adlink_core::types::{AttributeChange, RawEntry, Scope, SearchRequest};

use crate::config::ClientConfig;

/// Fixed page size for paginated search.
pub const PAGE_SIZE: u32 = 1000;

/// Hard ceiling on pages per paginated search.
pub const MAX_PAGES: u32 = 1000;

/// Hard ceiling on wall time per paginated search.
pub const MAX_SEARCH_DURATION: Duration = Duration::from_secs(30 * 60);

/// Progress is reported at least every this many pages...
const PROGRESS_PAGE_INTERVAL: u32 = 10;

/// ...or at least this often.
const PROGRESS_TIME_INTERVAL: Duration = Duration::from_secs(10);

/// How a paginated search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The server returned no continuation cursor.
    Complete,
    /// The caller's cancellation token fired.
    Cancelled,
    /// The wall-time ceiling was reached.
    TimeCeilingReached,
    /// The page-count ceiling was reached.
    PageCeilingReached,
}

/// Result of a paginated search. Entries accumulated before an early
/// termination are always returned.
#[derive(Debug)]
pub struct PagedSearch {
    /// Entries across all retrieved pages.
    pub entries: Vec<RawEntry>,
    /// Pages retrieved.
    pub pages: u32,
    /// Why pagination stopped.
    pub outcome: SearchOutcome,
    /// Wall time spent paginating.
    pub elapsed: Duration,
}

impl PagedSearch {
    /// Whether the full result set was retrieved.
    pub fn is_complete(&self) -> bool {
        self.outcome == SearchOutcome::Complete
    }
}

/// Result of a single-page search.
#[derive(Debug)]
pub struct SinglePage {
    /// Entries in the page.
    pub entries: Vec<RawEntry>,
    /// True when the result count hit the caller's size limit, meaning the
    /// server may hold more matches.
    pub has_more: bool,
}

/// Directory client wrapping a pooled-connection source with retry and
/// pagination.
pub struct DirectoryClient {
    pool: Arc<dyn ConnectionPool>,
    config: ClientConfig,
}

impl DirectoryClient {
    /// Create a client over the given pool.
    pub fn new(pool: Arc<dyn ConnectionPool>, config: ClientConfig) -> DirectoryResult<Self> {
        config.validate()?;
        Ok(Self { pool, config })
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Aggregate statistics from the underlying pool.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Paginated subtree search with the default 30-minute budget.
    pub async fn search_paged(
        &self,
        base_dn: &str,
        filter: &str,
        attributes: &[&str],
        cancel: &CancellationToken,
    ) -> DirectoryResult<PagedSearch> {
        self.search_paged_with_budget(base_dn, filter, attributes, MAX_SEARCH_DURATION, cancel)
            .await
    }

    /// Paginated subtree search with a caller-supplied time budget. The
    /// budget may tighten the 30-minute ceiling, never loosen it.
    #[instrument(skip(self, attributes, cancel), fields(filter = %filter))]
    pub async fn search_paged_with_budget(
        &self,
        base_dn: &str,
        filter: &str,
        attributes: &[&str],
        budget: Duration,
        cancel: &CancellationToken,
    ) -> DirectoryResult<PagedSearch> {
        let budget = budget.min(MAX_SEARCH_DURATION);
        let mut request = SearchRequest::new(base_dn, Scope::Subtree, filter)
            .with_attributes(attributes.iter().copied())
            .with_page_size(PAGE_SIZE);
        request.time_limit = self.config.operation_time_limit;
        let request = &request;

        let started = Instant::now();
        let mut last_progress = Instant::now();
        let mut entries: Vec<RawEntry> = Vec::new();
        let mut pages: u32 = 0;
        let mut cookie: Option<Vec<u8>> = None;

        let outcome = loop {
            // Termination checks run before each page is issued.
            if cancel.is_cancelled() {
                info!(
                    pages,
                    entries = entries.len(),
                    "Paginated search cancelled, returning accumulated entries"
                );
                break SearchOutcome::Cancelled;
            }
            if started.elapsed() >= budget {
                error!(
                    pages,
                    entries = entries.len(),
                    budget_secs = budget.as_secs(),
                    "Paginated search exceeded its time ceiling"
                );
                break SearchOutcome::TimeCeilingReached;
            }
            if pages >= MAX_PAGES {
                error!(
                    pages,
                    entries = entries.len(),
                    "Paginated search exceeded the page ceiling"
                );
                break SearchOutcome::PageCeilingReached;
            }

            let page = {
                let cookie_ref = cookie.as_deref();
                let result = with_retry("search_page", &self.config.retry, cancel, move || async move {
                    let mut conn = self.pool.acquire(cancel).await?;
                    let result = conn.search_page(request, cookie_ref).await;
                    conn.release().await;
                    result
                })
                .await;

                match result {
                    Ok(page) => page,
                    // Cancellation mid-page still surrenders the entries
                    // accumulated so far.
                    Err(e) if e.is_cancelled() => break SearchOutcome::Cancelled,
                    Err(e) => return Err(e),
                }
            };

            pages += 1;
            entries.extend(page.entries);
            cookie = page.cookie;

            if pages % PROGRESS_PAGE_INTERVAL == 0
                || last_progress.elapsed() >= PROGRESS_TIME_INTERVAL
            {
                info!(
                    pages,
                    entries = entries.len(),
                    elapsed_secs = started.elapsed().as_secs(),
                    "Paginated search progress"
                );
                last_progress = Instant::now();
            }

            if cookie.is_none() {
                debug!(pages, entries = entries.len(), "Paginated search complete");
                break SearchOutcome::Complete;
            }
        };

        Ok(PagedSearch {
            entries,
            pages,
            outcome,
            elapsed: started.elapsed(),
        })
    }

    /// Single-page search for point lookups. `size_limit` of 0 means no
    /// client-imposed limit; otherwise `has_more` is flagged when the result
    /// count equals the limit.
    #[instrument(skip(self, attributes, cancel), fields(filter = %filter))]
    pub async fn search_single(
        &self,
        base_dn: &str,
        scope: Scope,
        filter: &str,
        attributes: &[&str],
        size_limit: u32,
        cancel: &CancellationToken,
    ) -> DirectoryResult<SinglePage> {
        let mut request = SearchRequest::new(base_dn, scope, filter)
            .with_attributes(attributes.iter().copied())
            .with_size_limit(size_limit);
        request.time_limit = self.config.operation_time_limit;
        let request = &request;

        let page = with_retry("search", &self.config.retry, cancel, move || async move {
            let mut conn = self.pool.acquire(cancel).await?;
            let result = conn.search_page(request, None).await;
            conn.release().await;
            result
        })
        .await?;

        let has_more = size_limit > 0 && page.entries.len() as u32 >= size_limit;
        Ok(SinglePage {
            entries: page.entries,
            has_more,
        })
    }

    /// Add an entry.
    #[instrument(skip(self, attributes, cancel), fields(dn = %dn))]
    pub async fn add(
        &self,
        dn: &str,
        attributes: &[(String, Vec<String>)],
        cancel: &CancellationToken,
    ) -> DirectoryResult<()> {
        with_retry("add", &self.config.retry, cancel, move || async move {
            let mut conn = self.pool.acquire(cancel).await?;
            let result = conn.add(dn, attributes).await;
            conn.release().await;
            result
        })
        .await
        .map_err(|e| tag_dn(e, dn))
    }

    /// Apply attribute changes to an entry.
    #[instrument(skip(self, changes, cancel), fields(dn = %dn))]
    pub async fn modify(
        &self,
        dn: &str,
        changes: &[AttributeChange],
        cancel: &CancellationToken,
    ) -> DirectoryResult<()> {
        with_retry("modify", &self.config.retry, cancel, move || async move {
            let mut conn = self.pool.acquire(cancel).await?;
            let result = conn.modify(dn, changes).await;
            conn.release().await;
            result
        })
        .await
        .map_err(|e| tag_dn(e, dn))
    }

    /// Delete an entry.
    #[instrument(skip(self, cancel), fields(dn = %dn))]
    pub async fn delete(&self, dn: &str, cancel: &CancellationToken) -> DirectoryResult<()> {
        with_retry("delete", &self.config.retry, cancel, move || async move {
            let mut conn = self.pool.acquire(cancel).await?;
            let result = conn.delete(dn).await;
            conn.release().await;
            result
        })
        .await
        .map_err(|e| tag_dn(e, dn))
    }

    /// Rename or move an entry.
    #[instrument(skip(self, cancel), fields(dn = %dn, new_rdn = %new_rdn))]
    pub async fn rename(
        &self,
        dn: &str,
        new_rdn: &str,
        new_parent: Option<&str>,
        cancel: &CancellationToken,
    ) -> DirectoryResult<()> {
        with_retry("rename", &self.config.retry, cancel, move || async move {
            let mut conn = self.pool.acquire(cancel).await?;
            let result = conn.rename(dn, new_rdn, new_parent).await;
            conn.release().await;
            result
        })
        .await
        .map_err(|e| tag_dn(e, dn))
    }

    /// Authenticated "who am I" query.
    #[instrument(skip(self, cancel))]
    pub async fn whoami(&self, cancel: &CancellationToken) -> DirectoryResult<String> {
        with_retry("whoami", &self.config.retry, cancel, move || async move {
            let mut conn = self.pool.acquire(cancel).await?;
            let result = conn.whoami().await;
            conn.release().await;
            result
        })
        .await
    }

    /// Resolve the directory's default naming context from the rootDSE.
    #[instrument(skip(self, cancel))]
    pub async fn default_naming_context(
        &self,
        cancel: &CancellationToken,
    ) -> DirectoryResult<String> {
        let page = self
            .search_single(
                "",
                Scope::Base,
                "(objectClass=*)",
                &["defaultNamingContext"],
                0,
                cancel,
            )
            .await?;

        page.entries
            .first()
            .and_then(|e| e.attr_first("defaultNamingContext"))
            .map(str::to_string)
            .ok_or_else(|| {
                DirectoryError::server(
                    "default_naming_context",
                    "rootDSE did not return defaultNamingContext",
                    false,
                )
            })
    }

    /// The configured search base, or the rootDSE default when none is
    /// configured.
    pub async fn effective_base_dn(&self, cancel: &CancellationToken) -> DirectoryResult<String> {
        if !self.config.base_dn.is_empty() {
            return Ok(self.config.base_dn.clone());
        }
        self.default_naming_context(cancel).await
    }
}

impl std::fmt::Debug for DirectoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryClient")
            .field("config", &self.config)
            .finish()
    }
}

/// Attach the DN to an error that does not already carry one.
fn tag_dn(e: DirectoryError, dn: &str) -> DirectoryError {
    if e.dn.is_none() {
        e.with_dn(dn)
    } else {
        e
    }
}
