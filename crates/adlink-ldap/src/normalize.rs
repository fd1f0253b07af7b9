//! Identifier classification and normalization to canonical DNs.
//!
//! Callers hand us whatever identifier form they have — a DN in any casing,
//! a GUID, a SID, a UPN, or a `DOMAIN\account` name — and get back one
//! canonical distinguished name, resolved against the directory and written
//! through to the identity cache so the next caller skips the round trip.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use adlink_core::error::{DirectoryError, DirectoryResult};
use adlink_core::types::Scope;

use crate::cache::IdentityCache;
use crate::client::DirectoryClient;
use crate::codec::{as_filter_value_hex, guid_to_bytes, is_valid_guid};
use crate::dn::{canonicalize_dn, escape_filter_value};
use crate::entry::{DirectoryEntry, ATTR_SAM, ATTR_UPN};

static DN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(CN|OU|DC|O|C|STREET|L|ST|POSTALCODE)=.+").expect("valid regex")
});

static SID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^S-1-\d+(-\d+)*$").expect("valid regex"));

static UPN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex")
});

/// The syntactic form of a directory identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    /// An RFC 4514 distinguished name.
    DistinguishedName,
    /// A hyphenated objectGUID.
    Guid,
    /// An `S-1-...` security identifier.
    Sid,
    /// A `user@domain.tld` principal name.
    Upn,
    /// A legacy account name, optionally `DOMAIN\`-prefixed.
    SamAccountName,
    /// Nothing recognizable.
    Unknown,
}

/// Classify an identifier by syntax alone, without touching the directory.
///
/// Checks run in a fixed priority order, so an input matching several
/// patterns classifies deterministically: DN beats UPN for values containing
/// both `=` and `@`, and GUID/SID beat the account-name catch-all.
pub fn classify(identifier: &str) -> IdentifierKind {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return IdentifierKind::Unknown;
    }
    if DN_RE.is_match(trimmed) {
        return IdentifierKind::DistinguishedName;
    }
    if is_valid_guid(trimmed) {
        return IdentifierKind::Guid;
    }
    if SID_RE.is_match(trimmed) {
        return IdentifierKind::Sid;
    }
    if UPN_RE.is_match(trimmed) {
        return IdentifierKind::Upn;
    }
    // Catch-all: a bare or DOMAIN\-prefixed account name, no whitespace
    // and no stray @.
    let account = trimmed
        .split_once('\\')
        .map(|(_, account)| account)
        .unwrap_or(trimmed);
    if !account.is_empty()
        && !account.contains('@')
        && !account.contains('\\')
        && !account.chars().any(char::is_whitespace)
    {
        return IdentifierKind::SamAccountName;
    }
    IdentifierKind::Unknown
}

/// Outcome of a batch normalization.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Successfully normalized (input, canonical DN) pairs.
    pub resolved: Vec<(String, String)>,
    /// (input, error) pairs for identifiers that failed.
    pub failed: Vec<(String, DirectoryError)>,
}

/// Resolves arbitrary identifiers to canonical DNs, backed by the cache.
pub struct Normalizer {
    client: Arc<DirectoryClient>,
    cache: Arc<IdentityCache>,
}

impl Normalizer {
    /// Create a normalizer over the given client and cache.
    pub fn new(client: Arc<DirectoryClient>, cache: Arc<IdentityCache>) -> Self {
        Self { client, cache }
    }

    /// The backing cache.
    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    /// Resolve any identifier form to the object's canonical DN.
    ///
    /// The cache is consulted first; on a miss the identifier is classified
    /// and resolved with a targeted directory lookup, and the result is
    /// written back to the cache. Idempotent: feeding a returned DN back in
    /// yields the same DN.
    #[instrument(skip(self, cancel), fields(identifier = %identifier))]
    pub async fn normalize_to_dn(
        &self,
        identifier: &str,
        cancel: &CancellationToken,
    ) -> DirectoryResult<String> {
        let trimmed = identifier.trim();
        if trimmed.is_empty() {
            return Err(DirectoryError::validation("empty identifier"));
        }

        if let Some(cached) = self.cache.get(trimmed) {
            debug!(dn = %cached.dn, "Identifier resolved from cache");
            return canonicalize_dn(&cached.dn);
        }

        let mut entry = match classify(trimmed) {
            IdentifierKind::DistinguishedName => self.resolve_dn(trimmed, cancel).await?,
            IdentifierKind::Guid => {
                let bytes = guid_to_bytes(trimmed)?;
                let filter = format!("(objectGUID={})", as_filter_value_hex(&bytes));
                self.resolve_filter(&filter, trimmed, cancel).await?
            }
            IdentifierKind::Sid => {
                let filter = format!("(objectSid={})", escape_filter_value(trimmed));
                self.resolve_filter(&filter, trimmed, cancel).await?
            }
            IdentifierKind::Upn => {
                let filter = format!("({ATTR_UPN}={})", escape_filter_value(trimmed));
                self.resolve_filter(&filter, trimmed, cancel).await?
            }
            IdentifierKind::SamAccountName => {
                let account = trimmed
                    .split_once('\\')
                    .map(|(_, account)| account)
                    .unwrap_or(trimmed);
                let filter = format!("({ATTR_SAM}={})", escape_filter_value(account));
                self.resolve_filter(&filter, trimmed, cancel).await?
            }
            IdentifierKind::Unknown => {
                return Err(DirectoryError::validation(format!(
                    "unrecognizable identifier '{trimmed}'"
                )));
            }
        };

        // The cached record carries the canonical spelling, same as the
        // return value.
        let canonical = canonicalize_dn(&entry.dn)?;
        entry.dn = canonical.clone();
        if let Err(e) = self.cache.put(entry) {
            // A write-back failure degrades to uncached, nothing more.
            warn!(error = %e, "Failed to cache normalized entry");
        }
        Ok(canonical)
    }

    /// Normalize a batch of identifiers with per-item failure isolation.
    ///
    /// Blank inputs are skipped. Errors on individual identifiers are
    /// collected rather than aborting the batch; the whole call fails only
    /// when every non-blank identifier failed.
    pub async fn normalize_batch(
        &self,
        identifiers: &[String],
        cancel: &CancellationToken,
    ) -> DirectoryResult<BatchOutcome> {
        let mut outcome = BatchOutcome {
            resolved: Vec::new(),
            failed: Vec::new(),
        };

        for identifier in identifiers {
            if identifier.trim().is_empty() {
                continue;
            }
            match self.normalize_to_dn(identifier, cancel).await {
                Ok(dn) => outcome.resolved.push((identifier.clone(), dn)),
                Err(e) => {
                    if e.is_cancelled() {
                        return Err(e);
                    }
                    outcome.failed.push((identifier.clone(), e));
                }
            }
        }

        if outcome.resolved.is_empty() && !outcome.failed.is_empty() {
            return Err(DirectoryError::server(
                "normalize_batch",
                format!("all {} identifiers failed to normalize", outcome.failed.len()),
                false,
            ));
        }
        Ok(outcome)
    }

    /// Whether the identifier resolves to an existing object.
    pub async fn validate(
        &self,
        identifier: &str,
        cancel: &CancellationToken,
    ) -> DirectoryResult<bool> {
        match self.normalize_to_dn(identifier, cancel).await {
            Ok(_) => Ok(true),
            Err(e) if e.category == adlink_core::error::ErrorCategory::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Base-object probe of a literal DN. Prefers the server's own spelling
    /// from the distinguishedName attribute over the caller's.
    async fn resolve_dn(
        &self,
        dn: &str,
        cancel: &CancellationToken,
    ) -> DirectoryResult<DirectoryEntry> {
        let page = self
            .client
            .search_single(dn, Scope::Base, "(objectClass=*)", LOOKUP_ATTRIBUTES, 2, cancel)
            .await
            .map_err(|e| {
                if e.category == adlink_core::error::ErrorCategory::NotFound {
                    DirectoryError::not_found("normalize", dn)
                } else {
                    e
                }
            })?;

        let raw = page
            .entries
            .into_iter()
            .next()
            .ok_or_else(|| DirectoryError::not_found("normalize", dn))?;
        DirectoryEntry::from_raw(&raw)
    }

    /// Subtree search resolving `filter` to an object. When several objects
    /// match, the first one returned wins.
    async fn resolve_filter(
        &self,
        filter: &str,
        identifier: &str,
        cancel: &CancellationToken,
    ) -> DirectoryResult<DirectoryEntry> {
        let base = self.client.effective_base_dn(cancel).await?;
        let page = self
            .client
            .search_single(&base, Scope::Subtree, filter, LOOKUP_ATTRIBUTES, 1, cancel)
            .await?;

        let raw = page.entries.into_iter().next().ok_or_else(|| {
            DirectoryError::not_found("normalize", identifier)
        })?;
        DirectoryEntry::from_raw(&raw)
    }
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer").finish_non_exhaustive()
    }
}

/// Attributes fetched by normalization lookups.
const LOOKUP_ATTRIBUTES: &[&str] = &[
    "objectClass",
    "objectGUID",
    "objectSid",
    "userPrincipalName",
    "sAMAccountName",
    "distinguishedName",
];
