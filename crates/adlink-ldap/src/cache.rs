//! Concurrent identity cache with multi-key lookup.
//!
//! Records are stored once under an opaque numeric id and indexed under
//! every identifier they carry: distinguished name, objectGUID, objectSid,
//! userPrincipalName, and sAMAccountName. All index keys are trimmed and
//! lower-cased, so lookups are case-insensitive across the board.
//!
//! Replacing an entry via [`IdentityCache::put`] inserts a fresh record and
//! repoints the indexes; the previous record is left in the store until the
//! next [`IdentityCache::clear`] or an explicit [`IdentityCache::evict`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use adlink_core::error::{DirectoryError, DirectoryResult};

use crate::client::DirectoryClient;
use crate::codec::is_valid_guid;
use crate::entry::{DirectoryEntry, ATTR_OBJECT_GUID, ATTR_OBJECT_SID};

/// Ceiling on the wall-time budget for one warming run.
pub const MAX_WARM_BUDGET: Duration = Duration::from_secs(10 * 60);

/// Filter selecting the user and group population for warming.
const WARM_FILTER: &str =
    "(|(&(objectClass=user)(objectCategory=person))(objectClass=group))";

/// Attributes fetched during warming.
const WARM_ATTRIBUTES: &[&str] = &[
    "objectClass",
    "objectGUID",
    "objectSid",
    "userPrincipalName",
    "sAMAccountName",
    "distinguishedName",
    "cn",
    "displayName",
    "mail",
];

/// Rough per-record bookkeeping overhead used by the memory estimate.
const RECORD_OVERHEAD_BYTES: usize = 256;

/// Live index keys broken down by identifier kind. Recomputed on every
/// [`IdentityCache::stats`] call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexCounts {
    pub dn: usize,
    pub guid: usize,
    pub sid: usize,
    pub upn: usize,
    pub sam: usize,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    /// Live records in the store.
    pub entries: usize,
    /// Live index keys across all identifier kinds.
    pub index_keys: usize,
    /// Live index keys per identifier kind.
    pub index: IndexCounts,
    /// Cumulative lookup hits.
    pub hits: u64,
    /// Cumulative lookup misses.
    pub misses: u64,
    /// Hit percentage over all lookups, zero when no lookups have happened.
    pub hit_rate: f64,
    /// Running average latency of a cache hit, in microseconds.
    pub avg_hit_latency_us: u64,
    /// Completed warming runs.
    pub warm_runs: u64,
    /// When the cache was last warmed.
    pub last_warmed: Option<DateTime<Utc>>,
    /// Rough estimate of resident bytes.
    pub estimated_bytes: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    avg_hit_latency_us: u64,
    warm_runs: u64,
    last_warmed: Option<DateTime<Utc>>,
}

/// Concurrent cache of directory objects indexed by every identifier form.
#[derive(Debug, Default)]
pub struct IdentityCache {
    store: DashMap<u64, Arc<DirectoryEntry>>,
    index: DashMap<String, u64>,
    next_id: AtomicU64,
    counters: Mutex<Counters>,
}

impl IdentityCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, indexing it under every identifier it carries.
    ///
    /// Missing GUID/SID fields are backfilled from the attribute map when a
    /// valid value is present there. Returns the stored record.
    pub fn put(&self, mut entry: DirectoryEntry) -> DirectoryResult<Arc<DirectoryEntry>> {
        if entry.dn.trim().is_empty() {
            return Err(DirectoryError::validation(
                "cannot cache an entry without a distinguished name",
            ));
        }

        if entry.guid.is_none() {
            entry.guid = entry
                .attr_first(ATTR_OBJECT_GUID)
                .filter(|s| is_valid_guid(s))
                .map(str::to_lowercase);
        }
        if entry.sid.is_none() {
            entry.sid = entry
                .attr_first(ATTR_OBJECT_SID)
                .filter(|s| crate::codec::is_valid_sid(s))
                .map(str::to_string);
        }
        entry.updated_at = Utc::now();

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = Arc::new(entry);

        self.index.insert(dn_key(&record.dn), id);
        if let Some(guid) = &record.guid {
            self.index.insert(guid_key(guid), id);
        }
        if let Some(sid) = &record.sid {
            self.index.insert(sid_key(sid), id);
        }
        if let Some(upn) = record.upn() {
            self.index.insert(upn_key(upn), id);
        }
        if let Some(sam) = record.sam_account_name() {
            self.index.insert(sam_key(sam), id);
        }
        self.store.insert(id, record.clone());

        Ok(record)
    }

    /// Look up an entry by any identifier form.
    ///
    /// The identifier is trimmed and matched case-insensitively. Classified
    /// in priority order: GUID, SID, UPN, `DOMAIN\name`, DN, then bare
    /// account name. A `kind:` prefix (`dn:`, `guid:`, `sid:`, `upn:`,
    /// `sam:`) bypasses classification.
    pub fn get(&self, identifier: &str) -> Option<Arc<DirectoryEntry>> {
        let started = Instant::now();
        let key = lookup_key(identifier)?;

        let result = self.index.get(&key).map(|r| *r.value()).and_then(|id| {
            match self.store.get(&id) {
                Some(record) => Some(record.value().clone()),
                None => {
                    // Stale index entry left behind by eviction; heal it.
                    self.index.remove(&key);
                    None
                }
            }
        });

        let mut counters = lock(&self.counters);
        match &result {
            Some(_) => {
                counters.hits += 1;
                let sample = started.elapsed().as_micros() as u64;
                counters.avg_hit_latency_us =
                    fold_latency(counters.avg_hit_latency_us, sample);
            }
            None => counters.misses += 1,
        }
        result
    }

    /// Remove an entry and every index key that points at it. Returns true
    /// when a record was removed.
    pub fn evict(&self, identifier: &str) -> bool {
        let Some(key) = lookup_key(identifier) else {
            return false;
        };
        let Some((_, id)) = self.index.remove(&key) else {
            return false;
        };
        let removed = self.store.remove(&id).is_some();
        self.index.retain(|_, v| *v != id);
        removed
    }

    /// Drop every record and index key. Cumulative hit/miss and warming
    /// counters survive.
    pub fn clear(&self) {
        self.store.clear();
        self.index.clear();
        self.next_id.store(0, Ordering::SeqCst);
    }

    /// Live record count.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Repopulate the cache from the directory.
    ///
    /// Searches the user and group population under `base_dn` (or the
    /// directory's default naming context), clears the cache, and inserts
    /// every convertible entry. Individual bad entries are skipped; the run
    /// fails only when the search fails or no entry at all could be stored.
    ///
    /// The cache is visible to readers while it refills, so lookups during a
    /// warming run may miss records that were present before it started.
    #[instrument(skip(self, client, cancel))]
    pub async fn warm(
        &self,
        client: &DirectoryClient,
        base_dn: Option<&str>,
        cancel: &CancellationToken,
    ) -> DirectoryResult<usize> {
        let base = match base_dn {
            Some(dn) => dn.to_string(),
            None => client.effective_base_dn(cancel).await?,
        };

        let budget = client.config().warm_budget.min(MAX_WARM_BUDGET);
        let search = client
            .search_paged_with_budget(&base, WARM_FILTER, WARM_ATTRIBUTES, budget, cancel)
            .await?;
        if !search.is_complete() {
            warn!(
                outcome = ?search.outcome,
                entries = search.entries.len(),
                "Cache warming search ended early, warming with a partial population"
            );
        }

        self.clear();

        let total = search.entries.len();
        let mut stored = 0usize;
        for raw in &search.entries {
            match DirectoryEntry::from_raw(raw).and_then(|entry| self.put(entry)) {
                Ok(_) => stored += 1,
                Err(e) => {
                    debug!(dn = %raw.dn, error = %e, "Skipping entry during cache warming");
                }
            }
        }

        if stored == 0 && total > 0 {
            return Err(DirectoryError::server(
                "cache_warm",
                format!("all {total} entries failed conversion during warming"),
                false,
            ));
        }

        let mut counters = lock(&self.counters);
        counters.warm_runs += 1;
        counters.last_warmed = Some(Utc::now());
        drop(counters);

        info!(
            stored,
            skipped = total - stored,
            base_dn = %base,
            "Identity cache warmed"
        );
        Ok(stored)
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        let counters = lock(&self.counters);
        let total = counters.hits + counters.misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            counters.hits as f64 / total as f64 * 100.0
        };

        let mut index = IndexCounts::default();
        let mut estimated_bytes = 0usize;
        for record in self.store.iter() {
            let entry = record.value();
            estimated_bytes += RECORD_OVERHEAD_BYTES + entry.dn.len();
            estimated_bytes += entry.guid.as_ref().map_or(0, String::len);
            estimated_bytes += entry.sid.as_ref().map_or(0, String::len);
            for class in &entry.object_classes {
                estimated_bytes += class.len();
            }
            for (name, values) in &entry.attributes {
                estimated_bytes += name.len();
                for value in values {
                    estimated_bytes += value.len();
                }
            }
        }
        for key in self.index.iter() {
            estimated_bytes += key.key().len() + std::mem::size_of::<u64>();
            match key.key().split_once(':').map(|(kind, _)| kind) {
                Some("dn") => index.dn += 1,
                Some("guid") => index.guid += 1,
                Some("sid") => index.sid += 1,
                Some("upn") => index.upn += 1,
                Some("sam") => index.sam += 1,
                _ => {}
            }
        }

        CacheStats {
            entries: self.store.len(),
            index_keys: self.index.len(),
            index,
            hits: counters.hits,
            misses: counters.misses,
            hit_rate,
            avg_hit_latency_us: counters.avg_hit_latency_us,
            warm_runs: counters.warm_runs,
            last_warmed: counters.last_warmed,
            estimated_bytes,
        }
    }
}

fn lock(counters: &Mutex<Counters>) -> std::sync::MutexGuard<'_, Counters> {
    counters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fold a new latency sample into the running average. The first sample
/// seeds the average directly.
fn fold_latency(avg: u64, sample: u64) -> u64 {
    if avg == 0 {
        sample
    } else {
        (avg + sample) / 2
    }
}

fn dn_key(dn: &str) -> String {
    format!("dn:{}", dn.trim().to_lowercase())
}

fn guid_key(guid: &str) -> String {
    format!("guid:{}", guid.trim().to_lowercase())
}

fn sid_key(sid: &str) -> String {
    format!("sid:{}", sid.trim().to_lowercase())
}

fn upn_key(upn: &str) -> String {
    format!("upn:{}", upn.trim().to_lowercase())
}

fn sam_key(sam: &str) -> String {
    format!("sam:{}", sam.trim().to_lowercase())
}

/// Build the index key for an arbitrary identifier. `None` for blank input.
fn lookup_key(identifier: &str) -> Option<String> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return None;
    }

    for prefix in ["dn:", "guid:", "sid:", "upn:", "sam:"] {
        if let Some(rest) = strip_prefix_ignore_case(trimmed, prefix) {
            return Some(format!("{prefix}{}", rest.trim().to_lowercase()));
        }
    }

    if is_valid_guid(trimmed) {
        return Some(guid_key(trimmed));
    }
    let lower = trimmed.to_lowercase();
    if lower.starts_with("s-1-") {
        return Some(sid_key(trimmed));
    }
    if trimmed.contains('@') {
        return Some(upn_key(trimmed));
    }
    if let Some((_, account)) = trimmed.split_once('\\') {
        return Some(sam_key(account));
    }
    if trimmed.contains('=') {
        return Some(dn_key(trimmed));
    }
    Some(sam_key(trimmed))
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}
