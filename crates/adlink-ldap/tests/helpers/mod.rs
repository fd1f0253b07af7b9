//! In-memory directory fixture backing the integration tests.
//!
//! Implements the pool contracts over a fixed set of entries, answering the
//! handful of filter shapes the client actually emits: the rootDSE probe,
//! base-object probes, single-equality lookups (including hex-escaped
//! binary values), and the user/group population filter used by cache
//! warming. Errors can be queued to exercise the retry path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use adlink_core::error::{DirectoryError, DirectoryResult};
use adlink_core::pool::{ConnectionPool, PoolStats, PooledConnection};
use adlink_core::types::{AttributeChange, RawEntry, Scope, SearchPage, SearchRequest};

#[derive(Default)]
struct State {
    entries: Vec<RawEntry>,
    naming_context: String,
    /// Errors served (oldest first) before any real answer.
    fault_queue: VecDeque<DirectoryError>,
    /// When set, every page comes back with a continuation cookie.
    endless_pages: bool,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    searches: AtomicU32,
}

/// A fake directory acting as its own single-connection pool.
#[derive(Default)]
pub struct FakeDirectory {
    inner: Arc<Inner>,
}

impl FakeDirectory {
    pub fn new(naming_context: &str) -> Arc<Self> {
        let directory = Self::default();
        directory.lock().naming_context = naming_context.to_string();
        Arc::new(directory)
    }

    pub fn add_entry(&self, entry: RawEntry) {
        self.lock().entries.push(entry);
    }

    pub fn queue_error(&self, error: DirectoryError) {
        self.lock().fault_queue.push_back(error);
    }

    pub fn set_endless_pages(&self, endless: bool) {
        self.lock().endless_pages = endless;
    }

    /// Number of search pages served so far.
    pub fn search_count(&self) -> u32 {
        self.inner.searches.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.state.lock().unwrap()
    }
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn serve_page(
        &self,
        request: &SearchRequest,
        cookie: Option<&[u8]>,
    ) -> DirectoryResult<SearchPage> {
        self.searches.fetch_add(1, Ordering::SeqCst);

        let mut state = self.lock();
        if let Some(error) = state.fault_queue.pop_front() {
            return Err(error);
        }

        if state.endless_pages {
            return Ok(SearchPage {
                entries: vec![RawEntry::new(format!(
                    "CN=page-filler,{}",
                    state.naming_context
                ))],
                cookie: Some(b"more".to_vec()),
            });
        }

        // rootDSE probe.
        if request.base_dn.is_empty() && matches!(request.scope, Scope::Base) {
            let mut root = RawEntry::new("");
            root.attrs.insert(
                "defaultNamingContext".to_string(),
                vec![state.naming_context.clone()],
            );
            return Ok(SearchPage {
                entries: vec![root],
                cookie: None,
            });
        }

        let mut matched: Vec<RawEntry> = state
            .entries
            .iter()
            .filter(|e| in_scope(e, request))
            .filter(|e| filter_matches(e, &request.filter))
            .cloned()
            .collect();

        if request.size_limit > 0 {
            matched.truncate(request.size_limit as usize);
        }

        // Paged retrieval: the cookie is a plain offset.
        let offset = cookie
            .and_then(|c| std::str::from_utf8(c).ok())
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);
        let page_size = request.page_size.max(1) as usize;
        let end = (offset + page_size).min(matched.len());
        let page: Vec<RawEntry> = matched[offset.min(matched.len())..end].to_vec();
        let next = if end < matched.len() {
            Some(end.to_string().into_bytes())
        } else {
            None
        };

        Ok(SearchPage {
            entries: page,
            cookie: next,
        })
    }
}

fn in_scope(entry: &RawEntry, request: &SearchRequest) -> bool {
    match request.scope {
        Scope::Base => entry.dn.eq_ignore_ascii_case(&request.base_dn),
        // A malformed record without a DN is still returned by the server.
        Scope::OneLevel | Scope::Subtree => {
            entry.dn.is_empty()
                || entry
                    .dn
                    .to_lowercase()
                    .ends_with(&request.base_dn.to_lowercase())
        }
    }
}

/// Answer the filter shapes the client emits. Anything else matches nothing.
fn filter_matches(entry: &RawEntry, filter: &str) -> bool {
    if filter == "(objectClass=*)" {
        return true;
    }
    // The warming population filter: users and groups.
    if filter.starts_with("(|") {
        return entry
            .attr_all("objectClass")
            .map(|classes| {
                classes
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case("user") || c.eq_ignore_ascii_case("group"))
            })
            .unwrap_or(false);
    }
    // Single equality: (attr=value).
    let Some(inner) = filter.strip_prefix('(').and_then(|f| f.strip_suffix(')')) else {
        return false;
    };
    let Some((attr, value)) = inner.split_once('=') else {
        return false;
    };
    if let Some(bytes) = decode_hex_escapes(value) {
        return entry.bin_first(attr) == Some(bytes.as_slice());
    }
    // AD matches a string-form SID against the binary attribute.
    if attr.eq_ignore_ascii_case("objectSid") {
        if let Some(sid) = entry
            .bin_first(attr)
            .and_then(|b| adlink_ldap::codec::bytes_to_sid(b).ok())
        {
            return sid.eq_ignore_ascii_case(value);
        }
    }
    entry
        .attr_first(attr)
        .map(|v| v.eq_ignore_ascii_case(value))
        .unwrap_or(false)
}

/// Decode an all-hex-escaped filter value (`\xx\xx...`) to raw bytes.
fn decode_hex_escapes(value: &str) -> Option<Vec<u8>> {
    if !value.starts_with('\\') {
        return None;
    }
    let mut bytes = Vec::new();
    for piece in value.split('\\').skip(1) {
        if piece.len() != 2 {
            return None;
        }
        bytes.push(u8::from_str_radix(piece, 16).ok()?);
    }
    Some(bytes)
}

struct FakeConnection {
    inner: Arc<Inner>,
}

#[async_trait]
impl PooledConnection for FakeConnection {
    async fn search_page(
        &mut self,
        request: &SearchRequest,
        cookie: Option<&[u8]>,
    ) -> DirectoryResult<SearchPage> {
        self.inner.serve_page(request, cookie)
    }

    async fn add(&mut self, dn: &str, attributes: &[(String, Vec<String>)]) -> DirectoryResult<()> {
        let mut entry = RawEntry::new(dn);
        for (name, values) in attributes {
            entry.attrs.insert(name.clone(), values.clone());
        }
        self.inner.lock().entries.push(entry);
        Ok(())
    }

    async fn modify(&mut self, dn: &str, changes: &[AttributeChange]) -> DirectoryResult<()> {
        let mut state = self.inner.lock();
        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.dn.eq_ignore_ascii_case(dn))
            .ok_or_else(|| DirectoryError::not_found("modify", dn))?;
        for change in changes {
            match change {
                AttributeChange::Add { attribute, values }
                | AttributeChange::Replace { attribute, values } => {
                    entry.attrs.insert(attribute.clone(), values.clone());
                }
                AttributeChange::Delete { attribute, .. } => {
                    entry.attrs.remove(attribute);
                }
            }
        }
        Ok(())
    }

    async fn delete(&mut self, dn: &str) -> DirectoryResult<()> {
        let mut state = self.inner.lock();
        let before = state.entries.len();
        state.entries.retain(|e| !e.dn.eq_ignore_ascii_case(dn));
        if state.entries.len() == before {
            return Err(DirectoryError::not_found("delete", dn));
        }
        Ok(())
    }

    async fn rename(
        &mut self,
        dn: &str,
        new_rdn: &str,
        new_parent: Option<&str>,
    ) -> DirectoryResult<()> {
        let mut state = self.inner.lock();
        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.dn.eq_ignore_ascii_case(dn))
            .ok_or_else(|| DirectoryError::not_found("rename", dn))?;
        let parent = match new_parent {
            Some(p) => p.to_string(),
            None => dn
                .split_once(',')
                .map(|(_, p)| p.to_string())
                .unwrap_or_default(),
        };
        entry.dn = format!("{new_rdn},{parent}");
        Ok(())
    }

    async fn whoami(&mut self) -> DirectoryResult<String> {
        Ok("u:EXAMPLE\\svc-adlink".to_string())
    }

    async fn release(self: Box<Self>) {}
}

#[async_trait]
impl ConnectionPool for FakeDirectory {
    async fn acquire(
        &self,
        cancel: &CancellationToken,
    ) -> DirectoryResult<Box<dyn PooledConnection>> {
        if cancel.is_cancelled() {
            return Err(DirectoryError::cancelled("acquire"));
        }
        Ok(Box::new(FakeConnection {
            inner: self.inner.clone(),
        }))
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            total: 1,
            active: 0,
            idle: 1,
            unhealthy: 0,
            created: 1,
            errors: 0,
            uptime: std::time::Duration::ZERO,
        }
    }
}

/// A user entry carrying all five identifier forms.
pub fn user_entry(cn: &str, guid: &str, sid: &str, upn: &str, sam: &str, base: &str) -> RawEntry {
    let mut entry = RawEntry::new(format!("CN={cn},OU=Users,{base}"));
    entry.attrs.insert(
        "objectClass".to_string(),
        vec!["top".to_string(), "person".to_string(), "user".to_string()],
    );
    entry.bin_attrs.insert(
        "objectGUID".to_string(),
        vec![adlink_ldap::codec::guid_to_bytes(guid).unwrap().to_vec()],
    );
    entry.bin_attrs.insert(
        "objectSid".to_string(),
        vec![adlink_ldap::codec::sid_to_bytes(sid).unwrap()],
    );
    entry
        .attrs
        .insert("userPrincipalName".to_string(), vec![upn.to_string()]);
    entry
        .attrs
        .insert("sAMAccountName".to_string(), vec![sam.to_string()]);
    entry.attrs.insert(
        "distinguishedName".to_string(),
        vec![format!("CN={cn},OU=Users,{base}")],
    );
    entry
}
