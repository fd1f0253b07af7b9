//! Adapters between `ldap3` wire types and the wire-neutral core types.
//!
//! Pool implementations talk to `ldap3` directly; everything above the pool
//! boundary sees only [`RawEntry`], [`Scope`], and [`DirectoryError`].
//! These are free functions because both sides of each conversion live in
//! other crates.

use adlink_core::error::{classify_message, DirectoryError};
use adlink_core::types::{RawEntry, Scope};

/// Convert an `ldap3` search entry into a wire-neutral raw entry.
pub fn raw_entry_from_search(entry: ldap3::SearchEntry) -> RawEntry {
    RawEntry {
        dn: entry.dn,
        attrs: entry.attrs,
        bin_attrs: entry.bin_attrs,
    }
}

/// Map a wire-neutral scope onto the `ldap3` scope.
pub fn ldap_scope(scope: Scope) -> ldap3::Scope {
    match scope {
        Scope::Base => ldap3::Scope::Base,
        Scope::OneLevel => ldap3::Scope::OneLevel,
        Scope::Subtree => ldap3::Scope::Subtree,
    }
}

/// Classify an `ldap3` error into the directory error taxonomy.
///
/// Server result codes go through the result-code table; transport errors
/// become retryable connection failures; anything else is classified from
/// its message text.
pub fn error_from_ldap(err: ldap3::LdapError) -> DirectoryError {
    match err {
        ldap3::LdapError::LdapResult { result } => {
            DirectoryError::from_result_code("", result.rc, result.text.clone())
                .with_source(ldap3::LdapError::LdapResult { result })
        }
        ldap3::LdapError::Io { .. }
        | ldap3::LdapError::Timeout { .. }
        | ldap3::LdapError::EndOfStream => {
            DirectoryError::connection_failed("", err.to_string()).with_source(err)
        }
        other => {
            let message = other.to_string();
            let (category, retryable) = classify_message(&message);
            DirectoryError::new(category, "", message, retryable).with_source(other)
        }
    }
}
