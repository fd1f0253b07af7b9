//! Resilient Active Directory client layer.
//!
//! Builds on `adlink-core`'s wire-neutral contracts with everything AD
//! specific: the mixed-endian objectGUID and objectSid binary codecs, a
//! retrying paginated [`DirectoryClient`], a concurrent multi-key
//! [`IdentityCache`], and the identifier [`Normalizer`] that turns any of
//! the five identifier forms a caller might hold (DN, GUID, SID, UPN,
//! `DOMAIN\account`) into one canonical distinguished name.
//!
//! Connection management stays behind the [`adlink_core::pool`] traits; the
//! [`ldap`] module provides the conversions a pool implementation built on
//! `ldap3` needs at that seam.

pub mod cache;
pub mod client;
pub mod codec;
pub mod config;
pub mod dn;
pub mod entry;
pub mod ldap;
pub mod normalize;

pub use cache::{CacheStats, IdentityCache, IndexCounts};
pub use client::{DirectoryClient, PagedSearch, SearchOutcome, SinglePage};
pub use config::ClientConfig;
pub use entry::DirectoryEntry;
pub use normalize::{classify, IdentifierKind, Normalizer};
