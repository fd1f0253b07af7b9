//! Cache record type and conversion from raw search entries.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use adlink_core::error::{DirectoryError, DirectoryResult};
use adlink_core::types::RawEntry;

use crate::codec::{bytes_to_guid, bytes_to_sid, is_valid_guid, is_valid_sid};

/// Attribute carrying the object's GUID.
pub const ATTR_OBJECT_GUID: &str = "objectGUID";
/// Attribute carrying the object's SID.
pub const ATTR_OBJECT_SID: &str = "objectSid";
/// Attribute carrying the principal name.
pub const ATTR_UPN: &str = "userPrincipalName";
/// Attribute carrying the legacy account name.
pub const ATTR_SAM: &str = "sAMAccountName";

/// A directory object as held by the identity cache.
///
/// The attribute payload is immutable once stored: replacing an entry
/// creates a new record rather than mutating in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Distinguished name, case-preserved as received.
    pub dn: String,
    /// objectClass labels.
    pub object_classes: Vec<String>,
    /// Attribute name to string values. Order is irrelevant.
    pub attributes: HashMap<String, Vec<String>>,
    /// Canonical hyphenated GUID, when known.
    pub guid: Option<String>,
    /// Canonical SID string, when known.
    pub sid: Option<String>,
    /// Stamped by the cache on insertion.
    pub updated_at: DateTime<Utc>,
}

impl DirectoryEntry {
    /// Create an entry with the given DN and no attributes.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            object_classes: Vec::new(),
            attributes: HashMap::new(),
            guid: None,
            sid: None,
            updated_at: Utc::now(),
        }
    }

    /// Convert a raw search result into a cache record.
    ///
    /// objectGUID and objectSid arrive as binary values from AD but as
    /// pre-decoded strings from some intermediaries; both are tolerated.
    /// The `distinguishedName` attribute is the authoritative spelling; the
    /// envelope DN is only a fallback. Fails when neither is present.
    pub fn from_raw(raw: &RawEntry) -> DirectoryResult<Self> {
        let dn = raw
            .attr_first("distinguishedName")
            .map(str::to_string)
            .or_else(|| (!raw.dn.is_empty()).then(|| raw.dn.clone()))
            .ok_or_else(|| {
                DirectoryError::validation("raw entry has no distinguished name")
            })?;

        let guid = raw
            .bin_first(ATTR_OBJECT_GUID)
            .and_then(|b| bytes_to_guid(b).ok())
            .or_else(|| {
                raw.attr_first(ATTR_OBJECT_GUID)
                    .filter(|s| is_valid_guid(s))
                    .map(|s| s.to_lowercase())
            });

        let sid = raw
            .bin_first(ATTR_OBJECT_SID)
            .and_then(|b| bytes_to_sid(b).ok())
            .or_else(|| {
                raw.attr_first(ATTR_OBJECT_SID)
                    .filter(|s| is_valid_sid(s))
                    .map(str::to_string)
            });

        let object_classes = raw
            .attr_all("objectClass")
            .cloned()
            .unwrap_or_default();

        Ok(Self {
            dn,
            object_classes,
            attributes: raw.attrs.clone(),
            guid,
            sid,
            updated_at: Utc::now(),
        })
    }

    /// First value of `name`, matched case-insensitively.
    pub fn attr_first(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.first())
            .map(String::as_str)
    }

    /// The entry's principal name, when present.
    pub fn upn(&self) -> Option<&str> {
        self.attr_first(ATTR_UPN)
    }

    /// The entry's legacy account name, when present.
    pub fn sam_account_name(&self) -> Option<&str> {
        self.attr_first(ATTR_SAM)
    }
}
