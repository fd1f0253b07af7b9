//! Wire-neutral search and modify types.
//!
//! These types cross the seam between the retry/search engine and the
//! pooled-connection collaborator without committing either side to a
//! particular protocol library.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Search scope relative to the base DN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    /// The base object only.
    Base,
    /// Immediate children of the base object.
    OneLevel,
    /// The base object and its entire subtree.
    Subtree,
}

/// A directory entry as returned by the server, before any interpretation.
///
/// String-valued and binary-valued attributes are kept apart, mirroring how
/// the protocol library surfaces them. Attribute names are matched
/// case-insensitively per RFC 4512.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEntry {
    /// Distinguished name, case-preserved as received.
    pub dn: String,
    /// String-valued attributes.
    pub attrs: HashMap<String, Vec<String>>,
    /// Binary-valued attributes (objectGUID, objectSid, ...).
    pub bin_attrs: HashMap<String, Vec<Vec<u8>>>,
}

impl RawEntry {
    /// Create an entry with the given DN and no attributes.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            ..Self::default()
        }
    }

    /// First string value of `name`, matched case-insensitively.
    pub fn attr_first(&self, name: &str) -> Option<&str> {
        self.attr_all(name).and_then(|v| v.first()).map(String::as_str)
    }

    /// All string values of `name`, matched case-insensitively.
    pub fn attr_all(&self, name: &str) -> Option<&Vec<String>> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// First binary value of `name`, matched case-insensitively.
    pub fn bin_first(&self, name: &str) -> Option<&[u8]> {
        self.bin_attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.first())
            .map(Vec::as_slice)
    }
}

/// Parameters for one search request against a pooled connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Base distinguished name.
    pub base_dn: String,
    /// Search scope.
    pub scope: Scope,
    /// RFC 4515 filter string.
    pub filter: String,
    /// Attributes to return; empty means all user attributes.
    pub attributes: Vec<String>,
    /// Server-side result size limit; 0 means no client-imposed limit.
    pub size_limit: u32,
    /// Per-request time limit handed to the server.
    pub time_limit: Duration,
    /// Page size when the request participates in paged retrieval.
    pub page_size: u32,
}

impl SearchRequest {
    /// Create a request with adlink's defaults (no size limit, 120s time
    /// limit, 1000-entry pages).
    pub fn new(base_dn: impl Into<String>, scope: Scope, filter: impl Into<String>) -> Self {
        Self {
            base_dn: base_dn.into(),
            scope,
            filter: filter.into(),
            attributes: Vec::new(),
            size_limit: 0,
            time_limit: Duration::from_secs(120),
            page_size: 1000,
        }
    }

    /// Restrict the attributes returned.
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Apply a result size limit.
    pub fn with_size_limit(mut self, limit: u32) -> Self {
        self.size_limit = limit;
        self
    }

    /// Override the page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }
}

/// One page of search results plus the server's continuation cursor.
///
/// An absent cookie means the result set is complete.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Entries in this page.
    pub entries: Vec<RawEntry>,
    /// Opaque continuation cursor, present while more pages remain.
    pub cookie: Option<Vec<u8>>,
}

/// A single attribute modification within a modify operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeChange {
    /// Add values to an attribute.
    Add {
        attribute: String,
        values: Vec<String>,
    },
    /// Replace all values of an attribute.
    Replace {
        attribute: String,
        values: Vec<String>,
    },
    /// Delete specific values, or the whole attribute when empty.
    Delete {
        attribute: String,
        values: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_lookup_is_case_insensitive() {
        let mut entry = RawEntry::new("CN=Test,DC=example,DC=com");
        entry.attrs.insert(
            "sAMAccountName".to_string(),
            vec!["jdoe".to_string()],
        );

        assert_eq!(entry.attr_first("samaccountname"), Some("jdoe"));
        assert_eq!(entry.attr_first("SAMACCOUNTNAME"), Some("jdoe"));
        assert_eq!(entry.attr_first("mail"), None);
    }

    #[test]
    fn test_bin_lookup_is_case_insensitive() {
        let mut entry = RawEntry::new("CN=Test,DC=example,DC=com");
        entry
            .bin_attrs
            .insert("objectGUID".to_string(), vec![vec![1, 2, 3]]);

        assert_eq!(entry.bin_first("objectguid"), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_search_request_builder() {
        let req = SearchRequest::new("DC=example,DC=com", Scope::Subtree, "(objectClass=user)")
            .with_attributes(["cn", "mail"])
            .with_size_limit(50);

        assert_eq!(req.attributes, vec!["cn", "mail"]);
        assert_eq!(req.size_limit, 50);
        assert_eq!(req.page_size, 1000);
    }
}
