//! Distinguished-name utilities.
//!
//! A DN parser that respects RFC 4514 escaping, canonical casing of
//! attribute-type descriptors, parent/ancestor helpers, and the filter and
//! DN value escaping primitives used when building searches.
//!
//! Canonicalization upper-cases only the attribute types (`cn=` becomes
//! `CN=`); attribute values keep their escaping byte-for-byte. Two
//! spellings of the same DN therefore canonicalize to one identical string.

use adlink_core::error::{DirectoryError, DirectoryResult};

/// One attribute/value assertion inside a relative distinguished name.
///
/// The value is kept verbatim, escapes included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ava {
    /// Attribute type descriptor (e.g. `CN`, `dc`).
    pub attribute: String,
    /// Raw attribute value as it appeared in the DN.
    pub value: String,
}

/// A relative distinguished name: one or more AVAs joined by `+`.
pub type Rdn = Vec<Ava>;

/// Parse a DN into its relative-name components, respecting escaped
/// separators. Fails with a validation error on malformed input.
pub fn parse_dn(dn: &str) -> DirectoryResult<Vec<Rdn>> {
    if dn.trim().is_empty() {
        return Err(DirectoryError::validation("empty distinguished name"));
    }

    let mut rdns = Vec::new();
    for rdn_text in split_unescaped(dn, ',') {
        let mut avas = Vec::new();
        for ava_text in split_unescaped(&rdn_text, '+') {
            avas.push(parse_ava(&ava_text, dn)?);
        }
        rdns.push(avas);
    }
    Ok(rdns)
}

/// Canonicalize a DN: attribute types upper-cased, values untouched, RDNs
/// rejoined with `,` and multi-valued AVAs with `+`.
pub fn canonicalize_dn(dn: &str) -> DirectoryResult<String> {
    let rdns = parse_dn(dn)?;
    let parts: Vec<String> = rdns
        .iter()
        .map(|avas| {
            avas.iter()
                .map(|ava| format!("{}={}", ava.attribute.to_uppercase(), ava.value))
                .collect::<Vec<_>>()
                .join("+")
        })
        .collect();
    Ok(parts.join(","))
}

/// Drop the first relative name. Returns `None` for a single-RDN DN.
pub fn parent_dn(dn: &str) -> DirectoryResult<Option<String>> {
    let rdns = parse_dn(dn)?;
    if rdns.len() <= 1 {
        return Ok(None);
    }
    let parts: Vec<String> = rdns[1..]
        .iter()
        .map(|avas| {
            avas.iter()
                .map(|ava| format!("{}={}", ava.attribute, ava.value))
                .collect::<Vec<_>>()
                .join("+")
        })
        .collect();
    Ok(Some(parts.join(",")))
}

/// Whether `descendant` sits strictly below `ancestor`, comparing
/// relative-name sequences case-insensitively. Malformed input is never an
/// ancestor relationship.
pub fn is_ancestor_of(ancestor: &str, descendant: &str) -> bool {
    let (Ok(anc), Ok(desc)) = (parse_dn(ancestor), parse_dn(descendant)) else {
        return false;
    };
    if desc.len() <= anc.len() {
        return false;
    }
    let offset = desc.len() - anc.len();
    anc.iter()
        .zip(&desc[offset..])
        .all(|(a, d)| rdn_eq_ignore_case(a, d))
}

/// First value of `attribute` anywhere in the DN, unescaped. `None` when the
/// attribute does not appear.
pub fn first_attribute_value(dn: &str, attribute: &str) -> DirectoryResult<Option<String>> {
    let rdns = parse_dn(dn)?;
    for avas in &rdns {
        for ava in avas {
            if ava.attribute.eq_ignore_ascii_case(attribute) {
                return Ok(Some(unescape_value(&ava.value)));
            }
        }
    }
    Ok(None)
}

/// Escape special characters in search filter values (RFC 4515).
pub fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

/// Escape special characters in DN attribute values (RFC 4514).
///
/// `,` `+` `"` `\` `<` `>` `;` `=` always need a backslash; a space needs
/// one at the start or end; `#` needs one at the start; NUL is hex-escaped.
pub fn escape_dn_value(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }

    let char_count = value.chars().count();
    let mut out = String::with_capacity(value.len() * 2);

    for (i, ch) in value.chars().enumerate() {
        let is_first = i == 0;
        let is_last = i == char_count - 1;

        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                out.push('\\');
                out.push(ch);
            }
            '\0' => out.push_str("\\00"),
            ' ' if is_first || is_last => out.push_str("\\20"),
            '#' if is_first => out.push_str("\\23"),
            _ => out.push(ch),
        }
    }

    out
}

fn rdn_eq_ignore_case(a: &Rdn, b: &Rdn) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.attribute.eq_ignore_ascii_case(&y.attribute)
                && x.value.eq_ignore_ascii_case(&y.value)
        })
}

/// Split on `sep`, honoring backslash escapes. Escape sequences survive
/// verbatim in the pieces.
fn split_unescaped(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
        } else if ch == '\\' {
            current.push(ch);
            escaped = true;
        } else if ch == sep {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    parts.push(current);
    parts
}

/// Split one AVA at the first unescaped `=`.
fn parse_ava(text: &str, whole_dn: &str) -> DirectoryResult<Ava> {
    let mut escaped = false;
    for (i, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
            continue;
        }
        if ch == '=' {
            let attribute = text[..i].trim().to_string();
            // Leading whitespace after the separator is insignificant;
            // a significant leading space would be escaped.
            let value = text[i + 1..].trim_start().to_string();
            if attribute.is_empty()
                || !attribute
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
            {
                return Err(DirectoryError::validation(format!(
                    "malformed DN '{whole_dn}': bad attribute type '{attribute}'"
                )));
            }
            return Ok(Ava { attribute, value });
        }
    }
    Err(DirectoryError::validation(format!(
        "malformed DN '{whole_dn}': component '{text}' has no '='"
    )))
}

/// Resolve RFC 4514 escapes in an attribute value.
fn unescape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some(h1) if h1.is_ascii_hexdigit() => {
                // Possible \xx hex escape.
                if let Some(&h2) = chars.peek() {
                    if h2.is_ascii_hexdigit() {
                        chars.next();
                        let byte =
                            u8::from_str_radix(&format!("{h1}{h2}"), 16).unwrap_or(b'?');
                        out.push(byte as char);
                        continue;
                    }
                }
                out.push(h1);
            }
            Some(c) => out.push(c),
            None => out.push('\\'),
        }
    }
    out
}
