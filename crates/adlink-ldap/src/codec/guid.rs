//! objectGUID codec.
//!
//! AD stores a GUID's first three groups little-endian and the remaining
//! eight bytes big-endian. The canonical string form is lower-case
//! hyphenated (`xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`); a 32-hex-digit
//! compact form is also accepted on input. The transform is a bijection:
//! bytes 0-3, 4-5 and 6-7 are byte-reversed, bytes 8-15 are copied.

use adlink_core::error::{DirectoryError, DirectoryResult};

/// Positions of the hyphens in the canonical form.
const HYPHENS: [usize; 4] = [8, 13, 18, 23];

/// Convert a GUID string (hyphenated or compact, case-insensitive) to AD's
/// 16-byte wire layout.
///
/// Fails on wrong length, misplaced hyphens, non-hex digits, and the
/// reserved all-zero GUID.
pub fn guid_to_bytes(guid: &str) -> DirectoryResult<[u8; 16]> {
    let hex = strip_hyphens(guid)?;

    let mut text_order = [0u8; 16];
    for (i, chunk) in text_order.iter_mut().enumerate() {
        let pair = &hex[i * 2..i * 2 + 2];
        *chunk = u8::from_str_radix(pair, 16).map_err(|_| {
            DirectoryError::validation(format!("invalid GUID '{guid}': non-hex digit '{pair}'"))
        })?;
    }

    if text_order.iter().all(|&b| b == 0) {
        return Err(DirectoryError::validation(
            "invalid GUID: the all-zero GUID is reserved",
        ));
    }

    Ok(swap_endian_groups(&text_order))
}

/// Convert AD's 16-byte wire layout back to the canonical lower-case
/// hyphenated string. Exact inverse of [`guid_to_bytes`].
pub fn bytes_to_guid(bytes: &[u8]) -> DirectoryResult<String> {
    let wire: [u8; 16] = bytes.try_into().map_err(|_| {
        DirectoryError::validation(format!(
            "invalid GUID byte layout: expected 16 bytes, got {}",
            bytes.len()
        ))
    })?;

    if wire.iter().all(|&b| b == 0) {
        return Err(DirectoryError::validation(
            "invalid GUID: the all-zero GUID is reserved",
        ));
    }

    // The swap is self-inverse.
    let text_order = swap_endian_groups(&wire);

    let mut out = String::with_capacity(36);
    for b in text_order {
        if HYPHENS.contains(&out.len()) {
            out.push('-');
        }
        out.push_str(&format!("{b:02x}"));
    }
    Ok(out)
}

/// Whether `value` is a well-formed, non-zero GUID in either accepted form.
pub fn is_valid_guid(value: &str) -> bool {
    guid_to_bytes(value).is_ok()
}

/// Encode wire bytes for direct embedding in a search filter, escaping per
/// the protocol's generic value-escaping rule: printable non-special bytes
/// stay literal, everything else becomes a backslash-prefixed hex pair.
pub fn as_filter_value(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for &b in bytes {
        match b {
            // NUL and the RFC 4515 specials must always be escaped.
            0x00 | b'*' | b'(' | b')' | b'\\' => out.push_str(&format!("\\{b:02x}")),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{b:02x}")),
        }
    }
    out
}

/// Encode wire bytes for a search filter with every byte rendered as a
/// backslash-prefixed two-digit hex pair. Some server implementations only
/// accept this form.
pub fn as_filter_value_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for &b in bytes {
        out.push_str(&format!("\\{b:02x}"));
    }
    out
}

/// Reverse the little-endian groups (bytes 0-3, 4-5, 6-7); copy the rest.
fn swap_endian_groups(src: &[u8; 16]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[0..4].copy_from_slice(&src[0..4]);
    out[0..4].reverse();
    out[4..6].copy_from_slice(&src[4..6]);
    out[4..6].reverse();
    out[6..8].copy_from_slice(&src[6..8]);
    out[6..8].reverse();
    out[8..16].copy_from_slice(&src[8..16]);
    out
}

/// Validate shape and return the 32 hex digits without hyphens.
fn strip_hyphens(guid: &str) -> DirectoryResult<String> {
    if !guid.is_ascii() {
        return Err(DirectoryError::validation(format!(
            "invalid GUID '{guid}': non-ASCII input"
        )));
    }
    match guid.len() {
        32 => {
            if guid.contains('-') {
                return Err(DirectoryError::validation(format!(
                    "invalid GUID '{guid}': misplaced hyphen"
                )));
            }
            Ok(guid.to_string())
        }
        36 => {
            for (i, ch) in guid.char_indices() {
                let expect_hyphen = HYPHENS.contains(&i);
                if expect_hyphen != (ch == '-') {
                    return Err(DirectoryError::validation(format!(
                        "invalid GUID '{guid}': misplaced hyphen"
                    )));
                }
            }
            Ok(guid.replace('-', ""))
        }
        n => Err(DirectoryError::validation(format!(
            "invalid GUID '{guid}': expected 32 or 36 characters, got {n}"
        ))),
    }
}
