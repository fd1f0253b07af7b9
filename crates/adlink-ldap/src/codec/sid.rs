//! objectSid codec.
//!
//! Windows SID binary layout: 1 byte revision, 1 byte sub-authority count,
//! a 6-byte big-endian issuing authority, then `count` little-endian 4-byte
//! sub-authority values. Canonical string form is
//! `S-<revision>-<authority>-<sub1>-<sub2>-...`.

use adlink_core::error::{DirectoryError, DirectoryResult};

/// Windows caps a SID at 15 sub-authorities.
const MAX_SUB_AUTHORITIES: usize = 15;

/// Issuing authorities are 48-bit values.
const MAX_AUTHORITY: u64 = (1 << 48) - 1;

/// Convert a canonical SID string to its binary layout.
pub fn sid_to_bytes(sid: &str) -> DirectoryResult<Vec<u8>> {
    let mut parts = sid.split('-');

    match parts.next() {
        Some(p) if p.eq_ignore_ascii_case("S") => {}
        _ => {
            return Err(DirectoryError::validation(format!(
                "invalid SID '{sid}': must start with 'S-'"
            )))
        }
    }

    let revision: u8 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| DirectoryError::validation(format!("invalid SID '{sid}': bad revision")))?;

    let authority: u64 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(|| {
        DirectoryError::validation(format!("invalid SID '{sid}': bad issuing authority"))
    })?;
    if authority > MAX_AUTHORITY {
        return Err(DirectoryError::validation(format!(
            "invalid SID '{sid}': issuing authority exceeds 48 bits"
        )));
    }

    let mut sub_authorities: Vec<u32> = Vec::new();
    for part in parts {
        let sub: u32 = part.parse().map_err(|_| {
            DirectoryError::validation(format!(
                "invalid SID '{sid}': bad sub-authority '{part}'"
            ))
        })?;
        sub_authorities.push(sub);
    }
    if sub_authorities.len() > MAX_SUB_AUTHORITIES {
        return Err(DirectoryError::validation(format!(
            "invalid SID '{sid}': {} sub-authorities exceeds the maximum of {MAX_SUB_AUTHORITIES}",
            sub_authorities.len()
        )));
    }

    let mut bytes = Vec::with_capacity(8 + 4 * sub_authorities.len());
    bytes.push(revision);
    bytes.push(sub_authorities.len() as u8);
    bytes.extend_from_slice(&authority.to_be_bytes()[2..8]);
    for sub in &sub_authorities {
        bytes.extend_from_slice(&sub.to_le_bytes());
    }
    Ok(bytes)
}

/// Convert a binary SID to its canonical string form.
///
/// Rejects buffers whose length disagrees with the declared sub-authority
/// count.
pub fn bytes_to_sid(bytes: &[u8]) -> DirectoryResult<String> {
    if bytes.len() < 8 {
        return Err(DirectoryError::validation(format!(
            "invalid SID byte layout: expected at least 8 bytes, got {}",
            bytes.len()
        )));
    }

    let revision = bytes[0];
    let count = bytes[1] as usize;
    if count > MAX_SUB_AUTHORITIES {
        return Err(DirectoryError::validation(format!(
            "invalid SID byte layout: {count} sub-authorities exceeds the maximum of {MAX_SUB_AUTHORITIES}"
        )));
    }

    let expected = 8 + 4 * count;
    if bytes.len() != expected {
        return Err(DirectoryError::validation(format!(
            "invalid SID byte layout: declared {count} sub-authorities requires {expected} bytes, got {}",
            bytes.len()
        )));
    }

    let mut authority_bytes = [0u8; 8];
    authority_bytes[2..8].copy_from_slice(&bytes[2..8]);
    let authority = u64::from_be_bytes(authority_bytes);

    let mut out = format!("S-{revision}-{authority}");
    for i in 0..count {
        let offset = 8 + 4 * i;
        let sub = u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]);
        out.push_str(&format!("-{sub}"));
    }
    Ok(out)
}

/// Whether `value` parses as a well-formed SID string.
pub fn is_valid_sid(value: &str) -> bool {
    sid_to_bytes(value).is_ok()
}
