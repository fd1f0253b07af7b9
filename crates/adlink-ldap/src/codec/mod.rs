//! Binary identity codecs for Active Directory's non-standard encodings.
//!
//! AD stores objectGUID in a mixed-endian 16-byte layout and objectSid in
//! the Windows SID binary layout. Both codecs here are pure functions and
//! exact bijections over valid inputs.

pub mod guid;
pub mod sid;

pub use guid::{as_filter_value, as_filter_value_hex, bytes_to_guid, guid_to_bytes, is_valid_guid};
pub use sid::{bytes_to_sid, is_valid_sid, sid_to_bytes};
