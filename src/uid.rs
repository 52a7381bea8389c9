//! Stable device identifiers.
//!
//! A UID is `bustype:vendor:product:version:hash(name)` rendered as four
//! 4-digit and one 16-digit lowercase hex field: 36 characters, four
//! colons. Real devices and the virtual keyboard use the same derivation,
//! so the blacklist can match either.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Renders the UID for a device identity.
pub fn device_uid(bustype: u16, vendor: u16, product: u16, version: u16, name: &str) -> String {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    format!(
        "{:04x}:{:04x}:{:04x}:{:04x}:{:016x}",
        bustype,
        vendor,
        product,
        version,
        hasher.finish()
    )
}

/// Whether a string is a well-formed UID: exactly 36 characters with
/// exactly four colons. Used when filtering user-supplied blacklist
/// entries.
pub fn is_valid_uid(uid: &str) -> bool {
    uid.len() == 36 && uid.chars().filter(|&c| c == ':').count() == 4
}
