//! Canonical store keys.
//!
//! Key grammar:
//!
//! ```text
//! {prefix}{event}_{suffix}                      event bitmap
//! {prefix}bitop_{OPERATOR}_{key1}-{key2}-...    derived bitmap
//! ```
//!
//! Components are never reordered: event-name enumeration parses keys
//! positionally.

use crate::types::{BitOperator, Period};

/// Marker that follows the namespace prefix in derived keys.
pub const BITOP_MARKER: &str = "bitop_";

/// Key of an event bitmap for one period.
pub fn event_key(prefix: &str, event_name: &str, period: &Period) -> String {
    format!("{}{}_{}", prefix, event_name, period.suffix())
}

/// Key of the bitmap derived from `operand_keys` with `op`.
///
/// Operand order is preserved, so `AND(a, b)` and `AND(b, a)` get
/// different keys.
pub fn bitop_key<S: AsRef<str>>(prefix: &str, op: BitOperator, operand_keys: &[S]) -> String {
    let joined = operand_keys
        .iter()
        .map(|k| k.as_ref())
        .collect::<Vec<_>>()
        .join("-");
    format!("{}{}{}_{}", prefix, BITOP_MARKER, op.as_str(), joined)
}

/// Scan pattern matching every key under `prefix` whose event name starts
/// with `name_prefix`.
pub fn scan_pattern(prefix: &str, name_prefix: &str) -> String {
    format!("{}{}*", prefix, name_prefix)
}

/// Recover the event name from a stored key.
///
/// The key is split on `_`; everything between the first and the last
/// segment is the name. Derived keys and keys too short to carry a name
/// yield `None`.
pub fn event_name_from_key(key: &str) -> Option<String> {
    let chunks: Vec<&str> = key.split('_').collect();
    if chunks.len() < 3 {
        return None;
    }
    let name = chunks[1..chunks.len() - 1].join("_");
    if name.is_empty() || name.starts_with(BITOP_MARKER) {
        return None;
    }
    Some(name)
}
