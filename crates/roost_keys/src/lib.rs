//! # Roost Keys
//!
//! Order-preserving key encoding for the Roost document store.
//!
//! Every key produced by this crate has the property that byte-wise
//! lexicographic comparison equals logical comparison:
//!
//! - unsigned integers are fixed-width zero-padded decimals, so numeric
//!   order equals string order and encoded IDs sort naturally;
//! - booleans encode as `"0"` / `"1"`, so `false` partitions sort before
//!   `true` ones;
//! - timestamps encode as UTC, truncated to one-second resolution, in a
//!   fixed-width format, so byte comparison equals chronological
//!   comparison.
//!
//! Composite keys are built with [`KeyBuilder`], which joins typed
//! components with a separator. Prefix scans are exact because every
//! non-terminal component is fixed-width (IDs, flags, timestamps), so
//! the separator sits at the same offset in every key of an index, and
//! the sentinel [`key_max`] appends sorts after the separator, giving an
//! exclusive upper bound that brackets every extension of the prefix:
//!
//! ```rust
//! use roost_keys::{KeyBuilder, key_min_max};
//!
//! let key = KeyBuilder::new().str("0000000007").uint(42).build();
//! assert_eq!(key, "0000000007|0000000042");
//!
//! let (min, max) = key_min_max("0000000007");
//! assert!(min < key.clone().into_bytes());
//! assert!(key.into_bytes() < max);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};

/// Separator between composite key components.
///
/// Non-terminal components are always fixed-width, so the separator
/// sits at the same offset in every key of an index and its own sort
/// position between components never matters.
pub const SEP: char = '|';

/// Sentinel appended by [`key_max`].
///
/// Sorts after [`SEP`], so `prefix < prefix|rest < prefix~` holds and
/// `[prefix, prefix~)` brackets every extension of the prefix.
pub const MAX: char = '~';

/// Fixed-width UTC timestamp format, second resolution.
const TIME_FORMAT: &str = "%Y%m%d%H%M%SZ";

/// Encodes an unsigned integer as a ten-digit zero-padded decimal.
///
/// Numeric order equals lexicographic order for all values up to ten
/// decimal digits, which covers every sequence-assigned ID the store can
/// hand out.
#[must_use]
pub fn encode_uint(n: u64) -> String {
    format!("{n:010}")
}

/// Encodes a boolean as a single character, `false` sorting first.
#[must_use]
pub fn encode_bool(b: bool) -> String {
    if b { "1".to_owned() } else { "0".to_owned() }
}

/// Encodes a timestamp as a fixed-width, second-truncated UTC string.
///
/// Truncation keeps index keys and query bounds aligned even though
/// in-record timestamps may carry sub-second precision.
#[must_use]
pub fn encode_time(t: DateTime<Utc>) -> String {
    truncate(t).format(TIME_FORMAT).to_string()
}

/// Truncates a timestamp to whole-second resolution.
#[must_use]
pub fn truncate(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(t.timestamp(), 0).unwrap_or(t)
}

/// Returns the exclusive upper bound for a scan over keys starting with
/// `prefix`.
///
/// The sentinel sorts after any valid key character, so all scan loops
/// stay uniform: seek to the minimum and iterate while `key < max`.
#[must_use]
pub fn key_max(prefix: &str) -> Vec<u8> {
    let mut bound = prefix.as_bytes().to_vec();
    bound.push(MAX as u8);
    bound
}

/// Returns the `(min, max)` bounds for a prefix scan.
///
/// `min` is inclusive, `max` exclusive.
#[must_use]
pub fn key_min_max(prefix: &str) -> (Vec<u8>, Vec<u8>) {
    (prefix.as_bytes().to_vec(), key_max(prefix))
}

/// Strips the separator and sentinel characters from a string component.
///
/// A literal separator inside a username or URL would shift every
/// following component of a composite key; stripping preserves both
/// ordering and exact-match semantics for all remaining inputs.
fn sanitize(s: &str) -> String {
    s.chars().filter(|c| *c != SEP && *c != MAX).collect()
}

/// Builder for composite keys from typed components.
///
/// Components are appended left to right and joined with [`SEP`], so the
/// resulting byte string sorts by the component tuple.
#[derive(Debug, Default, Clone)]
pub struct KeyBuilder {
    parts: Vec<String>,
}

impl KeyBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a string component, sanitized of key metacharacters.
    #[must_use]
    pub fn str(mut self, s: &str) -> Self {
        self.parts.push(sanitize(s));
        self
    }

    /// Appends a lowercased string component, for case-insensitive
    /// indexes.
    #[must_use]
    pub fn str_lower(self, s: &str) -> Self {
        self.str(&s.to_lowercase())
    }

    /// Appends a fixed-width unsigned integer component.
    #[must_use]
    pub fn uint(mut self, n: u64) -> Self {
        self.parts.push(encode_uint(n));
        self
    }

    /// Appends a boolean component.
    #[must_use]
    pub fn boolean(mut self, b: bool) -> Self {
        self.parts.push(encode_bool(b));
        self
    }

    /// Appends a second-truncated UTC timestamp component.
    #[must_use]
    pub fn time(mut self, t: DateTime<Utc>) -> Self {
        self.parts.push(encode_time(t));
        self
    }

    /// Joins the components into the final key string.
    #[must_use]
    pub fn build(self) -> String {
        self.parts.join(&SEP.to_string())
    }

    /// Builds the key and returns `(min, max)` scan bounds treating it
    /// as a prefix.
    #[must_use]
    pub fn min_max(self) -> (Vec<u8>, Vec<u8>) {
        key_min_max(&self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn uint_is_fixed_width() {
        assert_eq!(encode_uint(0), "0000000000");
        assert_eq!(encode_uint(42), "0000000042");
        assert_eq!(encode_uint(1_234_567_890), "1234567890");
    }

    #[test]
    fn bool_false_sorts_first() {
        assert!(encode_bool(false) < encode_bool(true));
    }

    #[test]
    fn time_is_utc_and_second_truncated() {
        let t = Utc.with_ymd_and_hms(2016, 3, 1, 12, 30, 45).unwrap()
            + chrono::Duration::milliseconds(750);
        assert_eq!(encode_time(t), "20160301123045Z");
    }

    #[test]
    fn time_epoch() {
        let t = DateTime::from_timestamp(0, 0).unwrap();
        assert_eq!(encode_time(t), "19700101000000Z");
    }

    #[test]
    fn builder_joins_with_separator() {
        let key = KeyBuilder::new()
            .str("0000000001")
            .boolean(false)
            .uint(7)
            .build();
        assert_eq!(key, "0000000001|0|0000000007");
    }

    #[test]
    fn builder_sanitizes_metacharacters() {
        let key = KeyBuilder::new().str("a|b~c").str("d").build();
        assert_eq!(key, "abc|d");
    }

    #[test]
    fn builder_lowercases() {
        let key = KeyBuilder::new().str_lower("HTTP://X").build();
        assert_eq!(key, "http://x");
    }

    #[test]
    fn key_max_bounds_prefix_scans() {
        let (min, max) = key_min_max("0000000001");
        let inside = KeyBuilder::new().str("0000000001").uint(99).build();
        assert!(min.as_slice() <= inside.as_bytes());
        assert!(inside.as_bytes() < max.as_slice());

        // A sibling prefix falls outside the bounds.
        let outside = KeyBuilder::new().str("0000000002").uint(0).build();
        assert!(outside.as_bytes() >= max.as_slice());
    }

    #[test]
    fn sentinel_sorts_after_separator() {
        // p < p|rest < p~ must hold for prefix bounds to bracket every
        // extension of the prefix.
        assert!((SEP as u8) < (MAX as u8));

        let prefix = "0000000001";
        let extended = KeyBuilder::new().str(prefix).uint(7).build();
        let (min, max) = key_min_max(prefix);
        assert!(min.as_slice() <= extended.as_bytes());
        assert!(extended.as_bytes() < max.as_slice());
    }

    proptest! {
        #[test]
        fn uint_order_preserved(a in 0u64..9_999_999_999, b in 0u64..9_999_999_999) {
            prop_assert_eq!(a.cmp(&b), encode_uint(a).cmp(&encode_uint(b)));
        }

        #[test]
        fn time_order_preserved(a in 0i64..4_102_444_800, b in 0i64..4_102_444_800) {
            let ta = DateTime::from_timestamp(a, 0).unwrap();
            let tb = DateTime::from_timestamp(b, 0).unwrap();
            prop_assert_eq!(a.cmp(&b), encode_time(ta).cmp(&encode_time(tb)));
        }

        #[test]
        fn sanitized_components_never_shift(s in "[a-z|~]{0,12}") {
            let key = KeyBuilder::new().str(&s).uint(1).build();
            let parts: Vec<&str> = key.split(SEP).collect();
            let one = encode_uint(1);
            prop_assert_eq!(parts.len(), 2);
            prop_assert_eq!(parts[1], one.as_str());
        }
    }
}
