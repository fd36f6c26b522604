use crate::value::Value;
use std::{fmt, str::FromStr};
use xxhash_rust::xxh3::Xxh3;

/// Value-hash format version byte used by canonical digest encoding.
pub(crate) const VALUE_HASH_VERSION: u8 = 1;

/// Stable XXH3 seed; grouping-table continuations depend on it.
pub(crate) const VALUE_HASH_SEED: u64 = 0;

// Canonical type tags.
const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_NUMBER: u8 = 0x02;
const TAG_STRING: u8 = 0x03;
const TAG_ARRAY: u8 = 0x04;
const TAG_OBJECT: u8 = 0x05;

fn feed_u8(h: &mut Xxh3, x: u8) {
    h.update(&[x]);
}
fn feed_u64(h: &mut Xxh3, x: u64) {
    h.update(&x.to_be_bytes());
}
fn feed_len(h: &mut Xxh3, len: usize) {
    feed_u64(h, len as u64);
}
fn feed_str(h: &mut Xxh3, s: &str) {
    feed_len(h, s.len());
    h.update(s.as_bytes());
}

#[cfg(test)]
thread_local! {
    static TEST_HASH_OVERRIDE: std::cell::Cell<Option<u128>> =
        const { std::cell::Cell::new(None) };
}

#[cfg(test)]
#[expect(clippy::redundant_closure_for_method_calls)]
fn test_hash_override() -> Option<u128> {
    TEST_HASH_OVERRIDE.with(|cell| cell.get())
}

// Execute one closure with a thread-local test hash override and always restore
// the previous override state, even if the closure panics.
#[cfg(test)]
pub(crate) fn with_test_hash_override<T>(
    override_hash: u128,
    f: impl FnOnce() -> T + std::panic::UnwindSafe,
) -> T {
    let previous = TEST_HASH_OVERRIDE.with(|cell| cell.replace(Some(override_hash)));
    let result = std::panic::catch_unwind(f);
    TEST_HASH_OVERRIDE.with(|cell| cell.set(previous));
    match result {
        Ok(value) => value,
        Err(payload) => std::panic::resume_unwind(payload),
    }
}

// Numbers hash by their f64 value so `3`, `3.0`, and `-0`/`0` collapse.
fn feed_number(h: &mut Xxh3, n: &serde_json::Number) {
    let x = n.as_f64().unwrap_or(0.0);
    let x = if x == 0.0 { 0.0 } else { x };
    feed_u64(h, x.to_bits());
}

fn write_to_hasher(value: &Value, h: &mut Xxh3) {
    match value {
        Value::Null => feed_u8(h, TAG_NULL),
        Value::Bool(b) => {
            feed_u8(h, TAG_BOOL);
            feed_u8(h, u8::from(*b));
        }
        Value::Number(n) => {
            feed_u8(h, TAG_NUMBER);
            feed_number(h, n);
        }
        Value::String(s) => {
            feed_u8(h, TAG_STRING);
            feed_str(h, s);
        }
        Value::Array(items) => {
            feed_u8(h, TAG_ARRAY);
            feed_len(h, items.len());
            for item in items {
                write_to_hasher(item, h);
            }
        }
        Value::Object(map) => {
            // Object keys hash in sorted order regardless of insertion order.
            let mut entries = map.iter().collect::<Vec<_>>();
            entries.sort_by(|(left, _), (right, _)| left.cmp(right));

            feed_u8(h, TAG_OBJECT);
            feed_len(h, entries.len());
            for (key, value) in entries {
                feed_u8(h, 0xFD);
                feed_str(h, key);
                feed_u8(h, 0xFE);
                write_to_hasher(value, h);
            }
        }
    }
}

/// Stable 128-bit content hash of a structured value.
#[must_use]
pub fn hash_value(value: &Value) -> ContentHash {
    #[cfg(test)]
    if let Some(override_hash) = test_hash_override() {
        return ContentHash(override_hash);
    }

    let mut h = Xxh3::with_seed(VALUE_HASH_SEED);
    feed_u8(&mut h, VALUE_HASH_VERSION);

    write_to_hasher(value, &mut h);
    ContentHash(h.digest128())
}

///
/// ContentHash
///
/// 128-bit canonical value digest. Renders as 32 lowercase hex digits, the
/// form grouping-table continuations use as object keys.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ContentHash(pub u128);

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for ContentHash {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u128::from_str_radix(s, 16).map(Self)
    }
}

///
/// TESTS
///
