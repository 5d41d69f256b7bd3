//! Arithmetic on the m-bit Chord identifier ring.

use primitive_types::U256;
use sha1::{Digest, Sha1};

/// Bit-width of the identifier ring. Fixed at 160 (one SHA-1 digest).
pub const M: u32 = 160;

/// A point on the identifier ring.
///
/// Backed by `U256` so that `self.id + 2^(M-1)` never overflows the backing
/// integer; every public constructor and arithmetic helper below masks the
/// result down to the low `M` bits, so a `Key` value is always in `[0, 2^M)`.
pub type Key = U256;

/// `primitive-types::U256` has no `serde` impl without its optional `serde`
/// feature (not enabled here, to keep the dependency surface minimal); this
/// renders a `Key` as its decimal string for the JSON debug/status surface.
pub fn serialize_key<S>(key: &Key, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&key.to_string())
}

/// Extension methods mirrored after the donor crate's own `HashRingKey`
/// trait, adapted to the ring width and hash function this spec mandates.
pub trait HashRingKey {
    /// `SHA1(s)` interpreted as a big-endian integer, masked to `M` bits.
    fn hash(s: &str) -> Key;

    /// `(self + 2^(i-1)) mod 2^M`, the target identifier for finger `i`
    /// (1-indexed, as the finger table itself is).
    fn finger_target(&self, i: u32) -> Key;

    /// Reduce to the ring's `M`-bit domain.
    fn mask(&self) -> Key;
}

fn ring_mask() -> Key {
    (Key::one() << M) - Key::one()
}

impl HashRingKey for Key {
    fn hash(s: &str) -> Key {
        let mut hasher = Sha1::new();
        hasher.update(s.as_bytes());
        let digest = hasher.finalize();
        Key::from_big_endian(&digest).mask()
    }

    fn finger_target(&self, i: u32) -> Key {
        let offset = Key::one().overflowing_shl(i - 1).0;
        self.overflowing_add(offset).0.mask()
    }

    fn mask(&self) -> Key {
        *self & ring_mask()
    }
}

/// `on_arc(a, x, b]`: true iff walking clockwise from `a` reaches `x` before
/// (or exactly at) `b`, with `a` excluded and `b` included.
///
/// Handles wrap-around: when `a < b` the arc doesn't cross zero and this is
/// a plain range check; when `a >= b` the arc wraps past `2^M - 1` back to
/// zero, so `x` is on the arc if it's past `a` OR not yet past `b`.
pub fn on_arc(a: Key, x: Key, b: Key) -> bool {
    if a < b {
        a < x && x <= b
    } else {
        x > a || x <= b
    }
}

/// `closest_between(a, x, b)`: true iff `x` lies strictly between `a` and
/// `b` on the arc running clockwise from `a` to `b`, both endpoints
/// excluded. Used by `closest_preceding_finger`.
pub fn closest_between(a: Key, x: Key, b: Key) -> bool {
    if a < b {
        a < x && x < b
    } else {
        x > a || x < b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_within_ring() {
        let a = Key::hash("hello");
        let b = Key::hash("hello");
        assert_eq!(a, b);
        assert!(a < (Key::one() << M));
    }

    #[test]
    fn hash_differs_for_different_inputs() {
        assert_ne!(Key::hash("hello"), Key::hash("world"));
    }

    #[test]
    fn finger_target_wraps_at_ring_boundary() {
        let max = ring_mask();
        let target = max.finger_target(1);
        // max + 2^0 = 2^M, which wraps to 0 on the ring.
        assert_eq!(target, Key::zero());
    }

    #[test]
    fn on_arc_non_wrapping_excludes_left_includes_right() {
        let a = Key::from(10u64);
        let b = Key::from(20u64);
        assert!(!on_arc(a, a, b));
        assert!(on_arc(a, b, b));
        assert!(on_arc(a, Key::from(15u64), b));
        assert!(!on_arc(a, Key::from(25u64), b));
    }

    #[test]
    fn on_arc_wrapping_covers_both_sides_of_zero() {
        let a = Key::from(250u64);
        let b = Key::from(10u64);
        assert!(on_arc(a, Key::from(255u64), b));
        assert!(on_arc(a, Key::from(5u64), b));
        assert!(!on_arc(a, Key::from(128u64), b));
    }

    #[test]
    fn closest_between_excludes_both_endpoints() {
        let a = Key::from(10u64);
        let b = Key::from(20u64);
        assert!(!closest_between(a, a, b));
        assert!(!closest_between(a, b, b));
        assert!(closest_between(a, Key::from(15u64), b));
    }
}
