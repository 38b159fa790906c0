//! Vector clock primitives for causal ordering of task edits.
//!
//! A vector clock maps a device identifier to a monotonically increasing
//! counter. Two edits are causally ordered when one clock dominates the
//! other pointwise; otherwise they are concurrent and the server reports a
//! conflict instead of guessing a winner.
//!
//! Keys are kept in a `BTreeMap` so serialization is deterministic; clocks
//! are treated as immutable values and merge results are always derived on
//! demand rather than cached.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of comparing two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockOrdering {
    /// Same counters on both sides.
    Identical,
    /// Every component of A is <= B and at least one is strictly less.
    ABeforeB,
    /// Every component of B is <= A and at least one is strictly less.
    BBeforeA,
    /// Neither clock dominates the other.
    Concurrent,
}

/// A finite mapping from device id to a non-negative edit counter.
///
/// Missing entries are treated as zero, so `{}` and `{d: 0}` compare as
/// identical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock(BTreeMap<String, u64>);

impl VectorClock {
    pub fn new() -> Self {
        VectorClock(BTreeMap::new())
    }

    /// Build a clock for a single device.
    pub fn single(device: impl Into<String>, counter: u64) -> Self {
        let mut map = BTreeMap::new();
        map.insert(device.into(), counter);
        VectorClock(map)
    }

    /// Counter for a device; absent entries read as zero.
    pub fn get(&self, device: &str) -> u64 {
        self.0.get(device).copied().unwrap_or(0)
    }

    pub fn insert(&mut self, device: impl Into<String>, counter: u64) {
        self.0.insert(device.into(), counter);
    }

    /// Add one to a device's counter, creating the entry if absent.
    pub fn increment(&mut self, device: &str) {
        self.0
            .entry(device.to_string())
            .and_modify(|c| *c = c.saturating_add(1))
            .or_insert(1);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u64)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compare two clocks under the happens-before relation.
    ///
    /// Total over all inputs: exactly one of the four orderings is returned,
    /// and `compare(a, b) == ABeforeB` iff `compare(b, a) == BBeforeA`.
    pub fn compare(&self, other: &VectorClock) -> ClockOrdering {
        let mut a_le_b = true;
        let mut b_le_a = true;

        for (device, a_counter) in self.iter() {
            let b_counter = other.get(device);
            if *a_counter > b_counter {
                a_le_b = false;
            }
            if b_counter > *a_counter {
                b_le_a = false;
            }
        }
        // Devices only the other side has seen; A's counter reads as zero.
        for (device, b_counter) in other.iter() {
            if !self.0.contains_key(device) && *b_counter > 0 {
                b_le_a = false;
            }
        }

        match (a_le_b, b_le_a) {
            (true, true) => ClockOrdering::Identical,
            (true, false) => ClockOrdering::ABeforeB,
            (false, true) => ClockOrdering::BBeforeA,
            (false, false) => ClockOrdering::Concurrent,
        }
    }

    /// Pointwise maximum over the union of keys.
    pub fn merge(&self, other: &VectorClock) -> VectorClock {
        let mut merged = self.0.clone();
        for (device, counter) in other.iter() {
            merged
                .entry(device.clone())
                .and_modify(|c| *c = (*c).max(*counter))
                .or_insert(*counter);
        }
        VectorClock(merged)
    }
}

impl FromIterator<(String, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        VectorClock(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn clock(entries: &[(&str, u64)]) -> VectorClock {
        entries
            .iter()
            .map(|(d, c)| (d.to_string(), *c))
            .collect()
    }

    #[test]
    fn identical_for_equal_clocks() {
        let a = clock(&[("d1", 1), ("d2", 3)]);
        let b = clock(&[("d1", 1), ("d2", 3)]);
        assert_eq!(a.compare(&b), ClockOrdering::Identical);
    }

    #[test]
    fn missing_entries_read_as_zero() {
        let a = clock(&[("d1", 0)]);
        let b = VectorClock::new();
        assert_eq!(a.compare(&b), ClockOrdering::Identical);
    }

    #[test]
    fn dominance_is_antisymmetric() {
        let a = clock(&[("d1", 1)]);
        let b = clock(&[("d1", 1), ("d2", 1)]);
        assert_eq!(a.compare(&b), ClockOrdering::ABeforeB);
        assert_eq!(b.compare(&a), ClockOrdering::BBeforeA);
    }

    #[test]
    fn divergent_histories_are_concurrent() {
        let a = clock(&[("d1", 2), ("d2", 1)]);
        let b = clock(&[("d1", 1), ("d2", 2)]);
        assert_eq!(a.compare(&b), ClockOrdering::Concurrent);
        assert_eq!(b.compare(&a), ClockOrdering::Concurrent);
    }

    #[test]
    fn merge_takes_pointwise_maximum() {
        let a = clock(&[("d1", 5), ("d2", 1)]);
        let b = clock(&[("d2", 4), ("d3", 2)]);
        let m = a.merge(&b);
        assert_eq!(m.get("d1"), 5);
        assert_eq!(m.get("d2"), 4);
        assert_eq!(m.get("d3"), 2);
    }

    #[test]
    fn increment_creates_missing_entry() {
        let mut c = VectorClock::new();
        c.increment("d1");
        c.increment("d1");
        c.increment("d2");
        assert_eq!(c.get("d1"), 2);
        assert_eq!(c.get("d2"), 1);
    }

    #[test]
    fn serializes_as_plain_json_object() {
        let c = clock(&[("d1", 1), ("d2", 2)]);
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, r#"{"d1":1,"d2":2}"#);
        let back: VectorClock = serde_json::from_str(&json).unwrap();
        assert_eq!(c, back);
    }

    fn arb_clock() -> impl Strategy<Value = VectorClock> {
        proptest::collection::btree_map("[a-d]", 0u64..8, 0..4)
            .prop_map(|m| m.into_iter().collect())
    }

    proptest! {
        #[test]
        fn compare_is_total_and_antisymmetric(a in arb_clock(), b in arb_clock()) {
            let ab = a.compare(&b);
            let ba = b.compare(&a);
            match ab {
                ClockOrdering::Identical => prop_assert_eq!(ba, ClockOrdering::Identical),
                ClockOrdering::ABeforeB => prop_assert_eq!(ba, ClockOrdering::BBeforeA),
                ClockOrdering::BBeforeA => prop_assert_eq!(ba, ClockOrdering::ABeforeB),
                ClockOrdering::Concurrent => prop_assert_eq!(ba, ClockOrdering::Concurrent),
            }
        }

        #[test]
        fn compare_with_self_is_identical(a in arb_clock()) {
            prop_assert_eq!(a.compare(&a), ClockOrdering::Identical);
        }

        #[test]
        fn merge_is_commutative(a in arb_clock(), b in arb_clock()) {
            prop_assert_eq!(a.merge(&b), b.merge(&a));
        }

        #[test]
        fn merge_is_associative(a in arb_clock(), b in arb_clock(), c in arb_clock()) {
            prop_assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
        }

        #[test]
        fn merge_is_idempotent(a in arb_clock()) {
            prop_assert_eq!(a.merge(&a), a.clone());
        }

        #[test]
        fn merge_is_pointwise_max(a in arb_clock(), b in arb_clock()) {
            let m = a.merge(&b);
            for (device, counter) in m.iter() {
                prop_assert_eq!(*counter, a.get(device).max(b.get(device)));
            }
        }

        #[test]
        fn merged_clock_dominates_both_inputs(a in arb_clock(), b in arb_clock()) {
            let m = a.merge(&b);
            prop_assert!(matches!(
                a.compare(&m),
                ClockOrdering::ABeforeB | ClockOrdering::Identical
            ));
            prop_assert!(matches!(
                b.compare(&m),
                ClockOrdering::ABeforeB | ClockOrdering::Identical
            ));
        }
    }
}
