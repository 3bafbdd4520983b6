//! Per-vertex multiplicity histogram and threshold auto-selection.

use std::collections::BTreeMap;

/// Sparse mapping from multiplicity to vertex count. Kept as a `BTreeMap`
/// rather than a dense array since real coverage distributions have a long
/// thin tail that would otherwise waste memory, matching the reference
/// implementation's own sparse `Histogram` (a `std::map<int,int>`).
#[derive(Debug, Clone, Default)]
pub struct Histogram {
    buckets: BTreeMap<u64, u64>,
}

/// Consecutive non-improving buckets required before accepting a local
/// minimum.
const SMOOTHING_WINDOW: usize = 4;

impl Histogram {
    pub fn new() -> Self {
        Histogram::default()
    }

    pub fn insert(&mut self, multiplicity: u64) {
        *self.buckets.entry(multiplicity).or_insert(0) += 1;
    }

    pub fn insert_count(&mut self, multiplicity: u64, count: u64) {
        *self.buckets.entry(multiplicity).or_insert(0) += count;
    }

    /// Merge another worker's histogram into this one, for the sharded
    /// controller combining per-shard histograms before deriving
    /// thresholds.
    pub fn merge(&mut self, other: &Histogram) {
        for (&k, &c) in &other.buckets {
            self.insert_count(k, c);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn min_key(&self) -> Option<u64> {
        self.buckets.keys().next().copied()
    }

    pub fn max_key(&self) -> Option<u64> {
        self.buckets.keys().next_back().copied()
    }

    pub fn total_count(&self) -> u64 {
        self.buckets.values().sum()
    }

    pub fn mean(&self) -> f64 {
        let total = self.total_count();
        if total == 0 {
            return 0.0;
        }
        let sum: u128 = self
            .buckets
            .iter()
            .map(|(&k, &c)| k as u128 * c as u128)
            .sum();
        sum as f64 / total as f64
    }

    pub fn stddev(&self) -> f64 {
        let total = self.total_count();
        if total < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let var: f64 = self
            .buckets
            .iter()
            .map(|(&k, &c)| {
                let d = k as f64 - mean;
                d * d * c as f64
            })
            .sum::<f64>()
            / total as f64;
        var.sqrt()
    }

    /// Scan buckets in increasing multiplicity order, tracking the
    /// running minimum-count bucket; accept a candidate local minimum once
    /// `SMOOTHING_WINDOW` consecutive buckets fail to beat it. A tie (`<=`,
    /// not `<`) advances the running minimum to the later bucket and resets
    /// the stale-run counter, matching `Histogram::firstLocalMinimum`'s own
    /// `it->second <= minimum->second`. Clamped to
    /// `>= 2` (multiplicity-1 vertices are near-universally sequencing
    /// error, never a meaningful "first minimum").
    ///
    /// Returns `None` only for an empty histogram, which callers treat as
    /// an invariant violation (LOAD produced zero live vertices) rather
    /// than a normal "no minimum" outcome.
    pub fn first_local_minimum(&self) -> Option<u64> {
        if self.buckets.is_empty() {
            return None;
        }
        let mut best_key = None;
        let mut best_count = u64::MAX;
        let mut stale_run = 0usize;
        for (&key, &count) in self.buckets.iter() {
            if count <= best_count {
                best_count = count;
                best_key = Some(key);
                stale_run = 0;
            } else {
                stale_run += 1;
                if stale_run >= SMOOTHING_WINDOW {
                    break;
                }
            }
        }
        best_key.map(|k| k.max(2))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.buckets.iter().map(|(&k, &c)| (k, c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_minimum() {
        let h = Histogram::new();
        assert_eq!(h.first_local_minimum(), None);
    }

    #[test]
    fn first_local_minimum_clamped_to_two() {
        let mut h = Histogram::new();
        h.insert_count(1, 100); // error peak
        h.insert_count(2, 5);
        h.insert_count(3, 2); // true minimum, but clamp keeps it at >= 2
        h.insert_count(20, 50);
        h.insert_count(21, 48);
        h.insert_count(22, 49);
        h.insert_count(23, 47);
        assert_eq!(h.first_local_minimum(), Some(3));
    }

    #[test]
    fn first_local_minimum_advances_on_a_tied_count() {
        // A plateau at keys 5 and 6 (both count 10): the ground-truth
        // `<=` comparison advances the running minimum to the later,
        // tied bucket (6) and resets the stale-run counter there, rather
        // than freezing on the first bucket to reach that count (5).
        let mut h = Histogram::new();
        h.insert_count(5, 10);
        h.insert_count(6, 10);
        h.insert_count(7, 11);
        h.insert_count(8, 11);
        h.insert_count(9, 11);
        h.insert_count(10, 11);
        assert_eq!(h.first_local_minimum(), Some(6));
    }

    #[test]
    fn mean_and_stddev() {
        let mut h = Histogram::new();
        h.insert_count(2, 1);
        h.insert_count(4, 1);
        assert_eq!(h.mean(), 3.0);
        assert!((h.stddev() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn merge_combines_bucket_counts() {
        let mut a = Histogram::new();
        a.insert_count(5, 3);
        let mut b = Histogram::new();
        b.insert_count(5, 2);
        b.insert_count(6, 1);
        a.merge(&b);
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![(5, 5), (6, 1)]);
    }
}
