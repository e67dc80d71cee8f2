//! Highest-index-first iteration over a sequence that is edited while it is walked.
//!
//! Insertions and removals renumber everything after the edit, so a raw index
//! is never carried across a mutation. [`HighestFirst`] remembers the *times*
//! of the points it still has to visit and re-locates each one by time just
//! before handing it out. Points whose time no longer exists (removed or
//! retimed by an earlier step) are skipped.

use std::ops::Range;

/// A sequence of points addressed by index and ordered by time.
pub trait TimeIndexed {
    fn len(&self) -> usize;

    fn time_at(&self, i: usize) -> f64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the point whose time is exactly `t`.
    fn index_of_time(&self, t: f64) -> Option<usize> {
        let (mut lo, mut hi) = (0usize, self.len());
        while lo < hi {
            let mid = (lo + hi) / 2;
            let tm = self.time_at(mid);
            if tm == t {
                return Some(mid);
            } else if tm < t {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        None
    }
}

impl TimeIndexed for Vec<f64> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn time_at(&self, i: usize) -> f64 {
        self[i]
    }
}

#[derive(Debug, Clone)]
pub struct HighestFirst {
    /// Pending anchor times, ascending; the next one handed out is the last.
    pending: Vec<f64>,
}

impl HighestFirst {
    /// Capture the points of `seq` whose indices fall in `range`.
    pub fn over<S: TimeIndexed + ?Sized>(seq: &S, range: Range<usize>) -> Self {
        let end = range.end.min(seq.len());
        let pending = (range.start..end).map(|i| seq.time_at(i)).collect();
        Self { pending }
    }

    /// Number of anchors not yet handed out (some may have vanished).
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Current index of the highest remaining anchor that still exists in `seq`.
    pub fn next_index<S: TimeIndexed + ?Sized>(&mut self, seq: &S) -> Option<usize> {
        while let Some(t) = self.pending.pop() {
            if let Some(i) = seq.index_of_time(t) {
                return Some(i);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visits_every_anchor_high_to_low() {
        let seq = vec![0.0, 1.0, 2.0, 3.0, 4.0];
        let mut cursor = HighestFirst::over(&seq, 1..4);
        let mut seen = Vec::new();
        while let Some(i) = cursor.next_index(&seq) {
            seen.push(i);
        }
        assert_eq!(seen, vec![3, 2, 1]);
    }

    #[test]
    fn test_relocates_after_insertion_below_anchor() {
        let mut seq = vec![0.0, 10.0, 20.0, 30.0];
        let mut cursor = HighestFirst::over(&seq, 1..3);
        assert_eq!(cursor.next_index(&seq), Some(2));
        // insert two points in front of index 2, then one after it
        seq.insert(2, 15.0);
        seq.insert(2, 12.0);
        seq.insert(5, 25.0);
        assert_eq!(cursor.next_index(&seq), Some(1));
        assert_eq!(cursor.next_index(&seq), None);
    }

    #[test]
    fn test_skips_vanished_anchor() {
        let mut seq = vec![0.0, 1.0, 2.0, 3.0, 4.0];
        let mut cursor = HighestFirst::over(&seq, 0..5);
        assert_eq!(cursor.next_index(&seq), Some(4));
        seq.remove(3);
        seq[2] = 2.5; // retimed
        assert_eq!(cursor.next_index(&seq), Some(1));
        assert_eq!(cursor.next_index(&seq), Some(0));
        assert_eq!(cursor.next_index(&seq), None);
        assert_eq!(cursor.remaining(), 0);
    }
}
