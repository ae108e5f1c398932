//! Inter-beat interval sequences.
//!
//! An interval sequence covers one signal segment: the first and last
//! elements are *boundary* intervals (start-of-segment to first beat, last
//! beat to end-of-segment) and may be fragments of a true beat-to-beat gap;
//! interior elements are genuine inter-beat intervals.

use serde::{Deserialize, Serialize};

/// Ordered sequence of intervals in seconds.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IntervalSequence(Vec<f32>);

impl IntervalSequence {
    pub fn new(intervals: Vec<f32>) -> Self {
        Self(intervals)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    /// Total covered duration in seconds.
    pub fn total(&self) -> f32 {
        self.0.iter().sum()
    }

    /// Interior (non-boundary) intervals: true beat-to-beat gaps.
    /// Empty when the sequence holds fewer than three elements.
    pub fn interior(&self) -> &[f32] {
        if self.0.len() < 3 {
            &[]
        } else {
            &self.0[1..self.0.len() - 1]
        }
    }

    /// Mean of the interior intervals, if any.
    pub fn mean_interior(&self) -> Option<f32> {
        let interior = self.interior();
        if interior.is_empty() {
            None
        } else {
            Some(interior.iter().sum::<f32>() / interior.len() as f32)
        }
    }

    pub fn first(&self) -> Option<f32> {
        self.0.first().copied()
    }

    pub fn last(&self) -> Option<f32> {
        self.0.last().copied()
    }

    /// Split so that the returned tail sums to exactly `target` seconds,
    /// cutting the interval that straddles the boundary into two parts.
    ///
    /// Invariant: `head.total() + tail.total() == self.total()` and
    /// `tail.total() == target` (within float tolerance) for any
    /// `0 <= target <= self.total()`. No interval is duplicated or dropped.
    pub fn split_trailing(&self, target: f32) -> (IntervalSequence, IntervalSequence) {
        let total = self.total();
        if target <= 0.0 {
            return (self.clone(), IntervalSequence::default());
        }
        if target >= total {
            return (IntervalSequence::default(), self.clone());
        }

        let head_target = total - target;
        let mut head = Vec::new();
        let mut tail = Vec::new();
        let mut acc = 0.0f32;
        let mut cut = false;

        for &iv in &self.0 {
            if cut {
                tail.push(iv);
            } else if acc + iv <= head_target {
                head.push(iv);
                acc += iv;
            } else {
                // Straddling interval: cut it so the two parts sum to iv.
                let head_part = head_target - acc;
                if head_part > 0.0 {
                    head.push(head_part);
                }
                tail.push(iv - head_part);
                cut = true;
            }
        }

        (IntervalSequence::new(head), IntervalSequence::new(tail))
    }

    /// Stitch a trailing boundary fragment from the previous segment onto the
    /// leading boundary of this one, recovering the gap that spans the seam.
    pub fn stitch_leading(&self, previous_trailing: f32) -> IntervalSequence {
        let mut merged = self.0.clone();
        if let Some(first) = merged.first_mut() {
            *first += previous_trailing;
        } else {
            merged.push(previous_trailing);
        }
        IntervalSequence::new(merged)
    }

    /// Prepend a synthetic zero-duration boundary, marking a fresh beat-cycle
    /// start when a seam gap was judged implausible (missed beat).
    pub fn with_zero_boundary(&self) -> IntervalSequence {
        let mut v = Vec::with_capacity(self.0.len() + 1);
        v.push(0.0);
        v.extend_from_slice(&self.0);
        IntervalSequence::new(v)
    }
}

impl From<Vec<f32>> for IntervalSequence {
    fn from(v: Vec<f32>) -> Self {
        Self::new(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_split_mid_interval() {
        let seq = IntervalSequence::new(vec![1.0, 0.8, 0.9, 0.7]);
        let (head, tail) = seq.split_trailing(1.0);

        assert_relative_eq!(tail.total(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(head.total() + tail.total(), seq.total(), epsilon = 1e-5);
        // 0.7 is whole, 0.3 cut off the 0.9
        assert_eq!(tail.len(), 2);
        assert_relative_eq!(tail.as_slice()[0], 0.3, epsilon = 1e-5);
        assert_relative_eq!(tail.as_slice()[1], 0.7, epsilon = 1e-5);
    }

    #[test]
    fn test_split_on_boundary() {
        let seq = IntervalSequence::new(vec![1.0, 1.0, 1.0]);
        let (head, tail) = seq.split_trailing(1.0);
        assert_eq!(head.len(), 2);
        assert_eq!(tail.len(), 1);
        assert_relative_eq!(tail.total(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_split_target_exceeds_total() {
        let seq = IntervalSequence::new(vec![0.5, 0.5]);
        let (head, tail) = seq.split_trailing(5.0);
        assert!(head.is_empty());
        assert_eq!(tail, seq);
    }

    #[test]
    fn test_split_zero_target() {
        let seq = IntervalSequence::new(vec![0.5, 0.5]);
        let (head, tail) = seq.split_trailing(0.0);
        assert_eq!(head, seq);
        assert!(tail.is_empty());
    }

    #[test]
    fn test_stitch_leading() {
        let seq = IntervalSequence::new(vec![0.3, 0.8, 0.4]);
        let merged = seq.stitch_leading(0.5);
        assert_relative_eq!(merged.as_slice()[0], 0.8, epsilon = 1e-6);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_interior_excludes_boundaries() {
        let seq = IntervalSequence::new(vec![0.3, 0.8, 0.9, 0.4]);
        assert_eq!(seq.interior(), &[0.8, 0.9]);

        let short = IntervalSequence::new(vec![0.3, 0.4]);
        assert!(short.interior().is_empty());
    }

    proptest! {
        #[test]
        fn prop_split_conserves_total(
            intervals in proptest::collection::vec(0.01f32..2.0, 1..20),
            frac in 0.0f32..1.0,
        ) {
            let seq = IntervalSequence::new(intervals);
            let target = seq.total() * frac;
            let (head, tail) = seq.split_trailing(target);

            let recombined = head.total() + tail.total();
            prop_assert!((recombined - seq.total()).abs() < 1e-3);
            prop_assert!((tail.total() - target).abs() < 1e-3);
        }
    }
}
