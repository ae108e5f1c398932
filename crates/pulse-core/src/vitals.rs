//! Periodic BPM/HRV aggregation for the persistence collaborator.
//!
//! Stitches interval sequences across rounds (honoring `new_start` breaks)
//! and every N rounds emits one aggregate record. The core does not depend
//! on what the collaborator does with it.

use tracing::debug;

use pulse_signals::IntervalSequence;

use crate::domain::VitalsRecord;

/// Rolling interval aggregator.
pub struct VitalsAggregator {
    rounds_per_record: usize,
    intervals: Vec<f32>,
    round: usize,
}

impl VitalsAggregator {
    pub fn new(rounds_per_record: usize) -> Self {
        Self {
            rounds_per_record,
            intervals: Vec::new(),
            round: 0,
        }
    }

    pub fn reset(&mut self) {
        self.intervals.clear();
        self.round = 0;
    }

    /// Fold one chunk's intervals in; returns a record every
    /// `rounds_per_record` rounds.
    pub fn observe(&mut self, fresh: &IntervalSequence, new_start: bool) -> Option<VitalsRecord> {
        let values = fresh.as_slice();

        if !new_start && !self.intervals.is_empty() && !values.is_empty() {
            // The stored trailing boundary and the fresh leading boundary are
            // two halves of the same gap.
            let last = self.intervals.len() - 1;
            self.intervals[last] += values[0];
            self.intervals.extend_from_slice(&values[1..]);
        } else {
            self.intervals.extend_from_slice(values);
        }

        self.round += 1;
        if self.round < self.rounds_per_record {
            return None;
        }

        let record = if self.intervals.is_empty() {
            None
        } else {
            let n = self.intervals.len() as f32;
            let average_gap = self.intervals.iter().sum::<f32>() / n;
            let variance = self
                .intervals
                .iter()
                .map(|&x| (x - average_gap).powi(2))
                .sum::<f32>()
                / n;
            let bpm = if average_gap > 0.0 { 60.0 / average_gap } else { 0.0 };
            debug!(bpm, average_gap, "vitals record emitted");
            Some(VitalsRecord {
                bpm,
                hrv: variance.sqrt(),
                average_gap,
            })
        };

        // Carry the provisional trailing boundary into the next cycle.
        let carry = if new_start { None } else { fresh.last() };
        self.intervals.clear();
        if let Some(tail) = carry {
            self.intervals.push(tail);
        }
        self.round = 0;

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_every_n_rounds() {
        let mut agg = VitalsAggregator::new(3);
        let seq = IntervalSequence::new(vec![0.5, 1.0, 1.0, 0.5]);

        assert!(agg.observe(&seq, false).is_none());
        assert!(agg.observe(&seq, false).is_none());
        let record = agg.observe(&seq, false).expect("third round emits");

        // Stitched rhythm of ~1 s gaps.
        assert!((record.average_gap - 1.0).abs() < 0.1);
        assert!((record.bpm - 60.0).abs() < 6.0);
        assert!(record.hrv < 0.2);
    }

    #[test]
    fn test_new_start_breaks_stitching() {
        let mut agg = VitalsAggregator::new(2);
        let seq = IntervalSequence::new(vec![0.5, 1.0, 0.5]);

        agg.observe(&seq, false);
        let record = agg.observe(&seq, true).expect("second round emits");
        // Without stitching the boundary fragments stay as-is.
        assert!(record.average_gap < 1.0);
    }

    #[test]
    fn test_reset_clears_accumulation() {
        let mut agg = VitalsAggregator::new(2);
        let seq = IntervalSequence::new(vec![0.5, 1.0, 0.5]);

        agg.observe(&seq, false);
        agg.reset();
        assert!(agg.observe(&seq, false).is_none());
    }
}
