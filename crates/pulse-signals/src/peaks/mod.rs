//! Beat peak detection and interval extraction.
//!
//! Detects local maxima in the cleaned signal under adaptive height,
//! prominence, and minimum-separation constraints, converts them into
//! boundary-corrected interval sequences, and reconciles interval sequences
//! across chunk seams.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::intervals::IntervalSequence;

/// Extractor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeakConfig {
    /// Minimum peak separation as a fraction of the average gap
    pub min_distance_gap_factor: f32,
    /// Fallback minimum separation in seconds when no gap estimate exists
    pub default_min_distance_s: f32,
    /// Height threshold above the mean, in signal standard deviations
    pub height_factor: f32,
    /// Required prominence, in signal standard deviations
    pub prominence_factor: f32,
    /// EMA weight of fresh measurements in the average-gap prior
    pub gap_ema_alpha: f32,
    /// A seam gap above this multiple of the average gap means a missed beat
    pub missed_beat_factor: f32,
}

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            min_distance_gap_factor: 0.4,
            default_min_distance_s: 0.33,
            height_factor: 0.5,
            prominence_factor: 0.25,
            gap_ema_alpha: 0.3,
            missed_beat_factor: 1.5,
        }
    }
}

/// Result of reconciling a fresh interval sequence with the previous chunk's
/// trailing boundary.
#[derive(Debug, Clone)]
pub struct SeamOutcome {
    pub intervals: IntervalSequence,
    /// True when the seam gap was implausible and beat-cycle bookkeeping
    /// restarts instead of averaging a missed beat into a long interval.
    pub new_start: bool,
}

/// Peak detector and interval extractor.
pub struct PeakExtractor {
    config: PeakConfig,
}

impl PeakExtractor {
    pub fn new() -> Self {
        Self::with_config(PeakConfig::default())
    }

    pub fn with_config(config: PeakConfig) -> Self {
        Self { config }
    }

    /// Detect beat peaks. Thresholds derive from the signal's own
    /// dispersion; the separation constraint derives from the average gap
    /// when one is known.
    pub fn detect_peaks(
        &self,
        signal: &Array1<f32>,
        fs: f32,
        average_gap: Option<f32>,
    ) -> Vec<usize> {
        let n = signal.len();
        if n < 3 {
            return Vec::new();
        }

        let mean = signal.mean().unwrap_or(0.0);
        let std = {
            let var = signal.mapv(|x| (x - mean).powi(2)).mean().unwrap_or(0.0);
            var.sqrt()
        };
        let threshold = mean + self.config.height_factor * std;
        let min_prominence = self.config.prominence_factor * std;

        let min_distance = match average_gap {
            Some(gap) => (self.config.min_distance_gap_factor * gap * fs).round() as usize,
            None => (self.config.default_min_distance_s * fs).round() as usize,
        }
        .max(1);

        // Local maxima above threshold, skipping over plateaus.
        let mut candidates = Vec::new();
        let mut i = 1;
        while i < n - 1 {
            if signal[i] >= signal[i - 1] && signal[i] >= signal[i + 1] && signal[i] > threshold {
                candidates.push(i);
                while i < n - 1 && signal[i] == signal[i + 1] {
                    i += 1;
                }
            }
            i += 1;
        }

        candidates.retain(|&p| prominence(signal, p) >= min_prominence);

        // Enforce separation, keeping the tallest peaks first.
        let mut by_height = candidates;
        by_height.sort_by(|&a, &b| signal[b].partial_cmp(&signal[a]).unwrap_or(std::cmp::Ordering::Equal));
        let mut kept: Vec<usize> = Vec::new();
        for p in by_height {
            if kept
                .iter()
                .all(|&q| (p as i64 - q as i64).unsigned_abs() as usize >= min_distance)
            {
                kept.push(p);
            }
        }
        kept.sort_unstable();
        kept
    }

    /// Detect peaks and convert them into a boundary-corrected interval
    /// sequence covering the whole segment.
    pub fn extract_intervals(
        &self,
        signal: &Array1<f32>,
        fs: f32,
        average_gap: Option<f32>,
    ) -> IntervalSequence {
        let n = signal.len();
        let peaks = self.detect_peaks(signal, fs, average_gap);

        if peaks.is_empty() {
            // Whole segment as a single boundary interval.
            return IntervalSequence::new(vec![n as f32 / fs]);
        }

        let mut intervals = Vec::with_capacity(peaks.len() + 1);
        intervals.push(peaks[0] as f32 / fs);
        for pair in peaks.windows(2) {
            intervals.push((pair[1] - pair[0]) as f32 / fs);
        }
        intervals.push((n - peaks[peaks.len() - 1]) as f32 / fs);

        IntervalSequence::new(intervals)
    }

    /// Reconcile the fresh sequence with the previous chunk's trailing
    /// boundary. A plausible seam gap is merged; an implausible one
    /// (`> missed_beat_factor x average gap`) is treated as a missed beat and
    /// the cycle restarts behind a synthetic zero boundary.
    pub fn merge_at_seam(
        &self,
        previous_trailing: Option<f32>,
        fresh: &IntervalSequence,
        average_gap: Option<f32>,
    ) -> SeamOutcome {
        let Some(prev) = previous_trailing else {
            return SeamOutcome {
                intervals: fresh.clone(),
                new_start: false,
            };
        };

        let seam_gap = prev + fresh.first().unwrap_or(0.0);
        if let Some(gap) = average_gap {
            if seam_gap > self.config.missed_beat_factor * gap {
                debug!(seam_gap, gap, "implausible seam gap, restarting beat cycle");
                return SeamOutcome {
                    intervals: fresh.with_zero_boundary(),
                    new_start: true,
                };
            }
        }

        SeamOutcome {
            intervals: fresh.stitch_leading(prev),
            new_start: false,
        }
    }

    /// Fold the fresh interior mean into the slow-moving average-gap prior.
    pub fn update_average_gap(
        &self,
        previous: Option<f32>,
        fresh: &IntervalSequence,
    ) -> Option<f32> {
        match (previous, fresh.mean_interior()) {
            (None, measured) => measured,
            (Some(prior), None) => Some(prior),
            (Some(prior), Some(measured)) => {
                let alpha = self.config.gap_ema_alpha;
                Some(prior * (1.0 - alpha) + measured * alpha)
            }
        }
    }
}

impl Default for PeakExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Height of a peak above the higher of its two surrounding bases.
fn prominence(signal: &Array1<f32>, peak: usize) -> f32 {
    let height = signal[peak];

    let mut left_min = height;
    for i in (0..peak).rev() {
        if signal[i] > height {
            break;
        }
        left_min = left_min.min(signal[i]);
    }

    let mut right_min = height;
    for i in peak + 1..signal.len() {
        if signal[i] > height {
            break;
        }
        right_min = right_min.min(signal[i]);
    }

    height - left_min.max(right_min)
}
