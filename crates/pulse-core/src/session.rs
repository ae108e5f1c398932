//! Cross-chunk session state.
//!
//! Everything the pipeline remembers between chunks lives here as explicit
//! fields: filter weights, clean-sample history, accumulated true intervals,
//! the average-gap prior, and beat-cycle bookkeeping. A session belongs to
//! one stream; it is created at stream start, discarded at stream end, and
//! reset wholesale whenever the signal is declared unreadable.

use ndarray::Array1;
use std::collections::VecDeque;
use tracing::info;

use pulse_signals::denoise::{AdaptiveDenoiser, DenoiseOutput, DenoisePhase};
use pulse_signals::dsp::SpectralAnalyzer;
use pulse_signals::reference::{ReferenceTracker, ReferenceWaveform};

use crate::config::PulseConfig;
use crate::domain::SessionId;
use crate::vitals::VitalsAggregator;

/// Mutable per-stream state threaded through every engine call.
pub struct Session {
    id: SessionId,
    sample_rate: f32,
    pub(crate) denoiser: AdaptiveDenoiser,
    pub(crate) tracker: ReferenceTracker,
    pub(crate) spectral: SpectralAnalyzer,
    pub(crate) vitals: VitalsAggregator,
    /// Most recent clean samples, oldest evicted first
    pub(crate) history: VecDeque<f32>,
    history_capacity: usize,
    /// Accumulated true inter-beat intervals, oldest evicted first
    pub(crate) past_intervals: VecDeque<f32>,
    past_intervals_capacity: usize,
    pub(crate) average_gap: Option<f32>,
    /// Trailing boundary interval of the previous chunk
    pub(crate) last_boundary: Option<f32>,
    pub(crate) round: u64,
}

impl Session {
    pub fn new(config: &PulseConfig, reference: ReferenceWaveform, sample_rate: f32) -> Self {
        let taps = (sample_rate.round() as usize).max(2);
        Self {
            id: SessionId::new(),
            sample_rate,
            denoiser: AdaptiveDenoiser::new(taps, config.denoise.clone()),
            tracker: ReferenceTracker::with_config(reference, config.tracker.clone()),
            spectral: SpectralAnalyzer::new(config.conditioner.low_cut_hz, config.conditioner.high_cut_hz),
            vitals: VitalsAggregator::new(config.session.vitals_every_rounds),
            history: VecDeque::with_capacity(config.session.history_capacity),
            history_capacity: config.session.history_capacity,
            past_intervals: VecDeque::with_capacity(config.session.past_intervals_capacity),
            past_intervals_capacity: config.session.past_intervals_capacity,
            average_gap: None,
            last_boundary: None,
            round: 0,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn phase(&self) -> DenoisePhase {
        self.denoiser.phase()
    }

    pub fn average_gap(&self) -> Option<f32> {
        self.average_gap
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn past_intervals_len(&self) -> usize {
        self.past_intervals.len()
    }

    pub fn denoiser(&self) -> &AdaptiveDenoiser {
        &self.denoiser
    }

    /// Discard all accumulated state. Idempotent: resetting twice leaves the
    /// session exactly as a single reset does.
    pub fn reset(&mut self) {
        info!(round = self.round, "resetting session state");
        self.denoiser.reset();
        self.tracker.reset();
        self.vitals.reset();
        self.history.clear();
        self.past_intervals.clear();
        self.average_gap = None;
        self.last_boundary = None;
        self.round = 0;
    }

    /// Run the denoiser over one conditioned chunk against this session's
    /// tracker and weights.
    pub(crate) fn denoise_chunk(
        &mut self,
        bandpassed: &Array1<f32>,
        sample_rate: f32,
        nominal_period_s: f32,
    ) -> DenoiseOutput {
        self.denoiser
            .process_chunk(bandpassed, &mut self.tracker, sample_rate, nominal_period_s)
    }

    pub(crate) fn push_history(&mut self, samples: impl IntoIterator<Item = f32>) {
        for s in samples {
            if self.history.len() == self.history_capacity {
                self.history.pop_front();
            }
            self.history.push_back(s);
        }
    }

    pub(crate) fn push_intervals(&mut self, intervals: &[f32]) {
        for &iv in intervals {
            if self.past_intervals.len() == self.past_intervals_capacity {
                self.past_intervals.pop_front();
            }
            self.past_intervals.push_back(iv);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_signals::reference::ReferenceWaveform;
    use std::f32::consts::PI;

    fn reference() -> ReferenceWaveform {
        let beat: Vec<f32> = (0..24)
            .map(|i| (2.0 * PI * i as f32 / 24.0).sin())
            .collect();
        ReferenceWaveform::from_samples(beat).unwrap()
    }

    #[test]
    fn test_history_evicts_fifo() {
        let mut config = PulseConfig::default();
        config.session.history_capacity = 4;
        let mut session = Session::new(&config, reference(), 24.0);

        session.push_history([1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(session.history_len(), 4);
        assert_eq!(session.history.front().copied(), Some(2.0));
    }

    #[test]
    fn test_reset_is_idempotent() {
        let config = PulseConfig::default();
        let mut session = Session::new(&config, reference(), 24.0);

        session.push_history([1.0, 2.0]);
        session.push_intervals(&[0.8, 0.9]);
        session.average_gap = Some(0.85);
        session.last_boundary = Some(0.4);
        session.round = 7;

        session.reset();
        session.reset();

        assert_eq!(session.history_len(), 0);
        assert_eq!(session.past_intervals_len(), 0);
        assert_eq!(session.average_gap(), None);
        assert_eq!(session.round(), 0);
        assert_eq!(session.phase(), DenoisePhase::Accumulating);
        assert!(session.denoiser().weights().iter().all(|&w| w == 0.0));
    }
}
