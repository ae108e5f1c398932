//! Adaptive reference-tracking denoiser.
//!
//! Processes the conditioned chunk in consecutive beat-length windows,
//! strictly in order: every window's prediction depends on the weights
//! mutated by the previous one. Each window is scored for trust against the
//! aligned reference; clean windows are blended with the model prediction
//! and adapt the weights (LMS), artifact windows are replaced by the
//! reference outright and leave the weights untouched.
//!
//! # State machine
//!
//! - `Accumulating`: warm-up while history is seeded; windows pass through
//!   and the weights learn with full trust, no artifact classification.
//! - `Steady`: normal denoise/adapt operation.
//! - `Unreliable`: the artifact streak overflowed; terminal for the session.

use ndarray::{s, Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::reference::ReferenceTracker;

/// Denoiser lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenoisePhase {
    /// Fewer than the minimum chunks buffered
    Accumulating,
    /// Normal denoise/adapt operation
    Steady,
    /// Artifact streak overflowed; session must be restarted
    Unreliable,
}

/// Denoiser configuration
///
/// The trust and learning constants are deliberately tunable; defaults are
/// validated against the synthetic-scenario tests rather than fixed by
/// contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenoiseConfig {
    /// Trust floor assigned to the worst windows
    pub min_trust: f32,
    /// Trust ceiling for perfectly matching windows
    pub max_trust: f32,
    /// Windows below this trust are artifacts
    pub trust_threshold: f32,
    /// Steepness of the tanh trust mapping
    pub trust_gamma: f32,
    /// Scale of the model share in the clean-window blend
    pub blend_beta: f32,
    /// LMS step, normalized by reference window energy
    pub mu: f32,
    /// Per-chunk decay of the LMS step
    pub mu_decay: f32,
    /// Reject windows whose amplitude ratio to the reference leaves the band
    pub amplitude_gate: bool,
    /// Lower amplitude-ratio bound
    pub amplitude_low: f32,
    /// Upper amplitude-ratio bound
    pub amplitude_high: f32,
    /// Consecutive artifact windows before the session is declared unreadable
    pub artifact_streak_limit: usize,
    /// Chunks spent seeding before artifact classification starts
    pub warmup_chunks: usize,
    /// Guard for degenerate norms
    pub epsilon: f32,
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self {
            min_trust: 0.05,
            max_trust: 0.95,
            trust_threshold: 0.35,
            trust_gamma: 1.25,
            blend_beta: 0.85,
            mu: 0.6,
            mu_decay: 0.02,
            amplitude_gate: true,
            amplitude_low: 0.5,
            amplitude_high: 1.5,
            artifact_streak_limit: 5,
            warmup_chunks: 3,
            epsilon: 1e-6,
        }
    }
}

/// Per-chunk denoiser output
#[derive(Debug, Clone)]
pub struct DenoiseOutput {
    /// Cleaned chunk, same length as the input
    pub denoised: Array1<f32>,
    /// Full windows processed
    pub windows: usize,
    /// Windows classified as artifact and replaced by the reference
    pub artifact_windows: usize,
    /// Raised when the artifact streak overflowed
    pub not_reading: bool,
    /// Phase that governed this chunk
    pub phase: DenoisePhase,
}

/// Adaptive LMS denoiser with per-window trust scoring.
pub struct AdaptiveDenoiser {
    config: DenoiseConfig,
    taps: usize,
    /// One weight row per output sample of the 1-second window
    weights: Array2<f32>,
    artifact_streak: usize,
    rounds: u64,
    phase: DenoisePhase,
}

impl AdaptiveDenoiser {
    /// `taps` is the window length in samples (one nominal beat period,
    /// i.e. samples-per-second of the source).
    pub fn new(taps: usize, config: DenoiseConfig) -> Self {
        Self {
            weights: Array2::zeros((taps, taps)),
            taps,
            config,
            artifact_streak: 0,
            rounds: 0,
            phase: DenoisePhase::Accumulating,
        }
    }

    pub fn taps(&self) -> usize {
        self.taps
    }

    pub fn phase(&self) -> DenoisePhase {
        self.phase
    }

    pub fn artifact_streak(&self) -> usize {
        self.artifact_streak
    }

    pub fn weights(&self) -> &Array2<f32> {
        &self.weights
    }

    /// Zero the weights and return to `Accumulating`.
    pub fn reset(&mut self) {
        self.weights.fill(0.0);
        self.artifact_streak = 0;
        self.rounds = 0;
        self.phase = DenoisePhase::Accumulating;
    }

    /// Trust in a window given its residual and reference norms: high when
    /// the observed waveform agrees with the learned pattern, low when the
    /// residual dominates the reference's own energy.
    pub fn trust_factor(&self, residual_norm: f32, reference_norm: f32) -> f32 {
        let c = &self.config;
        let ratio = residual_norm / (reference_norm + c.epsilon);
        let t = c.min_trust + (c.max_trust - c.min_trust) * (1.0 - (c.trust_gamma * ratio).tanh());
        t.clamp(c.min_trust, c.max_trust)
    }

    /// Denoise one conditioned chunk. `nominal_period_s` is the current
    /// beat-period estimate used to size the reference alignment.
    pub fn process_chunk(
        &mut self,
        signal: &Array1<f32>,
        tracker: &mut ReferenceTracker,
        fs: f32,
        nominal_period_s: f32,
    ) -> DenoiseOutput {
        if self.phase == DenoisePhase::Unreliable {
            return DenoiseOutput {
                denoised: signal.clone(),
                windows: 0,
                artifact_windows: 0,
                not_reading: true,
                phase: DenoisePhase::Unreliable,
            };
        }

        if self.phase == DenoisePhase::Accumulating && self.rounds >= self.config.warmup_chunks as u64
        {
            debug!(rounds = self.rounds, "denoiser seeded, entering steady phase");
            self.phase = DenoisePhase::Steady;
        }
        let phase = self.phase;
        let seeding = phase == DenoisePhase::Accumulating;

        let c = self.config.clone();
        let mu_eff = c.mu / (1.0 + c.mu_decay * self.rounds as f32);

        let n = signal.len();
        let mut out = Array1::zeros(n);
        let mut windows = 0usize;
        let mut artifacts = 0usize;
        let mut not_reading = false;

        let mut start = 0usize;
        while start + self.taps <= n {
            let window = signal.slice(s![start..start + self.taps]).to_owned();
            let aligned = tracker.align(&window, fs, nominal_period_s);
            let x = aligned.segment;

            let norm_x = l2_norm(&x);
            let norm_s = l2_norm(&window);
            let degenerate = norm_x < c.epsilon || norm_s < c.epsilon;

            let y = self.weights.dot(&x);
            let residual = &window - &y;
            let trust = if degenerate {
                c.min_trust
            } else {
                self.trust_factor(l2_norm(&residual), norm_x)
            };

            let amp_ratio = std(&window) / (std(&x) + c.epsilon);
            let amp_outlier =
                c.amplitude_gate && (amp_ratio < c.amplitude_low || amp_ratio > c.amplitude_high);

            let cleaned = if seeding {
                // Seed the filter with full trust; no artifact verdicts yet.
                self.update_weights(c.max_trust, &residual, &x, norm_x, mu_eff);
                window.clone()
            } else if trust < c.trust_threshold || amp_outlier {
                artifacts += 1;
                self.artifact_streak += 1;
                debug!(
                    trust,
                    amp_ratio,
                    streak = self.artifact_streak,
                    "artifact window replaced by reference"
                );
                if self.artifact_streak >= c.artifact_streak_limit {
                    self.phase = DenoisePhase::Unreliable;
                    not_reading = true;
                }
                x.clone()
            } else {
                self.artifact_streak = 0;
                let blend = (c.blend_beta * (1.0 - trust)).clamp(0.0, 1.0);
                self.update_weights(trust, &residual, &x, norm_x, mu_eff);
                &window * (1.0 - blend) + &y * blend
            };

            out.slice_mut(s![start..start + self.taps]).assign(&cleaned);
            windows += 1;
            start += self.taps;

            if not_reading {
                break;
            }
        }

        // Trailing partial window (and anything after a streak overflow)
        // passes through untouched.
        if start < n {
            out.slice_mut(s![start..]).assign(&signal.slice(s![start..]));
        }

        self.rounds += 1;

        DenoiseOutput {
            denoised: out,
            windows,
            artifact_windows: artifacts,
            not_reading,
            phase,
        }
    }

    /// `W += mu_eff * outer(t * e, x)`, step normalized by the reference
    /// window energy to keep adaptation stable across amplitudes.
    fn update_weights(
        &mut self,
        trust: f32,
        residual: &Array1<f32>,
        x: &Array1<f32>,
        norm_x: f32,
        mu_eff: f32,
    ) {
        let scale = mu_eff * trust / (norm_x * norm_x + self.config.epsilon);
        for i in 0..self.taps {
            let ei = residual[i] * scale;
            if ei == 0.0 {
                continue;
            }
            for j in 0..self.taps {
                self.weights[[i, j]] += ei * x[j];
            }
        }
    }
}

fn l2_norm(v: &Array1<f32>) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn std(v: &Array1<f32>) -> f32 {
    let mean = v.mean().unwrap_or(0.0);
    let variance = v.mapv(|x| (x - mean).powi(2)).mean().unwrap_or(0.0);
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceWaveform;
    use std::f32::consts::PI;

    const FS: f32 = 24.0;
    const TAPS: usize = 24;

    fn sine_reference() -> ReferenceWaveform {
        let beat: Vec<f32> = (0..TAPS)
            .map(|i| (2.0 * PI * i as f32 / TAPS as f32).sin())
            .collect();
        ReferenceWaveform::from_samples(beat).unwrap()
    }

    fn sine_chunk(seconds: usize) -> Array1<f32> {
        (0..seconds * TAPS)
            .map(|i| (2.0 * PI * (i as f32 / FS)).sin())
            .collect()
    }

    fn garbage_chunk(seconds: usize) -> Array1<f32> {
        // Large-amplitude sawtooth: wrong shape and wrong amplitude.
        (0..seconds * TAPS)
            .map(|i| ((i % 7) as f32 - 3.0) * 20.0)
            .collect()
    }

    #[test]
    fn test_trust_monotone_in_residual() {
        let dn = AdaptiveDenoiser::new(TAPS, DenoiseConfig::default());
        let low_residual = dn.trust_factor(0.5, 5.0);
        let high_residual = dn.trust_factor(2.0, 5.0);
        assert!(low_residual > high_residual);

        // Extremes pin to the configured bounds.
        assert!((dn.trust_factor(0.0, 5.0) - 0.95).abs() < 1e-5);
        assert!((dn.trust_factor(1e6, 5.0) - 0.05).abs() < 1e-3);
    }

    #[test]
    fn test_clean_signal_survives_denoising() {
        let mut dn = AdaptiveDenoiser::new(TAPS, DenoiseConfig::default());
        let mut tracker = ReferenceTracker::new(sine_reference());
        let chunk = sine_chunk(5);

        // Warm-up chunks seed the weights.
        for _ in 0..3 {
            let out = dn.process_chunk(&chunk, &mut tracker, FS, 1.0);
            assert_eq!(out.phase, DenoisePhase::Accumulating);
            assert_eq!(out.artifact_windows, 0);
        }

        let out = dn.process_chunk(&chunk, &mut tracker, FS, 1.0);
        assert_eq!(out.phase, DenoisePhase::Steady);
        assert_eq!(out.artifact_windows, 0, "clean windows flagged as artifact");
        assert!(!out.not_reading);

        // Output stays close to the input.
        let corr: f32 = out
            .denoised
            .iter()
            .zip(chunk.iter())
            .map(|(a, b)| a * b)
            .sum::<f32>()
            / (l2_norm(&out.denoised) * l2_norm(&chunk) + 1e-6);
        assert!(corr > 0.9, "denoised diverged from clean input: corr {}", corr);
    }

    #[test]
    fn test_no_learning_on_artifact() {
        let config = DenoiseConfig {
            warmup_chunks: 1,
            ..Default::default()
        };
        let mut dn = AdaptiveDenoiser::new(TAPS, config);
        let mut tracker = ReferenceTracker::new(sine_reference());

        dn.process_chunk(&sine_chunk(5), &mut tracker, FS, 1.0);

        let before = dn.weights().clone();
        let out = dn.process_chunk(&garbage_chunk(2), &mut tracker, FS, 1.0);

        assert!(out.artifact_windows > 0, "garbage windows not flagged");
        assert_eq!(
            dn.weights(),
            &before,
            "weights mutated by artifact windows"
        );
    }

    #[test]
    fn test_streak_overflow_is_terminal() {
        let config = DenoiseConfig {
            warmup_chunks: 0,
            artifact_streak_limit: 2,
            ..Default::default()
        };
        let mut dn = AdaptiveDenoiser::new(TAPS, config);
        let mut tracker = ReferenceTracker::new(sine_reference());

        let out = dn.process_chunk(&garbage_chunk(3), &mut tracker, FS, 1.0);
        assert!(out.not_reading);
        assert_eq!(dn.phase(), DenoisePhase::Unreliable);

        // Terminal: even a clean chunk is refused now.
        let again = dn.process_chunk(&sine_chunk(3), &mut tracker, FS, 1.0);
        assert!(again.not_reading);
        assert_eq!(again.windows, 0);
    }

    #[test]
    fn test_reset_restores_pristine_state() {
        let config = DenoiseConfig {
            warmup_chunks: 0,
            artifact_streak_limit: 2,
            ..Default::default()
        };
        let mut dn = AdaptiveDenoiser::new(TAPS, config);
        let mut tracker = ReferenceTracker::new(sine_reference());
        dn.process_chunk(&garbage_chunk(3), &mut tracker, FS, 1.0);

        dn.reset();
        assert_eq!(dn.phase(), DenoisePhase::Accumulating);
        assert_eq!(dn.artifact_streak(), 0);
        assert!(dn.weights().iter().all(|&w| w == 0.0));

        // Resetting twice is the same as resetting once.
        let snapshot = dn.weights().clone();
        dn.reset();
        assert_eq!(dn.weights(), &snapshot);
        assert_eq!(dn.phase(), DenoisePhase::Accumulating);
    }
}
