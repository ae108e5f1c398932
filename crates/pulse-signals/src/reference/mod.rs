//! Canonical beat reference and time-stretch alignment.
//!
//! One beat-shaped template is loaded at process start and, per window,
//! stretched and phase-shifted to best match the incoming signal. The search
//! over stretch factors is a discrete grid: cross-correlation over resampled
//! length is not smooth in the factor, so there is no gradient shortcut.

use ndarray::Array1;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unparseable sample {token:?}")]
    Parse { token: String },
    #[error("reference file holds no samples")]
    Empty,
    #[error("reference waveform has no amplitude")]
    Degenerate,
}

/// One canonical heartbeat template, zero-mean and unit-dispersion.
#[derive(Debug, Clone)]
pub struct ReferenceWaveform {
    samples: Array1<f32>,
}

impl ReferenceWaveform {
    /// Load from a file holding either a Python-style list literal
    /// (`[0.1, 0.2, ...]`) or newline/comma separated floats.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ReferenceError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_text(&content)
    }

    pub fn from_text(content: &str) -> Result<Self, ReferenceError> {
        let trimmed = content.trim().trim_start_matches('[').trim_end_matches(']');
        let mut samples = Vec::new();
        for token in trimmed.split(|c: char| c == ',' || c.is_whitespace()) {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let value: f32 = token.parse().map_err(|_| ReferenceError::Parse {
                token: token.to_string(),
            })?;
            samples.push(value);
        }
        Self::from_samples(samples)
    }

    /// Build from raw samples, normalizing to zero mean and unit dispersion.
    pub fn from_samples(samples: Vec<f32>) -> Result<Self, ReferenceError> {
        if samples.len() < 4 {
            return Err(ReferenceError::Empty);
        }
        let arr = Array1::from(samples);
        let mean = arr.mean().unwrap_or(0.0);
        let centered = arr.mapv(|x| x - mean);
        let std = centered.mapv(|x| x * x).mean().unwrap_or(0.0).sqrt();
        if std < 1e-6 {
            return Err(ReferenceError::Degenerate);
        }
        Ok(Self {
            samples: centered.mapv(|x| x / std),
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &Array1<f32> {
        &self.samples
    }

    /// Resample to `target_len` by linear interpolation of sample index.
    pub fn resampled(&self, target_len: usize) -> Array1<f32> {
        resample_linear(&self.samples, target_len)
    }
}

fn resample_linear(source: &Array1<f32>, target_len: usize) -> Array1<f32> {
    let n = source.len();
    if target_len == 0 || n == 0 {
        return Array1::zeros(0);
    }
    if target_len == n {
        return source.clone();
    }
    if target_len == 1 || n == 1 {
        return Array1::from_elem(target_len, source[0]);
    }

    let mut out = Array1::zeros(target_len);
    let scale = (n - 1) as f32 / (target_len - 1) as f32;
    for i in 0..target_len {
        let pos = i as f32 * scale;
        let lo = pos.floor() as usize;
        let hi = (lo + 1).min(n - 1);
        let frac = pos - lo as f32;
        out[i] = source[lo] * (1.0 - frac) + source[hi] * frac;
    }
    out
}

/// Tracker configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TrackerConfig {
    /// Lower bound of the stretch-factor search (fraction of nominal beat)
    pub stretch_min: f32,
    /// Upper bound of the stretch-factor search
    pub stretch_max: f32,
    /// Grid steps over the full search range
    pub full_steps: usize,
    /// Grid steps when narrowed around the previous winner
    pub narrowed_steps: usize,
    /// Half-width of the narrowed search around the previous winner
    pub prior_margin: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            stretch_min: 0.6,
            stretch_max: 1.2,
            full_steps: 13,
            narrowed_steps: 5,
            prior_margin: 0.15,
        }
    }
}

/// Reference segment aligned to one signal window.
#[derive(Debug, Clone)]
pub struct AlignedReference {
    /// Template resampled, phase-shifted, and length-matched to the window
    pub segment: Array1<f32>,
    /// Winning stretch factor
    pub stretch: f32,
    /// Normalized cross-correlation of the winning candidate
    pub score: f32,
}

/// Stretch-and-align search over the reference template.
///
/// The winning stretch factor is kept as a prior that narrows the next
/// call's search range, exploiting temporal continuity of heart rate.
pub struct ReferenceTracker {
    config: TrackerConfig,
    reference: ReferenceWaveform,
    prior_stretch: Option<f32>,
}

impl ReferenceTracker {
    pub fn new(reference: ReferenceWaveform) -> Self {
        Self::with_config(reference, TrackerConfig::default())
    }

    pub fn with_config(reference: ReferenceWaveform, config: TrackerConfig) -> Self {
        Self {
            config,
            reference,
            prior_stretch: None,
        }
    }

    pub fn prior_stretch(&self) -> Option<f32> {
        self.prior_stretch
    }

    /// Forget the stretch prior (session reset).
    pub fn reset(&mut self) {
        self.prior_stretch = None;
    }

    /// Find the best (stretch, phase) alignment of the reference against
    /// `window`. `nominal_period_s` is the current beat-period estimate the
    /// stretch factors are relative to.
    pub fn align(&mut self, window: &Array1<f32>, fs: f32, nominal_period_s: f32) -> AlignedReference {
        let base_len = (nominal_period_s * fs).max(4.0);

        let (lo, hi, steps) = match self.prior_stretch {
            Some(prior) => (
                (prior - self.config.prior_margin).max(self.config.stretch_min),
                (prior + self.config.prior_margin).min(self.config.stretch_max),
                self.config.narrowed_steps,
            ),
            None => (
                self.config.stretch_min,
                self.config.stretch_max,
                self.config.full_steps,
            ),
        };

        let window_norm = l2_norm(window);
        let mut best: Option<AlignedReference> = None;

        for i in 0..=steps {
            let factor = lo + (i as f32 / steps as f32) * (hi - lo);
            let beat_len = ((factor * base_len).round() as usize).max(4);
            let beat = self.reference.resampled(beat_len);

            for shift in 0..beat_len {
                let (score, segment) = correlate_tiled(window, &beat, shift, window_norm);
                let better = match &best {
                    Some(b) => score > b.score,
                    None => true,
                };
                if better {
                    best = Some(AlignedReference {
                        segment,
                        stretch: factor,
                        score,
                    });
                }
            }
        }

        let aligned = best.unwrap_or_else(|| AlignedReference {
            segment: Array1::zeros(window.len()),
            stretch: 1.0,
            score: 0.0,
        });
        self.prior_stretch = Some(aligned.stretch);
        aligned
    }
}

/// Tile `beat` starting at `shift` to the window length and score the match.
fn correlate_tiled(
    window: &Array1<f32>,
    beat: &Array1<f32>,
    shift: usize,
    window_norm: f32,
) -> (f32, Array1<f32>) {
    let n = window.len();
    let m = beat.len();
    let mut segment = Array1::zeros(n);
    for i in 0..n {
        segment[i] = beat[(i + shift) % m];
    }
    let seg_norm = l2_norm(&segment);
    let dot: f32 = window
        .iter()
        .zip(segment.iter())
        .map(|(a, b)| a * b)
        .sum();
    let score = dot / (window_norm * seg_norm + 1e-6);
    (score, segment)
}

fn l2_norm(v: &Array1<f32>) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}
