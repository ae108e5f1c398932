//! Signal conditioning front end.
//!
//! Brings a raw intensity chunk to zero mean and comparable amplitude, then
//! band-limits it to the physiological pulse band. Scaling uses the median
//! absolute deviation so a single motion spike does not compress the whole
//! chunk.

use ndarray::Array1;
use thiserror::Error;

use super::bandpass::{design_bandpass_sos, min_input_len, sosfiltfilt};

/// MAD-to-sigma factor for normally distributed data.
const MAD_SCALE: f32 = 1.4826;

#[derive(Error, Debug)]
pub enum ConditionError {
    #[error("chunk of {len} samples is too short for filter edge padding (need > {min})")]
    ChunkTooShort { len: usize, min: usize },
    #[error("signal dispersion is degenerate, cannot normalize")]
    DegenerateSignal,
    #[error("invalid pass band {low_hz}-{high_hz} Hz at fs {fs} Hz")]
    InvalidBand { low_hz: f32, high_hz: f32, fs: f32 },
}

/// Conditioner configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConditionerConfig {
    /// Low band edge in Hz (30 BPM)
    pub low_cut_hz: f32,
    /// High band edge in Hz (180 BPM)
    pub high_cut_hz: f32,
    /// Butterworth prototype order (each order yields one biquad section)
    pub order: usize,
}

impl Default for ConditionerConfig {
    fn default() -> Self {
        Self {
            low_cut_hz: 0.5,
            high_cut_hz: 3.0,
            order: 4,
        }
    }
}

/// Signal conditioner: normalization + zero-phase band-pass.
pub struct Conditioner {
    config: ConditionerConfig,
}

impl Conditioner {
    pub fn new() -> Self {
        Self::with_config(ConditionerConfig::default())
    }

    pub fn with_config(config: ConditionerConfig) -> Self {
        Self { config }
    }

    /// Smallest chunk length this conditioner will accept.
    pub fn min_chunk_len(&self) -> usize {
        min_input_len(self.config.order)
    }

    /// Normalize and band-pass one chunk.
    ///
    /// Fails hard on chunks shorter than the filter's edge-padding
    /// requirement and on signals with no usable dispersion; both conditions
    /// must be surfaced to the caller rather than papered over with zeros.
    pub fn condition(&self, samples: &Array1<f32>, fs: f32) -> Result<Array1<f32>, ConditionError> {
        let n = samples.len();
        let min = self.min_chunk_len();
        if n <= min {
            return Err(ConditionError::ChunkTooShort { len: n, min });
        }

        let normalized = self.normalize(samples)?;

        let sos = design_bandpass_sos(
            self.config.order,
            self.config.low_cut_hz as f64,
            self.config.high_cut_hz as f64,
            fs as f64,
        )?;

        let filtered = sosfiltfilt(&normalized.to_vec(), &sos);
        Ok(Array1::from(filtered))
    }

    /// Zero-mean, unit-dispersion scaling with MAD robust estimate and
    /// population-sigma fallback.
    fn normalize(&self, samples: &Array1<f32>) -> Result<Array1<f32>, ConditionError> {
        let mean = samples.mean().unwrap_or(0.0);
        let centered = samples.mapv(|x| x - mean);

        let med = median(&centered);
        let mad = median(&centered.mapv(|x| (x - med).abs()));
        let mut scale = mad * MAD_SCALE;
        if scale < 1e-6 {
            let variance = centered.mapv(|x| x * x).mean().unwrap_or(0.0);
            scale = variance.sqrt();
        }
        if scale < 1e-6 {
            return Err(ConditionError::DegenerateSignal);
        }

        Ok(centered.mapv(|x| x / scale))
    }
}

impl Default for Conditioner {
    fn default() -> Self {
        Self::new()
    }
}

fn median(values: &Array1<f32>) -> f32 {
    let mut sorted: Vec<f32> = values.to_vec();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
