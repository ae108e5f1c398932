//! # pulse-signals
//!
//! Streaming pulse-waveform processing for camera-derived intensity signals.
//!
//! This crate provides:
//! - **Signal conditioning**: robust normalization and zero-phase band-pass filtering
//! - **Reference tracking**: time-stretch alignment of a canonical beat template
//! - **Adaptive denoising**: per-window trust scoring with LMS-style weight adaptation
//! - **Beat extraction**: peak detection and boundary-corrected inter-beat intervals
//! - **Interval forecasting**: short-horizon autoregressive beat-timing prediction
//!
//! ## Example
//!
//! ```ignore
//! use pulse_signals::{Conditioner, ReferenceTracker, AdaptiveDenoiser};
//!
//! let conditioner = Conditioner::new();
//! let bandpassed = conditioner.condition(&chunk, fps)?;
//!
//! let mut denoiser = AdaptiveDenoiser::new(fps as usize, Default::default());
//! let out = denoiser.process_chunk(&bandpassed, &mut tracker, fps, 1.0);
//! ```

pub mod denoise;
pub mod dsp;
pub mod forecast;
pub mod intervals;
pub mod peaks;
pub mod reference;

pub use denoise::{AdaptiveDenoiser, DenoiseConfig, DenoiseOutput, DenoisePhase};
pub use dsp::{ConditionError, Conditioner, ConditionerConfig, SpectralAnalyzer, SpectralEstimate};
pub use forecast::{ArForecaster, Forecast, ForecastConfig, ForecastError, ForecastMethod};
pub use intervals::IntervalSequence;
pub use peaks::{PeakConfig, PeakExtractor, SeamOutcome};
pub use reference::{AlignedReference, ReferenceError, ReferenceTracker, ReferenceWaveform, TrackerConfig};
