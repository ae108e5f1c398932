//! DSP (Digital Signal Processing) module
//!
//! Provides the conditioning front end for raw intensity chunks and
//! spectral diagnostics for the cleaned pulse waveform.
//!
//! - `Conditioner` - robust normalization + zero-phase band-pass filtering
//! - `SpectralAnalyzer` - FFT-based BPM estimate with band-limited SNR

mod bandpass;
mod conditioner;
mod spectrum;

pub use bandpass::{design_bandpass_sos, min_input_len};
pub use conditioner::{ConditionError, Conditioner, ConditionerConfig};
pub use spectrum::{SpectralAnalyzer, SpectralEstimate};
