//! Domain types shared across the engine, worker, and collaborators.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use pulse_signals::{ConditionError, Forecast, IntervalSequence};

/// Opaque per-stream session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId([u8; 16]);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().into_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the core reports for one processed chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkOutput {
    /// Cleaned pulse waveform
    pub denoised: Vec<f32>,
    /// Raw band-passed chunk, kept for diagnostics
    pub bandpassed: Vec<f32>,
    /// Boundary-corrected intervals covering this chunk
    pub intervals: IntervalSequence,
    /// Upcoming beat timing, trimmed to the forecast horizon
    pub forecast: Option<Forecast>,
    /// Beat-cycle bookkeeping restarted at the chunk seam
    pub new_start: bool,
    /// Session declared unreadable; state has been discarded
    pub not_reading: bool,
    /// Still buffering initial chunks; intervals/forecast not yet produced
    pub warming_up: bool,
    /// 60 / mean interior interval
    pub bpm: Option<f32>,
    /// Independent FFT cross-check of the rate
    pub spectral_bpm: Option<f32>,
    /// Periodic aggregate for the persistence collaborator
    pub vitals: Option<VitalsRecord>,
}

/// Aggregate measurement handed to the external persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalsRecord {
    pub bpm: f32,
    /// Standard deviation of the accumulated intervals
    pub hrv: f32,
    pub average_gap: f32,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("signal conditioning failed: {0}")]
    Condition(#[from] ConditionError),
    #[error("chunk contains no samples")]
    EmptyChunk,
    #[error("sample rate changed mid-session: {previous} then {got}")]
    SampleRateChanged { previous: f32, got: f32 },
    #[error("unknown session")]
    UnknownSession,
    #[error("session worker has shut down")]
    WorkerClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_chunk_output_serializes() {
        let out = ChunkOutput {
            denoised: vec![0.0, 1.0],
            bandpassed: vec![0.1, 0.9],
            intervals: IntervalSequence::new(vec![0.5, 1.0, 0.5]),
            forecast: None,
            new_start: false,
            not_reading: false,
            warming_up: false,
            bpm: Some(60.0),
            spectral_bpm: None,
            vitals: None,
        };
        let json = serde_json::to_string(&out).unwrap();
        assert!(json.contains("\"bpm\":60.0"));
    }
}
