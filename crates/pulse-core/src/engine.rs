//! Per-chunk pipeline orchestration.
//!
//! One synchronous pass per inbound chunk: condition, denoise against the
//! tracked reference, extract beat intervals, forecast ahead of the next
//! acquisition gap. All cross-chunk memory is read from and written back to
//! the [`Session`] passed in; the engine itself is immutable and shared
//! freely across sessions.
//!
//! Error policy: transient signal faults are corrected in place and never
//! surface; sustained faults (conditioning failure, artifact streak) discard
//! the session state and surface as an error or the `not_reading` flag; a
//! forecaster that cannot fit degrades to a flat forecast, never an error.

use ndarray::Array1;
use tracing::{debug, warn};

use pulse_signals::denoise::DenoisePhase;
use pulse_signals::dsp::Conditioner;
use pulse_signals::forecast::{ArForecaster, Forecast, ForecastError};
use pulse_signals::peaks::PeakExtractor;
use pulse_signals::reference::ReferenceWaveform;
use pulse_signals::IntervalSequence;

use crate::config::{ConfigError, PulseConfig};
use crate::domain::{ChunkOutput, EngineError};
use crate::session::Session;

/// Stateless pipeline front end. Chunks must arrive in temporal order, one
/// per call, at a constant sample rate per session; the reference tracker's
/// continuity assumptions do not tolerate gaps or reordering.
pub struct Engine {
    config: PulseConfig,
    reference: ReferenceWaveform,
    conditioner: Conditioner,
    extractor: PeakExtractor,
    forecaster: ArForecaster,
}

impl Engine {
    pub fn new(config: PulseConfig, reference: ReferenceWaveform) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            conditioner: Conditioner::with_config(config.conditioner.clone()),
            extractor: PeakExtractor::with_config(config.peaks.clone()),
            forecaster: ArForecaster::with_config(config.forecast.clone()),
            reference,
            config,
        })
    }

    pub fn config(&self) -> &PulseConfig {
        &self.config
    }

    /// Start a fresh session for one stream at the given sample rate.
    pub fn create_session(&self, sample_rate: f32) -> Session {
        Session::new(&self.config, self.reference.clone(), sample_rate)
    }

    /// Process one chunk against the session's accumulated state.
    pub fn process_chunk(
        &self,
        session: &mut Session,
        samples: &[f32],
        sample_rate: f32,
    ) -> Result<ChunkOutput, EngineError> {
        if samples.is_empty() {
            return Err(EngineError::EmptyChunk);
        }
        if (sample_rate - session.sample_rate()).abs() > 1e-3 {
            return Err(EngineError::SampleRateChanged {
                previous: session.sample_rate(),
                got: sample_rate,
            });
        }

        let chunk = Array1::from(samples.to_vec());
        let bandpassed = match self.conditioner.condition(&chunk, sample_rate) {
            Ok(filtered) => filtered,
            Err(err) => {
                // Sustained fault: the caller must start a new session.
                warn!(%err, "conditioning failed, discarding session state");
                session.reset();
                return Err(err.into());
            }
        };

        let nominal_period = session.average_gap.unwrap_or(1.0);
        let denoise = session.denoise_chunk(&bandpassed, sample_rate, nominal_period);

        if denoise.phase == DenoisePhase::Accumulating {
            debug!(round = session.round, "buffering warm-up chunk");
            session.push_history(bandpassed.iter().copied());
            session.round += 1;
            return Ok(ChunkOutput {
                denoised: denoise.denoised.to_vec(),
                bandpassed: bandpassed.to_vec(),
                intervals: IntervalSequence::default(),
                forecast: None,
                new_start: false,
                not_reading: false,
                warming_up: true,
                bpm: None,
                spectral_bpm: None,
                vitals: None,
            });
        }

        if denoise.not_reading {
            warn!(
                artifact_windows = denoise.artifact_windows,
                "artifact streak overflowed, session unreadable"
            );
            session.reset();
            return Ok(ChunkOutput {
                denoised: denoise.denoised.to_vec(),
                bandpassed: bandpassed.to_vec(),
                intervals: IntervalSequence::default(),
                forecast: None,
                new_start: false,
                not_reading: true,
                warming_up: false,
                bpm: None,
                spectral_bpm: None,
                vitals: None,
            });
        }

        session.push_history(denoise.denoised.iter().copied());

        // Beat extraction with seam reconciliation against the previous chunk.
        let fresh = self
            .extractor
            .extract_intervals(&denoise.denoised, sample_rate, session.average_gap);
        let seam = self
            .extractor
            .merge_at_seam(session.last_boundary, &fresh, session.average_gap);

        session.last_boundary = seam.intervals.last();
        session.push_intervals(seam.intervals.interior());
        session.average_gap = self
            .extractor
            .update_average_gap(session.average_gap, &seam.intervals);

        let bpm = seam.intervals.mean_interior().map(|gap| 60.0 / gap);
        // Cross-check over the whole history tail: the longer window buys
        // frequency resolution the single chunk cannot provide.
        let spectral_bpm = {
            let tail: Array1<f32> = session.history.iter().copied().collect();
            session
                .spectral
                .estimate(&tail, sample_rate)
                .map(|e| e.bpm)
        };

        let forecast = self.forecast_ahead(session);
        // The aggregator stitches seams itself, so it gets the unmerged
        // sequence.
        let vitals = session.vitals.observe(&fresh, seam.new_start);
        session.round += 1;

        Ok(ChunkOutput {
            denoised: denoise.denoised.to_vec(),
            bandpassed: bandpassed.to_vec(),
            intervals: seam.intervals,
            forecast,
            new_start: seam.new_start,
            not_reading: false,
            warming_up: false,
            bpm,
            spectral_bpm,
            vitals,
        })
    }

    /// Forecast beat timing across the next acquisition gap. Insufficient
    /// history degrades to a flat forecast from the average gap when one is
    /// known, and to no forecast at all otherwise.
    fn forecast_ahead(&self, session: &Session) -> Option<Forecast> {
        let history: Vec<f32> = session.past_intervals.iter().copied().collect();
        let last_boundary = session.last_boundary.unwrap_or(0.0);
        let horizon = self.config.session.forecast_horizon_s;

        match self.forecaster.forecast(&history, last_boundary, horizon) {
            Ok(forecast) => Some(forecast),
            Err(ForecastError::InsufficientHistory { len, min }) => {
                debug!(len, min, "history too short, degrading forecast");
                session
                    .average_gap
                    .map(|gap| self.forecaster.flat(gap, last_boundary, horizon))
            }
        }
    }
}
