//! End-to-end pipeline tests over synthetic rhythms.

use std::f32::consts::PI;
use std::sync::Arc;

use pulse_core::{Engine, EngineError, PulseConfig, SessionRegistry};
use pulse_signals::denoise::DenoisePhase;
use pulse_signals::reference::ReferenceWaveform;

const FS: f32 = 24.0;
const CHUNK_LEN: usize = 120; // 5 seconds

fn reference() -> ReferenceWaveform {
    let beat: Vec<f32> = (0..24)
        .map(|i| -(2.0 * PI * i as f32 / 24.0).cos())
        .collect();
    ReferenceWaveform::from_samples(beat).unwrap()
}

/// Continuous 60 BPM train; peaks land mid-second at every round.
fn beat_chunk(round: usize) -> Vec<f32> {
    (0..CHUNK_LEN)
        .map(|i| {
            let idx = round * CHUNK_LEN + i;
            -(2.0 * PI * idx as f32 / 24.0).cos()
        })
        .collect()
}

/// Out-of-band oscillation: conditions fine, denoises to artifacts.
fn unreadable_chunk() -> Vec<f32> {
    (0..CHUNK_LEN)
        .map(|i| (2.0 * PI * 8.0 * (i as f32 / FS)).sin())
        .collect()
}

fn engine() -> Engine {
    Engine::new(PulseConfig::default(), reference()).unwrap()
}

#[test]
fn test_clean_rhythm_end_to_end() {
    let engine = engine();
    let mut session = engine.create_session(FS);
    let warmup = engine.config().denoise.warmup_chunks;

    for round in 0..10 {
        let out = engine
            .process_chunk(&mut session, &beat_chunk(round), FS)
            .unwrap();

        if round < warmup {
            assert!(out.warming_up, "round {} should warm up", round);
            assert!(out.intervals.is_empty());
            continue;
        }

        assert!(!out.warming_up);
        assert!(!out.not_reading);
        assert!(!out.new_start, "steady rhythm must not restart the cycle");
        assert_eq!(out.denoised.len(), CHUNK_LEN);

        let bpm = out.bpm.expect("interior intervals present");
        assert!((bpm - 60.0).abs() < 5.0, "round {}: bpm {}", round, bpm);

        let forecast = out.forecast.expect("forecast or flat fallback");
        let horizon = engine.config().session.forecast_horizon_s;
        assert!(
            (forecast.intervals.total() - horizon).abs() < 0.2,
            "round {}: forecast sums to {}",
            round,
            forecast.intervals.total()
        );
        assert!(forecast.intervals.as_slice().iter().all(|&v| v >= 0.0));

        if let Some(spectral) = out.spectral_bpm {
            assert!((spectral - 60.0).abs() < 10.0, "spectral bpm {}", spectral);
        }
    }

    let gap = session.average_gap().expect("gap learned");
    assert!((gap - 1.0).abs() < 0.05, "average gap {}", gap);
    assert!(session.past_intervals_len() >= 5);
}

#[test]
fn test_unreadable_signal_flags_and_resets() {
    let engine = engine();
    let mut session = engine.create_session(FS);

    // Clean warm-up plus one steady chunk.
    for round in 0..4 {
        engine
            .process_chunk(&mut session, &beat_chunk(round), FS)
            .unwrap();
    }
    assert_eq!(session.phase(), DenoisePhase::Steady);

    // Sustained junk: every window is an artifact, the streak overflows.
    let out = engine
        .process_chunk(&mut session, &unreadable_chunk(), FS)
        .unwrap();
    assert!(out.not_reading);
    assert!(out.intervals.is_empty());
    assert!(out.forecast.is_none());

    // Session state was discarded; the stream starts over.
    assert_eq!(session.round(), 0);
    assert_eq!(session.phase(), DenoisePhase::Accumulating);
    assert_eq!(session.average_gap(), None);
    assert_eq!(session.past_intervals_len(), 0);

    let next = engine
        .process_chunk(&mut session, &beat_chunk(0), FS)
        .unwrap();
    assert!(next.warming_up, "fresh session warms up again");
}

#[test]
fn test_short_chunk_is_hard_error_and_resets() {
    let engine = engine();
    let mut session = engine.create_session(FS);

    for round in 0..4 {
        engine
            .process_chunk(&mut session, &beat_chunk(round), FS)
            .unwrap();
    }

    let result = engine.process_chunk(&mut session, &[1.0; 10], FS);
    assert!(matches!(result, Err(EngineError::Condition(_))));
    assert_eq!(session.round(), 0, "state discarded after hard failure");
}

#[test]
fn test_empty_chunk_rejected_without_reset() {
    let engine = engine();
    let mut session = engine.create_session(FS);
    engine
        .process_chunk(&mut session, &beat_chunk(0), FS)
        .unwrap();

    assert!(matches!(
        engine.process_chunk(&mut session, &[], FS),
        Err(EngineError::EmptyChunk)
    ));
    assert_eq!(session.round(), 1, "empty input must not clobber state");
}

#[test]
fn test_sample_rate_change_rejected() {
    let engine = engine();
    let mut session = engine.create_session(FS);
    assert!(matches!(
        engine.process_chunk(&mut session, &beat_chunk(0), 30.0),
        Err(EngineError::SampleRateChanged { .. })
    ));
}

#[test]
fn test_registry_serializes_per_session() {
    let engine = Arc::new(engine());
    let registry = SessionRegistry::new(Arc::clone(&engine));

    let a = registry.start_session(FS);
    let b = registry.start_session(FS);
    assert_eq!(registry.live_sessions(), 2);

    for round in 0..6 {
        let out_a = registry.process(&a, beat_chunk(round), FS).unwrap();
        let out_b = registry.process(&b, beat_chunk(round), FS).unwrap();

        // Independent sessions see identical input, so they agree.
        assert_eq!(out_a.warming_up, out_b.warming_up);
        if let (Some(x), Some(y)) = (out_a.bpm, out_b.bpm) {
            assert!((x - y).abs() < 1e-3);
        }
    }

    registry.end_session(&a);
    assert_eq!(registry.live_sessions(), 1);
    assert!(matches!(
        registry.process(&a, beat_chunk(0), FS),
        Err(EngineError::UnknownSession)
    ));

    registry.end_session(&b);
    assert_eq!(registry.live_sessions(), 0);
}

#[test]
fn test_vitals_emitted_periodically() {
    let engine = engine();
    let mut session = engine.create_session(FS);

    let mut records = 0;
    for round in 0..14 {
        let out = engine
            .process_chunk(&mut session, &beat_chunk(round), FS)
            .unwrap();
        if let Some(vitals) = out.vitals {
            records += 1;
            assert!((vitals.bpm - 60.0).abs() < 8.0, "vitals bpm {}", vitals.bpm);
            assert!(vitals.hrv < 0.3, "steady rhythm hrv {}", vitals.hrv);
        }
    }
    assert!(records >= 2, "expected periodic vitals, got {}", records);
}
