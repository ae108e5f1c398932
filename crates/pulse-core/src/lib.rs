//! # pulse-core
//!
//! Session state, configuration, and the per-chunk pipeline engine for
//! streaming cardiac pulse estimation.
//!
//! The engine wires the `pulse-signals` stages together:
//! conditioner -> reference tracker -> adaptive denoiser -> peak/interval
//! extractor -> interval forecaster, with all cross-chunk memory held in an
//! explicit [`Session`] value. Sessions are independent of each other;
//! chunks within one session are strictly serialized (see [`worker`]).

pub mod config;
pub mod domain;
pub mod engine;
pub mod session;
pub mod vitals;
pub mod worker;

pub use config::{ConfigError, PulseConfig, SessionConfig};
pub use domain::{ChunkOutput, EngineError, SessionId, VitalsRecord};
pub use engine::Engine;
pub use session::Session;
pub use vitals::VitalsAggregator;
pub use worker::{SessionRegistry, SessionWorker};
