//! Short-horizon autoregressive interval forecasting.
//!
//! Fits a linear AR(p) model over accumulated true inter-beat intervals and
//! predicts far enough ahead to bridge the next acquisition gap. The forecast
//! is walked cumulatively and the interval crossing the horizon is truncated
//! so the emitted durations sum to the time budget exactly.
//!
//! Every numerical failure mode is a designed branch: too little history is
//! a typed refusal, a degenerate fit falls back to a flat forecast of the
//! historical mean. Nothing here panics or propagates a fit error upward.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::intervals::IntervalSequence;

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("history of {len} intervals is below the minimum of {min}")]
    InsufficientHistory { len: usize, min: usize },
}

/// How a forecast was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForecastMethod {
    /// Autoregressive fit of the given order
    Ar { order: usize },
    /// Historical mean repeated to fill the horizon
    FlatFallback,
}

/// Forecast intervals summing exactly to the requested horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub intervals: IntervalSequence,
    pub method: ForecastMethod,
}

/// Forecaster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Below this many accumulated intervals, forecasting is refused
    pub min_history: usize,
    /// Cap on the AR order
    pub max_order: usize,
    /// Ridge term added to the normal equations
    pub ridge_lambda: f32,
    /// Cap on dynamic forecast steps
    pub max_steps: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_history: 5,
            max_order: 20,
            ridge_lambda: 1.0,
            max_steps: 64,
        }
    }
}

/// Autoregressive beat-interval forecaster.
pub struct ArForecaster {
    config: ForecastConfig,
}

impl ArForecaster {
    pub fn new() -> Self {
        Self::with_config(ForecastConfig::default())
    }

    pub fn with_config(config: ForecastConfig) -> Self {
        Self { config }
    }

    /// Forecast intervals covering `target_s` seconds past the end of the
    /// last chunk.
    ///
    /// `history` must hold true inter-beat intervals only (no boundary
    /// fragments, no provisional trailing interval). `last_boundary` is the
    /// already-elapsed tail of the current beat cycle; the forecast starts
    /// mid-cycle, so that duration is subtracted from the front of the
    /// emitted sequence (cascading across intervals when needed).
    pub fn forecast(
        &self,
        history: &[f32],
        last_boundary: f32,
        target_s: f32,
    ) -> Result<Forecast, ForecastError> {
        let n = history.len();
        if n < self.config.min_history {
            return Err(ForecastError::InsufficientHistory {
                len: n,
                min: self.config.min_history,
            });
        }

        let last_boundary = last_boundary.max(0.0);
        let target = target_s + last_boundary;
        let mean = history.iter().sum::<f32>() / n as f32;

        let order = (n / 2).saturating_sub(1).min(self.config.max_order).max(1);
        let predicted = self
            .fit_ar(history, order)
            .and_then(|coeffs| self.dynamic_forecast(history, &coeffs, order, target));

        let (raw, method) = match predicted {
            Some(values) => (values, ForecastMethod::Ar { order }),
            None => {
                debug!(order, "AR fit unusable, falling back to flat forecast");
                (flat_values(mean, target), ForecastMethod::FlatFallback)
            }
        };

        let intervals = assemble(raw, target, last_boundary, target_s);
        Ok(Forecast { intervals, method })
    }

    /// Flat forecast of a known mean interval; the degraded path when the
    /// history is still too short for a model fit.
    pub fn flat(&self, mean_interval: f32, last_boundary: f32, target_s: f32) -> Forecast {
        let last_boundary = last_boundary.max(0.0);
        let target = target_s + last_boundary;
        let intervals = assemble(flat_values(mean_interval, target), target, last_boundary, target_s);
        Forecast {
            intervals,
            method: ForecastMethod::FlatFallback,
        }
    }

    /// Least-squares AR(p) fit with intercept via ridge-regularized normal
    /// equations. `None` marks a fit failure (the flat-fallback branch).
    fn fit_ar(&self, history: &[f32], order: usize) -> Option<Vec<f64>> {
        let n = history.len();
        let rows = n - order;
        if rows < order + 1 {
            return None;
        }

        let x = DMatrix::from_fn(rows, order + 1, |r, c| {
            if c == 0 {
                1.0
            } else {
                history[order + r - c] as f64
            }
        });
        let y = DVector::from_fn(rows, |r, _| history[order + r] as f64);

        let mut xtx = x.transpose() * &x;
        for i in 0..order + 1 {
            xtx[(i, i)] += self.config.ridge_lambda as f64;
        }
        let xty = x.transpose() * y;

        let theta = xtx.cholesky()?.solve(&xty);
        if theta.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(theta.iter().copied().collect())
    }

    /// Iterative multi-step forecast: each prediction feeds the next lag
    /// window. Returns `None` on non-physical output (the fallback branch).
    fn dynamic_forecast(
        &self,
        history: &[f32],
        coeffs: &[f64],
        order: usize,
        target: f32,
    ) -> Option<Vec<f32>> {
        let mut lags: Vec<f64> = history[history.len() - order..]
            .iter()
            .map(|&v| v as f64)
            .collect();
        let mut values = Vec::new();
        let mut total = 0.0f32;

        for _ in 0..self.config.max_steps {
            let mut next = coeffs[0];
            for j in 1..=order {
                next += coeffs[j] * lags[lags.len() - j];
            }
            if !next.is_finite() || next <= 0.0 {
                return None;
            }
            lags.push(next);
            values.push(next as f32);
            total += next as f32;
            if total >= target {
                return Some(values);
            }
        }

        // Horizon never reached within the step budget.
        None
    }
}

impl Default for ArForecaster {
    fn default() -> Self {
        Self::new()
    }
}

fn flat_values(mean: f32, target: f32) -> Vec<f32> {
    let mean = if mean > 1e-4 { mean } else { target.max(1e-4) };
    let count = (target / mean).ceil() as usize + 1;
    vec![mean; count]
}

/// Truncate at the horizon, then apply the continuity correction for the
/// partially elapsed beat cycle. The result sums to `target_s` exactly.
fn assemble(raw: Vec<f32>, target: f32, last_boundary: f32, target_s: f32) -> IntervalSequence {
    // Walk cumulatively; cut the interval that crosses the horizon.
    let mut out = Vec::new();
    let mut total = 0.0f32;
    for v in raw {
        if total + v < target {
            out.push(v);
            total += v;
        } else {
            out.push(target - total);
            total = target;
            break;
        }
    }

    // Subtract the elapsed tail of the current cycle from the front,
    // dropping intervals the correction fully consumes.
    let mut remaining = last_boundary;
    while remaining > 0.0 && !out.is_empty() {
        if out[0] > remaining {
            out[0] -= remaining;
            remaining = 0.0;
        } else {
            remaining -= out.remove(0);
        }
    }
    if out.is_empty() {
        out.push(target_s.max(0.0));
    }

    IntervalSequence::new(out)
}
