//! Butterworth band-pass design as cascaded second-order sections.
//!
//! The digital sections are derived from the analog Butterworth prototype
//! through the lowpass-to-bandpass transform and the bilinear transform,
//! then applied forward-backward (zero phase) so beat timing is not shifted
//! by filter group delay.

use num_complex::Complex64;
use sci_rs::signal::filter::design::Sos;

use super::conditioner::ConditionError;

/// Minimum input length for forward-backward application of `n_sections`
/// cascaded biquads. Inputs at or below this length cannot be edge-padded.
pub fn min_input_len(n_sections: usize) -> usize {
    // Odd-extension padding of 3 * (2 * n_sections + 1) samples on each end.
    3 * (2 * n_sections + 1) + 1
}

/// Design an order-`order` Butterworth band-pass as `order` second-order
/// sections (total system order `2 * order`).
pub fn design_bandpass_sos(
    order: usize,
    low_hz: f64,
    high_hz: f64,
    fs: f64,
) -> Result<Vec<Sos<f32>>, ConditionError> {
    if order == 0 || low_hz <= 0.0 || high_hz <= low_hz || high_hz >= fs / 2.0 {
        return Err(ConditionError::InvalidBand {
            low_hz: low_hz as f32,
            high_hz: high_hz as f32,
            fs: fs as f32,
        });
    }

    let fs2 = 2.0 * fs;
    // Pre-warp the band edges for the bilinear transform.
    let w1 = fs2 * (std::f64::consts::PI * low_hz / fs).tan();
    let w2 = fs2 * (std::f64::consts::PI * high_hz / fs).tan();
    let bw = w2 - w1;
    let w0 = (w1 * w2).sqrt();

    // Analog Butterworth prototype poles on the unit circle, left half plane.
    let mut s_poles = Vec::with_capacity(2 * order);
    for k in 0..order {
        let theta = std::f64::consts::PI * (2 * k + order + 1) as f64 / (2 * order) as f64;
        let proto = Complex64::new(theta.cos(), theta.sin());

        // Lowpass-to-bandpass: each prototype pole splits into two.
        let pb = proto * (bw / 2.0);
        let disc = (pb * pb - Complex64::new(w0 * w0, 0.0)).sqrt();
        s_poles.push(pb + disc);
        s_poles.push(pb - disc);
    }

    // Bilinear transform into the z plane.
    let z_poles: Vec<Complex64> = s_poles
        .iter()
        .map(|&s| (Complex64::new(fs2, 0.0) + s) / (Complex64::new(fs2, 0.0) - s))
        .collect();

    // Band-pass zeros: `order` at z = +1 (DC) and `order` at z = -1 (Nyquist).
    // Overall gain fixed to unity at the geometric band center.
    let fc = (low_hz * high_hz).sqrt();
    let z0 = Complex64::from_polar(1.0, 2.0 * std::f64::consts::PI * fc / fs);

    let mut h = Complex64::new(1.0, 0.0);
    for _ in 0..order {
        h *= (z0 - Complex64::new(1.0, 0.0)) * (z0 + Complex64::new(1.0, 0.0));
    }
    for &p in &z_poles {
        h /= z0 - p;
    }
    let gain = 1.0 / h.norm();
    let section_gain = gain.powf(1.0 / order as f64);

    // Pair poles into conjugate pairs, one biquad per pair, each section
    // carrying one DC zero and one Nyquist zero: b(z) = g * (z^2 - 1).
    let pairs = pair_conjugates(z_poles);
    let sos = pairs
        .into_iter()
        .map(|(za, zb)| {
            let a1 = (-(za + zb)).re;
            let a2 = (za * zb).re;
            Sos::new(
                [section_gain as f32, 0.0, -(section_gain as f32)],
                [1.0, a1 as f32, a2 as f32],
            )
        })
        .collect();

    Ok(sos)
}

fn pair_conjugates(poles: Vec<Complex64>) -> Vec<(Complex64, Complex64)> {
    const IM_TOL: f64 = 1e-9;

    let mut upper: Vec<Complex64> = Vec::new();
    let mut lower: Vec<Complex64> = Vec::new();
    let mut real: Vec<Complex64> = Vec::new();

    for p in poles {
        if p.im > IM_TOL {
            upper.push(p);
        } else if p.im < -IM_TOL {
            lower.push(p);
        } else {
            real.push(p);
        }
    }

    let mut pairs = Vec::new();
    for p in upper {
        let conj = p.conj();
        // Closest lower-half pole stands in for the exact conjugate.
        let found = lower
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (*a - conj)
                    .norm()
                    .partial_cmp(&(*b - conj).norm())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(idx, _)| idx);
        match found {
            Some(idx) => {
                let q = lower.swap_remove(idx);
                pairs.push((p, q));
            }
            // Numerically orphaned pole: fall back to its exact conjugate.
            None => pairs.push((p, conj)),
        }
    }

    // Any remaining real poles pair among themselves (odd prototype orders).
    let mut leftovers = real.into_iter();
    while let (Some(a), Some(b)) = (leftovers.next(), leftovers.next()) {
        pairs.push((a, b));
    }

    pairs
}

/// Zero-phase (forward-backward) application of a cascaded SOS filter.
///
/// The caller must ensure `signal.len() > min_input_len(sos.len())`.
pub(crate) fn sosfiltfilt(signal: &[f32], sos: &[Sos<f32>]) -> Vec<f32> {
    sci_rs::signal::filter::sosfiltfilt_dyn(signal.iter(), sos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn band_energy(signal: &[f32]) -> f32 {
        signal.iter().map(|x| x * x).sum::<f32>() / signal.len() as f32
    }

    #[test]
    fn test_design_produces_order_sections() {
        let sos = design_bandpass_sos(4, 0.5, 3.0, 24.0).unwrap();
        assert_eq!(sos.len(), 4);
    }

    #[test]
    fn test_invalid_band_rejected() {
        assert!(design_bandpass_sos(4, 3.0, 0.5, 24.0).is_err());
        assert!(design_bandpass_sos(4, 0.5, 20.0, 24.0).is_err());
        assert!(design_bandpass_sos(0, 0.5, 3.0, 24.0).is_err());
    }

    #[test]
    fn test_passband_preserved_stopband_attenuated() {
        let fs = 24.0f32;
        let n = 480; // 20 seconds
        let sos = design_bandpass_sos(4, 0.5, 3.0, fs as f64).unwrap();

        // 1 Hz carrier (in band) with slow 0.05 Hz drift and 8 Hz noise.
        let in_band: Vec<f32> = (0..n).map(|i| (2.0 * PI * (i as f32 / fs)).sin()).collect();
        let drift: Vec<f32> = (0..n)
            .map(|i| 3.0 * (2.0 * PI * 0.05 * (i as f32 / fs)).sin())
            .collect();
        let hiss: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * 8.0 * (i as f32 / fs)).sin())
            .collect();

        let carrier_out = sosfiltfilt(&in_band, &sos);
        let drift_out = sosfiltfilt(&drift, &sos);
        let hiss_out = sosfiltfilt(&hiss, &sos);

        // Compare energies away from the edges.
        let mid = n / 4..3 * n / 4;
        let carrier_ratio =
            band_energy(&carrier_out[mid.clone()]) / band_energy(&in_band[mid.clone()]);
        let drift_ratio = band_energy(&drift_out[mid.clone()]) / band_energy(&drift[mid.clone()]);
        let hiss_ratio = band_energy(&hiss_out[mid.clone()]) / band_energy(&hiss[mid]);

        assert!(carrier_ratio > 0.5, "in-band energy lost: {}", carrier_ratio);
        assert!(drift_ratio < 0.05, "drift not attenuated: {}", drift_ratio);
        assert!(hiss_ratio < 0.05, "hiss not attenuated: {}", hiss_ratio);
    }

    #[test]
    fn test_zero_phase_keeps_peak_position() {
        let fs = 24.0f32;
        let n = 240;
        let sos = design_bandpass_sos(4, 0.5, 3.0, fs as f64).unwrap();

        let signal: Vec<f32> = (0..n).map(|i| (2.0 * PI * (i as f32 / fs)).sin()).collect();
        let filtered = sosfiltfilt(&signal, &sos);

        // A mid-signal peak of the 1 Hz sine sits at sample 126 (t = 5.25 s).
        let window = 120..132;
        let raw_peak = window
            .clone()
            .max_by(|&a, &b| signal[a].partial_cmp(&signal[b]).unwrap())
            .unwrap();
        let filt_peak = window
            .max_by(|&a, &b| filtered[a].partial_cmp(&filtered[b]).unwrap())
            .unwrap();

        assert!(
            (raw_peak as i64 - filt_peak as i64).abs() <= 1,
            "peak shifted from {} to {}",
            raw_peak,
            filt_peak
        );
    }
}
