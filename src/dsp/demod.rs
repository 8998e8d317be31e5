//! Detectors

use std::f64::consts::PI;

use num_complex::Complex32;

use super::filter::{low_pass, FirDecimator, LowPassSpec};

/// Envelope detector
pub fn magnitude(input: &[Complex32]) -> Vec<f32> {
    input.iter().map(|s| s.norm()).collect()
}

/// Narrowband FM voice demodulator: quadrature discriminator, de-emphasis
/// and a decimating audio low-pass.
pub struct FmDemod {
    gain: f32,
    last: Complex32,
    deemph_coeff: f32,
    deemph: f32,
    audio_filter: FirDecimator,
}

impl FmDemod {
    pub const MAX_DEVIATION: f64 = 5_000.0;
    pub const DEEMPHASIS_TAU: f64 = 75e-6;
    pub const AUDIO_PASS: f64 = 3_000.0;
    pub const AUDIO_STOP: f64 = 4_000.0;

    pub fn new(rate: f64, audio_decimation: usize) -> Self {
        let taps = low_pass(
            rate,
            LowPassSpec::new(
                Self::AUDIO_PASS,
                Self::AUDIO_STOP - Self::AUDIO_PASS,
                60.0,
            ),
        );
        Self {
            gain: (rate / (2.0 * PI * Self::MAX_DEVIATION)) as f32,
            last: Complex32::new(0.0, 0.0),
            deemph_coeff: (1.0 - (-1.0 / (rate * Self::DEEMPHASIS_TAU)).exp()) as f32,
            deemph: 0.0,
            audio_filter: FirDecimator::new(audio_decimation, &taps),
        }
    }

    pub fn process(&mut self, input: &[Complex32]) -> Vec<f32> {
        let discriminated: Vec<f32> = input
            .iter()
            .map(|&x| {
                let d = (x * self.last.conj()).arg() * self.gain;
                self.last = x;
                self.deemph += self.deemph_coeff * (d - self.deemph);
                self.deemph
            })
            .collect();
        self.audio_filter.process(&discriminated)
    }
}
