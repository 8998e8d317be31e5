//! FIR design and decimating filters

use std::f64::consts::PI;

use num_complex::{Complex32, Complex64};

/// Low-pass design parameters, all in Hz / dB
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LowPassSpec {
    pub cutoff: f64,
    pub transition: f64,
    pub attenuation_db: f64,
}

impl LowPassSpec {
    pub const fn new(cutoff: f64, transition: f64, attenuation_db: f64) -> Self {
        Self {
            cutoff,
            transition,
            attenuation_db,
        }
    }
}

/// Modified Bessel function of the first kind, order 0 (for Kaiser window)
fn bessel_i0(x: f64) -> f64 {
    let mut sum = 1.0;
    let mut term = 1.0;
    let x_sq_over_4 = x * x / 4.0;
    for k in 1..=40 {
        term *= x_sq_over_4 / (k * k) as f64;
        sum += term;
        if term < sum * 1e-12 {
            break;
        }
    }
    sum
}

/// Kaiser beta from stopband attenuation
fn kaiser_beta(attenuation_db: f64) -> f64 {
    if attenuation_db > 50.0 {
        0.1102 * (attenuation_db - 8.7)
    } else if attenuation_db > 21.0 {
        0.5842 * (attenuation_db - 21.0).powf(0.4) + 0.07886 * (attenuation_db - 21.0)
    } else {
        0.0
    }
}

/// Kaiser-windowed sinc low-pass with unity DC gain.
///
/// Tap count follows the Kaiser estimate for the requested transition width
/// and attenuation, forced odd so the filter has an integer group delay.
pub fn low_pass(sample_rate: f64, spec: LowPassSpec) -> Vec<f32> {
    let tw = (spec.transition / sample_rate).max(1e-6);
    let estimate = (spec.attenuation_db - 7.95) / (14.36 * tw) + 1.0;
    let mut ntaps = estimate.ceil().max(3.0) as usize;
    if ntaps % 2 == 0 {
        ntaps += 1;
    }

    let beta = kaiser_beta(spec.attenuation_db);
    let denom = bessel_i0(beta);
    let fc = spec.cutoff / sample_rate;
    let mid = (ntaps - 1) as f64 / 2.0;

    let mut taps: Vec<f64> = (0..ntaps)
        .map(|i| {
            let n = i as f64 - mid;
            let sinc = if n == 0.0 {
                2.0 * fc
            } else {
                (2.0 * PI * fc * n).sin() / (PI * n)
            };
            let x = n / mid;
            let window = bessel_i0(beta * (1.0 - x * x).max(0.0).sqrt()) / denom;
            sinc * window
        })
        .collect();

    let sum: f64 = taps.iter().sum();
    if sum.abs() > f64::EPSILON {
        taps.iter_mut().for_each(|t| *t /= sum);
    }
    taps.into_iter().map(|t| t as f32).collect()
}

/// Frequency-translating decimating FIR.
///
/// Moves the component at `offset` Hz to baseband, band-limits it with the
/// low-pass taps and keeps every `decimation`-th output. The taps are
/// shifted to a band-pass at `offset`; the residual rotation is removed on
/// the decimated output.
pub struct FreqXlatingFir {
    taps: Vec<Complex32>,
    decimation: usize,
    history: Vec<Complex32>,
    rotator: Complex64,
    rotator_step: Complex64,
}

impl FreqXlatingFir {
    pub fn new(decimation: usize, taps: &[f32], offset: f64, sample_rate: f64) -> Self {
        let w = 2.0 * PI * offset / sample_rate;
        // Reversed so the dot product runs oldest-to-newest over the history
        let ntaps = taps.len();
        let bandpass: Vec<Complex32> = taps
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                let phase = w * i as f64;
                Complex32::new(t * phase.cos() as f32, t * phase.sin() as f32)
            })
            .rev()
            .collect();
        let step = -w * decimation as f64;

        Self {
            taps: bandpass,
            decimation: decimation.max(1),
            history: vec![Complex32::new(0.0, 0.0); ntaps.saturating_sub(1)],
            rotator: Complex64::new(1.0, 0.0),
            rotator_step: Complex64::new(step.cos(), step.sin()),
        }
    }

    pub fn process(&mut self, input: &[Complex32]) -> Vec<Complex32> {
        self.history.extend_from_slice(input);
        let ntaps = self.taps.len();
        let mut out = Vec::with_capacity(input.len() / self.decimation + 1);

        let mut start = 0;
        while start + ntaps <= self.history.len() {
            let window = &self.history[start..start + ntaps];
            let acc: Complex32 = window
                .iter()
                .zip(&self.taps)
                .map(|(x, h)| x * h)
                .sum();
            let rot = Complex32::new(self.rotator.re as f32, self.rotator.im as f32);
            out.push(acc * rot);
            self.rotator *= self.rotator_step;
            start += self.decimation;
        }
        // Keep the magnitude from drifting
        self.rotator /= self.rotator.norm();
        self.history.drain(..start.min(self.history.len()));
        out
    }
}

/// Decimating real FIR
pub struct FirDecimator {
    taps: Vec<f32>,
    decimation: usize,
    history: Vec<f32>,
}

impl FirDecimator {
    pub fn new(decimation: usize, taps: &[f32]) -> Self {
        Self {
            taps: taps.iter().rev().copied().collect(),
            decimation: decimation.max(1),
            history: vec![0.0; taps.len().saturating_sub(1)],
        }
    }

    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        self.history.extend_from_slice(input);
        let ntaps = self.taps.len();
        let mut out = Vec::with_capacity(input.len() / self.decimation + 1);

        let mut start = 0;
        while start + ntaps <= self.history.len() {
            let acc: f32 = self.history[start..start + ntaps]
                .iter()
                .zip(&self.taps)
                .map(|(x, h)| x * h)
                .sum();
            out.push(acc);
            start += self.decimation;
        }
        self.history.drain(..start.min(self.history.len()));
        out
    }
}
