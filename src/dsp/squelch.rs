//! Squelch gates

use std::f32::consts::PI;

use num_complex::Complex32;

/// Noise-ratio squelch for AM audio.
///
/// Splits the detected audio into a voice band and everything above it and
/// tracks the fraction of energy that lands above the voice band. Noise
/// spreads evenly and scores high, speech scores low. The gate is open
/// while the ratio stays below the threshold.
pub struct AmSquelch {
    threshold: f32,
    /// Smoothing for the band power averages
    alpha: f32,
    /// One-pole voice band low-pass coefficient
    voice_coeff: f32,
    dc: f32,
    voice: f32,
    voice_power: f32,
    noise_power: f32,
}

impl AmSquelch {
    /// Threshold range this detector can produce
    pub const RANGE: (f32, f32) = (0.0, 1.0);

    /// `rate` is the sample rate of the detected audio
    pub fn new(rate: f32, threshold: f32) -> Self {
        let voice_coeff = 1.0 - (-2.0 * PI * 3_000.0 / rate).exp();
        Self {
            threshold,
            // ~100 ms averaging
            alpha: 1.0 - (-10.0 / rate).exp(),
            voice_coeff,
            dc: 0.0,
            voice: 0.0,
            voice_power: 0.0,
            noise_power: 0.0,
        }
    }

    /// Range probe used to derive a default threshold
    pub fn range(&self) -> (f32, f32) {
        Self::RANGE
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold.clamp(Self::RANGE.0, Self::RANGE.1);
    }

    /// Share of recent energy above the voice band, `1.0` when idle
    pub fn noise_ratio(&self) -> f32 {
        let total = self.voice_power + self.noise_power;
        if total < 1e-12 {
            1.0
        } else {
            self.noise_power / total
        }
    }

    pub fn is_open(&self) -> bool {
        self.noise_ratio() < self.threshold
    }

    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        input
            .iter()
            .map(|&x| {
                self.dc += 0.001 * (x - self.dc);
                let ac = x - self.dc;
                self.voice += self.voice_coeff * (ac - self.voice);
                let noise = ac - self.voice;
                self.voice_power += self.alpha * (self.voice * self.voice - self.voice_power);
                self.noise_power += self.alpha * (noise * noise - self.noise_power);

                if self.is_open() {
                    x
                } else {
                    0.0
                }
            })
            .collect()
    }
}

/// Power squelch on complex baseband.
///
/// Opens when the averaged power reaches `threshold_db`. Transitions are
/// shaped with a raised-cosine ramp of `ramp` samples. With `gate` set,
/// closed samples are dropped instead of zeroed.
pub struct PowerSquelch {
    threshold: f32,
    alpha: f32,
    ramp: usize,
    gate: bool,
    power: f32,
    envelope: usize,
}

impl PowerSquelch {
    pub fn new(threshold_db: f32, alpha: f32, ramp: usize, gate: bool) -> Self {
        Self {
            threshold: 10f32.powf(threshold_db / 10.0),
            alpha,
            ramp,
            gate,
            power: 0.0,
            envelope: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.power >= self.threshold
    }

    fn gain(&self) -> f32 {
        if self.ramp == 0 {
            return if self.envelope > 0 { 1.0 } else { 0.0 };
        }
        0.5 - 0.5 * (PI * self.envelope as f32 / self.ramp as f32).cos()
    }

    pub fn process(&mut self, input: &[Complex32]) -> Vec<Complex32> {
        let mut out = Vec::with_capacity(input.len());
        for &x in input {
            self.power += self.alpha * (x.norm_sqr() - self.power);

            let top = self.ramp.max(1);
            if self.is_open() {
                self.envelope = (self.envelope + 1).min(top);
            } else {
                self.envelope = self.envelope.saturating_sub(1);
            }

            let gain = self.gain();
            if gain == 0.0 {
                if !self.gate {
                    out.push(Complex32::new(0.0, 0.0));
                }
            } else {
                out.push(x * gain);
            }
        }
        out
    }
}
