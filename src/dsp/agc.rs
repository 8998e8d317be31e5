use num_complex::Complex32;

/// Feed-forward AGC with a linear gain update.
///
/// `gain += rate * (reference - |output|)` per sample, so the output
/// envelope settles at `reference`.
pub struct Agc {
    rate: f32,
    reference: f32,
    gain: f32,
    max_gain: f32,
}

impl Agc {
    pub fn new(rate: f32, reference: f32, gain: f32) -> Self {
        Self {
            rate,
            reference,
            gain,
            max_gain: 65_536.0,
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn process(&mut self, input: &[Complex32]) -> Vec<Complex32> {
        input
            .iter()
            .map(|&x| {
                let y = x * self.gain;
                self.gain += self.rate * (self.reference - y.norm());
                self.gain = self.gain.clamp(0.0, self.max_gain);
                y
            })
            .collect()
    }
}
