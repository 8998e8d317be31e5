//! Sums all channels into one monitor signal

use crate::audio::buffer::{AudioFrame, SharedRingBuffer};

pub struct Mixer {
    volume: f32,
    output: Option<SharedRingBuffer>,
    sequence: u32,
}

impl Mixer {
    pub fn new(volume: f32) -> Self {
        Self {
            volume,
            output: None,
            sequence: 0,
        }
    }

    /// Push mixed frames into `buffer`
    pub fn with_output(mut self, buffer: SharedRingBuffer) -> Self {
        self.output = Some(buffer);
        self
    }

    /// Sample-for-sample sum scaled by the volume. A shorter (or empty)
    /// input contributes silence past its end.
    pub fn mix(&self, inputs: &[Vec<f32>]) -> Vec<f32> {
        let len = inputs.iter().map(Vec::len).max().unwrap_or(0);
        let mut out = vec![0.0f32; len];
        for input in inputs {
            for (acc, &s) in out.iter_mut().zip(input) {
                *acc += s;
            }
        }
        out.iter_mut().for_each(|s| *s *= self.volume);
        out
    }

    /// Mix and hand the result to the output. Returns false if the output
    /// buffer was full and the frame was dropped.
    pub fn push(&mut self, inputs: &[Vec<f32>]) -> bool {
        let Some(output) = &self.output else {
            return true;
        };
        let samples = self.mix(inputs);
        if samples.is_empty() {
            return true;
        }
        let frame = AudioFrame::new(samples, self.sequence);
        self.sequence = self.sequence.wrapping_add(1);
        output.push(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::create_shared_buffer;

    #[test]
    fn test_mix_sums_and_scales() {
        let mixer = Mixer::new(0.5);
        let out = mixer.mix(&[vec![1.0, 2.0, 3.0], vec![1.0, 0.0, -1.0]]);
        assert_eq!(out, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_mix_pads_short_inputs() {
        let mixer = Mixer::new(1.0);
        let out = mixer.mix(&[vec![1.0], vec![], vec![0.5, 0.5]]);
        assert_eq!(out, vec![1.5, 0.5]);
        assert!(mixer.mix(&[]).is_empty());
    }

    #[test]
    fn test_push_sequences_frames() {
        let buffer = create_shared_buffer(4);
        let mut mixer = Mixer::new(1.0).with_output(buffer.clone());
        assert!(mixer.push(&[vec![0.25; 8]]));
        assert!(mixer.push(&[vec![0.25; 8]]));

        assert_eq!(buffer.pop().unwrap().sequence, 0);
        let second = buffer.pop().unwrap();
        assert_eq!(second.sequence, 1);
        assert_eq!(second.samples, vec![0.25; 8]);
    }
}
