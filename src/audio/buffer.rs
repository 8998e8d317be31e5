//! Lock-free ring buffer for audio frames
//!
//! Single producer (the signal graph) and single consumer (the output
//! device callback). Neither side ever blocks on the other.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Block of mono samples at the audio rate
#[derive(Clone, Debug, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    /// Frame sequence number
    pub sequence: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sequence: u32) -> Self {
        Self { samples, sequence }
    }

    /// Frame duration in microseconds
    pub fn duration_us(&self, sample_rate: u32) -> u64 {
        (self.samples.len() as u64 * 1_000_000) / sample_rate as u64
    }
}

/// Lock-free ring buffer for audio frames
pub struct RingBuffer {
    queue: ArrayQueue<AudioFrame>,
    overflow_count: AtomicUsize,
    underrun_count: AtomicUsize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            overflow_count: AtomicUsize::new(0),
            underrun_count: AtomicUsize::new(0),
        }
    }

    /// Push a frame into the buffer
    /// Returns false if buffer is full (overflow)
    pub fn push(&self, frame: AudioFrame) -> bool {
        match self.queue.push(frame) {
            Ok(()) => true,
            Err(_) => {
                self.overflow_count.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Pop a frame from the buffer
    /// Returns None if buffer is empty (underrun)
    pub fn pop(&self) -> Option<AudioFrame> {
        match self.queue.pop() {
            Some(frame) => Some(frame),
            None => {
                self.underrun_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }

    pub fn underrun_count(&self) -> usize {
        self.underrun_count.load(Ordering::Relaxed)
    }

    /// Get fill level as a fraction of capacity
    pub fn fill_level(&self) -> f32 {
        self.len() as f32 / self.capacity() as f32
    }
}

/// Thread-safe handle to a ring buffer
pub type SharedRingBuffer = Arc<RingBuffer>;

pub fn create_shared_buffer(capacity: usize) -> SharedRingBuffer {
    Arc::new(RingBuffer::new(capacity))
}

/// Drains frames sample by sample into device buffers of arbitrary size
pub struct FrameReader {
    buffer: SharedRingBuffer,
    current: Vec<f32>,
    position: usize,
}

impl FrameReader {
    pub fn new(buffer: SharedRingBuffer) -> Self {
        Self {
            buffer,
            current: Vec::new(),
            position: 0,
        }
    }

    /// Next sample, or silence when the buffer has run dry
    pub fn next_sample(&mut self) -> f32 {
        while self.position >= self.current.len() {
            match self.buffer.pop() {
                Some(frame) => {
                    self.current = frame.samples;
                    self.position = 0;
                }
                None => return 0.0,
            }
        }
        let sample = self.current[self.position];
        self.position += 1;
        sample
    }

    /// Fill an interleaved output buffer, repeating each sample across
    /// `channels`
    pub fn fill(&mut self, out: &mut [f32], channels: usize) {
        for frame in out.chunks_mut(channels.max(1)) {
            let sample = self.next_sample();
            frame.iter_mut().for_each(|s| *s = sample);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_basic() {
        let buffer = RingBuffer::new(4);

        assert!(buffer.push(AudioFrame::new(vec![0.0; 480], 0)));
        assert!(buffer.push(AudioFrame::new(vec![1.0; 480], 1)));
        assert_eq!(buffer.len(), 2);

        assert_eq!(buffer.pop().unwrap().sequence, 0);
        assert_eq!(buffer.pop().unwrap().sequence, 1);
        assert!(buffer.is_empty());
        assert!(buffer.pop().is_none());
        assert_eq!(buffer.underrun_count(), 1);
    }

    #[test]
    fn test_ring_buffer_overflow() {
        let buffer = RingBuffer::new(2);
        for seq in 0..3 {
            buffer.push(AudioFrame::new(vec![], seq));
        }
        assert_eq!(buffer.overflow_count(), 1);
        assert_eq!(buffer.fill_level(), 1.0);
    }

    #[test]
    fn test_frame_reader_spans_frames_and_pads_silence() {
        let buffer = create_shared_buffer(4);
        buffer.push(AudioFrame::new(vec![0.1, 0.2, 0.3], 0));
        buffer.push(AudioFrame::new(vec![0.4], 1));

        let mut reader = FrameReader::new(buffer);
        let mut out = [9.0f32; 12];
        reader.fill(&mut out, 2);
        assert_eq!(out, [0.1, 0.1, 0.2, 0.2, 0.3, 0.3, 0.4, 0.4, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_frame_duration() {
        let frame = AudioFrame::new(vec![0.0; 320], 0);
        assert_eq!(frame.duration_us(32_000), 10_000);
    }
}
