//! Capture sources
//!
//! The tuner hardware and its driver live outside this crate. A source only
//! has to deliver complex baseband blocks at a fixed rate around the planned
//! center frequency.

pub mod stream;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crossbeam_channel::Sender;
use num_complex::Complex32;

use crate::error::SourceError;

pub use stream::{IqStreamSource, SampleFormat};

/// A block of complex baseband samples
#[derive(Debug, Clone, Default)]
pub struct SampleBuf {
    pub samples: Vec<Complex32>,
}

/// Common trait for everything that produces the shared capture stream
pub trait SampleSource: Send {
    /// Stream blocks into `tx` until the input ends, `running` is cleared
    /// or the receiver goes away.
    fn run(&mut self, tx: Sender<SampleBuf>, running: Arc<AtomicBool>) -> Result<(), SourceError>;

    /// Sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Center frequency in Hz
    fn center_frequency(&self) -> u64;
}
