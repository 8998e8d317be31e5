//! Encoder plumbing
//!
//! Per channel: a named pipe, a thread writing PCM into it, and the external
//! encoder process reading from it.

pub mod encoder;
pub mod pipe;

pub use encoder::EncoderProcess;
pub use pipe::{EncoderPipe, PcmWriter, PcmWriterStats};
