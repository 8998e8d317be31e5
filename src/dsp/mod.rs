//! Channel extraction primitives
//!
//! Small self-contained blocks the channel extractor is wired from. They
//! are tuned for narrowband voice, not for sample-exact agreement with any
//! other filter implementation.

pub mod agc;
pub mod demod;
pub mod filter;
pub mod squelch;

pub use agc::Agc;
pub use demod::{magnitude, FmDemod};
pub use filter::{low_pass, FirDecimator, FreqXlatingFir, LowPassSpec};
pub use squelch::{AmSquelch, PowerSquelch};
