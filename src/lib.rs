//! # SDR Multistream
//!
//! Receives one wide capture window from an SDR, extracts several
//! independently tuned narrowband channels from it and republishes every
//! channel as a live Icecast source stream.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                         SIGNAL GRAPH (one thread)                        │
//! │                                                                          │
//! │  ┌───────────────┐     FrequencyPlanner runs once and tunes everything   │
//! │  │ SampleSource  │     below it (center frequency + per-channel offsets) │
//! │  │ (capture::*)  │                                                       │
//! │  └───────┬───────┘                                                       │
//! │          │ Vec<Complex32>, read-only fan-out                             │
//! │   ┌──────┼───────────────────────┬───────────────────────┐               │
//! │   ▼      ▼                       ▼                       ▼               │
//! │  ┌─────────────┐           ┌─────────────┐         ┌─────────────┐       │
//! │  │ Extractor 0 │           │ Extractor 1 │   ...   │ Extractor N │       │
//! │  │ xlate+AGC+  │           │             │         │             │       │
//! │  │ demod+sql   │           │             │         │             │       │
//! │  └──┬───────┬──┘           └──┬───────┬──┘         └──┬───────┬──┘       │
//! │     │       └─────────────────┼───────┴───────────────┼──┐    │          │
//! │     │ try_send (drop if full) │                       │  ▼    │          │
//! └─────┼─────────────────────────┼───────────────────────┼─ Mixer ┼─ cpal ───┘
//!       ▼                         ▼                       ▼
//!  ┌──────────┐              ┌──────────┐            ┌──────────┐
//!  │PcmWriter │ pipe-A.raw   │PcmWriter │            │PcmWriter │  (threads)
//!  └────┬─────┘              └────┬─────┘            └────┬─────┘
//!       ▼                         ▼                       ▼
//!  ┌──────────┐              ┌──────────┐            ┌──────────┐
//!  │   lame   │              │   lame   │            │   lame   │  (processes)
//!  └────┬─────┘              └────┬─────┘            └────┬─────┘
//!       ▼ stdout                  ▼                       ▼
//!  ┌──────────┐              ┌──────────┐            ┌──────────┐
//!  │ Uploader │              │ Uploader │            │ Uploader │  (tokio tasks)
//!  └────┬─────┘              └────┬─────┘            └────┬─────┘
//!       └──────── SOURCE /<label> ICE/1.0 ── Icecast :8000 ┘
//! ```

pub mod audio;
pub mod capture;
pub mod channel;
pub mod codec;
pub mod config;
pub mod dsp;
pub mod error;
pub mod network;
pub mod planner;
pub mod station;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Default capture sample rate (complex samples per second)
    pub const DEFAULT_DEVICE_RATE: u32 = 2_048_000;

    /// Maximum instantaneous bandwidth of the capture device
    pub const DEFAULT_MAX_BANDWIDTH: u64 = 2_400_000;

    /// Channel spacing used to keep channels off the LO leakage spot
    pub const DEFAULT_CHANNEL_BANDWIDTH: u64 = 10_000;

    /// Rate the channel filter decimates to before demodulation
    pub const DEFAULT_DEMOD_RATE: u32 = 64_000;

    /// Decoded audio rate, also the encoder input rate
    pub const DEFAULT_AUDIO_RATE: u32 = 32_000;

    /// Encoder bitrate in kbps
    pub const DEFAULT_BITRATE: u32 = 48;

    /// Float audio to i16 scale applied before the encoder pipe
    pub const PCM_SCALE: f32 = 7500.0;

    /// Icecast source port
    pub const DEFAULT_INGEST_PORT: u16 = 8000;

    /// Bytes read from the encoder per poll cycle
    pub const CHUNK_SIZE: usize = 4096;

    /// Bounded wait for encoded bytes
    pub const POLL_INTERVAL: Duration = Duration::from_millis(1000);

    /// Minimum spacing between two connect attempts of one channel
    pub const RECONNECT_COOLDOWN: Duration = Duration::from_secs(4);

    /// Default per-send timeout
    pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

    /// Capture blocks queued between capture and signal graph threads
    pub const SAMPLE_QUEUE_DEPTH: usize = 64;

    /// PCM blocks queued per channel between signal graph and pipe writer
    pub const PCM_QUEUE_DEPTH: usize = 64;

    /// Lock-free ring buffer capacity for monitor audio (in frames)
    pub const RING_BUFFER_CAPACITY: usize = 256;

    /// Default monitor volume
    pub const DEFAULT_VOLUME: f32 = 0.8;

    /// Default AM squelch threshold override
    pub const DEFAULT_AM_SQUELCH: f32 = 0.7;

    /// Identifier sent in the ingest handshake
    pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
}
