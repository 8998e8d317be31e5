//! Error types for the multistream receiver

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    #[error("Capture error: {0}")]
    Source(#[from] SourceError),

    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frequency planning errors. All of them are fatal: nothing else is
/// acquired until the plan succeeds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error(
        "Required bandwidth {:.3} MHz larger than maximum bandwidth {:.3} MHz",
        mhz(.required),
        mhz(.maximum)
    )]
    CapacityExceeded { required: u64, maximum: u64 },

    #[error("Frequency set is empty")]
    EmptyFrequencySet,

    #[error("Invalid frequency set entry: {0:?}")]
    InvalidEntry(String),

    #[error("Duplicate channel label: {0}")]
    DuplicateLabel(String),

    #[error("Frequency for channel {0} must be positive")]
    NonPositiveFrequency(String),
}

fn mhz(hz: &u64) -> f64 {
    *hz as f64 / 1e6
}

/// Sample source errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Read error: {0}")]
    Read(#[from] std::io::Error),
}

/// Encoder plumbing errors
#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Failed to create pipe {path}: {reason}")]
    Pipe { path: String, reason: String },

    #[error("Failed to launch encoder {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Encoder process has no stdout")]
    MissingStdout,

    #[error("Encoder output ended")]
    StreamEnded,

    #[error("Encoder read failed: {0}")]
    Read(#[source] std::io::Error),
}

/// Why the ingest server refused a source connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeFailure {
    #[error("No response from icecast server")]
    NoResponse,

    #[error("Server response: {0}")]
    Rejected(String),
}

/// Upload errors. Recoverable: they never leave the uploader loop.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeFailure),

    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("Timed out during {0}")]
    Timeout(&'static str),
}

/// Local audio output errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to write config: {0}")]
    Write(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
