//! Application configuration
//!
//! Loaded from a TOML file; every field has a default so a partial file (or
//! none at all) is valid. The binary layers command-line overrides on top.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::capture::SampleFormat;
use crate::channel::Mode;
use crate::constants::*;
use crate::error::ConfigError;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub capture: CaptureConfig,
    pub channels: ChannelsConfig,
    /// Absent (or an empty host) disables uploading
    pub ingest: Option<IngestConfig>,
    pub encoder: EncoderConfig,
    pub audio: AudioConfig,
}

/// Capture device and IQ input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Tuner device index
    pub device_index: u32,
    /// Extra options appended verbatim to the suggested tuner command
    pub device_args: String,
    /// RF gain in dB
    pub rf_gain: f64,
    /// IF and baseband gains are only stored here for tuners with separate
    /// stages; `rtl_sdr` has no options for them, so the suggested tuner
    /// command leaves them out.
    pub if_gain: f64,
    pub bb_gain: f64,
    pub freq_correction_ppm: i32,
    pub sample_rate: u32,
    /// Widest span the device can digitize at once
    pub max_bandwidth: u64,
    /// Channel spacing used to keep channels off the center
    pub channel_bandwidth: u64,
    /// Raw IQ input path, `-` for stdin
    pub input: String,
    pub format: SampleFormat,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            device_args: String::new(),
            rf_gain: 30.0,
            if_gain: 7.0,
            bb_gain: 10.0,
            freq_correction_ppm: 0,
            sample_rate: DEFAULT_DEVICE_RATE,
            max_bandwidth: DEFAULT_MAX_BANDWIDTH,
            channel_bandwidth: DEFAULT_CHANNEL_BANDWIDTH,
            input: "-".to_string(),
            format: SampleFormat::Cu8,
        }
    }
}

/// Channel set and demodulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    /// `label=kHz,label=kHz,...`
    pub freqset: String,
    pub mode: Mode,
    pub demod_rate: u32,
    pub audio_rate: u32,
    /// Fixed AM squelch threshold; `None` uses the midpoint of the probed range
    pub am_squelch: Option<f32>,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            freqset: String::new(),
            mode: Mode::Fm,
            demod_rate: DEFAULT_DEMOD_RATE,
            audio_rate: DEFAULT_AUDIO_RATE,
            am_squelch: Some(DEFAULT_AM_SQUELCH),
        }
    }
}

/// Icecast ingest endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub host: String,
    pub port: u16,
    /// Source password
    pub password: String,
    pub user_agent: String,
    pub genre: String,
    pub poll_interval_ms: u64,
    pub reconnect_cooldown_secs: u64,
    pub chunk_size: usize,
    /// Bound on connect and on each send; `None` waits indefinitely
    pub send_timeout_secs: Option<u64>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_INGEST_PORT,
            password: String::new(),
            user_agent: USER_AGENT.to_string(),
            genre: "AM".to_string(),
            poll_interval_ms: POLL_INTERVAL.as_millis() as u64,
            reconnect_cooldown_secs: RECONNECT_COOLDOWN.as_secs(),
            chunk_size: CHUNK_SIZE,
            send_timeout_secs: Some(DEFAULT_SEND_TIMEOUT.as_secs()),
        }
    }
}

impl IngestConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reconnect_cooldown(&self) -> Duration {
        Duration::from_secs(self.reconnect_cooldown_secs)
    }

    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_secs.map(Duration::from_secs)
    }
}

/// External MP3 encoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub program: String,
    /// kbps
    pub bitrate: u32,
    pub pcm_scale: f32,
    /// Directory holding the per-channel named pipes
    pub pipe_dir: PathBuf,
    pub high_quality: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: "lame".to_string(),
            bitrate: DEFAULT_BITRATE,
            pcm_scale: PCM_SCALE,
            pipe_dir: PathBuf::from("."),
            high_quality: true,
        }
    }
}

/// Local monitor output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name; `None` disables the mixer
    pub output_device: Option<String>,
    pub volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            output_device: None,
            volume: DEFAULT_VOLUME,
        }
    }
}

impl AppConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "multistream", "multistream")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Load `path`, or the default location; missing files yield defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Write as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self).map_err(|e| ConfigError::Write(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Write(e.to_string()))?;
        }
        fs::write(path, text).map_err(|e| ConfigError::Write(e.to_string()))
    }

    /// Ingest settings, if uploading is enabled
    pub fn active_ingest(&self) -> Option<&IngestConfig> {
        self.ingest.as_ref().filter(|i| !i.host.is_empty())
    }

    /// Check rate relationships and other cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.channels;
        if c.demod_rate == 0 || c.audio_rate == 0 || self.capture.sample_rate == 0 {
            return Err(ConfigError::Invalid("rates must be non-zero".into()));
        }
        if self.capture.sample_rate / c.demod_rate < 1 {
            return Err(ConfigError::Invalid(format!(
                "demod rate {} exceeds device rate {}",
                c.demod_rate, self.capture.sample_rate
            )));
        }
        if c.demod_rate / c.audio_rate < 1 {
            return Err(ConfigError::Invalid(format!(
                "audio rate {} exceeds demod rate {}",
                c.audio_rate, c.demod_rate
            )));
        }
        if let Some(threshold) = c.am_squelch {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::Invalid(format!(
                    "AM squelch {} outside 0.0 ..= 1.0",
                    threshold
                )));
            }
        }
        if self.encoder.bitrate == 0 {
            return Err(ConfigError::Invalid("encoder bitrate must be non-zero".into()));
        }
        if let Some(ingest) = self.active_ingest() {
            if ingest.chunk_size == 0 {
                return Err(ConfigError::Invalid("chunk size must be non-zero".into()));
            }
        }
        Ok(())
    }
}
