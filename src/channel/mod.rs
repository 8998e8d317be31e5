//! Per-channel configuration
//!
//! Every label in the frequency set becomes one immutable [`ChannelConfig`],
//! derived once from the capture plan and handed to its extractor.

pub mod extractor;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dsp::{AmSquelch, LowPassSpec};
use crate::planner::{CapturePlan, FrequencySet};

pub use extractor::{to_pcm, ChannelExtractor};

/// Demodulation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Am,
    #[default]
    Fm,
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "am" => Ok(Mode::Am),
            "fm" => Ok(Mode::Fm),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

/// Sample rates along the signal path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rates {
    /// Capture rate
    pub device: u32,
    pub demod: u32,
    pub audio: u32,
}

impl Rates {
    pub fn channel_decimation(&self) -> usize {
        (self.device / self.demod).max(1) as usize
    }

    pub fn audio_decimation(&self) -> usize {
        (self.demod / self.audio).max(1) as usize
    }
}

/// Squelch settings. The variant also selects the demodulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SquelchParams {
    /// Noise-ratio gate on detected AM audio
    NoiseRatio { threshold: f32 },
    /// Power gate on the channel baseband (FM)
    Power {
        threshold_db: f32,
        alpha: f32,
        ramp: usize,
        gate: bool,
    },
}

/// Filter settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    /// Channel filter at the device rate
    pub channel: LowPassSpec,
    /// Audio filter at the demod rate (AM; FM carries its own)
    pub audio: Option<LowPassSpec>,
}

const AM_CHANNEL_FILTER: LowPassSpec = LowPassSpec::new(8_000.0, 2_000.0, 60.0);
const FM_CHANNEL_FILTER: LowPassSpec = LowPassSpec::new(16_000.0, 3_000.0, 60.0);
const AM_AUDIO_FILTER: LowPassSpec = LowPassSpec::new(7_000.0, 2_000.0, 60.0);
const FM_SQUELCH_DB: f32 = -50.0;

/// Everything one extractor needs
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub label: String,
    pub target_frequency: u64,
    pub offset_from_center: i64,
    pub squelch: SquelchParams,
    pub filter: FilterParams,
}

impl ChannelConfig {
    pub fn mode(&self) -> Mode {
        match self.squelch {
            SquelchParams::NoiseRatio { .. } => Mode::Am,
            SquelchParams::Power { .. } => Mode::Fm,
        }
    }

    /// Build one config per label, in frequency set order.
    ///
    /// `am_squelch` fixes the AM threshold; without it the midpoint of the
    /// detector's range is used.
    pub fn derive(
        freqs: &FrequencySet,
        plan: &CapturePlan,
        mode: Mode,
        rates: Rates,
        am_squelch: Option<f32>,
    ) -> Vec<ChannelConfig> {
        let squelch = match mode {
            Mode::Am => {
                let (lo, hi) = AmSquelch::RANGE;
                let threshold = am_squelch.unwrap_or((lo + hi) / 2.0);
                info!("Squelch: range {:.1} ... {:.1}, using {:.2}", lo, hi, threshold);
                SquelchParams::NoiseRatio { threshold }
            }
            Mode::Fm => SquelchParams::Power {
                threshold_db: FM_SQUELCH_DB,
                alpha: 125.0 / rates.demod as f32,
                ramp: (rates.demod / 20) as usize,
                gate: false,
            },
        };
        let filter = match mode {
            Mode::Am => FilterParams {
                channel: AM_CHANNEL_FILTER,
                audio: Some(AM_AUDIO_FILTER),
            },
            Mode::Fm => FilterParams {
                channel: FM_CHANNEL_FILTER,
                audio: None,
            },
        };

        freqs
            .iter()
            .map(|(label, hz)| ChannelConfig {
                label: label.to_string(),
                target_frequency: hz,
                offset_from_center: plan.offset_of(hz),
                squelch,
                filter,
            })
            .collect()
    }
}
