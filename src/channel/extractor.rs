//! Channel extractor
//!
//! Isolates one channel from the shared capture stream and turns it into
//! audio at the audio rate. Owns all of its filter state; the capture block
//! is only borrowed.

use num_complex::Complex32;
use tracing::info;

use super::{ChannelConfig, Rates, SquelchParams};
use crate::dsp::{
    low_pass, magnitude, Agc, AmSquelch, FirDecimator, FmDemod, FreqXlatingFir, PowerSquelch,
};

enum Chain {
    Am {
        agc: Agc,
        squelch: AmSquelch,
        audio_filter: FirDecimator,
    },
    Fm {
        squelch: PowerSquelch,
        agc: Agc,
        demod: FmDemod,
    },
}

pub struct ChannelExtractor {
    config: ChannelConfig,
    channel_filter: FreqXlatingFir,
    chain: Chain,
}

impl ChannelExtractor {
    pub fn new(config: ChannelConfig, rates: Rates) -> Self {
        info!(
            "Setting up {}: {:.3} MHz ({:+} Hz from center, {:?})",
            config.label,
            config.target_frequency as f64 / 1e6,
            config.offset_from_center,
            config.mode()
        );

        let device_rate = rates.device as f64;
        let demod_rate = rates.demod as f64;
        let taps = low_pass(device_rate, config.filter.channel);
        let channel_filter = FreqXlatingFir::new(
            rates.channel_decimation(),
            &taps,
            config.offset_from_center as f64,
            device_rate,
        );

        let chain = match config.squelch {
            SquelchParams::NoiseRatio { threshold } => {
                let audio_spec = config.filter.audio.unwrap_or(config.filter.channel);
                Chain::Am {
                    agc: Agc::new(0.1, 1.0, 1.0),
                    squelch: AmSquelch::new(demod_rate as f32, threshold),
                    audio_filter: FirDecimator::new(
                        rates.audio_decimation(),
                        &low_pass(demod_rate, audio_spec),
                    ),
                }
            }
            SquelchParams::Power {
                threshold_db,
                alpha,
                ramp,
                gate,
            } => Chain::Fm {
                squelch: PowerSquelch::new(threshold_db, alpha, ramp, gate),
                agc: Agc::new(0.1, 1.0, 1.0),
                demod: FmDemod::new(demod_rate, rates.audio_decimation()),
            },
        };

        Self {
            config,
            channel_filter,
            chain,
        }
    }

    pub fn label(&self) -> &str {
        &self.config.label
    }

    /// Run one capture block through the channel; returns audio samples,
    /// zero while the squelch is closed.
    pub fn process(&mut self, capture: &[Complex32]) -> Vec<f32> {
        let baseband = self.channel_filter.process(capture);
        match &mut self.chain {
            Chain::Am {
                agc,
                squelch,
                audio_filter,
            } => {
                let detected = magnitude(&agc.process(&baseband));
                audio_filter.process(&squelch.process(&detected))
            }
            Chain::Fm {
                squelch,
                agc,
                demod,
            } => demod.process(&agc.process(&squelch.process(&baseband))),
        }
    }
}

/// Scale float audio into saturating i16 PCM for the encoder
pub fn to_pcm(samples: &[f32], scale: f32) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * scale).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}
