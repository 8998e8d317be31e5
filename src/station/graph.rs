//! Signal graph thread
//!
//! Fans every capture block out to all extractors, converts each channel's
//! audio to PCM for its encoder queue and feeds the mixer. Nothing here
//! waits on encoder or network I/O: a full PCM queue drops the block.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, warn};

use crate::audio::Mixer;
use crate::capture::SampleBuf;
use crate::channel::{to_pcm, ChannelExtractor};

/// Per-channel counters kept by the signal graph
#[derive(Debug, Default)]
pub struct ChannelStats {
    pub audio_samples: AtomicU64,
    pub pcm_blocks: AtomicU64,
    /// PCM blocks dropped because the writer queue was full
    pub pcm_dropped: AtomicU64,
}

/// One extractor and where its audio goes
pub struct GraphChannel {
    pub extractor: ChannelExtractor,
    /// Encoder queue; `None` when uploading is disabled
    pub pcm: Option<Sender<Vec<i16>>>,
    pub stats: Arc<ChannelStats>,
}

pub struct SignalGraph {
    channels: Vec<GraphChannel>,
    pcm_scale: f32,
    mixer: Option<Mixer>,
    blocks: u64,
}

impl SignalGraph {
    pub fn new(channels: Vec<GraphChannel>, pcm_scale: f32, mixer: Option<Mixer>) -> Self {
        Self {
            channels,
            pcm_scale,
            mixer,
            blocks: 0,
        }
    }

    /// Push one capture block through every channel
    pub fn process(&mut self, block: &SampleBuf) {
        let mut mix_inputs = Vec::new();

        for channel in &mut self.channels {
            let audio = channel.extractor.process(&block.samples);
            channel
                .stats
                .audio_samples
                .fetch_add(audio.len() as u64, Ordering::Relaxed);

            if let Some(pcm) = &channel.pcm {
                if !audio.is_empty() {
                    match pcm.try_send(to_pcm(&audio, self.pcm_scale)) {
                        Ok(()) => {
                            channel.stats.pcm_blocks.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(TrySendError::Full(_)) => {
                            channel.stats.pcm_dropped.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(TrySendError::Disconnected(_)) => {
                            warn!("[{}] pcm writer gone", channel.extractor.label());
                            channel.pcm = None;
                        }
                    }
                }
            }

            if self.mixer.is_some() {
                mix_inputs.push(audio);
            }
        }

        if let Some(mixer) = &mut self.mixer {
            mixer.push(&mix_inputs);
        }
        self.blocks += 1;
    }

    /// Run until the capture side hangs up or `running` is cleared
    pub fn run(mut self, rx: Receiver<SampleBuf>, running: Arc<AtomicBool>) -> u64 {
        while running.load(Ordering::Relaxed) {
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(block) => self.process(&block),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("signal graph stopped after {} blocks", self.blocks);
        self.blocks
    }
}
