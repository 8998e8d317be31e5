//! The receiving station
//!
//! Owns every resource the system acquires. `new` only plans; `start`
//! acquires pipes, threads, processes, tasks and the audio device in that
//! order; `shutdown` releases them in reverse.

pub mod channel;
pub mod graph;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audio::{create_shared_buffer, AudioPlayback, Mixer};
use crate::capture::SampleSource;
use crate::channel::{ChannelConfig, ChannelExtractor, Rates};
use crate::codec::{EncoderPipe, PcmWriter, PcmWriterStats};
use crate::config::AppConfig;
use crate::constants::{PCM_QUEUE_DEPTH, RING_BUFFER_CAPACITY, SAMPLE_QUEUE_DEPTH};
use crate::error::{AudioError, ConfigError, Error, Result};
use crate::network::{IcecastConnector, SourceRequest, UploadSettings, UploadStats, Uploader};
use crate::planner::{plan, CapturePlan, FrequencySet};

pub use channel::ChannelSupervisor;
pub use graph::{ChannelStats, GraphChannel, SignalGraph};

/// How often per-channel statistics are logged
const MONITOR_INTERVAL: Duration = Duration::from_secs(30);

/// Everything observable about one channel
#[derive(Clone)]
pub struct ChannelHandle {
    pub label: String,
    pub graph: Arc<ChannelStats>,
    pub writer: Option<Arc<PcmWriterStats>>,
    pub upload: Option<Arc<UploadStats>>,
}

impl ChannelHandle {
    fn log_stats(&self) {
        let graph = &self.graph;
        let pcm_dropped = graph.pcm_dropped.load(Ordering::Relaxed);
        let (pcm_discarded, reopens) = self
            .writer
            .as_ref()
            .map(|w| {
                (
                    w.blocks_discarded.load(Ordering::Relaxed),
                    w.reopens.load(Ordering::Relaxed),
                )
            })
            .unwrap_or_default();
        match &self.upload {
            Some(upload) => {
                let s = upload.snapshot();
                info!(
                    "[{}] sent {} KiB in {} chunks, dropped {} chunks, {}/{} connects, pcm dropped {} discarded {}, pipe reopened {}",
                    self.label,
                    s.bytes_sent / 1024,
                    s.chunks_sent,
                    s.chunks_dropped,
                    s.connects,
                    s.connect_attempts,
                    pcm_dropped,
                    pcm_discarded,
                    reopens
                );
            }
            None => info!(
                "[{}] {} audio samples",
                self.label,
                graph.audio_samples.load(Ordering::Relaxed)
            ),
        }
    }
}

pub struct Station {
    config: AppConfig,
    plan: CapturePlan,
    rates: Rates,
    channels: Vec<ChannelConfig>,

    running: Arc<AtomicBool>,
    cancel: CancellationToken,
    handles: Vec<ChannelHandle>,
    pipes: Vec<EncoderPipe>,
    writers: Vec<PcmWriter>,
    supervisors: Vec<JoinHandle<u64>>,
    playback: Option<AudioPlayback>,
    graph: Option<thread::JoinHandle<u64>>,
    capture: Option<thread::JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
    finished: Option<oneshot::Receiver<()>>,
}

impl Station {
    /// Parse and plan. Fails before anything is acquired.
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let freqs: FrequencySet = config.channels.freqset.parse()?;
        let plan = plan(
            &freqs,
            config.capture.max_bandwidth,
            config.capture.channel_bandwidth,
        )?;

        let rates = Rates {
            device: config.capture.sample_rate,
            demod: config.channels.demod_rate,
            audio: config.channels.audio_rate,
        };
        info!(
            "Device rate {}, bandwidth {:.3} MHz",
            rates.device,
            config.capture.max_bandwidth as f64 / 1e6
        );
        info!("Demod rate {}, audio rate {}", rates.demod, rates.audio);

        let channels = ChannelConfig::derive(
            &freqs,
            &plan,
            config.channels.mode,
            rates,
            config.channels.am_squelch,
        );

        Ok(Self {
            config,
            plan,
            rates,
            channels,
            running: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            handles: Vec::new(),
            pipes: Vec::new(),
            writers: Vec::new(),
            supervisors: Vec::new(),
            playback: None,
            graph: None,
            capture: None,
            monitor: None,
            finished: None,
        })
    }

    pub fn plan(&self) -> &CapturePlan {
        &self.plan
    }

    pub fn rates(&self) -> Rates {
        self.rates
    }

    pub fn channels(&self) -> &[ChannelConfig] {
        &self.channels
    }

    pub fn handles(&self) -> &[ChannelHandle] {
        &self.handles
    }

    /// Command line for an external tuner producing the planned capture
    pub fn tuner_command(&self) -> String {
        let capture = &self.config.capture;
        let mut cmd = format!(
            "rtl_sdr -d {} -f {} -s {} -g {}",
            capture.device_index, self.plan.center_frequency, self.rates.device, capture.rf_gain
        );
        if capture.freq_correction_ppm != 0 {
            cmd.push_str(&format!(" -p {}", capture.freq_correction_ppm));
        }
        let extra = capture.device_args.trim();
        if !extra.is_empty() {
            cmd.push(' ');
            cmd.push_str(extra);
        }
        cmd.push_str(" -");
        cmd
    }

    /// Acquire everything and start streaming. Must be called from inside a
    /// tokio runtime.
    pub fn start(&mut self, mut source: Box<dyn SampleSource>) -> Result<()> {
        if source.sample_rate() != self.rates.device {
            return Err(ConfigError::Invalid(format!(
                "source delivers {} Hz, plan expects {} Hz",
                source.sample_rate(),
                self.rates.device
            ))
            .into());
        }
        if source.center_frequency() != self.plan.center_frequency {
            warn!(
                "source centered at {:.3} MHz, plan expects {:.3} MHz",
                source.center_frequency() as f64 / 1e6,
                self.plan.center_frequency as f64 / 1e6
            );
        }

        self.running.store(true, Ordering::SeqCst);
        let ingest = self.config.active_ingest().cloned();
        let mut graph_channels = Vec::with_capacity(self.channels.len());

        for config in &self.channels {
            let stats = Arc::new(ChannelStats::default());
            let mut handle = ChannelHandle {
                label: config.label.clone(),
                graph: stats.clone(),
                writer: None,
                upload: None,
            };
            let mut pcm = None;

            if let Some(ingest) = &ingest {
                let pipe = EncoderPipe::create(&self.config.encoder.pipe_dir, &config.label)?;
                let (tx, rx) = bounded(PCM_QUEUE_DEPTH);
                let writer = PcmWriter::spawn(
                    config.label.clone(),
                    pipe.path().to_path_buf(),
                    rx,
                    self.running.clone(),
                )?;
                handle.writer = Some(writer.stats());

                let request = SourceRequest {
                    label: config.label.clone(),
                    password: ingest.password.clone(),
                    user_agent: ingest.user_agent.clone(),
                    genre: ingest.genre.clone(),
                    bitrate: self.config.encoder.bitrate,
                    sample_rate: self.rates.audio,
                };
                let connector = IcecastConnector::new(ingest.host.clone(), ingest.port, request);
                let settings = UploadSettings::from(ingest);
                let uploader =
                    Uploader::new(config.label.clone(), connector, settings, self.cancel.clone());
                handle.upload = Some(uploader.stats());

                let supervisor = ChannelSupervisor::new(
                    self.config.encoder.clone(),
                    self.rates.audio,
                    pipe.path().to_path_buf(),
                    uploader,
                    settings.cooldown,
                    self.cancel.clone(),
                );
                self.supervisors.push(tokio::spawn(supervisor.run()));

                self.pipes.push(pipe);
                self.writers.push(writer);
                pcm = Some(tx);
            }

            graph_channels.push(GraphChannel {
                extractor: ChannelExtractor::new(config.clone(), self.rates),
                pcm,
                stats,
            });
            self.handles.push(handle);
        }

        let mixer = self.start_playback();

        let (sample_tx, sample_rx) = bounded(SAMPLE_QUEUE_DEPTH);
        let (done_tx, done_rx) = oneshot::channel();
        self.finished = Some(done_rx);

        let graph = SignalGraph::new(graph_channels, self.config.encoder.pcm_scale, mixer);
        let running = self.running.clone();
        self.graph = Some(
            thread::Builder::new()
                .name("signal-graph".to_string())
                .spawn(move || {
                    let blocks = graph.run(sample_rx, running);
                    let _ = done_tx.send(());
                    blocks
                })?,
        );

        let running = self.running.clone();
        self.capture = Some(
            thread::Builder::new()
                .name("capture".to_string())
                .spawn(move || {
                    if let Err(e) = source.run(sample_tx, running) {
                        error!("capture failed: {}", e);
                    }
                })?,
        );

        let handles = self.handles.clone();
        let playback_errors = self.playback.as_ref().and_then(AudioPlayback::errors);
        self.monitor = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(MONITOR_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval.tick().await;
            loop {
                interval.tick().await;
                for handle in &handles {
                    handle.log_stats();
                }
                if let Some(errors) = &playback_errors {
                    log_playback_errors(errors);
                }
            }
        }));

        info!("Station running with {} channel(s)", self.channels.len());
        Ok(())
    }

    /// Open the monitor output. Failure only disables monitoring.
    fn start_playback(&mut self) -> Option<Mixer> {
        let device = self.config.audio.output_device.clone()?;
        let buffer = create_shared_buffer(RING_BUFFER_CAPACITY);
        let mut playback = AudioPlayback::new(&device, self.rates.audio, buffer.clone());
        match playback.start() {
            Ok(()) => {
                self.playback = Some(playback);
                Some(Mixer::new(self.config.audio.volume).with_output(buffer))
            }
            Err(e) => {
                warn!("Audio output {} unavailable, monitoring disabled: {}", device, e);
                None
            }
        }
    }

    /// Resolve once the capture input has ended and the graph drained it
    pub async fn wait(&mut self) {
        if let Some(finished) = self.finished.take() {
            let _ = finished.await;
        }
    }

    /// Stop everything and release resources in reverse order
    pub async fn shutdown(&mut self) {
        info!("Shutting down");
        self.running.store(false, Ordering::SeqCst);
        self.cancel.cancel();

        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }

        if let Some(graph) = self.graph.take() {
            match tokio::task::spawn_blocking(move || graph.join()).await {
                Ok(Ok(blocks)) => debug!("signal graph processed {} blocks", blocks),
                _ => error!("signal graph thread panicked"),
            }
        }
        if let Some(capture) = self.capture.take() {
            // A source blocked on stdin cannot observe the flag; leave it
            if capture.is_finished() {
                let _ = capture.join();
            } else {
                debug!("capture thread still blocked on input, detaching");
            }
        }

        for supervisor in self.supervisors.drain(..) {
            let _ = supervisor.await;
        }

        let writers: Vec<PcmWriter> = self.writers.drain(..).collect();
        let _ = tokio::task::spawn_blocking(move || {
            for writer in writers {
                writer.join();
            }
        })
        .await;

        if let Some(mut playback) = self.playback.take() {
            if let Some(errors) = playback.errors() {
                log_playback_errors(&errors);
            }
            playback.stop();
            debug!("monitor played {} samples", playback.samples_played());
        }

        for handle in &self.handles {
            handle.log_stats();
        }
        self.pipes.clear();
        info!("Shutdown complete");
    }
}

/// Warn about every queued playback error; returns how many there were
fn log_playback_errors(errors: &Receiver<AudioError>) -> usize {
    let mut count = 0;
    for e in errors.try_iter() {
        warn!("Audio output error: {}", e);
        count += 1;
    }
    count
}
