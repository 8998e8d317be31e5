//! Multistream receiver
//!
//! Reads raw IQ for the planned capture window (typically piped from an
//! external tuner) and uploads every configured channel to Icecast.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sdr_multistream::{
    audio,
    capture::{IqStreamSource, SampleFormat},
    channel::Mode,
    config::{AppConfig, IngestConfig},
    station::Station,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Extra options appended to the suggested tuner command
    #[arg(short = 'a', long = "args")]
    device_args: Option<String>,
    /// Tuner device index
    #[arg(long = "dev")]
    device_index: Option<u32>,
    /// Channels as label=kHz, comma separated
    #[arg(short, long)]
    freqset: Option<String>,
    /// Demodulation mode (am or fm)
    #[arg(short, long)]
    mode: Option<Mode>,
    /// RF gain in dB
    #[arg(short, long)]
    gain: Option<f64>,
    /// Monitor output volume
    #[arg(short = 'V', long)]
    volume: Option<f32>,
    /// Icecast server host; uploading is off without it
    #[arg(short, long)]
    icecast: Option<String>,
    /// Icecast source password
    #[arg(short = 'p', long)]
    icepw: Option<String>,
    /// Local audio output device, `default` for the system default
    #[arg(short = 'O', long)]
    audio_output: Option<String>,
    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Raw IQ input, `-` for stdin
    #[arg(long)]
    input: Option<String>,
    /// IQ sample format (cu8, cs8, cs16, cf32)
    #[arg(long)]
    format: Option<SampleFormat>,
    /// Directory for the encoder pipes
    #[arg(long)]
    pipe_dir: Option<PathBuf>,
    /// Write the effective configuration and exit
    #[arg(long)]
    write_config: bool,
    /// List local audio output devices and exit
    #[arg(long)]
    list_outputs: bool,
}

impl Args {
    /// Layer command line values over the loaded configuration
    fn apply(&self, config: &mut AppConfig) {
        let capture = &mut config.capture;
        if let Some(args) = &self.device_args {
            capture.device_args = args.clone();
        }
        if let Some(index) = self.device_index {
            capture.device_index = index;
        }
        if let Some(gain) = self.gain {
            capture.rf_gain = gain;
        }
        if let Some(input) = &self.input {
            capture.input = input.clone();
        }
        if let Some(format) = self.format {
            capture.format = format;
        }

        if let Some(freqset) = &self.freqset {
            config.channels.freqset = freqset.clone();
        }
        if let Some(mode) = self.mode {
            config.channels.mode = mode;
        }

        if self.icecast.is_some() || self.icepw.is_some() {
            let ingest = config.ingest.get_or_insert_with(IngestConfig::default);
            if let Some(host) = &self.icecast {
                ingest.host = host.clone();
            }
            if let Some(password) = &self.icepw {
                ingest.password = password.clone();
            }
        }

        if let Some(dir) = &self.pipe_dir {
            config.encoder.pipe_dir = dir.clone();
        }
        if let Some(device) = &self.audio_output {
            config.audio.output_device = Some(device.clone());
        }
        if let Some(volume) = self.volume {
            config.audio.volume = volume;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if args.list_outputs {
        for name in audio::list_output_devices() {
            println!("{}", name);
        }
        return Ok(());
    }

    let mut config = AppConfig::load_or_default(args.config.as_deref())?;
    args.apply(&mut config);

    if args.write_config {
        let path = args
            .config
            .clone()
            .or_else(AppConfig::default_path)
            .context("no configuration path available")?;
        config.save(&path)?;
        tracing::info!("Configuration written to {}", path.display());
        return Ok(());
    }

    tracing::info!("Starting multistream");
    let mut station = Station::new(config.clone())?;

    if config.active_ingest().is_none() {
        tracing::warn!("No Icecast host configured, channels are not uploaded");
    }
    tracing::info!("Tuner command: {}", station.tuner_command());

    let source = IqStreamSource::new(
        config.capture.input.clone(),
        config.capture.format,
        config.capture.sample_rate,
        station.plan().center_frequency,
    );
    station.start(Box::new(source))?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            tracing::info!("Interrupted");
        }
        _ = station.wait() => tracing::info!("Capture input ended"),
    }

    station.shutdown().await;
    Ok(())
}
