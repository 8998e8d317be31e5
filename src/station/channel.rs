//! Per-channel encoder and upload supervisor
//!
//! Keeps one encoder process alive for a channel and pumps its output
//! through the channel's uploader. The upload session belongs to the
//! supervisor, so it survives encoder restarts.

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::codec::EncoderProcess;
use crate::config::EncoderConfig;
use crate::network::{Connector, Uploader};

pub struct ChannelSupervisor<C: Connector> {
    label: String,
    encoder: EncoderConfig,
    sample_rate: u32,
    pipe_path: PathBuf,
    uploader: Uploader<C>,
    relaunch_delay: Duration,
    cancel: CancellationToken,
}

impl<C: Connector> ChannelSupervisor<C> {
    pub fn new(
        encoder: EncoderConfig,
        sample_rate: u32,
        pipe_path: PathBuf,
        uploader: Uploader<C>,
        relaunch_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            label: uploader.label().to_string(),
            encoder,
            sample_rate,
            pipe_path,
            uploader,
            relaunch_delay,
            cancel,
        }
    }

    /// Run until cancelled. Returns the number of encoder launches.
    pub async fn run(mut self) -> u64 {
        let mut launches = 0u64;

        while !self.cancel.is_cancelled() {
            match EncoderProcess::launch(&self.label, &self.encoder, self.sample_rate, &self.pipe_path) {
                Ok((process, mut stdout)) => {
                    launches += 1;
                    let result = self.uploader.run(&mut stdout).await;
                    process.shutdown().await;
                    match result {
                        Ok(()) => break,
                        Err(e) => warn!(
                            "[{}] encoder failed: {}; relaunching in {:?}",
                            self.label, e, self.relaunch_delay
                        ),
                    }
                }
                Err(e) => error!(
                    "[{}] {}; retrying in {:?}",
                    self.label, e, self.relaunch_delay
                ),
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.relaunch_delay) => {}
            }
        }

        self.uploader.close().await;
        info!("[{}] channel stopped", self.label);
        launches
    }
}
