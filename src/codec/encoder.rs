//! External MP3 encoder process
//!
//! One `lame` per channel reads raw PCM from the channel's named pipe and
//! writes the compressed stream to its stdout, which the uploader consumes.

use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::config::EncoderConfig;
use crate::error::EncoderError;

/// Running encoder for one channel
pub struct EncoderProcess {
    label: String,
    child: Child,
}

impl EncoderProcess {
    /// Encoder arguments: mono, raw little-endian input at `sample_rate`,
    /// flushing every frame so the stream has no extra latency
    pub fn command_args(config: &EncoderConfig, sample_rate: u32, input: &Path) -> Vec<String> {
        let mut args = vec![
            "-b".to_string(),
            config.bitrate.to_string(),
            "-m".to_string(),
            "m".to_string(),
            "-r".to_string(),
            "-s".to_string(),
            sample_rate.to_string(),
            "--flush".to_string(),
        ];
        if config.high_quality {
            args.push("-h".to_string());
        }
        args.push("--silent".to_string());
        args.push(input.display().to_string());
        args.push("-".to_string());
        args
    }

    /// Spawn the encoder and hand back its stdout
    pub fn launch(
        label: &str,
        config: &EncoderConfig,
        sample_rate: u32,
        input: &Path,
    ) -> Result<(Self, ChildStdout), EncoderError> {
        let args = Self::command_args(config, sample_rate, input);
        debug!("[{}] {} {}", label, config.program, args.join(" "));

        let mut child = Command::new(&config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EncoderError::Launch {
                program: config.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or(EncoderError::MissingStdout)?;
        info!(
            "[{}] encoder started (pid {})",
            label,
            child.id().map(|p| p.to_string()).unwrap_or_else(|| "?".into())
        );

        Ok((
            Self {
                label: label.to_string(),
                child,
            },
            stdout,
        ))
    }

    /// Kill the process and reap it
    pub async fn shutdown(mut self) {
        if let Err(e) = self.child.kill().await {
            warn!("[{}] failed to stop encoder: {}", self.label, e);
        }
        debug!("[{}] encoder stopped", self.label);
    }
}
