//! Named pipe hand-off between the signal graph and the encoder
//!
//! The signal graph never writes to the pipe itself. It queues PCM blocks to
//! a [`PcmWriter`] thread, which owns the write end and absorbs every stall
//! of the encoder process.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use tracing::{debug, error, info, warn};

use crate::error::EncoderError;

/// Poll period of the writer thread while idle or waiting for a reader
const WRITER_TICK: Duration = Duration::from_millis(100);

/// A FIFO on disk, removed again when dropped
#[derive(Debug)]
pub struct EncoderPipe {
    path: PathBuf,
}

impl EncoderPipe {
    /// Create `pipe-<label>.raw` in `dir`, replacing whatever is there
    pub fn create(dir: &Path, label: &str) -> Result<Self, EncoderError> {
        let path = dir.join(Self::file_name(label));
        let pipe_err = |reason: String| EncoderError::Pipe {
            path: path.display().to_string(),
            reason,
        };

        match fs::remove_file(&path) {
            Ok(()) => debug!("removed stale {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(pipe_err(e.to_string())),
        }
        nix::unistd::mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR)
            .map_err(|e| pipe_err(e.to_string()))?;

        Ok(Self { path })
    }

    /// File name for a label, with path separators and the like replaced
    pub fn file_name(label: &str) -> String {
        let safe: String = label
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("pipe-{}.raw", safe)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EncoderPipe {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Counters shared with whoever wants to report on the writer
#[derive(Debug, Default)]
pub struct PcmWriterStats {
    pub blocks_written: AtomicU64,
    /// Blocks discarded while no encoder had the pipe open
    pub blocks_discarded: AtomicU64,
    pub reopens: AtomicU64,
}

/// Thread feeding one channel's PCM into its encoder pipe
pub struct PcmWriter {
    label: String,
    stats: Arc<PcmWriterStats>,
    handle: Option<JoinHandle<()>>,
}

impl PcmWriter {
    pub fn spawn(
        label: String,
        path: PathBuf,
        blocks: Receiver<Vec<i16>>,
        running: Arc<AtomicBool>,
    ) -> Result<Self, EncoderError> {
        let stats = Arc::new(PcmWriterStats::default());
        let thread_stats = stats.clone();
        let thread_label = label.clone();

        let handle = thread::Builder::new()
            .name(format!("pcm-{}", label))
            .spawn(move || write_loop(&thread_label, &path, &blocks, &running, &thread_stats))
            .map_err(|e| EncoderError::Pipe {
                path: label.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            label,
            stats,
            handle: Some(handle),
        })
    }

    pub fn stats(&self) -> Arc<PcmWriterStats> {
        self.stats.clone()
    }

    /// Wait for the thread; it exits once the sender side is dropped or
    /// `running` is cleared.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("[{}] pcm writer thread panicked", self.label);
            }
        }
    }
}

/// Open the write end without blocking. Fails with ENXIO while no reader
/// has the FIFO open; once one has, a regular blocking handle is opened so
/// writes apply backpressure to this thread only.
fn open_writer(path: &Path) -> io::Result<File> {
    let probe = OpenOptions::new()
        .write(true)
        .custom_flags(OFlag::O_NONBLOCK.bits())
        .open(path)?;
    let file = OpenOptions::new().write(true).open(path)?;
    drop(probe);
    Ok(file)
}

fn pcm_bytes(block: &[i16]) -> Vec<u8> {
    block.iter().flat_map(|s| s.to_le_bytes()).collect()
}

fn write_loop(
    label: &str,
    path: &Path,
    blocks: &Receiver<Vec<i16>>,
    running: &AtomicBool,
    stats: &PcmWriterStats,
) {
    'open: while running.load(Ordering::Relaxed) {
        let mut file = match open_writer(path) {
            Ok(file) => file,
            Err(e) => {
                if e.raw_os_error() != Some(Errno::ENXIO as i32) {
                    warn!("[{}] cannot open encoder pipe {}: {}", label, path.display(), e);
                }
                // No reader yet: keep the queue from going stale
                match blocks.recv_timeout(WRITER_TICK) {
                    Ok(_) => {
                        stats.blocks_discarded.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break 'open,
                }
                continue;
            }
        };
        info!("[{}] encoder pipe open", label);

        loop {
            match blocks.recv_timeout(WRITER_TICK) {
                Ok(block) => {
                    if let Err(e) = file.write_all(&pcm_bytes(&block)) {
                        warn!("[{}] encoder pipe closed: {}", label, e);
                        stats.reopens.fetch_add(1, Ordering::Relaxed);
                        continue 'open;
                    }
                    stats.blocks_written.fetch_add(1, Ordering::Relaxed);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if !running.load(Ordering::Relaxed) {
                        break 'open;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break 'open,
            }
        }
    }
    debug!("[{}] pcm writer stopped", label);
}
