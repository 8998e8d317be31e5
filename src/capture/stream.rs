//! Raw interleaved IQ from a file or stdin
//!
//! Lets an external tuner process (`rtl_sdr -f <center> -s <rate> -`) feed
//! the signal graph through a pipe.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use num_complex::Complex32;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{SampleBuf, SampleSource};
use crate::error::SourceError;

/// IQ sample format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Unsigned 8 bit offset binary, the RTL-SDR native format
    Cu8,
    /// Signed 8 bit
    Cs8,
    /// Signed 16 bit little-endian
    Cs16,
    /// 32 bit float little-endian
    Cf32,
}

impl SampleFormat {
    /// Bytes per complex sample
    pub fn sample_size(self) -> usize {
        match self {
            SampleFormat::Cu8 | SampleFormat::Cs8 => 2,
            SampleFormat::Cs16 => 4,
            SampleFormat::Cf32 => 8,
        }
    }

    /// Convert whole samples in `bytes` into `out`
    pub fn decode(self, bytes: &[u8], out: &mut Vec<Complex32>) {
        let size = self.sample_size();
        out.extend(bytes.chunks_exact(size).map(|s| match self {
            SampleFormat::Cu8 => Complex32::new(
                (s[0] as f32 - 127.5) / 127.5,
                (s[1] as f32 - 127.5) / 127.5,
            ),
            SampleFormat::Cs8 => {
                Complex32::new(s[0] as i8 as f32 / 128.0, s[1] as i8 as f32 / 128.0)
            }
            SampleFormat::Cs16 => Complex32::new(
                i16::from_le_bytes([s[0], s[1]]) as f32 / 32768.0,
                i16::from_le_bytes([s[2], s[3]]) as f32 / 32768.0,
            ),
            SampleFormat::Cf32 => Complex32::new(
                f32::from_le_bytes([s[0], s[1], s[2], s[3]]),
                f32::from_le_bytes([s[4], s[5], s[6], s[7]]),
            ),
        }));
    }
}

impl std::str::FromStr for SampleFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cu8" => Ok(SampleFormat::Cu8),
            "cs8" => Ok(SampleFormat::Cs8),
            "cs16" => Ok(SampleFormat::Cs16),
            "cf32" => Ok(SampleFormat::Cf32),
            other => Err(format!("unknown sample format: {}", other)),
        }
    }
}

/// Reads IQ from a path (`-` for stdin) and sends it as [`SampleBuf`] blocks
pub struct IqStreamSource {
    path: String,
    format: SampleFormat,
    sample_rate: u32,
    center_freq: u64,
    /// Complex samples per block
    block_size: usize,
}

impl IqStreamSource {
    pub fn new(
        path: impl Into<String>,
        format: SampleFormat,
        sample_rate: u32,
        center_freq: u64,
    ) -> Self {
        Self {
            path: path.into(),
            format,
            sample_rate,
            center_freq,
            block_size: 16384,
        }
    }

    pub fn set_block_size(&mut self, size: usize) {
        self.block_size = size.max(1);
    }

    fn open(&self) -> Result<Box<dyn Read + Send>, SourceError> {
        if self.path == "-" {
            return Ok(Box::new(io::stdin()));
        }
        let file = File::open(&self.path).map_err(|source| SourceError::Open {
            path: self.path.clone(),
            source,
        })?;
        Ok(Box::new(file))
    }

    /// Pump `reader` until EOF. Partial trailing samples are carried over to
    /// the next read so sample alignment never slips.
    fn pump<R: Read>(
        &self,
        reader: R,
        tx: &Sender<SampleBuf>,
        running: &AtomicBool,
    ) -> Result<u64, SourceError> {
        let mut reader = BufReader::with_capacity(1024 * 1024, reader);
        let sample_size = self.format.sample_size();
        let mut buf = vec![0u8; self.block_size * sample_size];
        let mut filled = 0usize;
        let mut total = 0u64;

        while running.load(Ordering::Relaxed) {
            let n = match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            filled += n;

            let whole = filled - filled % sample_size;
            if whole == 0 {
                continue;
            }

            let mut samples = Vec::with_capacity(whole / sample_size);
            self.format.decode(&buf[..whole], &mut samples);
            total += samples.len() as u64;
            buf.copy_within(whole..filled, 0);
            filled -= whole;

            if tx.send(SampleBuf { samples }).is_err() {
                debug!("sample receiver dropped");
                break;
            }
        }

        Ok(total)
    }
}

impl SampleSource for IqStreamSource {
    fn run(&mut self, tx: Sender<SampleBuf>, running: Arc<AtomicBool>) -> Result<(), SourceError> {
        let reader = self.open()?;
        info!(
            "reading IQ from {} ({:?}, {} Hz, {:.3} MHz)",
            self.path,
            self.format,
            self.sample_rate,
            self.center_freq as f64 / 1e6
        );

        let total = self.pump(reader, &tx, &running)?;
        info!("end of IQ input {} after {} samples", self.path, total);
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn center_frequency(&self) -> u64 {
        self.center_freq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::io::Write;

    #[test]
    fn test_decode_cu8() {
        let mut out = Vec::new();
        SampleFormat::Cu8.decode(&[255, 0, 127, 128, 1], &mut out);
        assert_eq!(out.len(), 2);
        assert!((out[0].re - 1.0).abs() < 1e-6);
        assert!((out[0].im + 1.0).abs() < 1e-6);
        assert!(out[1].re.abs() < 0.01 && out[1].im.abs() < 0.01);
    }

    #[test]
    fn test_decode_cs16_and_cf32() {
        let mut out = Vec::new();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&16384i16.to_le_bytes());
        bytes.extend_from_slice(&(-32768i16).to_le_bytes());
        SampleFormat::Cs16.decode(&bytes, &mut out);
        assert_eq!(out, vec![Complex32::new(0.5, -1.0)]);

        let mut out = Vec::new();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0.25f32.to_le_bytes());
        bytes.extend_from_slice(&(-0.75f32).to_le_bytes());
        SampleFormat::Cf32.decode(&bytes, &mut out);
        assert_eq!(out, vec![Complex32::new(0.25, -0.75)]);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("CU8".parse::<SampleFormat>(), Ok(SampleFormat::Cu8));
        assert_eq!("cf32".parse::<SampleFormat>(), Ok(SampleFormat::Cf32));
        assert!("wav".parse::<SampleFormat>().is_err());
    }

    /// Reader returning one byte per call, to split samples across reads
    struct Trickle(Vec<u8>, usize);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.1 >= self.0.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.0[self.1];
            self.1 += 1;
            Ok(1)
        }
    }

    #[test]
    fn test_pump_keeps_alignment() {
        let mut bytes = Vec::new();
        for i in 0..10i16 {
            bytes.extend_from_slice(&(i * 100).to_le_bytes());
            bytes.extend_from_slice(&(-i * 100).to_le_bytes());
        }
        let source = IqStreamSource::new("-", SampleFormat::Cs16, 2_048_000, 145_000_000);
        let (tx, rx) = unbounded();
        let running = AtomicBool::new(true);

        let total = source.pump(Trickle(bytes, 0), &tx, &running).unwrap();
        drop(tx);

        assert_eq!(total, 10);
        let samples: Vec<Complex32> = rx.iter().flat_map(|b| b.samples).collect();
        assert_eq!(samples.len(), 10);
        for (i, s) in samples.iter().enumerate() {
            let expected = (i as f32 * 100.0) / 32768.0;
            assert!((s.re - expected).abs() < 1e-6);
            assert!((s.im + expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_run_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[127u8; 2 * 1000]).unwrap();
        file.flush().unwrap();

        let mut source = IqStreamSource::new(
            file.path().to_string_lossy(),
            SampleFormat::Cu8,
            2_048_000,
            145_000_000,
        );
        source.set_block_size(256);
        let (tx, rx) = unbounded();
        source.run(tx, Arc::new(AtomicBool::new(true))).unwrap();

        let count: usize = rx.iter().map(|b| b.samples.len()).sum();
        assert_eq!(count, 1000);
        assert_eq!(source.center_frequency(), 145_000_000);
    }

    #[test]
    fn test_run_missing_file() {
        let mut source = IqStreamSource::new("/nonexistent/iq.raw", SampleFormat::Cu8, 1, 1);
        let (tx, _rx) = unbounded();
        let err = source.run(tx, Arc::new(AtomicBool::new(true))).unwrap_err();
        assert!(matches!(err, SourceError::Open { .. }));
    }
}
