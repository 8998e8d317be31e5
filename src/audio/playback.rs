//! Local monitor output
//!
//! Plays the mixer's ring buffer on an output device. The cpal stream lives
//! on its own thread; a failure here disables monitoring and nothing else.

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::buffer::{FrameReader, SharedRingBuffer};
use crate::audio::device::find_output_device;
use crate::error::AudioError;

pub struct AudioPlayback {
    device_name: String,
    sample_rate: u32,
    running: Arc<AtomicBool>,
    input_buffer: SharedRingBuffer,
    thread_handle: Option<JoinHandle<()>>,
    error_rx: Option<Receiver<AudioError>>,
    samples_played: Arc<AtomicU64>,
}

impl AudioPlayback {
    pub fn new(device_name: &str, sample_rate: u32, input_buffer: SharedRingBuffer) -> Self {
        Self {
            device_name: device_name.to_string(),
            sample_rate,
            running: Arc::new(AtomicBool::new(false)),
            input_buffer,
            thread_handle: None,
            error_rx: None,
            samples_played: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Open the device and start playing. Device and format problems are
    /// reported here; later stream errors arrive on [`errors`].
    ///
    /// [`errors`]: AudioPlayback::errors
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let device = find_output_device(&self.device_name)?;
        let config = device.output_config(self.sample_rate)?;
        let channels = config.channels as usize;
        tracing::info!(
            "Audio output {}: {} Hz, {} channel(s)",
            device.name,
            self.sample_rate,
            channels
        );

        let (error_tx, error_rx) = bounded::<AudioError>(16);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);
        self.error_rx = Some(error_rx);

        let running = self.running.clone();
        let running_for_loop = self.running.clone();
        let samples_played = self.samples_played.clone();
        let mut reader = FrameReader::new(self.input_buffer.clone());

        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("audio-playback".to_string())
            .spawn(move || {
                let cpal_device = device.into_inner();

                let stream = cpal_device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        if !running.load(Ordering::Relaxed) {
                            data.fill(0.0);
                            return;
                        }
                        reader.fill(data, channels);
                        samples_played.fetch_add((data.len() / channels) as u64, Ordering::Relaxed);
                    },
                    move |err| {
                        let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
                    },
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                while running_for_loop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
                // Stream is dropped here, stopping playback
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        self.thread_handle = Some(handle);

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(AudioError::StreamError("playback thread exited".into())));
        if ready.is_err() {
            self.stop();
        }
        ready
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn samples_played(&self) -> u64 {
        self.samples_played.load(Ordering::Relaxed)
    }

    /// Stream errors raised after `start`; `None` before it
    pub fn errors(&self) -> Option<Receiver<AudioError>> {
        self.error_rx.clone()
    }
}

impl Drop for AudioPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}
