//! Local audio monitoring: mixer, ring buffer and output device

pub mod buffer;
pub mod device;
pub mod mixer;
pub mod playback;

pub use buffer::{create_shared_buffer, AudioFrame, RingBuffer, SharedRingBuffer};
pub use device::{find_output_device, list_output_devices, AudioDevice};
pub use mixer::Mixer;
pub use playback::AudioPlayback;
