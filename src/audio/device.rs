//! Output device lookup

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{SampleFormat, StreamConfig, SupportedStreamConfigRange};

use crate::error::AudioError;

/// Name that selects the host's default output device
pub const DEFAULT_DEVICE: &str = "default";

/// Wrapper around cpal device
pub struct AudioDevice {
    inner: cpal::Device,
    pub name: String,
}

impl AudioDevice {
    pub fn from_cpal(device: cpal::Device) -> Self {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        Self { inner: device, name }
    }

    pub fn into_inner(self) -> cpal::Device {
        self.inner
    }

    /// Get supported output configurations
    pub fn supported_output_configs(&self) -> Result<Vec<SupportedStreamConfigRange>, AudioError> {
        self.inner
            .supported_output_configs()
            .map(|iter| iter.collect())
            .map_err(|e| AudioError::DeviceNotFound(e.to_string()))
    }

    /// f32 output config at `sample_rate`, mono if the device offers it,
    /// otherwise the fewest channels available
    pub fn output_config(&self, sample_rate: u32) -> Result<StreamConfig, AudioError> {
        let configs = self.supported_output_configs()?;
        pick_config(&configs, sample_rate).ok_or_else(|| {
            AudioError::UnsupportedFormat(format!(
                "{} has no f32 output at {} Hz",
                self.name, sample_rate
            ))
        })
    }
}

fn pick_config(configs: &[SupportedStreamConfigRange], sample_rate: u32) -> Option<StreamConfig> {
    let rate = cpal::SampleRate(sample_rate);
    configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.min_sample_rate() <= rate && rate <= c.max_sample_rate())
        .min_by_key(|c| c.channels())
        .map(|c| StreamConfig {
            channels: c.channels(),
            sample_rate: rate,
            buffer_size: cpal::BufferSize::Default,
        })
}

/// Names of all output devices on the default host
pub fn list_output_devices() -> Vec<String> {
    let host = cpal::default_host();
    host.output_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}

/// Find an output device by name; `default` picks the host default
pub fn find_output_device(name: &str) -> Result<AudioDevice, AudioError> {
    let host = cpal::default_host();

    if name == DEFAULT_DEVICE {
        return host
            .default_output_device()
            .map(AudioDevice::from_cpal)
            .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()));
    }

    let devices = host
        .output_devices()
        .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?;

    for device in devices {
        if let Ok(device_name) = device.name() {
            if device_name == name {
                return Ok(AudioDevice::from_cpal(device));
            }
        }
    }

    Err(AudioError::DeviceNotFound(name.to_string()))
}
