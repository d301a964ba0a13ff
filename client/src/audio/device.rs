use crate::audio::error::{AudioError, AudioResult};
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};
use serde::{Deserialize, Serialize};

/// Which side of the audio path a device serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceDirection {
    /// Microphone
    Input,
    /// Speaker
    Output,
}

/// Information about an audio device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDevice {
    /// Device name, also used as the lookup key
    pub name: String,
    /// Input or output
    pub direction: DeviceDirection,
    /// Whether this is the host's default device for its direction
    pub is_default: bool,
    /// Supported sample rates among the common ones
    pub sample_rates: Vec<u32>,
}

const COMMON_RATES: [u32; 8] = [8000, 16000, 22050, 24000, 32000, 44100, 48000, 96000];

/// List all available input devices
///
/// # Errors
/// Returns `AudioError::DeviceNotFound` if no input devices are found.
///
/// # Example
/// ```no_run
/// use wybe_lib::audio::device::list_input_devices;
///
/// for device in list_input_devices().unwrap() {
///     println!("Microphone: {}", device.name);
/// }
/// ```
pub fn list_input_devices() -> AudioResult<Vec<AudioDevice>> {
    let host = cpal::default_host();
    let devices: Vec<Device> = host.input_devices()?.collect();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    describe_all(devices, DeviceDirection::Input, default_name)
}

/// List all available output devices
///
/// # Errors
/// Returns `AudioError::DeviceNotFound` if no output devices are found.
pub fn list_output_devices() -> AudioResult<Vec<AudioDevice>> {
    let host = cpal::default_host();
    let devices: Vec<Device> = host.output_devices()?.collect();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    describe_all(devices, DeviceDirection::Output, default_name)
}

/// Resolve an input device by name, or the default one
pub fn resolve_input_device(host: &Host, name: Option<&str>) -> AudioResult<Device> {
    match name {
        Some(name) => find_device(host.input_devices()?, name),
        None => host.default_input_device().ok_or(AudioError::DeviceNotFound),
    }
}

/// Resolve an output device by name, or the default one
pub fn resolve_output_device(host: &Host, name: Option<&str>) -> AudioResult<Device> {
    match name {
        Some(name) => find_device(host.output_devices()?, name),
        None => host.default_output_device().ok_or(AudioError::DeviceNotFound),
    }
}

fn find_device(mut devices: impl Iterator<Item = Device>, name: &str) -> AudioResult<Device> {
    devices
        .find(|device| device.name().map(|n| n == name).unwrap_or(false))
        .ok_or(AudioError::DeviceNotFound)
}

fn describe_all(
    devices: Vec<Device>,
    direction: DeviceDirection,
    default_name: Option<String>,
) -> AudioResult<Vec<AudioDevice>> {
    if devices.is_empty() {
        return Err(AudioError::DeviceNotFound);
    }

    let mut audio_devices = Vec::with_capacity(devices.len());

    for device in devices {
        let name = device.name().map_err(|_| AudioError::InvalidDeviceName)?;
        let is_default = default_name.as_deref() == Some(name.as_str());

        audio_devices.push(AudioDevice {
            sample_rates: supported_sample_rates(&device, direction),
            name,
            direction,
            is_default,
        });
    }

    Ok(audio_devices)
}

/// Get supported sample rates for a device
fn supported_sample_rates(device: &Device, direction: DeviceDirection) -> Vec<u32> {
    let ranges: Vec<(u32, u32)> = match direction {
        DeviceDirection::Input => device
            .supported_input_configs()
            .map(|configs| {
                configs
                    .map(|c| (c.min_sample_rate().0, c.max_sample_rate().0))
                    .collect()
            })
            .unwrap_or_default(),
        DeviceDirection::Output => device
            .supported_output_configs()
            .map(|configs| {
                configs
                    .map(|c| (c.min_sample_rate().0, c.max_sample_rate().0))
                    .collect()
            })
            .unwrap_or_default(),
    };

    let mut rates = rates_within(&ranges);

    // Fall back to the default config when the ranges are unavailable
    if rates.is_empty() {
        let default = match direction {
            DeviceDirection::Input => device.default_input_config(),
            DeviceDirection::Output => device.default_output_config(),
        };
        if let Ok(config) = default {
            rates.push(config.sample_rate().0);
        }
    }

    rates
}

fn rates_within(ranges: &[(u32, u32)]) -> Vec<u32> {
    let mut rates: Vec<u32> = COMMON_RATES
        .iter()
        .copied()
        .filter(|rate| ranges.iter().any(|&(min, max)| *rate >= min && *rate <= max))
        .collect();
    rates.sort_unstable();
    rates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_within_ranges() {
        let rates = rates_within(&[(16000, 24000), (48000, 48000)]);
        assert_eq!(rates, vec![16000, 22050, 24000, 48000]);

        assert!(rates_within(&[]).is_empty());
    }

    #[test]
    fn test_list_input_devices() {
        match list_input_devices() {
            Ok(devices) => {
                for device in &devices {
                    assert!(!device.name.is_empty(), "Device name should not be empty");
                    assert_eq!(device.direction, DeviceDirection::Input);
                }
                println!("Found {} input devices", devices.len());
            }
            Err(e) => {
                // No devices in CI
                eprintln!("Warning: Could not list input devices: {}", e);
            }
        }
    }

    #[test]
    fn test_list_output_devices() {
        match list_output_devices() {
            Ok(devices) => {
                for device in &devices {
                    assert_eq!(device.direction, DeviceDirection::Output);
                    println!(
                        "  - {} (default: {}, rates: {:?})",
                        device.name, device.is_default, device.sample_rates
                    );
                }
            }
            Err(e) => {
                eprintln!("Warning: Could not list output devices: {}", e);
            }
        }
    }

    #[test]
    fn test_device_not_found() {
        let host = cpal::default_host();
        let result = resolve_input_device(&host, Some("NonExistentDevice123456789"));
        assert!(matches!(
            result,
            Err(AudioError::DeviceNotFound) | Err(AudioError::CpalError(_))
        ));
    }

    #[test]
    fn test_resolve_output_device_by_name() {
        let Ok(devices) = list_output_devices() else {
            eprintln!("Warning: No output devices to resolve");
            return;
        };

        let host = cpal::default_host();
        let wanted = &devices[0].name;
        let device = resolve_output_device(&host, Some(wanted)).unwrap();
        assert_eq!(&device.name().unwrap(), wanted);
    }
}
