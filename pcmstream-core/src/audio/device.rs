//! Audio output device enumeration.

use serde::{Deserialize, Serialize};

/// Metadata about an audio output device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    /// Whether this is the system default output device.
    pub is_default: bool,
    /// Default output sample rate, if the device reported one.
    pub default_sample_rate: Option<u32>,
    /// Default output channel count, if the device reported one.
    pub default_channels: Option<u16>,
}

/// Order devices for display: default first, then by case-insensitive name.
pub fn sort_for_display(devices: &mut [DeviceInfo]) {
    devices.sort_by_key(|d| (!d.is_default, d.name.to_ascii_lowercase()));
}

/// List all available audio output devices on the system.
///
/// Returns an empty `Vec` if cpal is not available or no devices exist.
#[cfg(feature = "audio-cpal")]
pub fn list_output_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    match host.output_devices() {
        Ok(devices) => {
            let mut list = devices
                .enumerate()
                .map(|(idx, device)| {
                    let name = device
                        .name()
                        .unwrap_or_else(|_| format!("Output Device {}", idx + 1));
                    let is_default = default_name.as_deref() == Some(name.as_str());
                    let config = device.default_output_config().ok();
                    DeviceInfo {
                        name,
                        is_default,
                        default_sample_rate: config.as_ref().map(|c| c.sample_rate().0),
                        default_channels: config.as_ref().map(|c| c.channels()),
                    }
                })
                .collect::<Vec<_>>();
            sort_for_display(&mut list);
            list
        }
        Err(e) => {
            tracing::warn!("failed to enumerate output devices: {e}");
            match default_name {
                Some(name) => vec![DeviceInfo {
                    name,
                    is_default: true,
                    default_sample_rate: None,
                    default_channels: None,
                }],
                None => vec![],
            }
        }
    }
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_output_devices() -> Vec<DeviceInfo> {
    vec![]
}

#[cfg(test)]
mod tests {
    use super::{sort_for_display, DeviceInfo};

    fn device(name: &str, is_default: bool) -> DeviceInfo {
        DeviceInfo {
            name: name.into(),
            is_default,
            default_sample_rate: None,
            default_channels: None,
        }
    }

    #[test]
    fn default_device_sorts_first() {
        let mut list = vec![
            device("pulse", false),
            device("HDMI Output", false),
            device("Speakers", true),
        ];
        sort_for_display(&mut list);
        let names: Vec<&str> = list.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Speakers", "HDMI Output", "pulse"]);
    }
}
