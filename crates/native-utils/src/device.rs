use anyhow::Context;
use cpal::Device;
use cpal::traits::{DeviceTrait, HostTrait};

fn get_host() -> cpal::Host {
    cpal::default_host()
}

/// Looks up an input device by its exact name.
pub fn find_input(name: &str) -> anyhow::Result<Option<Device>> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());
    let input_devices = host
        .input_devices()
        .context("Failed to enumerate input devices")?;
    Ok(input_devices
        .into_iter()
        .find(|device| device.name().is_ok_and(|n| n == name)))
}

pub fn default_input() -> Option<Device> {
    get_host().default_input_device()
}

/// One line per input device: name, channels, rate and a default marker.
pub fn get_available_inputs() -> anyhow::Result<String> {
    for host in cpal::available_hosts() {
        tracing::debug!("Available host: {:?}", host);
    }

    let host = get_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    let input_devices = host
        .input_devices()
        .context("Failed to enumerate input devices")?;

    let mut device_names: Vec<String> = Vec::new();
    for in_device in input_devices {
        let Ok(d_name) = in_device.name() else {
            continue;
        };
        let mut d = match in_device.default_input_config() {
            Ok(cfg) => format!(" * {}({}ch, {}hz)", d_name, cfg.channels(), cfg.sample_rate().0),
            Err(e) => {
                tracing::debug!("No default config for {}: {}", d_name, e);
                format!(" * {}(unavailable)", d_name)
            }
        };
        if default_name.as_deref() == Some(d_name.as_str()) {
            d.push_str(" [default]");
        }
        device_names.push(d);
    }
    Ok(device_names.join("\n"))
}
