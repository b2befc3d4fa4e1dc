//! One-shot commands: discover, act, print, exit

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::warn;

use wemo_core::registry::Device;
use wemo_core::traits::DeviceHandle;
use wemo_core::{AgentConfig, DeviceDirectory, Error};
use wemo_device::attr;

use crate::daemon::Components;

/// Action on a single named device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    On,
    Off,
    Toggle,
    State,
    SetupCode,
}

/// Run one discovery pass and list every device found
pub async fn scan(config: &AgentConfig) -> Result<()> {
    let components = Components::build(config).await?;
    let outcome = components.discovery.discover().await;

    let devices = components.discovery.registry().snapshot().await;
    if let Err(e) = outcome {
        if devices.is_empty() {
            return Err(e).context("Discovery failed");
        }
        warn!("Deep scan skipped: {}", e);
    }

    print!("{}", render_devices(&devices));
    Ok(())
}

/// Find `name` and run `command` against it
pub async fn device(config: &AgentConfig, name: &str, command: DeviceCommand) -> Result<()> {
    let components = Components::build(config).await?;
    let handle = find_device(components.discovery.as_ref(), name).await?;

    match command {
        DeviceCommand::On => {
            handle.on().await?;
            println!("{}: on", handle.name());
        }
        DeviceCommand::Off => {
            handle.off().await?;
            println!("{}: off", handle.name());
        }
        DeviceCommand::Toggle => {
            let on = handle.toggle().await?;
            println!("{}: {}", handle.name(), on_off(on));
        }
        DeviceCommand::State => {
            let on = handle.get_state().await?;
            println!("{}: {}", handle.name(), on_off(on));
        }
        DeviceCommand::SetupCode => {
            let info = handle.get_setup_info().await?;
            match info.setup_code {
                Some(code) => println!("{}: {}", handle.name(), code),
                None => anyhow::bail!("{} did not report a setup code", handle.name()),
            }
        }
    }

    Ok(())
}

/// Print today's sunrise and sunset in local time
pub async fn solar(config: &AgentConfig) -> Result<()> {
    let components = Components::build(config).await?;
    let snapshot = components.solar.try_solar_times().await?;

    if let Some(coords) = components.solar.coordinates().await {
        println!("location: {:.4}, {:.4}", coords.lat, coords.lng);
    }
    println!("date:     {}", snapshot.date);
    println!("sunrise:  {}", snapshot.sunrise_hhmm());
    println!("sunset:   {}", snapshot.sunset_hhmm());
    Ok(())
}

/// Resolve a device, running one discovery pass if it is not known yet
async fn find_device(directory: &dyn DeviceDirectory, name: &str) -> Result<Arc<dyn DeviceHandle>> {
    if let Some(handle) = directory.resolve(name).await {
        return Ok(handle);
    }

    if let Err(e) = directory.rediscover().await {
        warn!("Discovery incomplete: {}", e);
    }

    directory
        .resolve(name)
        .await
        .ok_or_else(|| Error::device_not_found(name).into())
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}

fn render_devices(devices: &[Device]) -> String {
    if devices.is_empty() {
        return "No devices found\n".to_string();
    }

    let mut sorted: Vec<&Device> = devices.iter().collect();
    sorted.sort_by(|a, b| a.name().to_lowercase().cmp(&b.name().to_lowercase()));

    let width = sorted.iter().map(|d| d.name().len()).max().unwrap_or(0);
    sorted
        .into_iter()
        .map(|device| {
            let model = device
                .descriptor
                .attributes
                .get(attr::MODEL)
                .map(String::as_str)
                .unwrap_or("-");
            format!(
                "{:<width$}  {:<21}  {:<8}  {}\n",
                device.name(),
                device.address().to_string(),
                model,
                if device.reachable { "online" } else { "offline" },
                width = width
            )
        })
        .collect()
}
