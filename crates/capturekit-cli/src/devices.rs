// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Synthetic camera enumeration.

use crate::error::CliError;
use capturekit::device::CameraProvider;
use capturekit::negotiate::sorted_candidates;
use capturekit::synthetic::SyntheticProvider;
use clap::Args as ClapArgs;
use serde::Serialize;

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Show only the device with this identifier
    #[arg(short, long)]
    device: Option<String>,

    /// Show every supported output size
    #[arg(long)]
    sizes: bool,
}

#[derive(Debug, Serialize)]
struct DevicesOutput {
    devices: Vec<DeviceInfo>,
    fps: u32,
}

#[derive(Debug, Serialize)]
struct DeviceInfo {
    id: String,
    facing: String,
    sensor_orientation: i32,
    default_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_sizes: Option<Vec<String>>,
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    log::debug!("Executing devices command: {:?}", args);

    let provider = SyntheticProvider::default();
    let mut devices = Vec::new();

    for id in provider.device_ids()? {
        if args.device.as_deref().is_some_and(|wanted| wanted != id) {
            continue;
        }
        let characteristics = provider.characteristics(&id)?;
        let output_sizes = args.sizes.then(|| {
            sorted_candidates(&characteristics.output_sizes)
                .iter()
                .map(ToString::to_string)
                .collect()
        });
        devices.push(DeviceInfo {
            id,
            facing: characteristics.facing.to_string(),
            sensor_orientation: characteristics.sensor_orientation,
            default_size: characteristics.output_sizes.first().map(ToString::to_string),
            output_sizes,
        });
    }

    if let Some(wanted) = &args.device {
        if devices.is_empty() {
            return Err(CliError::CameraNotFound(wanted.clone()));
        }
    }

    let output = DevicesOutput {
        devices,
        fps: provider.fps(),
    };

    if json {
        let json = serde_json::to_string_pretty(&output)
            .map_err(|e| CliError::General(format!("Failed to serialize JSON: {}", e)))?;
        println!("{}", json);
    } else {
        print_text(&output);
    }

    Ok(())
}

fn print_text(output: &DevicesOutput) {
    println!("Synthetic cameras ({} fps):", output.fps);
    for device in &output.devices {
        println!(
            "  {}  {:<8} sensor {:>3}°  default {}",
            device.id,
            device.facing,
            device.sensor_orientation,
            device.default_size.as_deref().unwrap_or("-")
        );
        if let Some(sizes) = &device.output_sizes {
            println!("     sizes: {}", sizes.join(", "));
        }
    }
}
