// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Display transform calculation.

use crate::error::CliError;
use crate::utils::{parse_rotation, parse_size};
use capturekit::device::Facing;
use capturekit::geometry::Size;
use capturekit::transform::{compute_transform, sensor_to_display_degrees, Rotation};
use clap::Args as ClapArgs;
use serde::Serialize;

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Negotiated preview size (WxH)
    #[arg(short, long, value_parser = parse_size)]
    size: Size,

    /// Viewport size (WxH)
    #[arg(long, value_parser = parse_size)]
    viewport: Size,

    /// Display rotation as a quadrant (0-3) or degrees (0/90/180/270)
    #[arg(short, long, default_value = "0", value_parser = parse_rotation)]
    rotation: i32,

    /// Sensor orientation in degrees
    #[arg(long, default_value = "90")]
    sensor: i32,

    /// Treat the sensor as front facing
    #[arg(long)]
    front: bool,
}

#[derive(Debug, Serialize)]
struct TransformOutput {
    size: String,
    viewport: String,
    rotation_degrees: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    preview_rotation: Option<i32>,
    display_orientation: i32,
    identity: bool,
    matrix: [f32; 9],
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    log::debug!("Executing transform command: {:?}", args);

    let rotation = Rotation::from_quadrant(args.rotation)
        .ok_or_else(|| CliError::InvalidArgs(format!("Invalid rotation: {}", args.rotation)))?;
    if args.sensor.rem_euclid(90) != 0 || !(0..360).contains(&args.sensor) {
        return Err(CliError::InvalidArgs(format!(
            "Sensor orientation must be 0, 90, 180 or 270: {}",
            args.sensor
        )));
    }
    let facing = if args.front {
        Facing::Front
    } else {
        Facing::Back
    };

    let matrix = compute_transform(args.size, args.viewport, rotation);
    let output = TransformOutput {
        size: args.size.to_string(),
        viewport: args.viewport.to_string(),
        rotation_degrees: rotation.degrees(),
        preview_rotation: rotation.preview_degrees(),
        display_orientation: sensor_to_display_degrees(args.sensor, rotation, facing),
        identity: matrix.is_identity(),
        matrix: matrix.values(),
    };

    if json {
        let json = serde_json::to_string_pretty(&output)
            .map_err(|e| CliError::General(format!("Failed to serialize JSON: {}", e)))?;
        println!("{}", json);
    } else {
        println!(
            "Preview {} in viewport {} at {}",
            output.size, output.viewport, rotation
        );
        match output.preview_rotation {
            Some(degrees) => println!("Preview rotation:     {}°", degrees),
            None => println!("Preview rotation:     none"),
        }
        println!("Display orientation:  {}°", output.display_orientation);
        println!("Matrix:");
        for row in output.matrix.chunks(3) {
            println!("  [{:>10.4} {:>10.4} {:>10.4}]", row[0], row[1], row[2]);
        }
    }

    Ok(())
}
