// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::error::CliError;
use capturekit::geometry::Size;
use signal_hook::consts::SIGINT;
use signal_hook::flag;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Parse a size string in format "WxH" or "W*H"
pub fn parse_size(s: &str) -> Result<Size, CliError> {
    let (width_str, height_str) = s
        .split_once('x')
        .or_else(|| s.split_once('*'))
        .ok_or_else(|| {
            CliError::InvalidArgs(format!("Invalid size format (expected WxH or W*H): {}", s))
        })?;

    let width = width_str
        .trim()
        .parse::<u32>()
        .map_err(|_| CliError::InvalidArgs(format!("Invalid width in size: {}", s)))?;
    let height = height_str
        .trim()
        .parse::<u32>()
        .map_err(|_| CliError::InvalidArgs(format!("Invalid height in size: {}", s)))?;

    if width == 0 || height == 0 {
        return Err(CliError::InvalidArgs(format!(
            "Size dimensions must be positive: {}",
            s
        )));
    }

    Ok(Size::new(width, height))
}

/// Parse a comma-separated list of sizes, keeping the given order
pub fn parse_size_list(s: &str) -> Result<Vec<Size>, CliError> {
    let sizes = s
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(parse_size)
        .collect::<Result<Vec<_>, _>>()?;

    if sizes.is_empty() {
        return Err(CliError::InvalidArgs("Size list is empty".to_string()));
    }
    Ok(sizes)
}

/// Parse a display rotation given as a quadrant (0-3) or in degrees
/// (0, 90, 180, 270)
pub fn parse_rotation(s: &str) -> Result<i32, CliError> {
    let value = s
        .trim()
        .trim_end_matches('°')
        .parse::<i32>()
        .map_err(|_| CliError::InvalidArgs(format!("Invalid rotation: {}", s)))?;

    match value {
        0..=3 => Ok(value),
        90 | 180 | 270 => Ok(value / 90),
        _ => Err(CliError::InvalidArgs(format!(
            "Rotation must be a quadrant 0-3 or 0/90/180/270 degrees: {}",
            s
        ))),
    }
}

/// Install signal handler for graceful shutdown on Ctrl+C
///
/// Returns an Arc<AtomicBool> that will be set to true when SIGINT is received.
/// Check this flag periodically in your main loop to exit gracefully.
pub fn install_signal_handler() -> Result<Arc<AtomicBool>, CliError> {
    let term = Arc::new(AtomicBool::new(false));

    flag::register(SIGINT, Arc::clone(&term))
        .map_err(|e| CliError::General(format!("Failed to register signal handler: {}", e)))?;

    log::debug!("Installed SIGINT handler");
    Ok(term)
}
