// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Preview size negotiation against a size list.

use crate::error::CliError;
use crate::utils::{parse_size, parse_size_list};
use capturekit::device::{CameraProvider, DEVICE_ID_BACK};
use capturekit::geometry::Size;
use capturekit::negotiate::{choose, filter_candidates, DeviceConstraints, DEFAULT_PREVIEW_SIZE};
use capturekit::synthetic::SyntheticProvider;
use clap::Args as ClapArgs;
use serde::Serialize;

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Supported sizes in device order, comma separated (e.g. 1920x1080,1280x720).
    /// Defaults to the sizes of the synthetic device.
    #[arg(long)]
    sizes: Option<String>,

    /// Synthetic device to read sizes from when --sizes is not given
    #[arg(short, long, default_value = DEVICE_ID_BACK)]
    device: String,

    /// Exact preview size (WxH)
    #[arg(long, value_parser = parse_size)]
    exact: Option<Size>,

    /// Maximum preview size (WxH)
    #[arg(long, value_parser = parse_size)]
    max: Option<Size>,

    /// Minimum preview size (WxH)
    #[arg(long, value_parser = parse_size)]
    min: Option<Size>,

    /// Viewport size (WxH) whose aspect ratio drives the choice
    #[arg(long, value_parser = parse_size)]
    viewport: Option<Size>,
}

#[derive(Debug, Serialize)]
struct NegotiateOutput {
    supported: Vec<String>,
    candidates: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_ratio: Option<f32>,
    chosen: String,
    fallback: bool,
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    log::debug!("Executing negotiate command: {:?}", args);

    let supported = match args.sizes {
        Some(list) => parse_size_list(&list)?,
        None => {
            let provider = SyntheticProvider::default();
            if !provider.device_ids()?.contains(&args.device) {
                return Err(CliError::CameraNotFound(args.device));
            }
            provider.characteristics(&args.device)?.output_sizes
        }
    };

    let constraints = DeviceConstraints {
        viewport: args.viewport,
        exact: args.exact,
        max: args.max,
        min: args.min,
    };

    let candidates = filter_candidates(&supported, &constraints);
    let negotiation = choose(&supported, &constraints, DEFAULT_PREVIEW_SIZE);

    let output = NegotiateOutput {
        supported: supported.iter().map(ToString::to_string).collect(),
        candidates: candidates.iter().map(ToString::to_string).collect(),
        target_ratio: negotiation.target_ratio,
        chosen: negotiation.size.to_string(),
        fallback: negotiation.fallback,
    };

    if json {
        let json = serde_json::to_string_pretty(&output)
            .map_err(|e| CliError::General(format!("Failed to serialize JSON: {}", e)))?;
        println!("{}", json);
    } else {
        println!("Supported:   {}", output.supported.join(", "));
        if output.candidates.is_empty() {
            println!("Candidates:  (none)");
        } else {
            println!("Candidates:  {}", output.candidates.join(", "));
        }
        if let Some(ratio) = output.target_ratio {
            println!("Target:      {:.4}", ratio);
        }
        if output.fallback {
            println!("Chosen:      {} (fallback)", output.chosen);
        } else {
            println!("Chosen:      {}", output.chosen);
        }
    }

    Ok(())
}
