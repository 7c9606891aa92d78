// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

mod devices;
mod error;
mod metrics;
mod negotiate;
mod preview;
mod transform;
mod utils;

use clap::{Parser, Subcommand};
use error::result_to_exit_code;
use std::process::ExitCode;

/// CaptureKit CLI - Camera preview negotiation, transform, and metrics tool
#[derive(Parser)]
#[command(name = "capturekit")]
#[command(version)]
#[command(about = "CaptureKit CLI - Camera preview negotiation, transform, and metrics tool")]
#[command(long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (use RUST_LOG=debug for more)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output results in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the synthetic camera devices and their capabilities
    Devices(devices::Args),

    /// Choose a preview size from a list of supported sizes
    Negotiate(negotiate::Args),

    /// Compute the display transform for a preview size and viewport
    Transform(transform::Args),

    /// Run a preview session on the synthetic camera and measure delivery
    Preview(preview::Args),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbose, cli.quiet);

    // Execute the subcommand and convert result to exit code
    let result = match cli.command {
        Commands::Devices(args) => devices::execute(args, cli.json),
        Commands::Negotiate(args) => negotiate::execute(args, cli.json),
        Commands::Transform(args) => transform::execute(args, cli.json),
        Commands::Preview(args) => preview::execute(args, cli.json),
    };

    result_to_exit_code(result)
}

/// Initialize env_logger based on verbosity flags
fn init_logging(verbose: bool, quiet: bool) {
    // Determine log level from flags or RUST_LOG environment variable
    let env = env_logger::Env::default();

    let env = if quiet {
        env.default_filter_or("error")
    } else if verbose {
        env.default_filter_or("debug")
    } else {
        env.default_filter_or("info")
    };

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .init();

    log::debug!("Logging initialized");
}
