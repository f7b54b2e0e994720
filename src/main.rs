// SPDX-License-Identifier: GPL-3.0-only

use anyhow::Context;
use camera_session::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-session")]
#[command(about = "Drive a camera session from the command line")]
#[command(version)]
struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: <config dir>/camera-session/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Capture device, overriding the config ("synthetic" for the test pattern)
    #[arg(short, long, global = true)]
    device: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take a photo
    Photo {
        /// Output directory (default: from config)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Record a video
    Record {
        /// Recording duration in seconds
        #[arg(short = 't', long, default_value = "5")]
        duration: u64,

        /// Output directory (default: from config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Enable audio recording
        #[arg(short, long)]
        audio: bool,
    },

    /// Read raw frames through the image stream
    Stream {
        /// Number of frames to read
        #[arg(short, long, default_value = "30")]
        frames: u32,

        /// Use the shared block and doorbell instead of queued messages
        #[arg(long)]
        doorbell: bool,
    },

    /// Print which controls this platform supports
    Capabilities,

    /// Print the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        save: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_session=trace
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let config_path = cli.config.clone().or_else(Config::default_path);
    let mut config = match config_path.as_deref() {
        Some(path) => Config::load_or_default(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(device) = cli.device {
        config.camera.device = device;
    }

    match cli.command {
        Commands::Photo { output } => cli::take_photo(config, output),
        Commands::Record {
            duration,
            output,
            audio,
        } => cli::record_video(config, duration, output, audio),
        Commands::Stream { frames, doorbell } => cli::stream_frames(config, frames, doorbell),
        Commands::Capabilities => cli::show_capabilities(),
        Commands::Config { save } => cli::show_config(&config, save, config_path.as_deref()),
    }
}
