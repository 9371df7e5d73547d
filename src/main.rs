// SPDX-License-Identifier: GPL-3.0-only

use camera_preview::backends::camera::{CameraBackendType, LensFacing, Resolution};
use camera_preview::render::RendererKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-preview")]
#[command(about = "Real-time camera preview with hot-swappable GPU renderers")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Config file (default: ~/.config/camera-preview/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    List {
        /// Camera backend (gstreamer or synthetic)
        #[arg(short, long)]
        backend: Option<CameraBackendType>,
    },

    /// Run the preview pipeline against an offscreen surface
    Run {
        /// Camera backend (gstreamer or synthetic)
        #[arg(short, long)]
        backend: Option<CameraBackendType>,

        /// Renderer to start with (direct, planar or offscreen)
        #[arg(short, long)]
        renderer: Option<RendererKind>,

        /// Camera direction (front or back)
        #[arg(short, long)]
        facing: Option<LensFacing>,

        /// Display surface size
        #[arg(short, long, default_value = "1080x1920")]
        size: Resolution,

        /// Stop after drawing this many frames (default: run until Ctrl-C)
        #[arg(short = 'n', long)]
        frames: Option<u64>,

        /// Draw loop rate
        #[arg(long)]
        fps: Option<u32>,

        /// Cycle to the next renderer every N draw ticks
        #[arg(long)]
        switch_every: Option<u64>,

        /// Write debug snapshots into this directory
        #[arg(long)]
        snapshots: Option<PathBuf>,

        /// Maximum number of snapshots
        #[arg(long)]
        snapshot_limit: Option<u32>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_preview=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.or_else(camera_preview::Config::default_path);
    let config = camera_preview::Config::load_or_default(config_path.as_deref());

    match cli.command {
        Commands::List { backend } => cli::list_cameras(backend.unwrap_or(config.backend)),
        Commands::Run {
            backend,
            renderer,
            facing,
            size,
            frames,
            fps,
            switch_every,
            snapshots,
            snapshot_limit,
        } => {
            let mut config = config;
            if let Some(backend) = backend {
                config.backend = backend;
            }
            if let Some(renderer) = renderer {
                config.renderer = renderer;
            }
            if let Some(facing) = facing {
                config.lens_facing = facing;
            }
            if let Some(dir) = snapshots {
                config.snapshots.enabled = true;
                config.snapshots.directory = Some(dir);
            }
            if let Some(limit) = snapshot_limit {
                config.snapshots.limit = limit;
            }
            cli::run_preview(
                config,
                cli::RunOptions {
                    surface: size,
                    frames,
                    fps,
                    switch_every,
                },
            )
        }
    }
}
