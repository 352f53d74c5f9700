//! `pictoon` CLI - stylize an image file.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pictoon::{DeviceSpec, Engine, EngineConfig, RasterImage, StyleParams};

/// Apply a sketch, comic, pixel-art, neural or sticker style to an image.
#[derive(Parser, Debug)]
#[command(name = "pictoon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Input image path.
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output PNG path.
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Style identifier, e.g. `comic-art`, `pixel-art:8bit`, `style-transfer:udnie`, `sticker`.
    #[arg(short, long, value_name = "STYLE")]
    style: String,

    /// Parameter preset (pixel art only).
    #[arg(short, long, value_name = "PRESET")]
    preset: Option<String>,

    /// JSON engine configuration.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Checkpoint directory; overrides the configuration.
    #[arg(long, value_name = "DIR")]
    model_dir: Option<PathBuf>,

    /// Compute device: cpu, cuda or auto.
    #[arg(long, value_name = "DEVICE")]
    device: Option<DeviceSpec>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("pictoon={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = run(&args) {
        tracing::error!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run(args: &Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("Failed to read configuration {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = &args.model_dir {
        config.model_dir = dir.clone();
    }
    if let Some(device) = args.device {
        config.device = device;
    }

    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let image = RasterImage::decode(&bytes).context("Failed to decode input image")?;

    let engine = Engine::new(config).context("Failed to initialize engine")?;
    let params = args.preset.clone().map(StyleParams::with_preset);
    let result = engine
        .apply(&image, &args.style, params.as_ref())
        .with_context(|| format!("Failed to apply style '{}'", args.style))?;

    std::fs::write(&args.output, result.encode_png()?)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    println!(
        "Stylized {} -> {} ({}x{})",
        args.input.display(),
        args.output.display(),
        result.width(),
        result.height()
    );

    Ok(())
}
