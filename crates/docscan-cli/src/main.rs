//! docscan: scan a photographed document from an image file.
//!
//! Reads a photo (PNG, JPEG, BMP, WebP), finds the page outline, flattens
//! it, runs the selected enhancement chain and writes the result as PNG.
//! Per-stage diagnostics go to stdout; logs go to stderr (`RUST_LOG`).
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin docscan -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use docscan_export::{ScanManifest, to_png};
use docscan_pipeline::{
    AreaFilter, DetectorConfig, Point, ProcessingMode, Quadrilateral, RankingStrategy,
    ScanConfig, ScanError, Scanner, grayscale, order_corners,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Detect, flatten and enhance a photographed document.
#[derive(Parser)]
#[command(name = "docscan", version)]
struct Cli {
    /// Path to the input photo (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Where to write the scanned PNG. Defaults to `<stem>-scan.png`
    /// next to the input.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write a JSON manifest (contour, size, mode) here.
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Detection parameter profile.
    #[arg(long, value_enum, default_value_t = Profile::OneShot)]
    profile: Profile,

    /// Enhancement chain.
    #[arg(long, value_enum, default_value_t = Mode::Enhanced)]
    mode: Mode,

    /// Candidate ranking (overrides the profile).
    #[arg(long, value_enum)]
    ranking: Option<Ranking>,

    /// Canny low threshold (overrides the profile).
    #[arg(long)]
    canny_low: Option<f32>,

    /// Canny high threshold (overrides the profile).
    #[arg(long)]
    canny_high: Option<f32>,

    /// Minimum outline area in pixels; switches to an absolute area filter.
    #[arg(long)]
    min_area: Option<f64>,

    /// Dilate the edge map before contour tracing.
    #[arg(long, conflicts_with = "no_dilate")]
    dilate: bool,

    /// Do not dilate the edge map.
    #[arg(long)]
    no_dilate: bool,

    /// Run detection on a copy downsampled to this longest side.
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    working_resolution: Option<u32>,

    /// Skip detection and use these corners: `x,y;x,y;x,y;x,y` in any
    /// order.
    #[arg(long)]
    corners: Option<String>,

    /// RGBA image whose opaque pixels are signed onto the result.
    #[arg(long)]
    signature: Option<PathBuf>,

    /// Output diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,

    /// Full scan config as a JSON string.
    ///
    /// When provided, all other parameter flags are ignored. The JSON
    /// must be a valid `ScanConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Profile {
    /// Score ranking, relative area filter, dilated edges.
    Interactive,
    /// Largest-area ranking, absolute area filter, thin edges.
    OneShot,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Grayscale plus adaptive threshold.
    Bw,
    /// Contrast stretch plus color-preserving denoise.
    Color,
    /// Threshold, median denoise, sharpen.
    Enhanced,
}

#[derive(Clone, Copy, ValueEnum)]
enum Ranking {
    /// Best convexity/aspect score above a floor.
    Score,
    /// Largest area wins.
    Largest,
}

/// Build a [`ScanConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly.
/// Otherwise the profile is loaded and individual flags override it.
fn config_from_cli(cli: &Cli) -> Result<ScanConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let mode = match cli.mode {
        Mode::Bw => ProcessingMode::BlackAndWhite,
        Mode::Color => ProcessingMode::ColorEnhanced,
        Mode::Enhanced => ProcessingMode::Enhanced,
    };

    let mut detector = match cli.profile {
        Profile::Interactive => DetectorConfig::interactive(),
        Profile::OneShot => DetectorConfig::one_shot(),
    };
    if let Some(low) = cli.canny_low {
        detector.canny_low = low;
    }
    if let Some(high) = cli.canny_high {
        detector.canny_high = high;
    }
    if let Some(min_area) = cli.min_area {
        detector.area_filter = AreaFilter::Absolute { min_area };
    }
    match cli.ranking {
        Some(Ranking::Score) => {
            detector.ranking = RankingStrategy::Score {
                min_score: DetectorConfig::DEFAULT_MIN_SCORE,
            };
        }
        Some(Ranking::Largest) => detector.ranking = RankingStrategy::LargestArea,
        None => {}
    }
    if cli.dilate {
        detector.dilate = true;
    } else if cli.no_dilate {
        detector.dilate = false;
    }
    if cli.working_resolution.is_some() {
        detector.working_resolution = cli.working_resolution;
    }

    Ok(ScanConfig {
        detector,
        mode,
        ..ScanConfig::default()
    })
}

/// Parse `x,y;x,y;x,y;x,y` into ordered corners.
fn parse_corners(text: &str) -> Result<Quadrilateral, String> {
    let points = text
        .split(';')
        .map(|pair| {
            let (x, y) = pair
                .split_once(',')
                .ok_or_else(|| format!("corner {pair:?} is not `x,y`"))?;
            let x: f64 = x.trim().parse().map_err(|e| format!("corner {pair:?}: {e}"))?;
            let y: f64 = y.trim().parse().map_err(|e| format!("corner {pair:?}: {e}"))?;
            Ok(Point::new(x, y))
        })
        .collect::<Result<Vec<_>, String>>()?;
    order_corners(&points).map_err(|e| format!("Error in --corners: {e}"))
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    input.with_file_name(format!("{stem}-scan.png"))
}

fn read_raster(path: &Path) -> Result<image::RgbaImage, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    grayscale::decode_rgba(&bytes).map_err(|e| format!("Error decoding {}: {e}", path.display()))
}

fn run(cli: &Cli) -> Result<(), String> {
    let config = config_from_cli(cli)?;
    let corners = cli.corners.as_deref().map(parse_corners).transpose()?;
    let frame = read_raster(&cli.image_path)?;
    let signature = cli.signature.as_deref().map(read_raster).transpose()?;

    info!(
        path = %cli.image_path.display(),
        width = frame.width(),
        height = frame.height(),
        mode = %config.mode,
        "scanning"
    );

    let scanner = Scanner::new(config).map_err(|e| format!("Invalid configuration: {e}"))?;
    let (output, diagnostics) = scanner
        .process(&frame, corners, signature.as_ref())
        .map_err(|e| match e {
            ScanError::NotDetected => e.user_message(),
            other => format!("Scan failed: {other}"),
        })?;

    if let Some(ref warning) = output.warning {
        warn!(%warning, "enhancement skipped, writing rectified image");
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&diagnostics)
            .map_err(|e| format!("Error serializing diagnostics: {e}"))?;
        println!("{json}");
    } else {
        println!("{}", diagnostics.report());
    }

    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(&cli.image_path));
    let png = to_png(&output.image).map_err(|e| format!("Error encoding PNG: {e}"))?;
    std::fs::write(&output_path, &png)
        .map_err(|e| format!("Error writing {}: {e}", output_path.display()))?;
    info!(path = %output_path.display(), bytes = png.len(), "scan written");

    if let Some(ref manifest_path) = cli.manifest {
        let mut manifest = ScanManifest::from_output(&output).signed(signature.is_some());
        if let Some(name) = cli.image_path.file_name().and_then(|s| s.to_str()) {
            manifest = manifest.with_source(name);
        }
        let json = manifest
            .to_json()
            .map_err(|e| format!("Error serializing manifest: {e}"))?;
        std::fs::write(manifest_path, json)
            .map_err(|e| format!("Error writing {}: {e}", manifest_path.display()))?;
        info!(path = %manifest_path.display(), "manifest written");
    }

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}
