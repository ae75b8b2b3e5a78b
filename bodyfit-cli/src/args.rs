//! Command-line argument definitions for bodyfit.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Calibrate body measurements from phone photos and optionally render an avatar.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct CalibrateArgs {
    /// Calibration request JSON, or `-` to read it from stdin.
    #[arg(short, long)]
    pub request: PathBuf,

    /// Precomputed body and face keypoints keyed by photo index.
    #[arg(short, long)]
    pub keypoints: Option<PathBuf>,

    /// Optional settings JSON. Defaults to `config/bodyfit.json` when present, otherwise built-in parameters.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable telemetry timing logs (defaults to settings file).
    #[arg(long, action = ArgAction::SetTrue)]
    pub telemetry: bool,

    /// Override telemetry logging level (error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL")]
    pub telemetry_level: Option<String>,

    /// Override the minimum focus score.
    #[arg(long)]
    pub min_focus: Option<f64>,

    /// Override the minimum shoulder width as a fraction of image width.
    #[arg(long)]
    pub min_shoulder_ratio: Option<f64>,

    /// Override the maximum shoulder-line tilt in degrees.
    #[arg(long)]
    pub max_roll: Option<f64>,

    /// Override the camera's vertical field of view in degrees.
    #[arg(long)]
    pub vfov: Option<f64>,

    /// Override how many ranked photos are kept per role.
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Override the maximum number of photos analyzed per request.
    #[arg(long)]
    pub max_photos: Option<usize>,

    /// Fail the request instead of dropping photos beyond the cap.
    #[arg(long, action = ArgAction::SetTrue)]
    pub strict_cap: bool,

    /// Write the response to a JSON file instead of stdout.
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Run the external renderer after a successful calibration.
    #[arg(long, action = ArgAction::SetTrue)]
    pub render: bool,

    /// Where to write the rendered GLB.
    #[arg(short, long, default_value = "twin.glb", requires = "render")]
    pub output: PathBuf,

    /// Save the renderer's captured output to this file.
    #[arg(long, requires = "render")]
    pub render_log: Option<PathBuf>,

    /// Override the renderer executable.
    #[arg(long)]
    pub blender: Option<PathBuf>,

    /// Override the renderer script.
    #[arg(long)]
    pub render_script: Option<PathBuf>,

    /// Override the directory holding `base_<preset>.blend` assets.
    #[arg(long)]
    pub assets_dir: Option<PathBuf>,

    /// Override the renderer timeout in seconds.
    #[arg(long)]
    pub render_timeout: Option<u64>,

    /// Render even when required roles did not pass quality.
    #[arg(long, action = ArgAction::SetTrue)]
    pub allow_partial: bool,
}
