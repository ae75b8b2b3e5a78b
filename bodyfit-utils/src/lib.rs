//! Common helpers shared across bodyfit crates.

/// Application configuration and settings management.
pub mod config;
/// Test fixture loading and path resolution.
pub mod fixtures;
/// Photo payload decoding and image format detection.
pub mod image_utils;
/// Minimal 2D point arithmetic for landmark geometry.
pub mod point;
/// Photo sharpness scoring (Laplacian variance).
pub mod quality;
/// Per-stage timing records for the calibration pipeline.
pub mod telemetry;

use std::path::Path;

use anyhow::Result;
use log::LevelFilter;

pub use fixtures::{
    fixture_path, fixtures_dir, load_fixture_bytes, load_fixture_image, load_fixture_json,
};
pub use image_utils::{
    DecodedPhoto, ImageFormatHint, PhotoPayload, decode_photo, sniff_format, split_data_uri,
};
pub use point::Point;
pub use quality::{focus_score, laplacian_variance};
pub use telemetry::{
    Stage, TimingGuard, configure as configure_telemetry, telemetry_allows, telemetry_enabled,
    telemetry_level, timing_guard, timing_guard_if,
};

/// Initialize logging once for CLI and test environments.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` applies.
pub fn init_logging(default_filter: LevelFilter) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    builder.filter_module(telemetry::TELEMETRY_TARGET, LevelFilter::Trace);

    if builder.try_init().is_err() {
        // Logger already initialized; nothing to do.
    }
    Ok(())
}

/// Validate that a path exists and resolve it to an absolute path.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> Result<std::path::PathBuf> {
    let path = path.as_ref();
    anyhow::ensure!(path.exists(), "path does not exist: {}", path.display());
    Ok(path.canonicalize()?)
}
