//! Configuration loading and CLI override logic.

use std::path::PathBuf;

use anyhow::{Context, Result};
use bodyfit_utils::{
    config::{AppSettings, default_settings_path},
    normalize_path,
};
use log::{debug, info, warn};

use crate::args::CalibrateArgs;

/// Where the active settings came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsSource {
    /// `--config` path.
    Explicit(PathBuf),
    /// `config/bodyfit.json` found in the working directory.
    DefaultFile(PathBuf),
    BuiltIn,
}

/// Resolve and load calibration settings.
///
/// An explicit `--config` must exist. The default file is optional, but once
/// present it must parse.
pub fn load_settings(config_path: Option<&PathBuf>) -> Result<(AppSettings, SettingsSource)> {
    let source = match config_path {
        Some(path) => SettingsSource::Explicit(normalize_path(path)?),
        None => {
            let default_path = default_settings_path();
            if default_path.exists() {
                SettingsSource::DefaultFile(default_path)
            } else {
                SettingsSource::BuiltIn
            }
        }
    };

    let settings = match &source {
        SettingsSource::Explicit(path) | SettingsSource::DefaultFile(path) => {
            AppSettings::load_from_path(path)
                .with_context(|| format!("failed to load settings from {}", path.display()))?
        }
        SettingsSource::BuiltIn => AppSettings::default(),
    };
    match &source {
        SettingsSource::BuiltIn => debug!("using built-in calibration settings"),
        SettingsSource::Explicit(path) | SettingsSource::DefaultFile(path) => info!(
            "Loaded settings from {} (min focus {}, max photos {})",
            path.display(),
            settings.quality.min_focus,
            settings.photos.max_total
        ),
    }
    Ok((settings, source))
}

/// Apply command-line arguments to override loaded or default settings.
pub fn apply_cli_overrides(settings: &mut AppSettings, args: &CalibrateArgs) {
    if args.telemetry {
        settings.telemetry.enabled = true;
    }
    if let Some(level) = args.telemetry_level.as_ref() {
        let normalized = level.trim();
        if !normalized.is_empty() {
            let lower = normalized.to_ascii_lowercase();
            settings.telemetry.level = lower.clone();
            if lower == "off" {
                settings.telemetry.enabled = false;
            }
        }
    }

    if let Some(min_focus) = args.min_focus {
        settings.quality.min_focus = min_focus;
    }
    if let Some(ratio) = args.min_shoulder_ratio {
        settings.quality.min_shoulder_ratio = ratio;
    }
    if let Some(roll) = args.max_roll {
        settings.quality.max_roll_deg = roll;
    }
    if let Some(vfov) = args.vfov {
        settings.camera.vfov_deg = vfov;
    }
    if let Some(top_k) = args.top_k {
        settings.ranking.top_k = top_k;
    }
    if let Some(max) = args.max_photos {
        if max == 0 {
            warn!("--max-photos 0 would drop every photo; keeping {}", settings.photos.max_total);
        } else {
            settings.photos.max_total = max;
        }
    }
    if args.strict_cap {
        settings.photos.strict_cap = true;
    }

    if let Some(binary) = args.blender.as_ref() {
        settings.render.binary = binary.clone();
    }
    if let Some(script) = args.render_script.as_ref() {
        settings.render.script = script.clone();
    }
    if let Some(dir) = args.assets_dir.as_ref() {
        settings.render.assets_dir = dir.clone();
    }
    if let Some(secs) = args.render_timeout {
        settings.render.timeout_secs = secs;
    }
    if args.allow_partial {
        settings.render.allow_partial = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(extra: &[&str]) -> CalibrateArgs {
        let mut argv = vec!["bodyfit", "--request", "req.json"];
        argv.extend_from_slice(extra);
        CalibrateArgs::try_parse_from(argv).expect("args")
    }

    #[test]
    fn overrides_replace_thresholds_and_limits() {
        let mut settings = AppSettings::default();
        let args = parse(&[
            "--min-focus",
            "120",
            "--max-roll",
            "6.5",
            "--top-k",
            "3",
            "--max-photos",
            "4",
            "--strict-cap",
        ]);
        apply_cli_overrides(&mut settings, &args);
        assert_eq!(settings.quality.min_focus, 120.0);
        assert_eq!(settings.quality.max_roll_deg, 6.5);
        assert_eq!(settings.ranking.top_k, 3);
        assert_eq!(settings.photos.max_total, 4);
        assert!(settings.photos.strict_cap);
        assert_eq!(settings.quality.min_shoulder_ratio, 0.20);
    }

    #[test]
    fn zero_photo_cap_is_ignored() {
        let mut settings = AppSettings::default();
        apply_cli_overrides(&mut settings, &parse(&["--max-photos", "0"]));
        assert_eq!(settings.photos.max_total, 10);
    }

    #[test]
    fn telemetry_level_off_disables_telemetry() {
        let mut settings = AppSettings::default();
        apply_cli_overrides(
            &mut settings,
            &parse(&["--telemetry", "--telemetry-level", " OFF "]),
        );
        assert!(!settings.telemetry.enabled);
        assert_eq!(settings.telemetry.level, "off");
    }

    #[test]
    fn render_flags_update_render_settings() {
        let mut settings = AppSettings::default();
        let args = parse(&[
            "--render",
            "--blender",
            "/opt/blender/blender",
            "--render-timeout",
            "45",
            "--allow-partial",
        ]);
        apply_cli_overrides(&mut settings, &args);
        assert_eq!(settings.render.binary, PathBuf::from("/opt/blender/blender"));
        assert_eq!(settings.render.timeout_secs, 45);
        assert!(settings.render.allow_partial);
        assert_eq!(args.output, PathBuf::from("twin.glb"));
    }

    #[test]
    fn explicit_config_is_loaded_and_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bodyfit.json");
        std::fs::write(&path, r#"{"quality": {"min_focus": 42.0}}"#).expect("write");
        let (settings, source) = load_settings(Some(&path)).expect("settings");
        assert_eq!(settings.quality.min_focus, 42.0);
        assert!(matches!(source, SettingsSource::Explicit(_)));
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let missing = PathBuf::from("/nonexistent/bodyfit.json");
        assert!(load_settings(Some(&missing)).is_err());
    }

    #[test]
    fn output_requires_render() {
        let argv = ["bodyfit", "--request", "req.json", "--output", "x.glb"];
        assert!(CalibrateArgs::try_parse_from(argv).is_err());
    }
}
