//! Shared configuration types consumed across the bodyfit workspace.
//!
//! These structures hold the quality-gate thresholds, estimator constants,
//! calibration weights, plausibility bands, and render-stage settings. They
//! serialize to a single JSON document that the CLI loads and the core crate
//! converts into its own strongly-typed configs.

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
};

/// Photo quality-gate thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualitySettings {
    /// Minimum Laplacian variance for a photo to count as sharp.
    pub min_focus: f64,
    /// Minimum shoulder length as a fraction of image width.
    pub min_shoulder_ratio: f64,
    /// Maximum allowed shoulder-line tilt in degrees.
    pub max_roll_deg: f64,
    /// Maximum |yaw| for a photo labeled as the front view.
    pub front_max_abs_yaw: f64,
    /// Minimum |yaw| for a photo labeled as the side view.
    pub side_min_abs_yaw: f64,
    /// Reject photos that could not be decoded regardless of thresholds.
    pub reject_decode_errors: bool,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            min_focus: 200.0,
            min_shoulder_ratio: 0.20,
            max_roll_deg: 10.0,
            front_max_abs_yaw: 0.20,
            side_min_abs_yaw: 0.35,
            reject_decode_errors: true,
        }
    }
}

/// Pinhole camera assumptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Vertical field of view in degrees.
    pub vfov_deg: f64,
    /// Camera distance assumed when it cannot be estimated.
    pub default_distance_m: f64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            vfov_deg: 49.0,
            default_distance_m: 2.5,
        }
    }
}

/// Weights and clamp for the global scale correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleSettings {
    /// Per-feature weight keyed by body-part name.
    pub weights: BTreeMap<String, f64>,
    pub clamp_min: f64,
    pub clamp_max: f64,
}

impl Default for ScaleSettings {
    fn default() -> Self {
        let weights = [
            ("height", 1.2),
            ("chest", 1.0),
            ("waist", 1.0),
            ("hips", 1.0),
            ("shoulder", 0.8),
            ("inseam", 0.6),
            ("arm", 0.6),
            ("foot_length", 0.7),
            ("foot_width", 0.5),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self {
            weights,
            clamp_min: 0.85,
            clamp_max: 1.15,
        }
    }
}

/// Plausibility band for one feature, as fractions of height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandSettings {
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl BandSettings {
    pub const fn new(min: f64, max: f64, default: f64) -> Self {
        Self { min, max, default }
    }
}

/// Height-relative plausibility bands keyed by body-part name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub bands: BTreeMap<String, BandSettings>,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        let bands = [
            ("shoulder", BandSettings::new(0.18, 0.32, 0.25)),
            ("chest", BandSettings::new(0.42, 0.68, 0.52)),
            ("waist", BandSettings::new(0.30, 0.58, 0.42)),
            ("hips", BandSettings::new(0.38, 0.65, 0.50)),
            ("inseam", BandSettings::new(0.40, 0.50, 0.45)),
            ("arm", BandSettings::new(0.34, 0.46, 0.38)),
            ("foot_length", BandSettings::new(0.13, 0.17, 0.15)),
            ("foot_width", BandSettings::new(0.04, 0.07, 0.055)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self { bands }
    }
}

/// Ellipse depth ratios for the three torso circumferences.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthRatios {
    pub chest: f64,
    pub waist: f64,
    pub hips: f64,
}

impl Default for DepthRatios {
    fn default() -> Self {
        Self {
            chest: 0.55,
            waist: 0.50,
            hips: 0.60,
        }
    }
}

/// Empirical constants used by the photogrammetric estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorSettings {
    /// Depth ratios keyed by role (`front`, `side`, `back`, `unknown`).
    pub depth_ratios: BTreeMap<String, DepthRatios>,
    /// Multiplier on |average landmark depth| added to the depth ratio.
    pub depth_nudge: f64,
    /// Waist width as a fraction of hip width.
    pub waist_to_hip_width: f64,
    /// Foot width as a fraction of foot length.
    pub foot_width_ratio: f64,
    /// Foot width as a multiple of the ankle-to-heel distance.
    pub ankle_heel_multiplier: f64,
    /// Upward offset from the nose to the scalp, as a fraction of image height.
    pub scalp_offset: f64,
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        let depth_ratios = ["front", "side", "back", "unknown"]
            .into_iter()
            .map(|role| (role.to_string(), DepthRatios::default()))
            .collect();
        Self {
            depth_ratios,
            depth_nudge: 0.1,
            waist_to_hip_width: 0.85,
            foot_width_ratio: 0.39,
            ankle_heel_multiplier: 1.25,
            scalp_offset: 0.10,
        }
    }
}

/// Per-role ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingSettings {
    pub top_k: usize,
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self { top_k: 2 }
    }
}

/// Photo count limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotoLimits {
    /// Maximum photos analysed per request.
    pub max_total: usize,
    /// Maximum photos kept per labeled role.
    pub max_per_role: usize,
    /// Fail the request instead of truncating when `max_total` is exceeded.
    pub strict_cap: bool,
}

impl Default for PhotoLimits {
    fn default() -> Self {
        Self {
            max_total: 10,
            max_per_role: 2,
            strict_cap: false,
        }
    }
}

/// Telemetry preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Whether telemetry timing logs are enabled.
    pub enabled: bool,
    /// Logging level for telemetry output (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "debug".to_string(),
        }
    }
}

impl TelemetrySettings {
    /// Resolve the configured level string into a `LevelFilter`.
    pub fn level_filter(&self) -> LevelFilter {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "off" => LevelFilter::Off,
            "error" => LevelFilter::Error,
            "warn" | "warning" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "trace" => LevelFilter::Trace,
            _ => LevelFilter::Debug,
        }
    }

    /// Update the level string from a `LevelFilter` value.
    pub fn set_level(&mut self, level: LevelFilter) {
        self.level = level.as_str().to_ascii_lowercase();
    }
}

/// External renderer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Renderer executable.
    pub binary: PathBuf,
    /// Script passed to the renderer with `--python`.
    pub script: PathBuf,
    /// Directory holding `base_<preset>.blend` files.
    pub assets_dir: PathBuf,
    /// Preset whose base asset is used when the requested one is missing.
    pub fallback_preset: String,
    /// Subprocess timeout in seconds.
    pub timeout_secs: u64,
    pub min_tex_res: u32,
    pub max_tex_res: u32,
    pub default_tex_res: u32,
    /// Roles that must report `ok` before rendering.
    pub required_roles: Vec<String>,
    /// Render even when required roles are not `ok`.
    pub allow_partial: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        let binary = env::var("BLENDER_BIN").unwrap_or_else(|_| "/blender/blender".to_string());
        let timeout_secs = env::var("BLENDER_TIMEOUT")
            .ok()
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(300);
        Self {
            binary: PathBuf::from(binary),
            script: PathBuf::from("/app/deform_avatar.py"),
            assets_dir: PathBuf::from("/app/assets"),
            fallback_preset: "female".to_string(),
            timeout_secs,
            min_tex_res: 512,
            max_tex_res: 8192,
            default_tex_res: 2048,
            required_roles: vec!["front".to_string(), "side".to_string()],
            allow_partial: false,
        }
    }
}

/// Aggregated settings persisted to disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub quality: QualitySettings,
    pub camera: CameraSettings,
    pub scale: ScaleSettings,
    pub validation: ValidationSettings,
    pub estimator: EstimatorSettings,
    pub ranking: RankingSettings,
    pub photos: PhotoLimits,
    /// Telemetry and diagnostics preferences.
    pub telemetry: TelemetrySettings,
    pub render: RenderSettings,
}

impl AppSettings {
    /// Load settings from a JSON file.
    ///
    /// Missing sections and fields fall back to their defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let settings: AppSettings = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings JSON at {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serialize settings to disk in pretty-printed JSON.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let payload =
            serde_json::to_string_pretty(self).context("failed to serialize settings JSON")?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write settings file {}", path.display()))?;
        Ok(())
    }

    /// Reject settings that cannot produce meaningful results.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.scale.clamp_min > 0.0 && self.scale.clamp_min <= self.scale.clamp_max,
            "scale clamp must satisfy 0 < clamp_min <= clamp_max (got {}..{})",
            self.scale.clamp_min,
            self.scale.clamp_max
        );
        anyhow::ensure!(
            self.camera.vfov_deg > 0.0 && self.camera.vfov_deg < 180.0,
            "camera vfov_deg must be in (0, 180), got {}",
            self.camera.vfov_deg
        );
        anyhow::ensure!(
            self.render.min_tex_res <= self.render.default_tex_res
                && self.render.default_tex_res <= self.render.max_tex_res,
            "render default_tex_res must lie within min_tex_res..=max_tex_res"
        );
        for (name, band) in &self.validation.bands {
            anyhow::ensure!(
                band.min <= band.max,
                "validation band for {name} has min > max"
            );
        }
        Ok(())
    }
}

/// Returns the default path for persisted settings (`config/bodyfit.json`).
pub fn default_settings_path() -> PathBuf {
    env::current_dir()
        .map(|dir| dir.join("config/bodyfit.json"))
        .unwrap_or_else(|_| PathBuf::from("config/bodyfit.json"))
}
