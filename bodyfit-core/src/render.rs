//! Render-stage boundary.
//!
//! The renderer is an external executable driven through a fixed command
//! line. This module decides whether a calibration is good enough to render,
//! stages the selected photos as files, builds the command, supervises the
//! child process with a timeout and validates the binary glTF it produces.

use std::ffi::OsString;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use bodyfit_utils::config::AppSettings;
use bodyfit_utils::{PhotoPayload, Stage, timing_guard};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::analysis::{ByRole, PoseAngles, Role};
use crate::classifier::QualityThresholds;
use crate::l10n::Lang;
use crate::measurements::{BodyPart, MeasurementSet};
use crate::request::{CalibrationRequest, PhotoSlot};
use crate::response::{CalibrationResponse, RoleReportEntry, RoleStatus};

/// Most photos handed to the renderer across all roles.
pub const MAX_STAGED_PHOTOS: usize = 10;
const GLTF_MAGIC: &[u8; 4] = b"glTF";
const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long to wait for output pipes to close once the renderer has exited.
const READER_GRACE: Duration = Duration::from_secs(2);
const ERROR_MARKERS: [&str; 6] = [
    "error",
    "exception",
    "traceback",
    "failed",
    "fatal",
    "mesh verification",
];
const MAX_LOGGED_ERROR_LINES: usize = 10;
const RENDERED_MEASUREMENTS: [BodyPart; 6] = [
    BodyPart::Chest,
    BodyPart::Waist,
    BodyPart::Hips,
    BodyPart::Shoulder,
    BodyPart::Inseam,
    BodyPart::Arm,
];

/// Renderer installation and defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    pub binary: PathBuf,
    pub script: PathBuf,
    pub assets_dir: PathBuf,
    pub fallback_preset: String,
    pub timeout: Duration,
    pub min_tex_res: u32,
    pub max_tex_res: u32,
    pub default_tex_res: u32,
    pub required_roles: Vec<String>,
    pub allow_partial: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self::from(&AppSettings::default())
    }
}

impl From<&AppSettings> for RenderConfig {
    fn from(settings: &AppSettings) -> Self {
        let render = &settings.render;
        Self {
            binary: render.binary.clone(),
            script: render.script.clone(),
            assets_dir: render.assets_dir.clone(),
            fallback_preset: render.fallback_preset.clone(),
            timeout: Duration::from_secs(render.timeout_secs),
            min_tex_res: render.min_tex_res,
            max_tex_res: render.max_tex_res,
            default_tex_res: render.default_tex_res,
            required_roles: render.required_roles.clone(),
            allow_partial: render.allow_partial,
        }
    }
}

/// Whether the renderer poses the avatar with the calibration pose hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoseMode {
    #[default]
    Auto,
    Neutral,
}

impl FromStr for PoseMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "neutral" => Ok(Self::Neutral),
            other => Err(format!(
                "invalid pose mode '{other}'; expected 'auto' or 'neutral'"
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Invalid texRes value: {0}. Must be an integer.")]
    InvalidTexRes(String),
    #[error("texRes must be between {min} and {max}, got {value}. Using default {default}.")]
    TexResOutOfRange {
        value: i64,
        min: u32,
        max: u32,
        default: u32,
    },
    #[error("Blender binary not found at {}", .0.display())]
    BinaryMissing(PathBuf),
    #[error("Base blend not found: {}", .0.display())]
    BaseAssetMissing(PathBuf),
    #[error("failed to prepare render workspace: {0}")]
    Workspace(#[from] io::Error),
    #[error("failed to start renderer: {source}")]
    Spawn { source: io::Error },
    #[error("Blender execution timed out after {secs}s")]
    Timeout { secs: u64, log: String },
    #[error("Blender exited with code {}", exit_code(.code))]
    Failed { code: Option<i32>, log: String },
    #[error("Blender finished (code {}) but GLB missing", exit_code(.code))]
    OutputMissing { code: Option<i32>, log: String },
    #[error("GLB created but empty")]
    OutputEmpty { log: String },
    #[error("unexpected GLB header {header:?}")]
    BadMagic { header: Vec<u8>, log: String },
    #[error("failed to read render output: {source}")]
    OutputRead { source: io::Error, log: String },
}

fn exit_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

impl RenderError {
    /// Captured renderer output, when the process ran.
    pub fn log(&self) -> Option<&str> {
        match self {
            Self::Timeout { log, .. }
            | Self::Failed { log, .. }
            | Self::OutputMissing { log, .. }
            | Self::OutputEmpty { log }
            | Self::BadMagic { log, .. }
            | Self::OutputRead { log, .. } => Some(log),
            _ => None,
        }
    }
}

/// Per-request render choices.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub preset: String,
    pub tex_res: u32,
    pub pose_mode: PoseMode,
    pub high_detail: bool,
    pub required_roles: Vec<String>,
    pub allow_partial: bool,
}

impl RenderOptions {
    /// Read render fields from a request, falling back to `config`.
    ///
    /// A request may opt into partial renders but cannot opt out of one the
    /// operator enabled.
    pub fn from_request(
        request: &CalibrationRequest,
        config: &RenderConfig,
    ) -> Result<Self, RenderError> {
        let tex_res = parse_tex_res(request.tex_res.as_ref(), config)?;
        let preset = [&request.preset, &request.gender_hint]
            .into_iter()
            .flatten()
            .find(|value| !value.is_empty())
            .map(|value| value.trim().to_ascii_lowercase())
            .unwrap_or_else(|| "neutral".to_string());
        let pose_mode = match request.pose_mode.as_deref() {
            None | Some("") => PoseMode::default(),
            Some(raw) => raw.parse().unwrap_or_else(|err: String| {
                warn!("{err}; rendering without pose");
                PoseMode::Neutral
            }),
        };
        let required_roles = match &request.required_roles {
            Some(roles) if !roles.is_empty() => roles.clone(),
            _ => config.required_roles.clone(),
        };
        Ok(Self {
            preset,
            tex_res,
            pose_mode,
            high_detail: request.high_detail.unwrap_or(false),
            required_roles,
            allow_partial: config.allow_partial || request.allow_partial.unwrap_or(false),
        })
    }
}

fn parse_tex_res(raw: Option<&Value>, config: &RenderConfig) -> Result<u32, RenderError> {
    let value = match raw {
        None | Some(Value::Null) | Some(Value::Bool(false)) => None,
        Some(Value::String(text)) if text.is_empty() => None,
        Some(Value::Number(number)) => match number.as_i64() {
            Some(0) => None,
            Some(v) => Some(v),
            None => match number.as_f64() {
                Some(f) if f.is_finite() && f.trunc() != 0.0 => Some(f.trunc() as i64),
                Some(f) if f.is_finite() => None,
                _ => return Err(RenderError::InvalidTexRes(number.to_string())),
            },
        },
        Some(Value::String(text)) => Some(
            text.trim()
                .parse::<i64>()
                .map_err(|_| RenderError::InvalidTexRes(text.clone()))?,
        ),
        Some(other) => return Err(RenderError::InvalidTexRes(other.to_string())),
    };
    let Some(value) = value else {
        return Ok(config.default_tex_res);
    };
    if value < i64::from(config.min_tex_res) || value > i64::from(config.max_tex_res) {
        return Err(RenderError::TexResOutOfRange {
            value,
            min: config.min_tex_res,
            max: config.max_tex_res,
            default: config.default_tex_res,
        });
    }
    Ok(value as u32)
}

/// Required roles whose report status is not `ok`, in the order given.
pub fn roles_not_ok(report: &ByRole<RoleReportEntry>, required: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|name| {
            let status = name
                .parse::<Role>()
                .ok()
                .and_then(|role| report.get(role))
                .map(|entry| entry.status);
            status != Some(RoleStatus::Ok)
        })
        .cloned()
        .collect()
}

/// Structured refusal to render because required views failed quality.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QaFailure {
    pub ok: bool,
    pub lang: Lang,
    pub error: String,
    pub required_roles: Vec<String>,
    pub roles_not_ok: Vec<String>,
    pub role_report: ByRole<RoleReportEntry>,
    pub retake_tips: Vec<String>,
    pub thresholds: QualityThresholds,
}

/// Allow rendering only when every required role is `ok`, unless partial
/// renders are allowed.
pub fn gate(response: &CalibrationResponse, options: &RenderOptions) -> Result<(), QaFailure> {
    let not_ok = roles_not_ok(&response.role_report, &options.required_roles);
    info!(
        "render gate: required {:?}, allow partial {}, not ok {:?}",
        options.required_roles, options.allow_partial, not_ok
    );
    if options.allow_partial || not_ok.is_empty() {
        return Ok(());
    }
    Err(QaFailure {
        ok: false,
        lang: response.lang,
        error: "Photos didn't pass quality. Please retake the required views.".to_string(),
        required_roles: options.required_roles.clone(),
        roles_not_ok: not_ok,
        role_report: response.role_report.clone(),
        retake_tips: response.retake_tips.clone(),
        thresholds: response.thresholds,
    })
}

/// Request indices to stage per role: ranked list first, then the chosen
/// photo, without repeats, capped at [`MAX_STAGED_PHOTOS`] in role order.
pub fn staging_plan(response: &CalibrationResponse) -> ByRole<Vec<usize>> {
    let mut budget = MAX_STAGED_PHOTOS;
    let mut plan = ByRole::<Vec<usize>>::default();
    for role in Role::SELECTABLE {
        let ranked = response.by_role_ranked.get(role).cloned().unwrap_or_default();
        let chosen = response.chosen_by_role.get(role).copied().flatten();
        let Some(slot) = plan.get_mut(role) else {
            continue;
        };
        for index in ranked.into_iter().chain(chosen) {
            if budget == 0 {
                break;
            }
            if !slot.contains(&index) {
                slot.push(index);
                budget -= 1;
            }
        }
    }
    plan
}

/// Everything needed to build one renderer command line.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    pub base_blend: PathBuf,
    pub preset: String,
    pub height_m: f64,
    pub tex_res: u32,
    pub high_detail: bool,
    pub measurements: MeasurementSet,
    pub photos: ByRole<Vec<PathBuf>>,
    pub pose_json: Option<PathBuf>,
    pub output: PathBuf,
}

/// A finished render.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub glb: Vec<u8>,
    pub log: String,
}

/// Captured result of a finished child process.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn log(&self) -> String {
        format_log(&self.stdout, &self.stderr)
    }
}

fn format_log(stdout: &str, stderr: &str) -> String {
    let mut log = String::new();
    if !stdout.is_empty() {
        log.push_str("=== STDOUT ===\n");
        log.push_str(stdout);
        log.push('\n');
    }
    if !stderr.is_empty() {
        log.push_str("=== STDERR ===\n");
        log.push_str(stderr);
        log.push('\n');
    }
    log
}

/// Lines of renderer output that look like errors.
pub fn error_lines(text: &str) -> Vec<&str> {
    text.lines()
        .filter(|line| {
            let lower = line.to_ascii_lowercase();
            ERROR_MARKERS.iter().any(|marker| lower.contains(marker))
        })
        .collect()
}

/// Run `command` with piped output, killing it after `timeout`.
pub fn run_with_timeout(mut command: Command, timeout: Duration) -> Result<ProcessOutput, RenderError> {
    command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = command.spawn().map_err(|source| RenderError::Spawn { source })?;
    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) if started.elapsed() >= timeout => break None,
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(err) => {
                warn!("failed to poll renderer: {err}");
                break None;
            }
        }
    };

    // Pipes only close once the child is gone, so kill before joining readers.
    // Grandchildren may still hold them open, which the grace period bounds.
    let Some(status) = status else {
        kill(&mut child);
        let log = format_log(&join_reader(stdout), &join_reader(stderr));
        return Err(RenderError::Timeout {
            secs: timeout.as_secs(),
            log,
        });
    };
    Ok(ProcessOutput {
        status,
        stdout: join_reader(stdout),
        stderr: join_reader(stderr),
    })
}

fn kill(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!("renderer already exited: {err}");
    }
    if let Err(err) = child.wait() {
        warn!("failed to reap renderer: {err}");
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<String>> {
    pipe.map(|mut pipe| {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            if let Err(err) = pipe.read_to_end(&mut buf) {
                debug!("renderer output read ended early: {err}");
            }
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });
        rx
    })
}

fn join_reader(reader: Option<Receiver<String>>) -> String {
    let Some(reader) = reader else {
        return String::new();
    };
    reader.recv_timeout(READER_GRACE).unwrap_or_else(|err| {
        warn!("renderer output still open after exit ({err}); dropping it");
        String::new()
    })
}

/// Check that the renderer wrote a non-empty binary glTF file.
pub fn validate_output(path: &Path, code: Option<i32>, log: &str) -> Result<Vec<u8>, RenderError> {
    if !path.exists() {
        return Err(RenderError::OutputMissing {
            code,
            log: log.to_string(),
        });
    }
    let bytes = fs::read(path).map_err(|source| RenderError::OutputRead {
        source,
        log: log.to_string(),
    })?;
    if bytes.is_empty() {
        return Err(RenderError::OutputEmpty {
            log: log.to_string(),
        });
    }
    if !bytes.starts_with(GLTF_MAGIC) {
        return Err(RenderError::BadMagic {
            header: bytes.iter().take(4).copied().collect(),
            log: log.to_string(),
        });
    }
    Ok(bytes)
}

/// Drives the external renderer.
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    config: RenderConfig,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// `base_<preset>.blend`, falling back to the configured preset.
    pub fn resolve_base_asset(&self, preset: &str) -> Result<PathBuf, RenderError> {
        let requested = self.config.assets_dir.join(format!("base_{preset}.blend"));
        if requested.exists() {
            return Ok(requested);
        }
        let fallback = self
            .config
            .assets_dir
            .join(format!("base_{}.blend", self.config.fallback_preset));
        warn!(
            "{} not found; falling back to {}",
            requested.display(),
            fallback.display()
        );
        if fallback.exists() {
            Ok(fallback)
        } else {
            Err(RenderError::BaseAssetMissing(fallback))
        }
    }

    /// Write the planned photos into `dir`. Undecodable payloads are skipped.
    pub fn stage_photos(
        &self,
        plan: &ByRole<Vec<usize>>,
        slots: &[PhotoSlot],
        dir: &Path,
    ) -> ByRole<Vec<PathBuf>> {
        let mut staged = ByRole::<Vec<PathBuf>>::default();
        for (role, indices) in plan.iter() {
            let Some(paths) = staged.get_mut(role) else {
                continue;
            };
            for (n, &index) in indices.iter().enumerate() {
                let Some(slot) = slots.iter().find(|slot| slot.index == index) else {
                    warn!("no photo with index {index} to stage for {role}");
                    continue;
                };
                match write_photo(slot, dir, &format!("{role}_{n}")) {
                    Ok(path) => paths.push(path),
                    Err(err) => warn!("failed to stage {role} photo {index}: {err:#}"),
                }
            }
        }
        debug!(
            "staged photos: front {}, side {}, back {}",
            staged.front.len(),
            staged.side.len(),
            staged.back.len()
        );
        staged
    }

    /// Renderer arguments, excluding the binary.
    pub fn command_args(&self, job: &RenderJob) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-b".into(),
            job.base_blend.clone().into(),
            "--python".into(),
            self.config.script.clone().into(),
            "--".into(),
            "--preset".into(),
            job.preset.clone().into(),
            "--height".into(),
            job.height_m.to_string().into(),
            "--texRes".into(),
            job.tex_res.to_string().into(),
            "--out".into(),
            job.output.clone().into(),
        ];
        if job.high_detail {
            args.push("--highDetail".into());
        }
        for part in RENDERED_MEASUREMENTS {
            if let Some(value) = job.measurements.get(part) {
                args.push(format!("--{part}").into());
                args.push(value.to_string().into());
            }
        }
        for (role, paths) in job.photos.iter() {
            match paths.as_slice() {
                [] => {}
                [single] => {
                    args.push(format!("--{role}Tex").into());
                    args.push(single.clone().into());
                }
                many => {
                    let joined = many
                        .iter()
                        .map(|path| path.to_string_lossy())
                        .collect::<Vec<_>>()
                        .join(";");
                    args.push(format!("--{role}TexList").into());
                    args.push(joined.into());
                }
            }
        }
        if let Some(pose) = &job.pose_json {
            args.push("--poseJson".into());
            args.push(pose.clone().into());
        }
        args
    }

    pub fn build_command(&self, job: &RenderJob) -> Command {
        let mut command = Command::new(&self.config.binary);
        command
            .args(self.command_args(job))
            .env("OUTPUT_GLTF", &job.output)
            .env("SDL_AUDIODRIVER", "dummy");
        command
    }

    /// Stage photos, run the renderer and return the validated GLB.
    pub fn render(
        &self,
        response: &CalibrationResponse,
        slots: &[PhotoSlot],
        options: &RenderOptions,
    ) -> Result<RenderOutput, RenderError> {
        let _guard = timing_guard(Stage::Render);
        if !self.config.binary.exists() {
            return Err(RenderError::BinaryMissing(self.config.binary.clone()));
        }
        let base_blend = self.resolve_base_asset(&options.preset)?;
        let workspace = tempfile::Builder::new().prefix("bodyfit-render-").tempdir()?;
        let dir = workspace.path();

        let photos = self.stage_photos(&staging_plan(response), slots, dir);
        let pose_json = match options.pose_mode {
            PoseMode::Auto if !response.pose_hint.is_empty() => {
                write_pose(&response.pose_hint, &dir.join("pose.json"))
            }
            _ => None,
        };
        let job = RenderJob {
            base_blend,
            preset: options.preset.clone(),
            height_m: response.height_m,
            tex_res: options.tex_res,
            high_detail: options.high_detail,
            measurements: response.measurements(),
            photos,
            pose_json,
            output: dir.join("avatar.glb"),
        };
        info!(
            "starting renderer: preset {}, height {:.2} m, texRes {}, pose {:?}",
            job.preset, job.height_m, job.tex_res, options.pose_mode
        );

        let output = run_with_timeout(self.build_command(&job), self.config.timeout)?;
        let log = output.log();
        let errors = error_lines(&output.stderr);
        for line in errors.iter().take(MAX_LOGGED_ERROR_LINES) {
            warn!("renderer: {line}");
        }
        let code = output.status.code();
        info!("renderer exited with code {code:?}");
        if !output.status.success() {
            return Err(RenderError::Failed { code, log });
        }
        let glb = validate_output(&job.output, code, &log)?;
        info!("render produced {} bytes", glb.len());
        Ok(RenderOutput { glb, log })
    }
}

fn write_photo(slot: &PhotoSlot, dir: &Path, stem: &str) -> anyhow::Result<PathBuf> {
    let payload = PhotoPayload::from_base64(&slot.data)?;
    let path = dir.join(format!("{stem}{}", payload.format(None).extension()));
    fs::write(&path, &payload.bytes)?;
    Ok(path)
}

fn write_pose(pose: &PoseAngles, path: &Path) -> Option<PathBuf> {
    let written = serde_json::to_vec(pose)
        .map_err(io::Error::other)
        .and_then(|bytes| fs::write(path, bytes));
    match written {
        Ok(()) => Some(path.to_path_buf()),
        Err(err) => {
            warn!("failed to write pose JSON: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Joint;
    use serde_json::json;

    fn request(value: Value) -> CalibrationRequest {
        CalibrationRequest::from_value(value).expect("request")
    }

    fn report(front: RoleStatus, side: RoleStatus) -> ByRole<RoleReportEntry> {
        let mut report = ByRole::from_fn(|_| RoleReportEntry::missing());
        report.front.status = front;
        report.side.status = side;
        report
    }

    #[test]
    fn tex_res_defaults_and_validation() {
        let config = RenderConfig::default();
        let opts = |v: Value| RenderOptions::from_request(&request(v), &config);

        assert_eq!(opts(json!({})).expect("default").tex_res, 2048);
        assert_eq!(opts(json!({"texRes": 0})).expect("zero").tex_res, 2048);
        assert_eq!(opts(json!({"texRes": "4096"})).expect("text").tex_res, 4096);
        assert_eq!(opts(json!({"texRes": 1024.9})).expect("float").tex_res, 1024);

        let err = opts(json!({"texRes": "huge"})).expect_err("text");
        assert_eq!(err.to_string(), "Invalid texRes value: huge. Must be an integer.");
        let err = opts(json!({"texRes": 100})).expect_err("range");
        assert_eq!(
            err.to_string(),
            "texRes must be between 512 and 8192, got 100. Using default 2048."
        );
        assert!(opts(json!({"texRes": [1]})).is_err());
    }

    #[test]
    fn options_read_preset_pose_and_roles() {
        let config = RenderConfig::default();
        let opts = RenderOptions::from_request(
            &request(json!({
                "gender_hint": " Male ",
                "poseMode": "NEUTRAL",
                "highDetail": true,
                "required_roles": ["front"],
                "allowPartial": true
            })),
            &config,
        )
        .expect("options");
        assert_eq!(opts.preset, "male");
        assert_eq!(opts.pose_mode, PoseMode::Neutral);
        assert!(opts.high_detail);
        assert_eq!(opts.required_roles, vec!["front".to_string()]);
        assert!(opts.allow_partial);

        let defaults = RenderOptions::from_request(&request(json!({})), &config).expect("defaults");
        assert_eq!(defaults.preset, "neutral");
        assert_eq!(defaults.pose_mode, PoseMode::Auto);
        assert_eq!(defaults.required_roles, vec!["front".to_string(), "side".to_string()]);
        assert!(!defaults.allow_partial);
    }

    #[test]
    fn operator_allow_partial_survives_request_opt_out() {
        let config = RenderConfig {
            allow_partial: true,
            ..RenderConfig::default()
        };
        let opts = RenderOptions::from_request(&request(json!({"allowPartial": false})), &config)
            .expect("options");
        assert!(opts.allow_partial);

        let strict = RenderConfig::default();
        let opts = RenderOptions::from_request(&request(json!({"allowPartial": false})), &strict)
            .expect("options");
        assert!(!opts.allow_partial);
    }

    #[test]
    fn roles_not_ok_lists_missing_retry_and_unknown_roles() {
        let report = report(RoleStatus::Ok, RoleStatus::Retry);
        let required = vec!["front".to_string(), "side".to_string(), "top".to_string()];
        assert_eq!(roles_not_ok(&report, &required), vec!["side", "top"]);
    }

    #[test]
    fn staging_plan_prefers_ranked_and_dedupes() {
        let mut response = sample_response();
        response.by_role_ranked = ByRole {
            front: vec![0, 1],
            side: vec![2],
            back: vec![0, 1],
        };
        response.chosen_by_role = ByRole {
            front: Some(0),
            side: Some(3),
            back: Some(0),
        };
        let plan = staging_plan(&response);
        assert_eq!(plan.front, vec![0, 1]);
        assert_eq!(plan.side, vec![2, 3]);
        assert_eq!(plan.back, vec![0, 1]);
    }

    #[test]
    fn staging_plan_caps_total() {
        let mut response = sample_response();
        response.by_role_ranked = ByRole {
            front: (0..6).collect(),
            side: (6..12).collect(),
            back: (12..14).collect(),
        };
        let plan = staging_plan(&response);
        assert_eq!(plan.front.len(), 6);
        assert_eq!(plan.side.len(), 4);
        assert!(plan.back.is_empty());
    }

    #[test]
    fn command_line_follows_renderer_contract() {
        let renderer = Renderer::new(RenderConfig {
            script: PathBuf::from("/app/deform.py"),
            ..RenderConfig::default()
        });
        let job = RenderJob {
            base_blend: PathBuf::from("/assets/base_neutral.blend"),
            preset: "neutral".into(),
            height_m: 1.7,
            tex_res: 2048,
            high_detail: true,
            measurements: MeasurementSet::new()
                .with(BodyPart::Chest, 0.9)
                .with(BodyPart::FootLength, 0.26),
            photos: ByRole {
                front: vec![PathBuf::from("/t/front_0.jpg"), PathBuf::from("/t/front_1.png")],
                side: vec![PathBuf::from("/t/side_0.jpg")],
                back: Vec::new(),
            },
            pose_json: Some(PathBuf::from("/t/pose.json")),
            output: PathBuf::from("/t/avatar.glb"),
        };
        let args: Vec<String> = renderer
            .command_args(&job)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-b",
                "/assets/base_neutral.blend",
                "--python",
                "/app/deform.py",
                "--",
                "--preset",
                "neutral",
                "--height",
                "1.7",
                "--texRes",
                "2048",
                "--out",
                "/t/avatar.glb",
                "--highDetail",
                "--chest",
                "0.9",
                "--frontTexList",
                "/t/front_0.jpg;/t/front_1.png",
                "--sideTex",
                "/t/side_0.jpg",
                "--poseJson",
                "/t/pose.json",
            ]
        );
    }

    #[test]
    fn output_validation_checks_presence_size_and_magic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.glb");
        assert!(matches!(
            validate_output(&path, Some(0), ""),
            Err(RenderError::OutputMissing { .. })
        ));
        fs::write(&path, b"").expect("write");
        assert!(matches!(
            validate_output(&path, Some(0), ""),
            Err(RenderError::OutputEmpty { .. })
        ));
        fs::write(&path, b"PK\x03\x04").expect("write");
        assert!(matches!(
            validate_output(&path, Some(0), "log"),
            Err(RenderError::BadMagic { .. })
        ));
        fs::write(&path, b"glTF\x02\x00\x00\x00").expect("write");
        assert_eq!(validate_output(&path, Some(0), "").expect("valid").len(), 8);
    }

    #[test]
    fn error_lines_are_detected_case_insensitively() {
        let stderr = "loading\nTraceback (most recent call last):\nok\nMesh Verification failed";
        assert_eq!(error_lines(stderr).len(), 2);
    }

    #[test]
    fn errors_expose_captured_log() {
        let err = RenderError::Failed {
            code: Some(2),
            log: "=== STDERR ===\nboom\n".into(),
        };
        assert_eq!(err.to_string(), "Blender exited with code 2");
        assert!(err.log().unwrap_or_default().contains("boom"));
        assert!(RenderError::BinaryMissing(PathBuf::from("/x")).log().is_none());
    }

    #[test]
    fn pose_hint_is_written_as_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut pose = PoseAngles::default();
        pose.set(Joint::HeadYaw, Some(12.0));
        let path = write_pose(&pose, &dir.path().join("pose.json")).expect("written");
        let value: Value = serde_json::from_slice(&fs::read(path).expect("read")).expect("json");
        assert_eq!(value, json!({"head_yaw": 12.0}));
    }

    fn sample_response() -> CalibrationResponse {
        CalibrationResponse {
            ok: true,
            lang: Lang::En,
            height_m: 1.7,
            foot_width_category: None,
            thresholds: QualityThresholds::default(),
            photos_received: 0,
            photos_trimmed: None,
            accepted: Vec::new(),
            rejected: Vec::new(),
            chosen_by_role: ByRole::default(),
            by_role_ranked: ByRole::default(),
            retake_tips: vec!["tip".into()],
            role_report: report(RoleStatus::Ok, RoleStatus::Missing),
            pose_hint: PoseAngles::default(),
            chest: Some(0.9),
            waist: None,
            hips: None,
            shoulder: None,
            inseam: None,
            arm: None,
            foot_length_m: None,
            foot_width_m: None,
        }
    }

    #[test]
    fn gate_refuses_incomplete_required_roles() {
        let response = sample_response();
        let options =
            RenderOptions::from_request(&request(json!({})), &RenderConfig::default()).expect("opts");
        let failure = gate(&response, &options).expect_err("side missing");
        assert!(!failure.ok);
        assert_eq!(failure.roles_not_ok, vec!["side"]);
        assert_eq!(failure.retake_tips, vec!["tip"]);
        assert_eq!(
            failure.error,
            "Photos didn't pass quality. Please retake the required views."
        );

        let partial = RenderOptions {
            allow_partial: true,
            ..options
        };
        assert!(gate(&response, &partial).is_ok());
    }
}
