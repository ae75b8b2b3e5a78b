mod args;
mod config;

use std::{
    fs::{self, File},
    io::{self, Read},
    path::Path,
    process::ExitCode,
};

use anyhow::{Context, Result};
use bodyfit_core::{
    CalibrationReply, CalibrationRequest, Calibrator, FailureResponse, KeypointAdapter, Lang,
    PrecomputedKeypoints, RenderConfig, RenderOptions, Renderer, render::gate,
};
use bodyfit_utils::{configure_telemetry, init_logging};
use clap::Parser;
use log::{LevelFilter, debug, error, info, warn};
use serde::Serialize;

use crate::{
    args::CalibrateArgs,
    config::{apply_cli_overrides, load_settings},
};

/// Render-stage failure with the renderer's captured output.
#[derive(Debug, Serialize)]
struct RenderFailure {
    ok: bool,
    lang: Lang,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    log: Option<String>,
}

fn main() -> ExitCode {
    let args = CalibrateArgs::parse();
    if let Err(err) = init_logging(LevelFilter::Info) {
        eprintln!("failed to initialize logging: {err:#}");
    }

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err:#}");
            let failure = FailureResponse::unexpected(&err, Lang::default());
            if let Err(write_err) = emit(&failure, args.json.as_deref()) {
                error!("failed to write failure response: {write_err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the run produced a successful response.
fn run(args: &CalibrateArgs) -> Result<bool> {
    let (mut settings, source) = load_settings(args.config.as_ref())?;
    debug!("settings source: {source:?}");
    apply_cli_overrides(&mut settings, args);
    settings.validate().context("invalid settings")?;
    configure_telemetry(
        settings.telemetry.enabled,
        settings.telemetry.level_filter(),
    );

    let raw = read_request(&args.request)?;
    let request = match CalibrationRequest::from_json_str(&raw) {
        Ok(request) => request,
        Err(err) => {
            warn!("rejecting request: {err}");
            emit(
                &FailureResponse::from_error(&err, Lang::default()),
                args.json.as_deref(),
            )?;
            return Ok(false);
        }
    };

    let adapter = match args.keypoints.as_ref() {
        Some(path) => {
            let keypoints = PrecomputedKeypoints::from_path(path)?;
            info!(
                "Loaded keypoints for {} photo(s) from {}",
                keypoints.len(),
                path.display()
            );
            keypoints.into_adapter()
        }
        None => {
            warn!("no --keypoints given; photos are analyzed without landmarks");
            KeypointAdapter::empty()
        }
    };

    let mut calibrator = Calibrator::from_settings(&settings, adapter);
    let reply = calibrator.handle(&request);
    calibrator.release();

    let response = match &reply {
        CalibrationReply::Success(response) if args.render => response,
        _ => {
            emit(&reply, args.json.as_deref())?;
            return Ok(reply.is_ok());
        }
    };

    let render_config = RenderConfig::from(&settings);
    let options = match RenderOptions::from_request(&request, &render_config) {
        Ok(options) => options,
        Err(err) => {
            warn!("invalid render options: {err}");
            let failure = RenderFailure {
                ok: false,
                lang: response.lang,
                error: err.to_string(),
                log: None,
            };
            emit(&failure, args.json.as_deref())?;
            return Ok(false);
        }
    };
    if let Err(qa) = gate(response, &options) {
        warn!("{} Not ok: {}", qa.error, qa.roles_not_ok.join(", "));
        emit(&qa, args.json.as_deref())?;
        return Ok(false);
    }

    let slots = request.photo_slots(&settings.photos)?.slots;
    let renderer = Renderer::new(render_config);
    match renderer.render(response, &slots, &options) {
        Ok(output) => {
            write_bytes(&args.output, &output.glb)?;
            info!(
                "Wrote {} byte model to {}",
                output.glb.len(),
                args.output.display()
            );
            if let Some(path) = args.render_log.as_ref() {
                write_bytes(path, output.log.as_bytes())?;
            }
            emit(&reply, args.json.as_deref())?;
            Ok(true)
        }
        Err(err) => {
            error!("render failed: {err}");
            if let (Some(path), Some(log)) = (args.render_log.as_ref(), err.log()) {
                write_bytes(path, log.as_bytes())?;
            }
            let failure = RenderFailure {
                ok: false,
                lang: response.lang,
                error: err.to_string(),
                log: err.log().map(str::to_string),
            };
            emit(&failure, args.json.as_deref())?;
            Ok(false)
        }
    }
}

fn read_request(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut raw = String::new();
        io::stdin()
            .read_to_string(&mut raw)
            .context("failed to read request from stdin")?;
        return Ok(raw);
    }
    fs::read_to_string(path)
        .with_context(|| format!("failed to read request {}", path.display()))
}

/// Write `value` as pretty JSON to `path`, or print it to stdout.
fn emit<T: Serialize>(value: &T, path: Option<&Path>) -> Result<()> {
    if let Some(json_path) = path {
        if let Some(dir) = json_path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }
        let file = File::create(json_path)
            .with_context(|| format!("failed to create {}", json_path.display()))?;
        serde_json::to_writer_pretty(file, value)
            .with_context(|| format!("failed to write response JSON to {}", json_path.display()))?;
        info!("Wrote response to {}", json_path.display());
    } else {
        let json = serde_json::to_string_pretty(value).context("failed to serialize response")?;
        println!("{json}");
    }
    Ok(())
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
    }
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}
