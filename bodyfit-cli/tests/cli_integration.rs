use std::error::Error;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::process::Output;

use assert_cmd::cargo::cargo_bin_cmd;
use base64::{Engine, engine::general_purpose::STANDARD};
use bodyfit_utils::fixture_path;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{Value, json};
use tempfile::tempdir;

type TestResult = Result<(), Box<dyn Error>>;

fn checkerboard_png() -> Result<String, Box<dyn Error>> {
    let img = RgbImage::from_fn(400, 800, |x, y| {
        if (x / 4 + y / 4) % 2 == 0 {
            Rgb([230, 230, 230])
        } else {
            Rgb([25, 25, 25])
        }
    });
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img).write_to(&mut bytes, ImageFormat::Png)?;
    Ok(STANDARD.encode(bytes.into_inner()))
}

fn write_request(dir: &Path, body: &Value) -> Result<std::path::PathBuf, Box<dyn Error>> {
    let path = dir.join("request.json");
    fs::write(&path, serde_json::to_vec(body)?)?;
    Ok(path)
}

fn run_cli(args: &[&str]) -> Result<Output, Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("bodyfit");
    cmd.args(args).env("RUST_LOG", "warn");
    Ok(cmd.output()?)
}

fn stdout_json(output: &Output) -> Result<Value, Box<dyn Error>> {
    Ok(serde_json::from_slice(&output.stdout)?)
}

#[test]
fn user_only_request_prints_measurements() -> TestResult {
    let dir = tempdir()?;
    let request = write_request(dir.path(), &json!({"height": 170, "waist": 80}))?;

    let output = run_cli(&["--request", request.to_str().ok_or("utf8")?])?;
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let response = stdout_json(&output)?;
    assert_eq!(response["ok"], true);
    assert_eq!(response["height_m"], 1.7);
    assert_eq!(response["waist"], 0.8);
    assert!(response["chest"].is_null());
    assert_eq!(response["role_report"]["front"]["status"], "missing");
    Ok(())
}

#[test]
fn photos_with_keypoints_are_written_to_json_file() -> TestResult {
    let dir = tempdir()?;
    let photo = checkerboard_png()?;
    let request = write_request(
        dir.path(),
        &json!({"height": "175", "lang": "de-DE", "photos": {"front": photo.clone(), "side": photo}}),
    )?;
    let keypoints = fixture_path("keypoints/session.json")?;
    let json_path = dir.path().join("out").join("response.json");

    let output = run_cli(&[
        "--request",
        request.to_str().ok_or("utf8")?,
        "--keypoints",
        keypoints.to_str().ok_or("utf8")?,
        "--json",
        json_path.to_str().ok_or("utf8")?,
    ])?;
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(output.stdout.is_empty());

    let response: Value = serde_json::from_slice(&fs::read(&json_path)?)?;
    assert_eq!(response["lang"], "de");
    assert_eq!(response["accepted"].as_array().map(Vec::len), Some(2));
    assert_eq!(response["chosen_by_role"]["front"], 0);
    assert_eq!(response["chosen_by_role"]["side"], 1);
    assert_eq!(response["role_report"]["side"]["status"], "ok");
    assert!(response["chest"].as_f64().is_some_and(|v| v > 0.0));
    Ok(())
}

#[test]
fn threshold_override_rejects_sharp_photos() -> TestResult {
    let dir = tempdir()?;
    let photo = checkerboard_png()?;
    let request = write_request(
        dir.path(),
        &json!({"height": 175, "photos": {"front": photo}}),
    )?;
    let keypoints = fixture_path("keypoints/front.json")?;

    let output = run_cli(&[
        "--request",
        request.to_str().ok_or("utf8")?,
        "--keypoints",
        keypoints.to_str().ok_or("utf8")?,
        "--min-focus",
        "1e12",
    ])?;
    assert!(output.status.success());
    let response = stdout_json(&output)?;
    assert_eq!(response["thresholds"]["min_focus"], 1e12);
    assert_eq!(response["rejected"][0]["index"], 0);
    assert_eq!(response["role_report"]["front"]["status"], "retry");
    assert!(
        response["retake_tips"]
            .as_array()
            .is_some_and(|tips| !tips.is_empty())
    );
    Ok(())
}

#[test]
fn unrealistic_height_fails_with_structured_error() -> TestResult {
    let dir = tempdir()?;
    let request = write_request(dir.path(), &json!({"height": -5, "lang": "fr"}))?;

    let output = run_cli(&["--request", request.to_str().ok_or("utf8")?])?;
    assert!(!output.status.success());
    let failure = stdout_json(&output)?;
    assert_eq!(failure["ok"], false);
    assert_eq!(failure["lang"], "fr");
    assert!(
        failure["error"]
            .as_str()
            .is_some_and(|e| e.contains("unrealistic height"))
    );
    Ok(())
}

#[test]
fn malformed_request_is_reported() -> TestResult {
    let dir = tempdir()?;
    let request = dir.path().join("request.json");
    fs::write(&request, "{ not json")?;

    let output = run_cli(&["--request", request.to_str().ok_or("utf8")?])?;
    assert!(!output.status.success());
    let failure = stdout_json(&output)?;
    assert!(
        failure["error"]
            .as_str()
            .is_some_and(|e| e.starts_with("malformed calibration request"))
    );
    Ok(())
}

#[test]
fn missing_request_file_reports_trace() -> TestResult {
    let dir = tempdir()?;
    let missing = dir.path().join("absent.json");

    let output = run_cli(&["--request", missing.to_str().ok_or("utf8")?])?;
    assert!(!output.status.success());
    let failure = stdout_json(&output)?;
    assert_eq!(failure["ok"], false);
    assert!(
        failure["error"]
            .as_str()
            .is_some_and(|e| e.contains("failed to read request"))
    );
    assert!(failure["trace"].is_string());
    Ok(())
}

#[test]
fn render_gate_blocks_missing_views() -> TestResult {
    let dir = tempdir()?;
    let request = write_request(dir.path(), &json!({"height": 170}))?;
    let glb = dir.path().join("twin.glb");

    let output = run_cli(&[
        "--request",
        request.to_str().ok_or("utf8")?,
        "--render",
        "--output",
        glb.to_str().ok_or("utf8")?,
    ])?;
    assert!(!output.status.success());
    let failure = stdout_json(&output)?;
    assert_eq!(failure["ok"], false);
    assert_eq!(failure["roles_not_ok"], json!(["front", "side"]));
    assert!(!glb.exists());
    Ok(())
}

#[cfg(unix)]
#[test]
fn render_writes_glb_from_stub_renderer() -> TestResult {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir()?;
    let assets = dir.path().join("assets");
    fs::create_dir(&assets)?;
    fs::write(assets.join("base_female.blend"), b"blend")?;
    let stub = dir.path().join("blender.sh");
    fs::write(
        &stub,
        "#!/bin/sh\necho 'stub renderer'\nprintf 'glTF\\002\\000\\000\\000' > \"$OUTPUT_GLTF\"\n",
    )?;
    fs::set_permissions(&stub, fs::Permissions::from_mode(0o755))?;

    let photo = checkerboard_png()?;
    let request = write_request(
        dir.path(),
        &json!({"height": 175, "preset": "female", "texRes": "1024",
                "photos": {"front": photo.clone(), "side": photo}}),
    )?;
    let keypoints = fixture_path("keypoints/session.json")?;
    let glb = dir.path().join("models").join("twin.glb");
    let log = dir.path().join("render.log");

    let output = run_cli(&[
        "--request",
        request.to_str().ok_or("utf8")?,
        "--keypoints",
        keypoints.to_str().ok_or("utf8")?,
        "--render",
        "--blender",
        stub.to_str().ok_or("utf8")?,
        "--assets-dir",
        assets.to_str().ok_or("utf8")?,
        "--output",
        glb.to_str().ok_or("utf8")?,
        "--render-log",
        log.to_str().ok_or("utf8")?,
    ])?;
    assert!(
        output.status.success(),
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(fs::read(&glb)?.starts_with(b"glTF"));
    assert!(fs::read_to_string(&log)?.contains("stub renderer"));
    assert_eq!(stdout_json(&output)?["ok"], true);
    Ok(())
}
