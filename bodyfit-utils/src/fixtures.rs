use anyhow::{Context, Result};
use image::DynamicImage;
use serde::de::DeserializeOwned;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

const FIXTURE_ENV: &str = "BODYFIT_FIXTURE_ROOT";

/// Resolve the root directory that stores project fixtures.
///
/// `BODYFIT_FIXTURE_ROOT` wins when set; otherwise the first `fixtures`
/// directory found walking up from this crate's manifest directory.
pub fn fixtures_dir() -> Result<PathBuf> {
    if let Ok(value) = env::var(FIXTURE_ENV) {
        return Ok(PathBuf::from(value));
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .ancestors()
        .map(|ancestor| ancestor.join("fixtures"))
        .find(|candidate| candidate.is_dir())
        .with_context(|| {
            format!(
                "fixtures directory not found starting from {}",
                manifest_dir.display()
            )
        })
}

/// Resolve a path inside the fixture folder, failing if it does not exist.
pub fn fixture_path<P: AsRef<Path>>(relative: P) -> Result<PathBuf> {
    let relative = relative.as_ref();
    let root = fixtures_dir()?;
    let full = root.join(relative);
    anyhow::ensure!(
        full.exists(),
        "fixture {} does not exist under {}",
        relative.display(),
        root.display()
    );
    Ok(full)
}

/// Load a fixture image.
pub fn load_fixture_image<P: AsRef<Path>>(relative: P) -> Result<DynamicImage> {
    let path = fixture_path(relative)?;
    image::open(&path).with_context(|| format!("failed to open fixture image {}", path.display()))
}

/// Load fixture contents as bytes.
pub fn load_fixture_bytes<P: AsRef<Path>>(relative: P) -> Result<Vec<u8>> {
    let path = fixture_path(relative)?;
    fs::read(&path).with_context(|| format!("failed to read fixture {}", path.display()))
}

/// Load fixture JSON into a strongly-typed structure.
pub fn load_fixture_json<P, T>(relative: P) -> Result<T>
where
    P: AsRef<Path>,
    T: DeserializeOwned,
{
    let path = fixture_path(relative)?;
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("failed to read JSON fixture {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse JSON fixture {}", path.display()))
}
