//! Stage timing for the calibration pipeline.
//!
//! Each pipeline [`Stage`] can be wrapped in a [`TimingGuard`]. On drop the
//! guard logs one record under the `bodyfit::telemetry` target, tagged with
//! the photo index or item count it was given. Records are written only when
//! telemetry is switched on through [`configure`], the stage's level passes the
//! configured threshold and the logger accepts it.

use std::{
    fmt,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::{Duration, Instant},
};

use log::{Level, LevelFilter, log, log_enabled};

/// Log target used for all timing records.
pub const TELEMETRY_TARGET: &str = "bodyfit::telemetry";

static TELEMETRY_ENABLED: AtomicBool = AtomicBool::new(false);
static TELEMETRY_LEVEL: AtomicUsize = AtomicUsize::new(LevelFilter::Off as usize);

/// Timed steps of a calibration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Whole request, from height validation to final measurements.
    Calibrate,
    /// Decode, score and measure one photo.
    AnalyzePhoto,
    /// Pose and face landmark detection on one photo.
    DetectKeypoints,
    /// Quality gate over every analyzed photo.
    QualityPartition,
    /// User merge and plausibility validation.
    Merge,
    /// External renderer run, staging included.
    Render,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Calibrate => "calibrate",
            Self::AnalyzePhoto => "analyze_photo",
            Self::DetectKeypoints => "detect_keypoints",
            Self::QualityPartition => "quality_partition",
            Self::Merge => "merge",
            Self::Render => "render",
        }
    }

    /// Level the stage reports at. Renders take seconds, the rest milliseconds.
    pub fn level(self) -> Level {
        match self {
            Self::Render => Level::Info,
            Self::Calibrate => Level::Debug,
            _ => Level::Trace,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logs how long a stage took when dropped.
#[derive(Debug)]
pub struct TimingGuard {
    stage: Stage,
    photo: Option<usize>,
    items: Option<usize>,
    start: Instant,
    active: bool,
}

impl TimingGuard {
    /// Tag the record with the request index of the photo being processed.
    pub fn for_photo(mut self, index: usize) -> Self {
        self.photo = Some(index);
        self
    }

    /// Record how many items (photos, roles) the stage handled.
    pub fn set_items(&mut self, count: usize) {
        self.items = Some(count);
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Returns `true` when the guard will emit a record on drop.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the clock without logging and return the elapsed duration.
    pub fn finish(mut self) -> Duration {
        self.active = false;
        self.start.elapsed()
    }

    fn record(&self) -> String {
        let mut line = format!("stage={} elapsed={:.2?}", self.stage, self.start.elapsed());
        if let Some(photo) = self.photo {
            line.push_str(&format!(" photo={photo}"));
        }
        if let Some(items) = self.items {
            line.push_str(&format!(" items={items}"));
        }
        line
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if self.active {
            log!(target: TELEMETRY_TARGET, self.stage.level(), "{}", self.record());
        }
    }
}

/// Start timing `stage`.
pub fn timing_guard(stage: Stage) -> TimingGuard {
    timing_guard_if(stage, true)
}

/// Start timing `stage` unless the caller's own switch is off.
pub fn timing_guard_if(stage: Stage, enabled: bool) -> TimingGuard {
    let level = stage.level();
    let active =
        enabled && telemetry_allows(level) && log_enabled!(target: TELEMETRY_TARGET, level);
    TimingGuard {
        stage,
        photo: None,
        items: None,
        start: Instant::now(),
        active,
    }
}

/// Configure the global telemetry switch and maximum level.
pub fn configure(enabled: bool, level: LevelFilter) {
    TELEMETRY_ENABLED.store(enabled, Ordering::Relaxed);
    TELEMETRY_LEVEL.store(level as usize, Ordering::Relaxed);
}

pub fn telemetry_enabled() -> bool {
    TELEMETRY_ENABLED.load(Ordering::Relaxed)
}

/// Maximum level that telemetry reports at.
pub fn telemetry_level() -> LevelFilter {
    LevelFilter::iter()
        .nth(TELEMETRY_LEVEL.load(Ordering::Relaxed))
        .unwrap_or(LevelFilter::Off)
}

/// `true` when telemetry is on and `level` is within the configured threshold.
pub fn telemetry_allows(level: Level) -> bool {
    telemetry_enabled() && level <= telemetry_level()
}
