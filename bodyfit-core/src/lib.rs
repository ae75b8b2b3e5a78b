//! Photo quality gate, photogrammetric estimation and measurement calibration.
//!
//! A calibration request carries a reference height, optional user
//! measurements and a handful of phone photos. Each photo is decoded, scored
//! for sharpness, run through the keypoint adapter and turned into view
//! geometry and metric measurements. Photos are then partitioned by the
//! quality gate, ranked per role, and the best one supplies measurements that
//! are scale-corrected against the user's values, merged and validated.

/// Keypoint Adapter and detector traits.
pub mod adapter;
/// Per-photo analysis records and role types.
pub mod analysis;
/// View classification and the quality gate.
pub mod classifier;
/// Request-level errors.
pub mod error;
/// Keypoints to geometry and measurements.
pub mod estimator;
/// Body and face keypoint model.
pub mod keypoints;
/// Localized retake tips.
pub mod l10n;
/// Body parts and measurement sets.
pub mod measurements;
/// Merging, validation and per-role selection.
pub mod merge;
/// The calibration pipeline.
pub mod orchestrator;
/// External renderer boundary.
pub mod render;
/// Request schema.
pub mod request;
/// Response schema.
pub mod response;
/// Scale correction against user measurements.
pub mod scale;

pub use adapter::{
    AdapterSession, FaceDetector, KeypointAdapter, NoKeypoints, PhotoFrame, PoseDetector,
    PrecomputedKeypoints,
};
pub use analysis::{ByRole, CameraEstimate, FaceBox, PhotoAnalysis, PoseAngles, Role, ViewGeometry};
pub use classifier::{QualityGate, QualityThresholds, RejectionReason, assign_view};
pub use error::CalibrationError;
pub use estimator::{CameraHint, Estimator, EstimatorConfig};
pub use keypoints::{BodyKeypoints, BodyLandmark, DetectedKeypoints, FaceKeypoints, Keypoint};
pub use l10n::{Lang, TipKind, tips_for_rejection};
pub use measurements::{AbsentReason, BodyPart, Extraction, MeasurementSet};
pub use merge::{
    Candidate, PlausibilityTable, best_for_measurements, choose_roles, merge_with_user,
    rank_by_role,
};
pub use orchestrator::{CalibrationConfig, Calibrator};
pub use render::{
    PoseMode, QaFailure, RenderConfig, RenderError, RenderOptions, RenderOutput, Renderer,
};
pub use request::{CalibrationRequest, PhotoSelection, PhotoSlot};
pub use response::{
    AcceptanceEntry, CalibrationReply, CalibrationResponse, FailureResponse, RoleReportEntry,
    RoleStatus,
};
pub use scale::{ScaleConfig, ScaleEstimate, estimate_scale, weighted_median};

/// Returns the crate version for diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
