//! Calibration response schema.

use serde::Serialize;

use crate::analysis::{ByRole, PhotoAnalysis, PoseAngles, Role};
use crate::classifier::{QualityThresholds, RejectionReason};
use crate::error::CalibrationError;
use crate::l10n::Lang;
use crate::measurements::{BodyPart, MeasurementSet};

/// One photo's quality-gate outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcceptanceEntry {
    pub index: usize,
    pub role_pred: Role,
    pub reasons: Vec<RejectionReason>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tips: Vec<String>,
    pub analysis: PhotoAnalysis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleStatus {
    /// The chosen photo passed the quality gate.
    Ok,
    /// A photo was chosen but rejected.
    Retry,
    /// No candidate exists.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleReportEntry {
    pub status: RoleStatus,
    pub chosen_index: Option<usize>,
    /// Photos the caller filed under this role.
    pub provided_indices: Vec<usize>,
    /// The subset of `provided_indices` that was rejected.
    pub failed_indices: Vec<usize>,
    pub reasons: Vec<String>,
    pub tips: Vec<String>,
}

impl RoleReportEntry {
    pub fn missing() -> Self {
        Self {
            status: RoleStatus::Missing,
            chosen_index: None,
            provided_indices: Vec::new(),
            failed_indices: Vec::new(),
            reasons: Vec::new(),
            tips: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhotosTrimmed {
    pub received: usize,
    pub kept: usize,
}

/// Successful calibration output. Photo references are request indices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationResponse {
    pub ok: bool,
    pub lang: Lang,
    pub height_m: f64,
    pub foot_width_category: Option<String>,
    pub thresholds: QualityThresholds,
    pub photos_received: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photos_trimmed: Option<PhotosTrimmed>,
    pub accepted: Vec<AcceptanceEntry>,
    pub rejected: Vec<AcceptanceEntry>,
    pub chosen_by_role: ByRole<Option<usize>>,
    pub by_role_ranked: ByRole<Vec<usize>>,
    pub retake_tips: Vec<String>,
    pub role_report: ByRole<RoleReportEntry>,
    pub pose_hint: PoseAngles,
    pub chest: Option<f64>,
    pub waist: Option<f64>,
    pub hips: Option<f64>,
    pub shoulder: Option<f64>,
    pub inseam: Option<f64>,
    pub arm: Option<f64>,
    pub foot_length_m: Option<f64>,
    pub foot_width_m: Option<f64>,
}

impl CalibrationResponse {
    /// Copy final values into the flat response fields; non-positive or non-finite entries become null.
    pub fn set_measurements(&mut self, set: &MeasurementSet) {
        self.chest = set.positive(BodyPart::Chest);
        self.waist = set.positive(BodyPart::Waist);
        self.hips = set.positive(BodyPart::Hips);
        self.shoulder = set.positive(BodyPart::Shoulder);
        self.inseam = set.positive(BodyPart::Inseam);
        self.arm = set.positive(BodyPart::Arm);
        self.foot_length_m = set.positive(BodyPart::FootLength);
        self.foot_width_m = set.positive(BodyPart::FootWidth);
    }

    /// Final measurements as a set, for the render stage.
    pub fn measurements(&self) -> MeasurementSet {
        [
            (BodyPart::Chest, self.chest),
            (BodyPart::Waist, self.waist),
            (BodyPart::Hips, self.hips),
            (BodyPart::Shoulder, self.shoulder),
            (BodyPart::Inseam, self.inseam),
            (BodyPart::Arm, self.arm),
            (BodyPart::FootLength, self.foot_length_m),
            (BodyPart::FootWidth, self.foot_width_m),
        ]
        .into_iter()
        .collect()
    }

    pub fn is_accepted(&self, index: usize) -> bool {
        self.accepted.iter().any(|entry| entry.index == index)
    }
}

/// Structured failure returned instead of a response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureResponse {
    pub ok: bool,
    pub error: String,
    pub lang: Lang,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl FailureResponse {
    pub fn new(error: impl Into<String>, lang: Lang) -> Self {
        Self {
            ok: false,
            error: error.into(),
            lang,
            trace: None,
        }
    }

    pub fn from_error(err: &CalibrationError, lang: Lang) -> Self {
        Self::new(err.to_string(), lang)
    }

    /// Failure for an unexpected error, carrying its full cause chain.
    pub fn unexpected(err: &anyhow::Error, lang: Lang) -> Self {
        Self {
            trace: Some(format!("{err:?}")),
            ..Self::new(err.to_string(), lang)
        }
    }
}

/// Either outcome of a calibration request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CalibrationReply {
    Success(Box<CalibrationResponse>),
    Failure(FailureResponse),
}

impl CalibrationReply {
    pub fn is_ok(&self) -> bool {
        matches!(self, CalibrationReply::Success(_))
    }

    pub fn success(&self) -> Option<&CalibrationResponse> {
        match self {
            CalibrationReply::Success(response) => Some(response),
            CalibrationReply::Failure(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_serializes_without_trace_by_default() {
        let failure = FailureResponse::from_error(&CalibrationError::HeightMissing, Lang::Fr);
        let json = serde_json::to_value(CalibrationReply::Failure(failure)).expect("json");
        assert_eq!(
            json,
            serde_json::json!({"ok": false, "error": "height is required (cm or m)", "lang": "fr"})
        );
    }

    #[test]
    fn unexpected_failure_carries_trace() {
        let err = anyhow::anyhow!("disk full").context("writing response");
        let failure = FailureResponse::unexpected(&err, Lang::En);
        assert_eq!(failure.error, "writing response");
        assert!(failure.trace.as_deref().unwrap_or_default().contains("disk full"));
    }

    #[test]
    fn missing_role_entry_is_empty() {
        let json = serde_json::to_value(RoleReportEntry::missing()).expect("json");
        assert_eq!(json["status"], "missing");
        assert!(json["chosen_index"].is_null());
        assert_eq!(json["reasons"], serde_json::json!([]));
    }
}
