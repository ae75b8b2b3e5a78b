//! View classification and the photo quality gate.

use std::fmt;

use bodyfit_utils::config::QualitySettings;
use serde::{Serialize, Serializer};

use crate::analysis::{PhotoAnalysis, Role};

const FRONT_MAX_ABS_YAW: f64 = 0.15;
const FRONT_MAX_HORIZ_DEG: f64 = 20.0;
const SIDE_MIN_ABS_YAW: f64 = 0.40;
const SIDE_MIN_HORIZ_DEG: f64 = 45.0;

/// Classify the viewpoint from face yaw and shoulder-line angle.
///
/// `roll_deg` is the shoulder-line angle relative to horizontal. Either signal
/// missing yields [`Role::Unknown`].
pub fn assign_view(abs_yaw: Option<f64>, roll_deg: Option<f64>) -> Role {
    let (Some(abs_yaw), Some(roll)) = (abs_yaw, roll_deg) else {
        return Role::Unknown;
    };
    let horiz = roll.abs();
    if abs_yaw < FRONT_MAX_ABS_YAW && horiz < FRONT_MAX_HORIZ_DEG {
        Role::Front
    } else if abs_yaw > SIDE_MIN_ABS_YAW || horiz > SIDE_MIN_HORIZ_DEG {
        Role::Side
    } else {
        Role::Back
    }
}

/// Accept/reject thresholds, echoed back in responses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityThresholds {
    pub min_focus: f64,
    pub min_shoulder_ratio: f64,
    pub max_roll_deg: f64,
    pub front_max_abs_yaw: f64,
    pub side_min_abs_yaw: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self::from(&QualitySettings::default())
    }
}

impl From<&QualitySettings> for QualityThresholds {
    fn from(settings: &QualitySettings) -> Self {
        Self {
            min_focus: settings.min_focus,
            min_shoulder_ratio: settings.min_shoulder_ratio,
            max_roll_deg: settings.max_roll_deg,
            front_max_abs_yaw: settings.front_max_abs_yaw,
            side_min_abs_yaw: settings.side_min_abs_yaw,
        }
    }
}

/// A violated quality threshold.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectionReason {
    DecodeFailed,
    LowFocus { focus: f64, min: f64 },
    ShouldersNotVisible,
    CameraTilt { roll_deg: f64, max: f64 },
    NotFacingCamera,
    NotTurnedEnough,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DecodeFailed => f.write_str("photo could not be decoded"),
            Self::LowFocus { focus, min } => write!(f, "low focus ({focus:.1} < {min:.1})"),
            Self::ShouldersNotVisible => {
                f.write_str("shoulders not fully visible / subject too far")
            }
            Self::CameraTilt { roll_deg, max } => {
                write!(f, "camera tilt {roll_deg:.1}° > {max:.1}°")
            }
            Self::NotFacingCamera => f.write_str("not facing camera enough for front view"),
            Self::NotTurnedEnough => f.write_str("not turned enough for side view"),
        }
    }
}

impl Serialize for RejectionReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Applies [`QualityThresholds`] to analyses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityGate {
    pub thresholds: QualityThresholds,
    /// Reject undecodable photos outright instead of scoring their stub.
    pub reject_decode_errors: bool,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::from(&QualitySettings::default())
    }
}

impl From<&QualitySettings> for QualityGate {
    fn from(settings: &QualitySettings) -> Self {
        Self {
            thresholds: QualityThresholds::from(settings),
            reject_decode_errors: settings.reject_decode_errors,
        }
    }
}

impl QualityGate {
    /// Every violated threshold, in check order. Empty means accepted.
    ///
    /// Yaw checks only run when the caller labeled the photo front or side.
    pub fn evaluate(&self, analysis: &PhotoAnalysis, role_hint: Option<Role>) -> Vec<RejectionReason> {
        let thr = &self.thresholds;
        let mut reasons = Vec::new();

        if analysis.decode_error && self.reject_decode_errors {
            reasons.push(RejectionReason::DecodeFailed);
        }
        if analysis.focus < thr.min_focus {
            reasons.push(RejectionReason::LowFocus {
                focus: analysis.focus,
                min: thr.min_focus,
            });
        }
        if analysis.shoulder_ratio() < thr.min_shoulder_ratio {
            reasons.push(RejectionReason::ShouldersNotVisible);
        }
        let roll = analysis.geometry.roll_deg.unwrap_or(0.0).abs();
        if roll > thr.max_roll_deg {
            reasons.push(RejectionReason::CameraTilt {
                roll_deg: roll,
                max: thr.max_roll_deg,
            });
        }
        match role_hint {
            Some(Role::Front) if analysis.abs_yaw_or_default() > thr.front_max_abs_yaw => {
                reasons.push(RejectionReason::NotFacingCamera);
            }
            Some(Role::Side) if analysis.abs_yaw_or_default() < thr.side_min_abs_yaw => {
                reasons.push(RejectionReason::NotTurnedEnough);
            }
            _ => {}
        }
        reasons
    }

    pub fn accepts(&self, analysis: &PhotoAnalysis, role_hint: Option<Role>) -> bool {
        self.evaluate(analysis, role_hint).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sharp_front() -> PhotoAnalysis {
        let mut analysis = PhotoAnalysis::decode_failed(49.0);
        analysis.decode_error = false;
        analysis.focus = 1_000.0;
        analysis.geometry.shoulder_len_ratio = 0.4;
        analysis.geometry.roll_deg = Some(0.0);
        analysis.geometry.abs_yaw = Some(0.05);
        analysis.geometry.role = Role::Front;
        analysis
    }

    #[test]
    fn classification_follows_yaw_and_shoulder_angle() {
        assert_eq!(assign_view(Some(0.05), Some(3.0)), Role::Front);
        assert_eq!(assign_view(Some(0.5), Some(3.0)), Role::Side);
        assert_eq!(assign_view(Some(0.05), Some(-50.0)), Role::Side);
        assert_eq!(assign_view(Some(0.25), Some(10.0)), Role::Back);
        assert_eq!(assign_view(Some(0.05), Some(25.0)), Role::Back);
        assert_eq!(assign_view(None, Some(0.0)), Role::Unknown);
        assert_eq!(assign_view(Some(0.0), None), Role::Unknown);
    }

    #[test]
    fn sharp_level_photo_passes() {
        let gate = QualityGate::default();
        assert!(gate.accepts(&sharp_front(), Some(Role::Front)));
        assert!(gate.accepts(&sharp_front(), None));
    }

    #[test]
    fn every_violation_is_reported() {
        let mut analysis = sharp_front();
        analysis.focus = 50.0;
        analysis.geometry.shoulder_len_ratio = 0.1;
        analysis.geometry.roll_deg = Some(-12.5);
        analysis.geometry.abs_yaw = Some(0.3);

        let reasons = QualityGate::default().evaluate(&analysis, Some(Role::Front));
        let text: Vec<String> = reasons.iter().map(ToString::to_string).collect();
        assert_eq!(
            text,
            vec![
                "low focus (50.0 < 200.0)",
                "shoulders not fully visible / subject too far",
                "camera tilt 12.5° > 10.0°",
                "not facing camera enough for front view",
            ]
        );
    }

    #[test]
    fn yaw_checks_only_apply_with_hint() {
        let mut analysis = sharp_front();
        analysis.geometry.abs_yaw = Some(0.1);
        let gate = QualityGate::default();
        assert!(gate.accepts(&analysis, None));
        assert_eq!(
            gate.evaluate(&analysis, Some(Role::Side)),
            vec![RejectionReason::NotTurnedEnough]
        );
    }

    #[test]
    fn missing_face_fails_front_hint() {
        let mut analysis = sharp_front();
        analysis.geometry.abs_yaw = None;
        assert_eq!(
            QualityGate::default().evaluate(&analysis, Some(Role::Front)),
            vec![RejectionReason::NotFacingCamera]
        );
    }

    #[test]
    fn decode_failures_are_rejected_even_with_lenient_thresholds() {
        let gate = QualityGate {
            thresholds: QualityThresholds {
                min_focus: 0.0,
                min_shoulder_ratio: 0.0,
                ..QualityThresholds::default()
            },
            reject_decode_errors: true,
        };
        let stub = PhotoAnalysis::decode_failed(49.0);
        assert_eq!(gate.evaluate(&stub, None), vec![RejectionReason::DecodeFailed]);

        let lenient = QualityGate {
            reject_decode_errors: false,
            ..gate
        };
        assert!(lenient.accepts(&stub, None));
    }

    #[test]
    fn reasons_serialize_as_text() {
        let json = serde_json::to_value(vec![RejectionReason::ShouldersNotVisible]).expect("json");
        assert_eq!(json[0], "shoulders not fully visible / subject too far");
    }
}
