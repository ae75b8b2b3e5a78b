//! Per-photo analysis records.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::measurements::{AbsentReason, BodyPart, MeasurementSet};
use crate::scale::ScaleEstimate;

/// |yaw| assumed when no face was found; larger than any real estimate.
pub const ABSENT_ABS_YAW: f64 = 9.0;

/// Camera viewpoint a photo represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Front,
    Side,
    Back,
    Unknown,
}

impl Role {
    /// Roles that photos are selected for.
    pub const SELECTABLE: [Role; 3] = [Role::Front, Role::Side, Role::Back];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Front => "front",
            Role::Side => "side",
            Role::Back => "back",
            Role::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "front" => Ok(Role::Front),
            "side" => Ok(Role::Side),
            "back" => Ok(Role::Back),
            "unknown" => Ok(Role::Unknown),
            other => Err(format!(
                "invalid role '{other}'; expected 'front', 'side', 'back' or 'unknown'"
            )),
        }
    }
}

/// One value per selectable role.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ByRole<T> {
    pub front: T,
    pub side: T,
    pub back: T,
}

impl<T> ByRole<T> {
    pub fn from_fn(mut f: impl FnMut(Role) -> T) -> Self {
        Self {
            front: f(Role::Front),
            side: f(Role::Side),
            back: f(Role::Back),
        }
    }

    /// `None` for [`Role::Unknown`].
    pub fn get(&self, role: Role) -> Option<&T> {
        match role {
            Role::Front => Some(&self.front),
            Role::Side => Some(&self.side),
            Role::Back => Some(&self.back),
            Role::Unknown => None,
        }
    }

    pub fn get_mut(&mut self, role: Role) -> Option<&mut T> {
        match role {
            Role::Front => Some(&mut self.front),
            Role::Side => Some(&mut self.side),
            Role::Back => Some(&mut self.back),
            Role::Unknown => None,
        }
    }

    /// Iterate in front, side, back order.
    pub fn iter(&self) -> impl Iterator<Item = (Role, &T)> {
        [
            (Role::Front, &self.front),
            (Role::Side, &self.side),
            (Role::Back, &self.back),
        ]
        .into_iter()
    }
}

/// Face bounding box in pixels, clamped to the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FaceBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl FaceBox {
    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }
}

/// Pinhole estimate of the camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraEstimate {
    pub fov_v_deg: f64,
    pub f_pix: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub px_per_meter: Option<f64>,
}

/// Joints reported in pose hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    LeftElbow,
    RightElbow,
    LeftShoulderAbd,
    RightShoulderAbd,
    HeadYaw,
}

/// Relative joint angles in degrees. Empty when no body was detected.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PoseAngles {
    angles: BTreeMap<Joint, Option<f64>>,
}

impl PoseAngles {
    pub fn set(&mut self, joint: Joint, degrees: Option<f64>) {
        self.angles.insert(joint, degrees);
    }

    pub fn get(&self, joint: Joint) -> Option<f64> {
        self.angles.get(&joint).copied().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.angles.len()
    }
}

/// View geometry derived from keypoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewGeometry {
    pub shoulder_len_px: Option<f64>,
    /// Shoulder length over image width; `0.0` when shoulders are missing.
    pub shoulder_len_ratio: f64,
    /// Shoulder-line angle to horizontal, in (-90, 90].
    pub roll_deg: Option<f64>,
    pub yaw: Option<f64>,
    pub abs_yaw: Option<f64>,
    pub role: Role,
    pub bbox_face: Option<FaceBox>,
    pub bbox_h_px: Option<f64>,
    pub camera: CameraEstimate,
    pub pose_angles: PoseAngles,
}

/// Photo-derived measurements and their calibration trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoMeasurements {
    /// As extracted from landmarks.
    pub raw: MeasurementSet,
    /// After the global scale correction.
    pub scaled: MeasurementSet,
    /// User values layered over `scaled`, then validated.
    pub merged: MeasurementSet,
    pub scale: ScaleEstimate,
    /// Why each absent raw measurement could not be extracted.
    pub absent: BTreeMap<BodyPart, AbsentReason>,
}

/// Everything learned about one input photo.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoAnalysis {
    pub decode_error: bool,
    pub focus: f64,
    pub image_w: u32,
    pub image_h: u32,
    #[serde(flatten)]
    pub geometry: ViewGeometry,
    pub measurements_available: bool,
    pub measurements: Option<PhotoMeasurements>,
}

impl PhotoAnalysis {
    /// Stub for a photo whose bytes could not be decoded.
    pub fn decode_failed(vfov_deg: f64) -> Self {
        Self {
            decode_error: true,
            focus: 0.0,
            image_w: 0,
            image_h: 0,
            geometry: ViewGeometry {
                shoulder_len_px: None,
                shoulder_len_ratio: 0.0,
                roll_deg: None,
                yaw: None,
                abs_yaw: None,
                role: Role::Unknown,
                bbox_face: None,
                bbox_h_px: None,
                camera: CameraEstimate {
                    fov_v_deg: vfov_deg,
                    f_pix: 0.0,
                    distance_m: None,
                    px_per_meter: None,
                },
                pose_angles: PoseAngles::default(),
            },
            measurements_available: false,
            measurements: None,
        }
    }

    pub fn role(&self) -> Role {
        self.geometry.role
    }

    pub fn shoulder_ratio(&self) -> f64 {
        self.geometry.shoulder_len_ratio
    }

    /// |yaw|, or [`ABSENT_ABS_YAW`] when no face was found.
    pub fn abs_yaw_or_default(&self) -> f64 {
        self.geometry.abs_yaw.unwrap_or(ABSENT_ABS_YAW)
    }

    pub fn distance_m(&self) -> Option<f64> {
        self.geometry.camera.distance_m
    }

    /// Sharpness weighted by framing; used to pick the measurement source.
    pub fn measurement_score(&self) -> f64 {
        self.focus * self.shoulder_ratio()
    }

    /// Sharpness with a framing bonus; used for per-role ranking.
    pub fn ranking_score(&self) -> f64 {
        self.focus * (1.0 + 0.4 * self.shoulder_ratio())
    }

    /// Scale-corrected measurements, if any were extracted.
    pub fn scaled_measurements(&self) -> Option<&MeasurementSet> {
        self.measurements.as_ref().map(|m| &m.scaled)
    }
}
