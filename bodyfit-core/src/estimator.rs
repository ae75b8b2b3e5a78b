//! Photogrammetric estimation from normalized keypoints.
//!
//! The subject's known height fixes the meters-per-pixel scale: the vertical
//! extent from scalp (nose raised by a fraction of the image height) to the
//! mean ankle height maps to the reference height. Every other length is a
//! landmark-to-landmark pixel distance on that scale, corrected for camera
//! distance and tilt. Torso circumferences model the cross-section as an
//! ellipse whose depth is a fixed fraction of the measured width.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use bodyfit_utils::{Point, config::AppSettings, config::DepthRatios};
use log::{debug, warn};

use crate::analysis::{
    CameraEstimate, FaceBox, Joint, PoseAngles, Role, ViewGeometry,
};
use crate::classifier::assign_view;
use crate::keypoints::{BodyKeypoints, BodyLandmark, DetectedKeypoints, FaceKeypoints, Keypoint};
use crate::measurements::{AbsentReason, BodyPart, Extraction, MeasurementSet};

use BodyLandmark::*;

/// Person height estimated from a face box, as a multiple of its height.
const FACE_TO_BODY_HEIGHT: f64 = 2.8;
/// Head yaw in degrees per unit of yaw proxy.
const YAW_TO_DEGREES: f64 = 60.0;
/// Tilt beyond which the cosine correction is not applied.
const MAX_TILT_CORRECTION_DEG: f64 = 30.0;

/// Constants driving the estimator.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorConfig {
    pub vfov_deg: f64,
    pub default_distance_m: f64,
    pub depth_ratios: BTreeMap<Role, DepthRatios>,
    pub depth_nudge: f64,
    pub waist_to_hip_width: f64,
    pub foot_width_ratio: f64,
    pub ankle_heel_multiplier: f64,
    pub scalp_offset: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self::from(&AppSettings::default())
    }
}

impl From<&AppSettings> for EstimatorConfig {
    fn from(settings: &AppSettings) -> Self {
        let est = &settings.estimator;
        let depth_ratios = est
            .depth_ratios
            .iter()
            .filter_map(|(name, ratios)| match name.parse::<Role>() {
                Ok(role) => Some((role, *ratios)),
                Err(err) => {
                    warn!("ignoring depth ratios: {err}");
                    None
                }
            })
            .collect();
        Self {
            vfov_deg: settings.camera.vfov_deg,
            default_distance_m: settings.camera.default_distance_m,
            depth_ratios,
            depth_nudge: est.depth_nudge,
            waist_to_hip_width: est.waist_to_hip_width,
            foot_width_ratio: est.foot_width_ratio,
            ankle_heel_multiplier: est.ankle_heel_multiplier,
            scalp_offset: est.scalp_offset,
        }
    }
}

impl EstimatorConfig {
    fn ratios_for(&self, role: Role) -> DepthRatios {
        self.depth_ratios.get(&role).copied().unwrap_or_default()
    }
}

/// Camera assumptions used for perspective correction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraHint {
    pub distance_m: f64,
    pub roll_deg: f64,
}

/// Photo measurements plus the reason each missing one could not be taken.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMeasurements {
    pub set: MeasurementSet,
    pub absent: BTreeMap<BodyPart, AbsentReason>,
}

/// Shoulder line in pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShoulderLine {
    pub vector: Point,
    pub length_px: f64,
    /// Angle to horizontal in (-90, 90].
    pub roll_deg: f64,
}

/// Folds a direction angle onto (-90, 90] so that a line and its reverse agree.
pub fn normalize_roll(deg: f64) -> f64 {
    if deg > 90.0 {
        deg - 180.0
    } else if deg <= -90.0 {
        deg + 180.0
    } else {
        deg
    }
}

pub fn shoulder_line(body: &BodyKeypoints, width: u32, height: u32) -> Option<ShoulderLine> {
    let left = body.get(LeftShoulder)?.to_pixel(width, height);
    let right = body.get(RightShoulder)?.to_pixel(width, height);
    let vector = right - left;
    Some(ShoulderLine {
        vector,
        length_px: vector.hypot(),
        roll_deg: normalize_roll(vector.angle_deg()),
    })
}

/// Face box over all face points and the yaw proxy from the nose offset.
pub fn face_box_and_yaw(
    face: &FaceKeypoints,
    width: u32,
    height: u32,
) -> (Option<FaceBox>, Option<f64>) {
    let (w, h) = (width as f64, height as f64);
    let mut bounds: Option<(f64, f64, f64, f64)> = None;
    for p in face.iter() {
        let (x, y) = (p.x * w, p.y * h);
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x1, y1, x2, y2)) => (x1.min(x), y1.min(y), x2.max(x), y2.max(y)),
        });
    }
    let bbox = bounds.map(|(x1, y1, x2, y2)| FaceBox {
        x1: x1.max(0.0) as u32,
        y1: y1.max(0.0) as u32,
        x2: x2.min(w).max(0.0) as u32,
        y2: y2.min(h).max(0.0) as u32,
    });

    let yaw = match (
        face.get(FaceKeypoints::NOSE_TIP),
        face.get(FaceKeypoints::EDGE_LEFT),
        face.get(FaceKeypoints::EDGE_RIGHT),
    ) {
        (Some(nose), Some(left), Some(right)) => {
            let denom = (right.x - left.x).max(1e-6);
            Some((nose.x - 0.5 * (left.x + right.x)) / denom)
        }
        _ => None,
    };
    (bbox, yaw)
}

/// Subject height in pixels from the pose, else from the face box.
pub fn person_bbox_height_px(
    body: Option<&BodyKeypoints>,
    face_box: Option<FaceBox>,
    height: u32,
) -> Option<f64> {
    let from_pose = body.and_then(|body| {
        let top = [Nose, LeftShoulder, RightShoulder]
            .into_iter()
            .map(|lm| body.get(lm).map(|p| p.y))
            .collect::<Option<Vec<_>>>()?
            .into_iter()
            .fold(f64::INFINITY, f64::min);
        let bottom = [LeftAnkle, RightAnkle]
            .into_iter()
            .map(|lm| body.get(lm).map(|p| p.y))
            .collect::<Option<Vec<_>>>()?
            .into_iter()
            .fold(f64::NEG_INFINITY, f64::max);
        Some(((bottom - top) * height as f64).max(1.0))
    });
    from_pose.or_else(|| face_box.map(|b| b.height() as f64 * FACE_TO_BODY_HEIGHT))
}

/// Pinhole camera estimate for a fixed vertical field of view.
pub fn estimate_camera(
    image_height: u32,
    bbox_h_px: Option<f64>,
    height_m: f64,
    vfov_deg: f64,
) -> CameraEstimate {
    let f_pix = 0.5 * image_height as f64 / (0.5 * vfov_deg.to_radians()).tan();
    let bbox = bbox_h_px.filter(|b| *b > 0.0);
    CameraEstimate {
        fov_v_deg: vfov_deg,
        f_pix,
        distance_m: bbox.map(|b| height_m * f_pix / b),
        px_per_meter: bbox.map(|b| b / height_m),
    }
}

/// Combined distance and tilt correction factor.
pub fn perspective_factor(distance_m: f64, roll_deg: f64) -> f64 {
    let distance_factor = if distance_m < 1.5 {
        1.0 + (1.5 - distance_m) * 0.1
    } else if distance_m > 3.5 {
        1.0 - (distance_m - 3.5) * 0.05
    } else {
        1.0
    };
    let tilt = roll_deg.abs();
    let angle_factor = if tilt < MAX_TILT_CORRECTION_DEG {
        1.0 / tilt.to_radians().cos()
    } else {
        1.0
    };
    distance_factor * angle_factor
}

/// Ramanujan's approximation of an ellipse perimeter from its full width and depth.
pub fn ellipse_circumference(width: f64, depth: f64) -> f64 {
    let a = width / 2.0;
    let b = depth / 2.0;
    PI * (3.0 * (a + b) - ((3.0 * a + b) * (a + 3.0 * b)).sqrt())
}

/// Joint angles of the arms plus head yaw in degrees.
pub fn pose_angles(body: &BodyKeypoints, yaw: Option<f64>, width: u32, height: u32) -> PoseAngles {
    let px = |lm| body.get(lm).map(|p: &Keypoint| p.to_pixel(width, height));
    let elbow = |sh, el, wr| Some(px(el)?.angle_between(px(sh)?, px(wr)?));
    let abduction = |sh, el| {
        let v = px(el)? - px(sh)?;
        Some(v.x.atan2(-v.y).to_degrees())
    };

    let mut angles = PoseAngles::default();
    angles.set(Joint::LeftElbow, elbow(LeftShoulder, LeftElbow, LeftWrist));
    angles.set(Joint::RightElbow, elbow(RightShoulder, RightElbow, RightWrist));
    angles.set(Joint::LeftShoulderAbd, abduction(LeftShoulder, LeftElbow));
    angles.set(Joint::RightShoulderAbd, abduction(RightShoulder, RightElbow));
    angles.set(Joint::HeadYaw, yaw.map(|y| y * YAW_TO_DEGREES));
    angles
}

fn landmark(body: &BodyKeypoints, lm: BodyLandmark) -> Result<&Keypoint, AbsentReason> {
    body.get(lm)
        .ok_or(AbsentReason::MissingLandmark { landmark: lm })
}

fn finite_positive(value: f64) -> Extraction {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(AbsentReason::Degenerate)
    }
}

fn mean_abs_depth(a: &Keypoint, b: &Keypoint) -> f64 {
    ((a.z.unwrap_or(0.0) + b.z.unwrap_or(0.0)) / 2.0).abs()
}

/// Turns keypoints into view geometry and body measurements.
#[derive(Debug, Clone, Default)]
pub struct Estimator {
    config: EstimatorConfig,
}

impl Estimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Shoulder line, face box, yaw, role, camera and pose for one photo.
    pub fn geometry(
        &self,
        keypoints: &DetectedKeypoints,
        width: u32,
        height: u32,
        height_m: f64,
    ) -> ViewGeometry {
        let shoulders = keypoints
            .body
            .as_ref()
            .and_then(|body| shoulder_line(body, width, height));
        let (bbox_face, yaw) = keypoints
            .face
            .as_ref()
            .map(|face| face_box_and_yaw(face, width, height))
            .unwrap_or((None, None));
        let abs_yaw = yaw.map(f64::abs);
        let roll_deg = shoulders.map(|s| s.roll_deg);
        let bbox_h_px = person_bbox_height_px(keypoints.body.as_ref(), bbox_face, height);
        let shoulder_len_px = shoulders.map(|s| s.length_px);

        ViewGeometry {
            shoulder_len_px,
            shoulder_len_ratio: match shoulder_len_px {
                Some(len) if width > 0 => len / width as f64,
                _ => 0.0,
            },
            roll_deg,
            yaw,
            abs_yaw,
            role: assign_view(abs_yaw, roll_deg),
            bbox_face,
            bbox_h_px,
            camera: estimate_camera(height, bbox_h_px, height_m, self.config.vfov_deg),
            pose_angles: keypoints
                .body
                .as_ref()
                .map(|body| pose_angles(body, yaw, width, height))
                .unwrap_or_default(),
        }
    }

    /// Camera hint from an estimate, with configured fallbacks.
    pub fn camera_hint(&self, geometry: &ViewGeometry) -> CameraHint {
        CameraHint {
            distance_m: geometry
                .camera
                .distance_m
                .unwrap_or(self.config.default_distance_m),
            roll_deg: geometry.roll_deg.unwrap_or(0.0),
        }
    }

    /// Scalp-to-ankle extent in pixels.
    pub fn body_extent_px(&self, body: &BodyKeypoints, height: u32) -> Extraction {
        let h = height as f64;
        let nose = landmark(body, Nose)?;
        let left = landmark(body, LeftAnkle)?;
        let right = landmark(body, RightAnkle)?;
        let top = nose.y * h - self.config.scalp_offset * h;
        let bottom = (left.y + right.y) / 2.0 * h;
        let extent = bottom - top;
        if extent.is_finite() && extent >= 1.0 {
            Ok(extent)
        } else {
            Err(AbsentReason::NoBodyExtent)
        }
    }

    /// Extract every tracked measurement. Fails only when the body extent
    /// cannot be measured; individual measurements degrade to absent.
    pub fn measure(
        &self,
        body: &BodyKeypoints,
        width: u32,
        height: u32,
        height_m: f64,
        hint: CameraHint,
        role: Role,
    ) -> Result<RawMeasurements, AbsentReason> {
        let extent = self.body_extent_px(body, height)?;
        let meters_per_px = height_m / extent;
        let factor = perspective_factor(hint.distance_m, hint.roll_deg);
        let ratios = self.config.ratios_for(role);
        let nudge = self.config.depth_nudge;
        debug!(
            "measuring {role} view: extent {extent:.0}px, distance {:.2}m, tilt {:.1}°",
            hint.distance_m, hint.roll_deg
        );

        let linear = |a: BodyLandmark, b: BodyLandmark| -> Extraction {
            let px = landmark(body, a)?.pixel_distance(landmark(body, b)?, width, height);
            finite_positive(px * meters_per_px * factor)
        };
        let depth = |a: BodyLandmark, b: BodyLandmark| -> Result<f64, AbsentReason> {
            Ok(mean_abs_depth(landmark(body, a)?, landmark(body, b)?))
        };

        let shoulder = linear(LeftShoulder, RightShoulder);
        let chest = shoulder.clone().and_then(|width| {
            let ratio = ratios.chest + depth(LeftShoulder, RightShoulder)? * nudge;
            finite_positive(ellipse_circumference(width, width * ratio))
        });
        let hip_width = linear(LeftHip, RightHip);
        let waist = hip_width.clone().and_then(|hips| {
            let width = hips * self.config.waist_to_hip_width;
            let ratio = ratios.waist + depth(LeftHip, RightHip)? * nudge;
            finite_positive(ellipse_circumference(width, width * ratio))
        });
        let hips = hip_width.and_then(|width| {
            let ratio = ratios.hips + depth(LeftHip, RightHip)? * nudge;
            finite_positive(ellipse_circumference(width, width * ratio))
        });
        let inseam = linear(LeftHip, LeftAnkle);
        let arm = linear(LeftShoulder, LeftWrist);
        let foot_length = linear(LeftHeel, LeftFootIndex);
        let foot_width = match &foot_length {
            Ok(length) => finite_positive(length * self.config.foot_width_ratio),
            Err(_) => landmark(body, LeftAnkle)
                .and_then(|ankle| {
                    let heel = landmark(body, LeftHeel)?;
                    Ok(ankle.pixel_distance(heel, width, height))
                })
                .and_then(|px| {
                    finite_positive(px * meters_per_px * self.config.ankle_heel_multiplier)
                }),
        };

        let mut set = MeasurementSet::new();
        let mut absent = BTreeMap::new();
        for (part, extraction) in [
            (BodyPart::Shoulder, shoulder),
            (BodyPart::Chest, chest),
            (BodyPart::Waist, waist),
            (BodyPart::Hips, hips),
            (BodyPart::Inseam, inseam),
            (BodyPart::Arm, arm),
            (BodyPart::FootLength, foot_length),
            (BodyPart::FootWidth, foot_width),
        ] {
            match extraction {
                Ok(value) => set.set(part, Some(value)),
                Err(reason) => {
                    debug!("{part} not extracted: {reason}");
                    absent.insert(part, reason);
                }
            }
        }
        Ok(RawMeasurements { set, absent })
    }
}
