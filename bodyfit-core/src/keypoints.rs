//! Normalized landmark sets produced by pose and face detectors.

use std::{collections::BTreeMap, fmt};

use bodyfit_utils::Point;
use serde::{Deserialize, Serialize};

/// Named body landmarks, following the 33-point pose topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BodyLandmark {
    Nose,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    MouthLeft,
    MouthRight,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinky,
    RightPinky,
    LeftIndex,
    RightIndex,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

impl BodyLandmark {
    /// All landmarks in detector output order.
    pub const ALL: [BodyLandmark; 33] = [
        Self::Nose,
        Self::LeftEyeInner,
        Self::LeftEye,
        Self::LeftEyeOuter,
        Self::RightEyeInner,
        Self::RightEye,
        Self::RightEyeOuter,
        Self::LeftEar,
        Self::RightEar,
        Self::MouthLeft,
        Self::MouthRight,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftPinky,
        Self::RightPinky,
        Self::LeftIndex,
        Self::RightIndex,
        Self::LeftThumb,
        Self::RightThumb,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
        Self::LeftHeel,
        Self::RightHeel,
        Self::LeftFootIndex,
        Self::RightFootIndex,
    ];
}

impl fmt::Display for BodyLandmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Serialized names double as display names.
        match serde_json::to_value(self) {
            Ok(serde_json::Value::String(name)) => f.write_str(&name),
            _ => write!(f, "{self:?}"),
        }
    }
}

/// A single landmark in normalized image coordinates.
///
/// `x` and `y` are fractions of image width and height. `z` is relative depth
/// on the same scale as `x`, when the detector provides it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f64>,
}

impl Keypoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            z: None,
            visibility: None,
        }
    }

    pub const fn with_depth(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z: Some(z),
            visibility: None,
        }
    }

    /// Project into pixel space.
    pub fn to_pixel(&self, width: u32, height: u32) -> Point {
        Point::new(self.x * width as f64, self.y * height as f64)
    }

    /// Pixel distance to another keypoint, including depth when both carry it.
    pub fn pixel_distance(&self, other: &Keypoint, width: u32, height: u32) -> f64 {
        let w = width as f64;
        let h = height as f64;
        let dx = (other.x - self.x) * w;
        let dy = (other.y - self.y) * h;
        let dz = match (self.z, other.z) {
            (Some(a), Some(b)) => (b - a) * w,
            _ => 0.0,
        };
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BodyRepr {
    Named(BTreeMap<BodyLandmark, Keypoint>),
    Ordered(Vec<Keypoint>),
}

impl From<BodyRepr> for BodyKeypoints {
    fn from(repr: BodyRepr) -> Self {
        match repr {
            BodyRepr::Named(points) => Self { points },
            BodyRepr::Ordered(list) => Self {
                points: BodyLandmark::ALL.into_iter().zip(list).collect(),
            },
        }
    }
}

/// Body landmarks keyed by name. Accepts either an object keyed by landmark
/// name or an array in detector order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "BodyRepr")]
pub struct BodyKeypoints {
    points: BTreeMap<BodyLandmark, Keypoint>,
}

impl Serialize for BodyKeypoints {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.points.serialize(serializer)
    }
}

impl BodyKeypoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, landmark: BodyLandmark, point: Keypoint) -> Self {
        self.points.insert(landmark, point);
        self
    }

    pub fn insert(&mut self, landmark: BodyLandmark, point: Keypoint) {
        self.points.insert(landmark, point);
    }

    pub fn get(&self, landmark: BodyLandmark) -> Option<&Keypoint> {
        self.points.get(&landmark)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

// Untagged buffering loses integer map keys, so indices arrive as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum FaceRepr {
    Indexed(BTreeMap<String, Keypoint>),
    Ordered(Vec<Keypoint>),
}

impl From<FaceRepr> for FaceKeypoints {
    fn from(repr: FaceRepr) -> Self {
        match repr {
            FaceRepr::Indexed(points) => Self {
                points: points
                    .into_iter()
                    .filter_map(|(key, point)| key.trim().parse::<u16>().ok().map(|i| (i, point)))
                    .collect(),
            },
            FaceRepr::Ordered(list) => Self {
                points: (0u16..).zip(list).collect(),
            },
        }
    }
}

/// Face mesh landmarks keyed by mesh index. Sparse sets are allowed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "FaceRepr")]
pub struct FaceKeypoints {
    points: BTreeMap<u16, Keypoint>,
}

impl Serialize for FaceKeypoints {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.points.serialize(serializer)
    }
}

impl FaceKeypoints {
    /// Nose tip.
    pub const NOSE_TIP: u16 = 4;
    /// Outer edge of the face on the image-left side.
    pub const EDGE_LEFT: u16 = 234;
    /// Outer edge of the face on the image-right side.
    pub const EDGE_RIGHT: u16 = 454;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, index: u16, point: Keypoint) -> Self {
        self.points.insert(index, point);
        self
    }

    pub fn get(&self, index: u16) -> Option<&Keypoint> {
        self.points.get(&index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keypoint> {
        self.points.values()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Everything the detectors found for one photo.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectedKeypoints {
    pub body: Option<BodyKeypoints>,
    pub face: Option<FaceKeypoints>,
}
