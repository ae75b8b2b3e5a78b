//! Body-part measurement sets and per-measurement extraction results.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keypoints::BodyLandmark;

/// Body features tracked through calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyPart {
    Height,
    Chest,
    Waist,
    Hips,
    Shoulder,
    Inseam,
    Arm,
    FootLength,
    FootWidth,
}

impl BodyPart {
    /// Features present in every final measurement set.
    pub const TRACKED: [BodyPart; 8] = [
        Self::Chest,
        Self::Waist,
        Self::Hips,
        Self::Shoulder,
        Self::Inseam,
        Self::Arm,
        Self::FootLength,
        Self::FootWidth,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Height => "height",
            Self::Chest => "chest",
            Self::Waist => "waist",
            Self::Hips => "hips",
            Self::Shoulder => "shoulder",
            Self::Inseam => "inseam",
            Self::Arm => "arm",
            Self::FootLength => "foot_length",
            Self::FootWidth => "foot_width",
        }
    }
}

impl fmt::Display for BodyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BodyPart {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        [Self::Height]
            .into_iter()
            .chain(Self::TRACKED)
            .find(|part| part.as_str() == normalized)
            .ok_or_else(|| format!("unknown body part '{s}'"))
    }
}

/// Why a single measurement could not be extracted.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbsentReason {
    #[error("landmark {landmark} not detected")]
    MissingLandmark { landmark: BodyLandmark },
    #[error("body extent in the image is too small")]
    NoBodyExtent,
    #[error("measurement is not a finite positive value")]
    Degenerate,
}

/// Outcome of extracting one measurement.
pub type Extraction = Result<f64, AbsentReason>;

/// Mapping from body part to an optional length in meters.
///
/// Every tracked part is always present as a key, so serialized sets list
/// absent values as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MeasurementSet {
    values: BTreeMap<BodyPart, Option<f64>>,
}

impl Default for MeasurementSet {
    fn default() -> Self {
        Self {
            values: BodyPart::TRACKED.into_iter().map(|p| (p, None)).collect(),
        }
    }
}

impl MeasurementSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, part: BodyPart, value: f64) -> Self {
        self.set(part, Some(value));
        self
    }

    pub fn set(&mut self, part: BodyPart, value: Option<f64>) {
        self.values.insert(part, value);
    }

    pub fn get(&self, part: BodyPart) -> Option<f64> {
        self.values.get(&part).copied().flatten()
    }

    /// Value only when it is finite and strictly positive.
    pub fn positive(&self, part: BodyPart) -> Option<f64> {
        self.get(part).filter(|v| v.is_finite() && *v > 0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BodyPart, Option<f64>)> + '_ {
        self.values.iter().map(|(part, value)| (*part, *value))
    }

    /// Number of positive values.
    pub fn present_count(&self) -> usize {
        self.values
            .keys()
            .filter(|part| self.positive(**part).is_some())
            .count()
    }

    /// Multiply every positive value by `scale`; other entries are kept as-is.
    pub fn scaled(&self, scale: f64) -> MeasurementSet {
        let values = self
            .values
            .iter()
            .map(|(part, value)| {
                let scaled = match value {
                    Some(v) if *v > 0.0 => Some(v * scale),
                    other => *other,
                };
                (*part, scaled)
            })
            .collect();
        Self { values }
    }
}

impl FromIterator<(BodyPart, Option<f64>)> for MeasurementSet {
    fn from_iter<I: IntoIterator<Item = (BodyPart, Option<f64>)>>(iter: I) -> Self {
        let mut set = Self::default();
        for (part, value) in iter {
            set.set(part, value);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_serializes_every_tracked_part_as_null() {
        let json = serde_json::to_value(MeasurementSet::new()).expect("serialize");
        let obj = json.as_object().expect("object");
        assert_eq!(obj.len(), 8);
        assert!(obj["foot_width"].is_null());
    }

    #[test]
    fn scaling_skips_absent_and_non_positive_values() {
        let set = MeasurementSet::new()
            .with(BodyPart::Chest, 1.0)
            .with(BodyPart::Waist, 0.0);
        let scaled = set.scaled(0.9);
        assert_eq!(scaled.get(BodyPart::Chest), Some(0.9));
        assert_eq!(scaled.get(BodyPart::Waist), Some(0.0));
        assert_eq!(scaled.get(BodyPart::Hips), None);
        assert_eq!(scaled.positive(BodyPart::Waist), None);
    }

    #[test]
    fn body_part_parses_snake_case_names() {
        assert_eq!("foot_length".parse::<BodyPart>(), Ok(BodyPart::FootLength));
        assert_eq!(" Height ".parse::<BodyPart>(), Ok(BodyPart::Height));
        assert!("neck".parse::<BodyPart>().is_err());
    }
}
