//! Calibration request schema and boundary normalization.

use bodyfit_utils::config::PhotoLimits;
use log::{info, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::analysis::Role;
use crate::error::CalibrationError;
use crate::l10n::Lang;
use crate::measurements::{BodyPart, MeasurementSet};

pub const MIN_HEIGHT_M: f64 = 0.3;
pub const MAX_HEIGHT_M: f64 = 2.6;

/// Values above this are read as centimeters.
const CM_THRESHOLD: f64 = 3.0;

/// A number that may arrive as JSON number or text with a decimal comma.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LooseNumber {
    Number(f64),
    Text(String),
    Other(Value),
}

impl LooseNumber {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            LooseNumber::Number(v) => Some(*v),
            LooseNumber::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    None
                } else {
                    text.replace(',', ".").parse().ok()
                }
            }
            LooseNumber::Other(_) => None,
        }
    }

    /// The value in meters, reading anything above 3.0 as centimeters.
    pub fn as_meters(&self) -> Option<f64> {
        self.as_f64().map(to_meters)
    }
}

pub fn to_meters(value: f64) -> f64 {
    if value <= CM_THRESHOLD {
        value
    } else {
        value / 100.0
    }
}

fn meters(value: &Option<LooseNumber>) -> Option<f64> {
    value.as_ref().and_then(LooseNumber::as_meters)
}

/// First value that is present and non-zero.
fn either(primary: Option<f64>, fallback: Option<f64>) -> Option<f64> {
    primary.filter(|v| *v != 0.0).or(fallback)
}

/// Incoming calibration request. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CalibrationRequest {
    pub height: Option<LooseNumber>,
    pub chest: Option<LooseNumber>,
    pub waist: Option<LooseNumber>,
    pub hips: Option<LooseNumber>,
    pub shoulder: Option<LooseNumber>,
    pub inseam: Option<LooseNumber>,
    pub arm: Option<LooseNumber>,
    pub foot_length: Option<LooseNumber>,
    #[serde(rename = "footLength")]
    pub foot_length_alt: Option<LooseNumber>,
    pub foot_width: Option<LooseNumber>,
    #[serde(rename = "footWidth")]
    pub foot_width_alt: Option<LooseNumber>,
    pub foot_width_category: Option<String>,
    #[serde(rename = "footWidthCategory")]
    pub foot_width_category_alt: Option<String>,

    pub lang: Option<String>,
    pub language: Option<String>,
    pub locale: Option<String>,
    pub accept_language: Option<String>,

    /// `{unordered: [..]}` or `{front, side, back}`; validated by [`Self::photo_slots`].
    pub photos: Option<Value>,

    pub required_roles: Option<Vec<String>>,
    #[serde(rename = "allowPartial")]
    pub allow_partial: Option<bool>,
    #[serde(rename = "texRes")]
    pub tex_res: Option<Value>,
    pub preset: Option<String>,
    pub gender_hint: Option<String>,
    #[serde(rename = "poseMode")]
    pub pose_mode: Option<String>,
    #[serde(rename = "highDetail")]
    pub high_detail: Option<bool>,
}

/// One submitted photo, numbered in submission order.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoSlot {
    pub index: usize,
    /// Base64 payload, possibly a data URI.
    pub data: String,
    /// Role the caller filed this photo under; `None` for unordered pools.
    pub label: Option<Role>,
}

/// Photos kept for analysis after the total cap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhotoSelection {
    pub slots: Vec<PhotoSlot>,
    pub received: usize,
    /// `Some(received)` when the cap dropped photos.
    pub trimmed: Option<usize>,
}

impl PhotoSelection {
    /// Request indices the caller filed under `role`.
    pub fn provided_indices(&self, role: Role) -> Vec<usize> {
        self.slots
            .iter()
            .filter(|slot| slot.label == Some(role))
            .map(|slot| slot.index)
            .collect()
    }
}

impl CalibrationRequest {
    pub fn from_json_str(json: &str) -> Result<Self, CalibrationError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_value(value: Value) -> Result<Self, CalibrationError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Validated reference height in meters.
    pub fn height_m(&self) -> Result<f64, CalibrationError> {
        let height = meters(&self.height).ok_or(CalibrationError::HeightMissing)?;
        if height.is_finite() && (MIN_HEIGHT_M..=MAX_HEIGHT_M).contains(&height) {
            Ok(height)
        } else {
            Err(CalibrationError::HeightUnrealistic(height))
        }
    }

    /// User-supplied measurements in meters, as given.
    pub fn user_measurements(&self) -> MeasurementSet {
        let mut set = MeasurementSet::new();
        set.set(BodyPart::Chest, meters(&self.chest));
        set.set(BodyPart::Waist, meters(&self.waist));
        set.set(BodyPart::Hips, meters(&self.hips));
        set.set(BodyPart::Shoulder, meters(&self.shoulder));
        set.set(BodyPart::Inseam, meters(&self.inseam));
        set.set(BodyPart::Arm, meters(&self.arm));
        set.set(
            BodyPart::FootLength,
            either(meters(&self.foot_length), meters(&self.foot_length_alt)),
        );
        set.set(
            BodyPart::FootWidth,
            either(meters(&self.foot_width), meters(&self.foot_width_alt)),
        );
        set
    }

    pub fn foot_width_category(&self) -> Option<String> {
        [&self.foot_width_category, &self.foot_width_category_alt]
            .into_iter()
            .flatten()
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
            .map(str::to_string)
    }

    pub fn lang(&self) -> Lang {
        let tag = [&self.lang, &self.language, &self.locale, &self.accept_language]
            .into_iter()
            .flatten()
            .find(|value| !value.is_empty());
        Lang::resolve(tag.map(String::as_str))
    }

    /// Flatten the `photos` field into numbered slots, applying the caps.
    ///
    /// A non-empty `unordered` list takes precedence over labeled entries.
    /// Labeled entries may be a single string or a best-first list truncated
    /// to `max_per_role`. Non-string and empty entries are skipped.
    pub fn photo_slots(&self, limits: &PhotoLimits) -> Result<PhotoSelection, CalibrationError> {
        let map = match &self.photos {
            None | Some(Value::Null) => return Ok(PhotoSelection::default()),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(CalibrationError::MalformedPhotos),
        };

        let mut entries: Vec<(String, Option<Role>)> = Vec::new();
        match map.get("unordered") {
            Some(Value::Array(items)) if !items.is_empty() => {
                entries.extend(strings(items).map(|data| (data, None)));
            }
            _ => {
                for role in Role::SELECTABLE {
                    match map.get(role.as_str()) {
                        Some(Value::String(data)) if !data.is_empty() => {
                            entries.push((data.clone(), Some(role)));
                        }
                        Some(Value::Array(items)) => entries.extend(
                            strings(items)
                                .take(limits.max_per_role)
                                .map(|data| (data, Some(role))),
                        ),
                        _ => {}
                    }
                }
            }
        }

        let received = entries.len();
        let mut trimmed = None;
        if received > limits.max_total {
            if limits.strict_cap {
                return Err(CalibrationError::TooManyPhotos {
                    count: received,
                    max: limits.max_total,
                });
            }
            warn!(
                "received {received} photos; keeping the first {}",
                limits.max_total
            );
            entries.truncate(limits.max_total);
            trimmed = Some(received);
        }
        if !entries.is_empty() {
            info!("analyzing {} photo(s)", entries.len());
        }

        let slots = entries
            .into_iter()
            .enumerate()
            .map(|(index, (data, label))| PhotoSlot { index, data, label })
            .collect();
        Ok(PhotoSelection {
            slots,
            received,
            trimmed,
        })
    }
}

fn strings(items: &[Value]) -> impl Iterator<Item = String> + '_ {
    items
        .iter()
        .filter_map(Value::as_str)
        .filter(|data| !data.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: Value) -> CalibrationRequest {
        CalibrationRequest::from_value(value).expect("request")
    }

    #[test]
    fn height_accepts_centimeters_meters_and_decimal_commas() {
        assert_eq!(request(json!({"height": 170})).height_m().ok(), Some(1.70));
        assert_eq!(request(json!({"height": "1,82"})).height_m().ok(), Some(1.82));
        assert_eq!(request(json!({"height": 1.5})).height_m().ok(), Some(1.5));
    }

    #[test]
    fn height_failures_are_structured() {
        assert!(matches!(
            request(json!({})).height_m(),
            Err(CalibrationError::HeightMissing)
        ));
        assert!(matches!(
            request(json!({"height": ""})).height_m(),
            Err(CalibrationError::HeightMissing)
        ));
        assert!(matches!(
            request(json!({"height": "tall"})).height_m(),
            Err(CalibrationError::HeightMissing)
        ));
        let err = request(json!({"height": -5})).height_m().expect_err("negative");
        assert!(err.to_string().contains("unrealistic height"));
        assert!(request(json!({"height": 400})).height_m().is_err());
    }

    #[test]
    fn user_measurements_convert_and_alias() {
        let req = request(json!({
            "height": 170,
            "waist": "80",
            "chest": 0.95,
            "footLength": 26,
            "foot_width": 0,
            "footWidth": "9,5",
        }));
        let set = req.user_measurements();
        assert_eq!(set.get(BodyPart::Waist), Some(0.80));
        assert_eq!(set.get(BodyPart::Chest), Some(0.95));
        assert_eq!(set.get(BodyPart::FootLength), Some(0.26));
        assert_eq!(set.get(BodyPart::FootWidth), Some(0.095));
        assert_eq!(set.get(BodyPart::Hips), None);
    }

    #[test]
    fn language_and_category_aliases() {
        let req = request(json!({
            "lang": "",
            "locale": "es-MX,es;q=0.9",
            "footWidthCategory": "  wide ",
        }));
        assert_eq!(req.lang(), Lang::Es);
        assert_eq!(req.foot_width_category().as_deref(), Some("wide"));
        assert_eq!(request(json!({})).foot_width_category(), None);
    }

    #[test]
    fn labeled_photos_keep_roles_and_rank_limits() {
        let req = request(json!({
            "photos": {"front": ["a", "b", "c"], "side": "d", "back": ""}
        }));
        let sel = req.photo_slots(&PhotoLimits::default()).expect("slots");
        let labels: Vec<Option<Role>> = sel.slots.iter().map(|s| s.label).collect();
        assert_eq!(labels, vec![Some(Role::Front), Some(Role::Front), Some(Role::Side)]);
        assert_eq!(sel.provided_indices(Role::Front), vec![0, 1]);
        assert_eq!(sel.provided_indices(Role::Side), vec![2]);
        assert_eq!(sel.trimmed, None);
    }

    #[test]
    fn unordered_pool_wins_and_is_capped() {
        let pool: Vec<String> = (0..12).map(|i| format!("photo{i}")).collect();
        let req = request(json!({"photos": {"unordered": pool, "front": "x"}}));
        let sel = req.photo_slots(&PhotoLimits::default()).expect("slots");
        assert_eq!(sel.slots.len(), 10);
        assert_eq!(sel.received, 12);
        assert_eq!(sel.trimmed, Some(12));
        assert!(sel.slots.iter().all(|s| s.label.is_none()));
        assert_eq!(sel.slots[9].data, "photo9");
    }

    #[test]
    fn strict_cap_rejects_oversized_requests() {
        let pool: Vec<String> = (0..11).map(|i| format!("p{i}")).collect();
        let req = request(json!({"photos": {"unordered": pool}}));
        let limits = PhotoLimits {
            strict_cap: true,
            ..PhotoLimits::default()
        };
        assert!(matches!(
            req.photo_slots(&limits),
            Err(CalibrationError::TooManyPhotos { count: 11, max: 10 })
        ));
    }

    #[test]
    fn photos_must_be_an_object() {
        let req = request(json!({"photos": ["a", "b"]}));
        assert!(matches!(
            req.photo_slots(&PhotoLimits::default()),
            Err(CalibrationError::MalformedPhotos)
        ));
        let empty = request(json!({"photos": null}));
        assert!(empty.photo_slots(&PhotoLimits::default()).expect("null").slots.is_empty());
    }
}
