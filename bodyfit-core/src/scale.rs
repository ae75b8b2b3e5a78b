//! Global scale correction between user-supplied and photo-derived measurements.
//!
//! Photo measurements share systematic errors (lens, distance estimate,
//! landmark placement), so a single factor is estimated from every feature
//! present in both sets and applied to all photo values. The factor is the
//! weighted median of per-feature ratios so one bad landmark cannot drag it,
//! and it is clamped to a configured band.

use std::collections::BTreeMap;

use bodyfit_utils::config::ScaleSettings;
use log::warn;
use serde::Serialize;

use crate::measurements::{BodyPart, MeasurementSet};

/// Weights and clamp band for scale estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleConfig {
    pub weights: BTreeMap<BodyPart, f64>,
    pub clamp_min: f64,
    pub clamp_max: f64,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self::from(&ScaleSettings::default())
    }
}

impl From<&ScaleSettings> for ScaleConfig {
    fn from(settings: &ScaleSettings) -> Self {
        let weights = settings
            .weights
            .iter()
            .filter_map(|(name, weight)| match name.parse::<BodyPart>() {
                Ok(part) => Some((part, *weight)),
                Err(err) => {
                    warn!("ignoring scale weight: {err}");
                    None
                }
            })
            .collect();
        Self {
            weights,
            clamp_min: settings.clamp_min,
            clamp_max: settings.clamp_max,
        }
    }
}

/// A feature that contributed to the scale estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScalePair {
    pub feature: BodyPart,
    pub user: f64,
    pub photo: f64,
}

/// Result of comparing one photo's measurements with the user's.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaleEstimate {
    pub scale: f64,
    /// `user / photo` per feature.
    pub per_feature: BTreeMap<BodyPart, f64>,
    /// `100 * (photo - user) / user` per feature.
    pub errors_percent: BTreeMap<BodyPart, f64>,
    pub pairs_used: Vec<ScalePair>,
}

impl ScaleEstimate {
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            per_feature: BTreeMap::new(),
            errors_percent: BTreeMap::new(),
            pairs_used: Vec::new(),
        }
    }
}

/// Weighted median of `(value, weight)` pairs.
///
/// Values are sorted ascending and the first whose cumulative normalized
/// weight reaches 0.5 is returned. Empty input yields `1.0`.
pub fn weighted_median(pairs: &[(f64, f64)]) -> f64 {
    if pairs.is_empty() {
        return 1.0;
    }
    let mut sorted = pairs.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let total: f64 = sorted.iter().map(|(_, w)| w).sum();
    let denom = if total > 0.0 { total } else { 1.0 };

    let mut cumulative = 0.0;
    for (value, weight) in &sorted {
        cumulative += weight;
        if cumulative / denom >= 0.5 {
            return *value;
        }
    }
    sorted[sorted.len() - 1].0
}

/// Estimate the global correction factor for one photo.
pub fn estimate_scale(
    user: &MeasurementSet,
    photo: &MeasurementSet,
    config: &ScaleConfig,
) -> ScaleEstimate {
    let mut estimate = ScaleEstimate::identity();
    let mut ratios = Vec::new();

    for (&feature, &weight) in &config.weights {
        let (Some(u), Some(p)) = (user.positive(feature), photo.positive(feature)) else {
            continue;
        };
        let ratio = u / p;
        estimate.per_feature.insert(feature, ratio);
        estimate
            .errors_percent
            .insert(feature, 100.0 * (p - u) / u);
        estimate.pairs_used.push(ScalePair {
            feature,
            user: u,
            photo: p,
        });
        ratios.push((ratio, weight));
    }

    if !ratios.is_empty() {
        estimate.scale = weighted_median(&ratios).clamp(config.clamp_min, config.clamp_max);
    }
    estimate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_pair_sets_scale_and_applies_globally() {
        let user = MeasurementSet::new().with(BodyPart::Chest, 0.90);
        let photo = MeasurementSet::new()
            .with(BodyPart::Chest, 1.00)
            .with(BodyPart::Waist, 0.80);

        let estimate = estimate_scale(&user, &photo, &ScaleConfig::default());
        assert!((estimate.scale - 0.90).abs() < 1e-12);
        assert_eq!(estimate.pairs_used.len(), 1);
        assert!((estimate.errors_percent[&BodyPart::Chest] - 11.111).abs() < 1e-3);

        let scaled = photo.scaled(estimate.scale);
        assert!((scaled.get(BodyPart::Waist).unwrap_or_default() - 0.72).abs() < 1e-12);
    }

    #[test]
    fn no_overlap_is_identity() {
        let user = MeasurementSet::new().with(BodyPart::Arm, 0.6);
        let photo = MeasurementSet::new().with(BodyPart::Chest, 1.0);
        let estimate = estimate_scale(&user, &photo, &ScaleConfig::default());
        assert_eq!(estimate, ScaleEstimate::identity());
    }

    #[test]
    fn extreme_ratios_are_clamped() {
        let config = ScaleConfig::default();
        let user = MeasurementSet::new().with(BodyPart::Chest, 3.0);
        let photo = MeasurementSet::new().with(BodyPart::Chest, 1.0);
        assert_eq!(estimate_scale(&user, &photo, &config).scale, 1.15);

        let user = MeasurementSet::new().with(BodyPart::Chest, 0.1);
        assert_eq!(estimate_scale(&user, &photo, &config).scale, 0.85);
    }

    #[test]
    fn weighted_median_resists_outliers() {
        let pairs = [(0.95, 1.0), (1.0, 1.0), (5.0, 0.6)];
        assert_eq!(weighted_median(&pairs), 1.0);
        assert_eq!(weighted_median(&[]), 1.0);
    }

    #[test]
    fn weighted_median_with_zero_weights_returns_last() {
        assert_eq!(weighted_median(&[(0.9, 0.0), (1.1, 0.0)]), 1.1);
    }

    #[test]
    fn non_positive_values_do_not_pair() {
        let user = MeasurementSet::new().with(BodyPart::Chest, 0.0);
        let photo = MeasurementSet::new().with(BodyPart::Chest, 1.0);
        assert!(estimate_scale(&user, &photo, &ScaleConfig::default()).pairs_used.is_empty());
    }
}
