//! Measurement merging, plausibility validation and per-role photo selection.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use bodyfit_utils::config::{BandSettings, ValidationSettings};
use log::{debug, warn};

use crate::analysis::{ByRole, PhotoAnalysis, Role};
use crate::measurements::{BodyPart, MeasurementSet};

/// Per-feature merge: positive user values win, then positive photo values.
pub fn merge_with_user(user: &MeasurementSet, photo: &MeasurementSet) -> MeasurementSet {
    BodyPart::TRACKED
        .into_iter()
        .map(|part| (part, user.positive(part).or_else(|| photo.positive(part))))
        .collect()
}

/// Height-relative plausibility bands.
#[derive(Debug, Clone, PartialEq)]
pub struct PlausibilityTable {
    bands: BTreeMap<BodyPart, BandSettings>,
}

impl Default for PlausibilityTable {
    fn default() -> Self {
        Self::from(&ValidationSettings::default())
    }
}

impl From<&ValidationSettings> for PlausibilityTable {
    fn from(settings: &ValidationSettings) -> Self {
        let bands = settings
            .bands
            .iter()
            .filter_map(|(name, band)| match name.parse::<BodyPart>() {
                Ok(part) => Some((part, *band)),
                Err(err) => {
                    warn!("ignoring plausibility band: {err}");
                    None
                }
            })
            .collect();
        Self { bands }
    }
}

impl PlausibilityTable {
    pub fn band(&self, part: BodyPart) -> Option<&BandSettings> {
        self.bands.get(&part)
    }

    /// Replace absent or implausible values with `height × default`.
    ///
    /// Parts with a positive value in `trusted` are passed through untouched.
    pub fn validate(
        &self,
        merged: &MeasurementSet,
        height_m: f64,
        trusted: &MeasurementSet,
    ) -> MeasurementSet {
        let mut out = merged.clone();
        for (&part, band) in &self.bands {
            if trusted.positive(part).is_some() {
                continue;
            }
            match merged.positive(part) {
                Some(value) => {
                    let ratio = value / height_m;
                    if ratio < band.min || ratio > band.max {
                        let fallback = height_m * band.default;
                        debug!(
                            "{part} = {value:.3}m ({:.1}% of height) outside {:.1}-{:.1}%, using {fallback:.3}m",
                            ratio * 100.0,
                            band.min * 100.0,
                            band.max * 100.0
                        );
                        out.set(part, Some(fallback));
                    }
                }
                None => out.set(part, Some(height_m * band.default)),
            }
        }
        out
    }
}

/// A photo competing for selection, identified by its request index.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub index: usize,
    pub analysis: &'a PhotoAnalysis,
}

/// The candidate maximizing `focus × shoulder ratio`; earliest wins ties.
pub fn best_for_measurements<'a>(candidates: &[Candidate<'a>]) -> Option<Candidate<'a>> {
    candidates.iter().copied().fold(None, |best, cand| match best {
        Some(b) if b.analysis.measurement_score() >= cand.analysis.measurement_score() => Some(b),
        _ => Some(cand),
    })
}

/// Best-first request indices for `role`.
///
/// Candidates classified as `role` compete; if there are none, every
/// candidate does. Ties on score prefer straighter views for front and back
/// and more-turned views for side.
pub fn rank_for_role(candidates: &[Candidate<'_>], role: Role, k: usize) -> Vec<usize> {
    let mut pool: Vec<Candidate<'_>> = candidates
        .iter()
        .copied()
        .filter(|c| c.analysis.role() == role)
        .collect();
    if pool.is_empty() {
        pool = candidates.to_vec();
    }

    pool.sort_by(|a, b| {
        let by_score = b
            .analysis
            .ranking_score()
            .total_cmp(&a.analysis.ranking_score());
        let (ya, yb) = (a.analysis.abs_yaw_or_default(), b.analysis.abs_yaw_or_default());
        let by_yaw = match role {
            Role::Side => yb.total_cmp(&ya),
            _ => ya.total_cmp(&yb),
        };
        by_score.then(by_yaw).then(Ordering::Equal)
    });
    pool.into_iter().take(k).map(|c| c.index).collect()
}

/// Top-`k` request indices per role.
pub fn rank_by_role(candidates: &[Candidate<'_>], k: usize) -> ByRole<Vec<usize>> {
    ByRole::from_fn(|role| rank_for_role(candidates, role, k))
}

/// Single best request index per role.
pub fn choose_roles(candidates: &[Candidate<'_>]) -> ByRole<Option<usize>> {
    ByRole::from_fn(|role| rank_for_role(candidates, role, 1).into_iter().next())
}
