//! Calibration Orchestrator: runs one request through every stage.
//!
//! Height validation is the only hard precondition besides malformed photo
//! payloads. Everything after it degrades: undecodable photos become stub
//! analyses, missing landmarks become absent measurements, and rejected
//! photos are reported with reasons and tips instead of failing the request.

use bodyfit_utils::config::{AppSettings, PhotoLimits};
use bodyfit_utils::{Stage, decode_photo, focus_score, timing_guard};
use image::GenericImageView;
use log::{debug, info, warn};

use crate::adapter::{KeypointAdapter, PhotoFrame};
use crate::analysis::{ByRole, PhotoAnalysis, PhotoMeasurements, PoseAngles, Role};
use crate::classifier::QualityGate;
use crate::error::CalibrationError;
use crate::estimator::{Estimator, EstimatorConfig};
use crate::l10n::{Lang, push_unique, tips_for_rejection};
use crate::measurements::MeasurementSet;
use crate::merge::{
    Candidate, PlausibilityTable, best_for_measurements, choose_roles, merge_with_user,
    rank_by_role,
};
use crate::request::{CalibrationRequest, PhotoSelection, PhotoSlot};
use crate::response::{
    AcceptanceEntry, CalibrationReply, CalibrationResponse, FailureResponse, PhotosTrimmed,
    RoleReportEntry, RoleStatus,
};
use crate::scale::{ScaleConfig, estimate_scale};

/// Everything that tunes a calibration run.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationConfig {
    pub gate: QualityGate,
    pub estimator: EstimatorConfig,
    pub scale: ScaleConfig,
    pub plausibility: PlausibilityTable,
    pub top_k: usize,
    pub photo_limits: PhotoLimits,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self::from(&AppSettings::default())
    }
}

impl From<&AppSettings> for CalibrationConfig {
    fn from(settings: &AppSettings) -> Self {
        Self {
            gate: QualityGate::from(&settings.quality),
            estimator: EstimatorConfig::from(settings),
            scale: ScaleConfig::from(&settings.scale),
            plausibility: PlausibilityTable::from(&settings.validation),
            top_k: settings.ranking.top_k,
            photo_limits: settings.photos.clone(),
        }
    }
}

/// Runs calibration requests against one keypoint adapter.
///
/// Requests share nothing but the adapter's detectors; each call recomputes
/// every result from its own input.
#[derive(Debug)]
pub struct Calibrator {
    config: CalibrationConfig,
    estimator: Estimator,
    adapter: KeypointAdapter,
}

impl Calibrator {
    pub fn new(config: CalibrationConfig, adapter: KeypointAdapter) -> Self {
        let estimator = Estimator::new(config.estimator.clone());
        Self {
            config,
            estimator,
            adapter,
        }
    }

    pub fn from_settings(settings: &AppSettings, adapter: KeypointAdapter) -> Self {
        Self::new(CalibrationConfig::from(settings), adapter)
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn adapter(&self) -> &KeypointAdapter {
        &self.adapter
    }

    /// Release the adapter's detectors. They are recreated on next use.
    pub fn release(&mut self) {
        self.adapter.release();
    }

    /// Calibrate and convert request-level errors into a structured failure.
    pub fn handle(&mut self, request: &CalibrationRequest) -> CalibrationReply {
        match self.calibrate(request) {
            Ok(response) => CalibrationReply::Success(Box::new(response)),
            Err(err) => {
                warn!("calibration request rejected: {err}");
                CalibrationReply::Failure(FailureResponse::from_error(&err, request.lang()))
            }
        }
    }

    pub fn calibrate(
        &mut self,
        request: &CalibrationRequest,
    ) -> Result<CalibrationResponse, CalibrationError> {
        let mut guard = timing_guard(Stage::Calibrate);
        let lang = request.lang();
        let height_m = request.height_m()?;
        info!("reference height {height_m:.2} m");

        let user = request.user_measurements();
        let provided = user.present_count();
        if provided > 0 {
            info!("{provided} user measurement(s) provided");
        }
        let photos = request.photo_slots(&self.config.photo_limits)?;
        guard.set_items(photos.slots.len());

        let mut response = CalibrationResponse {
            ok: true,
            lang,
            height_m,
            foot_width_category: request.foot_width_category(),
            thresholds: self.config.gate.thresholds,
            photos_received: photos.received,
            photos_trimmed: photos.trimmed.map(|received| PhotosTrimmed {
                received,
                kept: photos.slots.len(),
            }),
            accepted: Vec::new(),
            rejected: Vec::new(),
            chosen_by_role: ByRole::default(),
            by_role_ranked: ByRole::default(),
            retake_tips: Vec::new(),
            role_report: ByRole::from_fn(|_| RoleReportEntry::missing()),
            pose_hint: PoseAngles::default(),
            chest: None,
            waist: None,
            hips: None,
            shoulder: None,
            inseam: None,
            arm: None,
            foot_length_m: None,
            foot_width_m: None,
        };

        if photos.slots.is_empty() {
            debug!("no photos supplied; returning user measurements");
            response.set_measurements(&user);
            return Ok(response);
        }

        let analyses: Vec<PhotoAnalysis> = photos
            .slots
            .iter()
            .map(|slot| self.analyze_photo(slot, height_m, &user))
            .collect();

        self.partition(&photos, analyses, lang, &mut response);
        self.select(&mut response);

        let final_set = {
            let _guard = timing_guard(Stage::Merge);
            let photo_set = self.measurement_source(&response);
            let merged = merge_with_user(&user, &photo_set);
            self.config.plausibility.validate(&merged, height_m, &user)
        };
        response.set_measurements(&final_set);

        for entry in &response.rejected {
            for tip in &entry.tips {
                push_unique(&mut response.retake_tips, tip);
            }
        }
        response.role_report = build_role_report(&response, &photos);
        response.pose_hint = pose_hint(&response.accepted);

        info!(
            "calibration finished: {} accepted, {} rejected",
            response.accepted.len(),
            response.rejected.len()
        );
        Ok(response)
    }

    /// Decode, score and measure one photo.
    pub fn analyze_photo(
        &mut self,
        slot: &PhotoSlot,
        height_m: f64,
        user: &MeasurementSet,
    ) -> PhotoAnalysis {
        let _guard = timing_guard(Stage::AnalyzePhoto).for_photo(slot.index);
        let decoded = match decode_photo(&slot.data) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!("photo {} could not be decoded: {err:#}", slot.index);
                return PhotoAnalysis::decode_failed(self.config.estimator.vfov_deg);
            }
        };
        let image = &decoded.image;
        let (width, height) = image.dimensions();
        let focus = focus_score(image);

        let keypoints = self.adapter.detect(&PhotoFrame {
            index: slot.index,
            image,
        });
        let geometry = self.estimator.geometry(&keypoints, width, height, height_m);

        let measurements = keypoints.body.as_ref().and_then(|body| {
            let hint = self.estimator.camera_hint(&geometry);
            match self
                .estimator
                .measure(body, width, height, height_m, hint, geometry.role)
            {
                Ok(raw) => Some(raw),
                Err(reason) => {
                    debug!("photo {}: no measurements ({reason})", slot.index);
                    None
                }
            }
        });
        let measurements = measurements.map(|raw| {
            let scale = estimate_scale(user, &raw.set, &self.config.scale);
            if !scale.pairs_used.is_empty() {
                info!(
                    "photo {}: scale factor {:.3} from {} feature(s)",
                    slot.index,
                    scale.scale,
                    scale.pairs_used.len()
                );
            }
            let scaled = raw.set.scaled(scale.scale);
            let merged =
                self.config
                    .plausibility
                    .validate(&merge_with_user(user, &scaled), height_m, user);
            PhotoMeasurements {
                raw: raw.set,
                scaled,
                merged,
                scale,
                absent: raw.absent,
            }
        });

        debug!(
            "photo {}: {width}x{height}, focus {focus:.1}, role {}",
            slot.index, geometry.role
        );
        PhotoAnalysis {
            decode_error: false,
            focus,
            image_w: width,
            image_h: height,
            geometry,
            measurements_available: measurements.is_some(),
            measurements,
        }
    }

    /// Route every analysis to exactly one of accepted or rejected.
    fn partition(
        &self,
        photos: &PhotoSelection,
        analyses: Vec<PhotoAnalysis>,
        lang: Lang,
        response: &mut CalibrationResponse,
    ) {
        let mut guard = timing_guard(Stage::QualityPartition);
        guard.set_items(photos.slots.len());
        for (slot, analysis) in photos.slots.iter().zip(analyses) {
            let reasons = self.config.gate.evaluate(&analysis, slot.label);
            let mut entry = AcceptanceEntry {
                index: slot.index,
                role_pred: analysis.role(),
                reasons,
                tips: Vec::new(),
                analysis,
            };
            if entry.reasons.is_empty() {
                response.accepted.push(entry);
            } else {
                debug!(
                    "photo {} rejected: {}",
                    entry.index,
                    entry
                        .reasons
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("; ")
                );
                entry.tips = tips_for_rejection(&entry.reasons, entry.analysis.distance_m(), lang);
                response.rejected.push(entry);
            }
        }
    }

    /// Choose and rank photos per role from accepted photos, or from all
    /// photos when none passed.
    fn select(&self, response: &mut CalibrationResponse) {
        let pool = if response.accepted.is_empty() {
            &response.rejected
        } else {
            &response.accepted
        };
        let candidates: Vec<Candidate<'_>> = pool
            .iter()
            .map(|entry| Candidate {
                index: entry.index,
                analysis: &entry.analysis,
            })
            .collect();
        let chosen = choose_roles(&candidates);
        let ranked = rank_by_role(&candidates, self.config.top_k);
        response.chosen_by_role = chosen;
        response.by_role_ranked = ranked;
    }

    /// Scale-corrected measurements of the best photo for measuring.
    fn measurement_source(&self, response: &CalibrationResponse) -> MeasurementSet {
        let candidates: Vec<Candidate<'_>> = if response.accepted.is_empty() {
            response
                .rejected
                .iter()
                .filter(|entry| !entry.analysis.decode_error)
                .map(|entry| Candidate {
                    index: entry.index,
                    analysis: &entry.analysis,
                })
                .collect()
        } else {
            response
                .accepted
                .iter()
                .map(|entry| Candidate {
                    index: entry.index,
                    analysis: &entry.analysis,
                })
                .collect()
        };
        match best_for_measurements(&candidates) {
            Some(best) => {
                debug!("measuring from photo {}", best.index);
                best.analysis
                    .scaled_measurements()
                    .cloned()
                    .unwrap_or_default()
            }
            None => MeasurementSet::new(),
        }
    }
}

fn build_role_report(
    response: &CalibrationResponse,
    photos: &PhotoSelection,
) -> ByRole<RoleReportEntry> {
    let rejected_entry =
        |index: usize| response.rejected.iter().find(|entry| entry.index == index);

    ByRole::from_fn(|role| {
        let mut entry = RoleReportEntry::missing();
        entry.chosen_index = response.chosen_by_role.get(role).copied().flatten();
        entry.provided_indices = photos.provided_indices(role);
        entry.failed_indices = entry
            .provided_indices
            .iter()
            .copied()
            .filter(|&index| rejected_entry(index).is_some())
            .collect();

        let mut sources = Vec::new();
        if let Some(chosen) = entry.chosen_index {
            if response.is_accepted(chosen) {
                entry.status = RoleStatus::Ok;
            } else {
                entry.status = RoleStatus::Retry;
                sources.extend(rejected_entry(chosen));
            }
        }
        sources.extend(entry.failed_indices.iter().filter_map(|&i| rejected_entry(i)));

        for source in sources {
            for reason in &source.reasons {
                push_unique(&mut entry.reasons, &reason.to_string());
            }
            for tip in &source.tips {
                push_unique(&mut entry.tips, tip);
            }
        }
        entry
    })
}

fn pose_hint(accepted: &[AcceptanceEntry]) -> PoseAngles {
    accepted
        .iter()
        .find(|entry| entry.analysis.role() == Role::Front)
        .or_else(|| accepted.first())
        .map(|entry| entry.analysis.geometry.pose_angles.clone())
        .unwrap_or_default()
}
