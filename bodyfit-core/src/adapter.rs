//! Keypoint Adapter: owns the pose and face detectors used by calibration.
//!
//! Landmark detection is an external capability. Detectors are created lazily
//! through factories on first use, reused across photos and requests, and
//! released explicitly with [`KeypointAdapter::release`] or when an
//! [`AdapterSession`] goes out of scope. Detectors are `&mut` and not shared;
//! a parallel pipeline would give each worker its own adapter.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use image::DynamicImage;
use log::{debug, warn};
use serde::Deserialize;

use crate::keypoints::{BodyKeypoints, DetectedKeypoints, FaceKeypoints};
use bodyfit_utils::{Stage, timing_guard};

/// A decoded photo handed to detectors.
#[derive(Debug, Clone, Copy)]
pub struct PhotoFrame<'a> {
    /// Position of the photo in the request.
    pub index: usize,
    pub image: &'a DynamicImage,
}

/// Body landmark detector.
pub trait PoseDetector {
    /// `Ok(None)` when no person is visible.
    fn detect(&mut self, frame: &PhotoFrame<'_>) -> Result<Option<BodyKeypoints>>;

    /// Free native resources. Called once before the detector is dropped.
    fn close(&mut self) {}
}

/// Face mesh detector.
pub trait FaceDetector {
    /// `Ok(None)` when no face is visible.
    fn detect(&mut self, frame: &PhotoFrame<'_>) -> Result<Option<FaceKeypoints>>;

    fn close(&mut self) {}
}

type Factory<T> = Box<dyn FnMut() -> Result<Box<T>>>;

struct LazySlot<T: ?Sized> {
    name: &'static str,
    factory: Factory<T>,
    instance: Option<Box<T>>,
}

impl<T: ?Sized> LazySlot<T> {
    fn new(name: &'static str, factory: Factory<T>) -> Self {
        Self {
            name,
            factory,
            instance: None,
        }
    }

    fn get(&mut self) -> Result<&mut T> {
        if self.instance.is_none() {
            let instance = (self.factory)()
                .with_context(|| format!("failed to initialize {} detector", self.name))?;
            debug!("{} detector initialized", self.name);
            self.instance = Some(instance);
        }
        self.instance
            .as_deref_mut()
            .ok_or_else(|| anyhow!("{} detector unavailable", self.name))
    }

    fn take(&mut self) -> Option<Box<T>> {
        self.instance.take()
    }

    fn is_initialized(&self) -> bool {
        self.instance.is_some()
    }
}

/// Lazily constructed pose and face detectors with an explicit lifecycle.
pub struct KeypointAdapter {
    pose: LazySlot<dyn PoseDetector>,
    face: LazySlot<dyn FaceDetector>,
}

impl fmt::Debug for KeypointAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeypointAdapter")
            .field("pose_initialized", &self.pose.is_initialized())
            .field("face_initialized", &self.face.is_initialized())
            .finish()
    }
}

impl KeypointAdapter {
    /// Build an adapter from detector factories. Nothing is constructed yet.
    pub fn new<P, F>(pose_factory: P, face_factory: F) -> Self
    where
        P: FnMut() -> Result<Box<dyn PoseDetector>> + 'static,
        F: FnMut() -> Result<Box<dyn FaceDetector>> + 'static,
    {
        Self {
            pose: LazySlot::new("pose", Box::new(pose_factory)),
            face: LazySlot::new("face", Box::new(face_factory)),
        }
    }

    /// An adapter whose detectors never find anything.
    pub fn empty() -> Self {
        Self::new(
            || Ok(Box::new(NoKeypoints) as Box<dyn PoseDetector>),
            || Ok(Box::new(NoKeypoints) as Box<dyn FaceDetector>),
        )
    }

    /// Run both detectors on one photo.
    ///
    /// Initialization or detection failures are logged and reported as
    /// "nothing found" so one bad photo cannot abort a request.
    pub fn detect(&mut self, frame: &PhotoFrame<'_>) -> DetectedKeypoints {
        let _guard = timing_guard(Stage::DetectKeypoints).for_photo(frame.index);
        let body = match self.pose.get().and_then(|detector| detector.detect(frame)) {
            Ok(body) => body.filter(|b| !b.is_empty()),
            Err(err) => {
                warn!("pose detection failed for photo {}: {err:#}", frame.index);
                None
            }
        };
        let face = match self.face.get().and_then(|detector| detector.detect(frame)) {
            Ok(face) => face.filter(|f| !f.is_empty()),
            Err(err) => {
                warn!("face detection failed for photo {}: {err:#}", frame.index);
                None
            }
        };
        DetectedKeypoints { body, face }
    }

    /// Close and drop any constructed detectors. They are rebuilt on next use.
    pub fn release(&mut self) {
        if let Some(mut pose) = self.pose.take() {
            pose.close();
            debug!("pose detector released");
        }
        if let Some(mut face) = self.face.take() {
            face.close();
            debug!("face detector released");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.pose.is_initialized() || self.face.is_initialized()
    }

    /// Borrow the adapter for a scope; detectors are released when it ends.
    pub fn session(&mut self) -> AdapterSession<'_> {
        AdapterSession { adapter: self }
    }
}

impl Drop for KeypointAdapter {
    fn drop(&mut self) {
        self.release();
    }
}

/// Scope guard returned by [`KeypointAdapter::session`].
#[derive(Debug)]
pub struct AdapterSession<'a> {
    adapter: &'a mut KeypointAdapter,
}

impl Deref for AdapterSession<'_> {
    type Target = KeypointAdapter;

    fn deref(&self) -> &Self::Target {
        self.adapter
    }
}

impl DerefMut for AdapterSession<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.adapter
    }
}

impl Drop for AdapterSession<'_> {
    fn drop(&mut self) {
        self.adapter.release();
    }
}

/// Detector that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoKeypoints;

impl PoseDetector for NoKeypoints {
    fn detect(&mut self, _frame: &PhotoFrame<'_>) -> Result<Option<BodyKeypoints>> {
        Ok(None)
    }
}

impl FaceDetector for NoKeypoints {
    fn detect(&mut self, _frame: &PhotoFrame<'_>) -> Result<Option<FaceKeypoints>> {
        Ok(None)
    }
}

#[derive(Deserialize)]
struct PrecomputedDocument {
    #[serde(default)]
    photos: Vec<PrecomputedEntry>,
}

#[derive(Deserialize)]
struct PrecomputedEntry {
    index: usize,
    #[serde(default)]
    body: Option<BodyKeypoints>,
    #[serde(default)]
    face: Option<FaceKeypoints>,
}

/// Keypoints produced ahead of time by an out-of-process detector, keyed by
/// photo index.
///
/// The JSON document has the form `{"photos": [{"index": 0, "body": {..}, "face": {..}}]}`.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedKeypoints {
    entries: Arc<BTreeMap<usize, DetectedKeypoints>>,
}

impl PrecomputedKeypoints {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let doc: PrecomputedDocument =
            serde_json::from_str(json).context("failed to parse keypoints document")?;
        let entries = doc
            .photos
            .into_iter()
            .map(|entry| {
                (
                    entry.index,
                    DetectedKeypoints {
                        body: entry.body,
                        face: entry.face,
                    },
                )
            })
            .collect();
        Ok(Self {
            entries: Arc::new(entries),
        })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read keypoints from {}", path.display()))?;
        Self::from_json_str(&json)
            .with_context(|| format!("invalid keypoints file {}", path.display()))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (usize, DetectedKeypoints)>) -> Self {
        Self {
            entries: Arc::new(entries.into_iter().collect()),
        }
    }

    pub fn get(&self, index: usize) -> Option<&DetectedKeypoints> {
        self.entries.get(&index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wrap this source in an adapter serving both body and face keypoints.
    pub fn into_adapter(self) -> KeypointAdapter {
        let face = self.clone();
        KeypointAdapter::new(
            move || Ok(Box::new(self.clone()) as Box<dyn PoseDetector>),
            move || Ok(Box::new(face.clone()) as Box<dyn FaceDetector>),
        )
    }
}

impl PoseDetector for PrecomputedKeypoints {
    fn detect(&mut self, frame: &PhotoFrame<'_>) -> Result<Option<BodyKeypoints>> {
        Ok(self.get(frame.index).and_then(|kp| kp.body.clone()))
    }
}

impl FaceDetector for PrecomputedKeypoints {
    fn detect(&mut self, frame: &PhotoFrame<'_>) -> Result<Option<FaceKeypoints>> {
        Ok(self.get(frame.index).and_then(|kp| kp.face.clone()))
    }
}
