//! Face Locator
//!
//! Decodes an upload, normalizes it to luminance, runs the multi-scale cascade
//! and reduces the candidates to the single largest face. Every failure on the
//! way degrades to a negative result instead of an error.

use std::cmp::Reverse;
use std::sync::Arc;

use anyhow::{Context, Result};
use image::GrayImage;
use tracing::{debug, warn};

use crate::config::DetectionConfig;

use super::preprocess::{decode_grayscale, DecodeLimits};

/// Axis-aligned face box in pixel coordinates of the upright image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Clip a signed box to `[0, image_width) x [0, image_height)`.
    /// Returns `None` when nothing of the box lies inside the image.
    pub fn clamped(x: i64, y: i64, width: i64, height: i64, image_width: u32, image_height: u32) -> Option<Self> {
        let x1 = x.clamp(0, image_width as i64);
        let y1 = y.clamp(0, image_height as i64);
        let x2 = (x + width).clamp(0, image_width as i64);
        let y2 = (y + height).clamp(0, image_height as i64);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Self::new(x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32))
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Intersection over union
    pub fn iou(&self, other: &FaceBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let intersection = x2.saturating_sub(x1) as u64 * y2.saturating_sub(y1) as u64;
        let union = self.area() + other.area() - intersection;

        if union > 0 {
            intersection as f32 / union as f32
        } else {
            0.0
        }
    }
}

/// Outcome of locating a face in one upload
#[derive(Debug, Clone, PartialEq)]
pub enum FaceResult {
    /// The largest detected face
    Face(FaceBox),
    /// The image decoded but no candidate survived
    NoFace,
    /// Decoding, the classifier or the worker failed; carries the reason
    DecodeFailure(String),
}

impl FaceResult {
    pub fn face(&self) -> Option<FaceBox> {
        match self {
            FaceResult::Face(face) => Some(*face),
            _ => None,
        }
    }
}

/// Multi-scale search parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    /// Size ratio between consecutive pyramid levels
    pub scale_factor: f32,
    /// Overlapping window hits a region needs before it is kept
    pub min_neighbors: u32,
    /// Smallest face side length searched, in pixels
    pub min_face_size: u32,
}

impl DetectionParams {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            scale_factor: config.scale_factor,
            min_neighbors: config.min_neighbors,
            min_face_size: config.min_face_size,
        }
    }
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self::from_config(&DetectionConfig::default())
    }
}

/// Pre-trained sliding-window face classifier.
///
/// The loaded model is read-only, so one instance serves all concurrent calls.
/// Candidates are returned in no particular order.
pub trait Classifier: Send + Sync {
    fn detect_multi_scale(&self, gray: &GrayImage, params: &DetectionParams) -> Result<Vec<FaceBox>>;
}

/// Pick the candidate with the largest area.
/// Equal areas resolve to the topmost, then leftmost box.
pub fn select_largest(candidates: &[FaceBox]) -> Option<FaceBox> {
    candidates
        .iter()
        .copied()
        .min_by_key(|face| (Reverse(face.area()), face.y, face.x))
}

/// Stateless face locator around a shared classifier
pub struct FaceLocator {
    classifier: Arc<dyn Classifier>,
    params: DetectionParams,
    limits: DecodeLimits,
}

impl FaceLocator {
    pub fn new(classifier: Arc<dyn Classifier>, params: DetectionParams, limits: DecodeLimits) -> Self {
        Self {
            classifier,
            params,
            limits,
        }
    }

    pub fn from_config(classifier: Arc<dyn Classifier>, config: &DetectionConfig) -> Self {
        Self::new(
            classifier,
            DetectionParams::from_config(config),
            DecodeLimits::from_config(config),
        )
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    /// Locate the largest face in encoded image bytes
    pub fn detect(&self, image_data: &[u8]) -> FaceResult {
        match self.locate(image_data) {
            Ok(Some(face)) => FaceResult::Face(face),
            Ok(None) => FaceResult::NoFace,
            Err(e) => {
                warn!("Face detection failed: {:#}", e);
                FaceResult::DecodeFailure(format!("{:#}", e))
            }
        }
    }

    fn locate(&self, image_data: &[u8]) -> Result<Option<FaceBox>> {
        let gray = decode_grayscale(image_data, &self.limits)?;
        let (width, height) = gray.dimensions();

        if width < self.params.min_face_size || height < self.params.min_face_size {
            debug!("Image {}x{} is smaller than the minimum face size", width, height);
            return Ok(None);
        }

        let candidates = self
            .classifier
            .detect_multi_scale(&gray, &self.params)
            .context("Classifier failed")?;

        debug!("{} face candidates in {}x{} image", candidates.len(), width, height);

        Ok(select_largest(&candidates))
    }
}
