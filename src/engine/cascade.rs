//! SeetaFace frontal cascade
//!
//! Funnel-structured cascade run through `rustface`. The detector merges
//! overlapping window hits with non-maximum suppression and sums their scores,
//! so a merged face carries the support of every window folded into it. The
//! neighbor requirement is enforced on that summed score.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use image::GrayImage;
use rustface::ImageData;
use tracing::{debug, info};

use crate::config::DetectionConfig;

use super::detector::{Classifier, DetectionParams, FaceBox};

/// Frontal-face cascade loaded once at startup
pub struct SeetaCascade {
    model: rustface::Model,
    score_thresh: f64,
    neighbor_score: f64,
    window_step: u32,
}

impl SeetaCascade {
    /// Load the model file; failure here must stop the process
    pub fn load(path: &Path, config: &DetectionConfig) -> Result<Self> {
        info!("Loading cascade model from {}", path.display());
        let start = Instant::now();

        let file = File::open(path)
            .with_context(|| format!("Failed to open cascade model {}", path.display()))?;
        let model = rustface::read_model(BufReader::new(file))
            .with_context(|| format!("Failed to parse cascade model {}", path.display()))?;

        info!("Cascade model loaded in {:?}", start.elapsed());

        Ok(Self {
            model,
            score_thresh: config.score_thresh,
            neighbor_score: config.neighbor_score,
            window_step: config.window_step,
        })
    }

    /// Minimum merged score for a face backed by `min_neighbors` windows
    fn min_support(&self, params: &DetectionParams) -> f64 {
        params.min_neighbors as f64 * self.neighbor_score
    }
}

impl Classifier for SeetaCascade {
    fn detect_multi_scale(&self, gray: &GrayImage, params: &DetectionParams) -> Result<Vec<FaceBox>> {
        let (width, height) = gray.dimensions();

        // The detector keeps per-run scratch buffers, so each call gets its own
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(params.min_face_size);
        detector.set_score_thresh(self.score_thresh);
        detector.set_pyramid_scale_factor(1.0 / params.scale_factor);
        detector.set_slide_window_step(self.window_step, self.window_step);

        let faces = detector.detect(&ImageData::new(gray.as_raw(), width, height));
        let min_support = self.min_support(params);

        let candidates: Vec<FaceBox> = faces
            .iter()
            .filter(|face| face.score() >= min_support)
            .filter_map(|face| {
                let bbox = face.bbox();
                FaceBox::clamped(
                    bbox.x() as i64,
                    bbox.y() as i64,
                    bbox.width() as i64,
                    bbox.height() as i64,
                    width,
                    height,
                )
            })
            .collect();

        debug!(
            "Cascade kept {}/{} faces (min support {:.1})",
            candidates.len(),
            faces.len(),
            min_support
        );

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn manifest_path(relative: impl AsRef<Path>) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join(relative)
    }

    fn bundled_cascade(config: &DetectionConfig) -> SeetaCascade {
        SeetaCascade::load(&manifest_path(&config.model_path), config).unwrap()
    }

    fn group_photo() -> GrayImage {
        image::open(manifest_path("tests/fixtures/group.png")).unwrap().to_luma8()
    }

    #[test]
    fn test_missing_model_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.bin");
        assert!(SeetaCascade::load(&path, &DetectionConfig::default()).is_err());
    }

    #[test]
    fn test_corrupt_model_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.bin");
        std::fs::write(&path, b"\x01\x00").unwrap();
        assert!(SeetaCascade::load(&path, &DetectionConfig::default()).is_err());
    }

    #[test]
    fn test_bundled_model_finds_faces_inside_image() {
        let config = DetectionConfig::default();
        let cascade = bundled_cascade(&config);
        let gray = group_photo();

        let faces = cascade
            .detect_multi_scale(&gray, &DetectionParams::from_config(&config))
            .unwrap();

        assert!(faces.len() > 1, "expected several faces, got {}", faces.len());
        for face in &faces {
            assert!(face.width > 0 && face.height > 0);
            assert!(face.x + face.width <= gray.width(), "{:?} leaves the image", face);
            assert!(face.y + face.height <= gray.height(), "{:?} leaves the image", face);
        }
    }

    #[test]
    fn test_neighbor_floor_drops_weak_faces() {
        let gray = group_photo();

        // Merged scores on this photo stay far below 5 * 100
        let mut config = DetectionConfig::default();
        config.neighbor_score = 100.0;
        let strict = bundled_cascade(&config)
            .detect_multi_scale(&gray, &DetectionParams::from_config(&config))
            .unwrap();
        assert!(strict.is_empty());
    }

    #[test]
    fn test_blank_image_has_no_candidates() {
        let config = DetectionConfig::default();
        let gray = GrayImage::from_pixel(320, 240, image::Luma([128]));

        let faces = bundled_cascade(&config)
            .detect_multi_scale(&gray, &DetectionParams::from_config(&config))
            .unwrap();
        assert!(faces.is_empty());
    }
}
