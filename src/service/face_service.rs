//! Face Service - runs the locator off the async workers
//!
//! Decoding and the cascade are CPU-bound, so each call is moved onto the
//! blocking pool and bounded by a wall-clock timeout. Timeouts and worker
//! panics come back as decode failures, never as errors.
//!
//! A timed-out worker cannot be cancelled. It keeps its permit until it
//! finishes, so at most `max_concurrent` workers occupy the blocking pool and
//! further uploads wait for a permit inside their own timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::DetectionConfig;
use crate::engine::{FaceLocator, FaceResult};

use super::types::LocateResult;

/// Face location service
pub struct FaceService {
    locator: Arc<FaceLocator>,
    timeout: Duration,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl FaceService {
    /// Create a new face service
    pub fn new(locator: Arc<FaceLocator>, timeout: Duration, max_concurrent: usize) -> Self {
        Self {
            locator,
            timeout,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    pub fn from_config(locator: Arc<FaceLocator>, config: &DetectionConfig) -> Self {
        Self::new(locator, Duration::from_millis(config.timeout_ms), config.max_concurrent)
    }

    /// Detections currently holding a permit, detached workers included
    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.permits.available_permits()
    }

    /// Locate the largest face in an uploaded image
    pub async fn locate(&self, image_data: Vec<u8>) -> LocateResult {
        let start = Instant::now();
        let size = image_data.len();

        let locator = self.locator.clone();
        let permits = self.permits.clone();
        let work = async move {
            let permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    return FaceResult::DecodeFailure(format!("detection unavailable: {}", e));
                }
            };
            let task = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                locator.detect(&image_data)
            });
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    error!("Detection worker failed: {}", e);
                    FaceResult::DecodeFailure(format!("detection worker failed: {}", e))
                }
            }
        };

        // On timeout a started worker is detached and runs to completion on its own
        let result = match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    in_flight = self.in_flight(),
                    "Detection timed out after {:?} ({} bytes)", self.timeout, size
                );
                FaceResult::DecodeFailure(format!("detection timed out after {:?}", self.timeout))
            }
        };

        let inference_time_ms = start.elapsed().as_millis() as u64;
        if let FaceResult::Face(face) = &result {
            info!(
                "Face at ({}, {}) {}x{} in {}ms",
                face.x, face.y, face.width, face.height, inference_time_ms
            );
        }

        LocateResult {
            result,
            inference_time_ms,
        }
    }
}
