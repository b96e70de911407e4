//! Service layer types

use crate::engine::FaceResult;

/// Face location result for one upload
#[derive(Debug, Clone)]
pub struct LocateResult {
    pub result: FaceResult,
    pub inference_time_ms: u64,
}

impl LocateResult {
    pub fn is_success(&self) -> bool {
        matches!(self.result, FaceResult::Face(_))
    }
}
