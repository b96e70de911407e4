//! REST API request/response data transfer objects

use serde::{Deserialize, Serialize};

use crate::engine::FaceBox;

/// Message returned whenever no face can be reported
pub const NO_FACE_MESSAGE: &str = "No face detected in image";

/// Face coordinates in the uploaded image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceCoordsDto {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl From<FaceBox> for FaceCoordsDto {
    fn from(face: FaceBox) -> Self {
        Self {
            x: face.x,
            y: face.y,
            w: face.width,
            h: face.height,
        }
    }
}

/// Detect-face response
#[derive(Debug, Serialize, Deserialize)]
pub struct FaceResponse {
    pub success: bool,
    pub face: Option<FaceCoordsDto>,
    pub error: Option<String>,
}

impl FaceResponse {
    pub fn found(face: FaceBox) -> Self {
        Self {
            success: true,
            face: Some(face.into()),
            error: None,
        }
    }

    pub fn no_face() -> Self {
        Self {
            success: false,
            face: None,
            error: Some(NO_FACE_MESSAGE.to_string()),
        }
    }
}

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            code: code.to_string(),
        }
    }
}
