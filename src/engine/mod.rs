//! Face location engine
//!
//! Provides:
//! - Upload decoding with format sniffing, EXIF orientation and resource limits
//! - Pluggable multi-scale classifier (SeetaFace cascade in production)
//! - Largest-face selection

pub mod cascade;
pub mod detector;
pub mod preprocess;

pub use cascade::SeetaCascade;
pub use detector::{Classifier, DetectionParams, FaceBox, FaceLocator, FaceResult};
