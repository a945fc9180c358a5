//! attend-vision: Face extraction and image I/O for attendance.
//!
//! SCRFD detection, five-point alignment and ArcFace embedding via ONNX
//! Runtime, plus the reference image directory and a still-frame capture
//! source.

pub mod alignment;
pub mod detector;
pub mod extractor;
pub mod frames;
pub mod recognizer;
pub mod store;

pub use extractor::{ExtractorError, OnnxFaceExtractor, ARCFACE_MODEL_FILE, SCRFD_MODEL_FILE};
pub use frames::{FrameSourceError, ImageSequence};
pub use store::{ImageDirStore, StoreError};
