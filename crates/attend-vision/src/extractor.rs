use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use attend_core::{Embedding, FaceExtractor, FrameLocation, EMBEDDING_DIM};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

/// File name of the SCRFD detection model inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model directory.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// SCRFD + ArcFace behind the core's [`FaceExtractor`] trait.
pub struct OnnxFaceExtractor {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceExtractor {
    /// Load both models from `model_dir`. Fails fast if either is missing.
    pub fn load(model_dir: &Path) -> Result<Self, ExtractorError> {
        let detector = FaceDetector::load(&model_dir.join(SCRFD_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(ARCFACE_MODEL_FILE))?;
        Ok(Self { detector, recognizer })
    }
}

impl FaceExtractor<EMBEDDING_DIM> for OnnxFaceExtractor {
    type Image = RgbImage;
    type Error = ExtractorError;

    fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<FrameLocation>, ExtractorError> {
        Ok(self.detector.detect(image)?)
    }

    fn embed(
        &mut self,
        image: &RgbImage,
        locations: &[FrameLocation],
    ) -> Result<Vec<Embedding>, ExtractorError> {
        locations
            .iter()
            .map(|face| self.recognizer.extract(image, face).map_err(ExtractorError::from))
            .collect()
    }
}
