use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Embedding width produced by the ArcFace w600k_r50 model.
pub const EMBEDDING_DIM: usize = 512;

/// Label of a known person, taken verbatim from a reference image's file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Derive an identity from a file path's stem (`images/Alice.jpg` → `Alice`).
    ///
    /// Returns `None` for paths without a UTF-8 stem.
    pub fn from_path_stem(path: &Path) -> Option<Self> {
        let stem = path.file_stem()?.to_str()?.trim();
        if stem.is_empty() {
            return None;
        }
        Some(Self(stem.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("embedding has {actual} dimensions, expected {expected}")]
pub struct DimensionMismatch {
    pub expected: usize,
    pub actual: usize,
}

/// Fixed-width face embedding.
///
/// The width is part of the type, so two embeddings from different models
/// cannot be compared by accident. Raw extractor output is checked once in
/// [`Embedding::try_from_slice`].
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding<const D: usize = EMBEDDING_DIM> {
    values: [f32; D],
}

impl<const D: usize> Embedding<D> {
    pub fn new(values: [f32; D]) -> Self {
        Self { values }
    }

    pub fn try_from_slice(values: &[f32]) -> Result<Self, DimensionMismatch> {
        let values: [f32; D] = values.try_into().map_err(|_| DimensionMismatch {
            expected: D,
            actual: values.len(),
        })?;
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f32; D] {
        &self.values
    }

    /// Euclidean (L2) distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Self) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Face bounding box in frame pixel coordinates, with optional landmarks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameLocation {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Detector confidence in [0, 1].
    pub confidence: f32,
    /// Five-point landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl FrameLocation {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-union with another box.
    pub fn iou(&self, other: &FrameLocation) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union > 0.0 { inter / union } else { 0.0 }
    }
}

/// One detected face in one frame.
#[derive(Debug, Clone)]
pub struct Observation<const D: usize = EMBEDDING_DIM> {
    pub embedding: Embedding<D>,
    pub location: FrameLocation,
}

/// Outcome of matching one observation against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Matched identity, or `None` for an unknown face.
    pub identity: Option<Identity>,
    /// Distance to the nearest gallery entry; `f32::INFINITY` when the gallery is empty.
    pub distance: f32,
}

impl MatchResult {
    pub fn unknown(distance: f32) -> Self {
        Self { identity: None, distance }
    }

    pub fn is_match(&self) -> bool {
        self.identity.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Embedding::new([0.3, 0.4, 0.5]);
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    fn test_euclidean_distance_known_value() {
        let a = Embedding::new([0.0, 0.0]);
        let b = Embedding::new([3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_try_from_slice_rejects_wrong_width() {
        let err = Embedding::<4>::try_from_slice(&[1.0, 2.0]).unwrap_err();
        assert_eq!(err, DimensionMismatch { expected: 4, actual: 2 });
    }

    #[test]
    fn test_try_from_slice_accepts_exact_width() {
        let e = Embedding::<3>::try_from_slice(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(e.values(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_identity_from_path_stem() {
        let id = Identity::from_path_stem(Path::new("images/Alice Smith.jpg")).unwrap();
        assert_eq!(id.as_str(), "Alice Smith");
        assert!(Identity::from_path_stem(Path::new("/")).is_none());
    }

    #[test]
    fn test_iou() {
        let a = FrameLocation {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
            confidence: 0.9,
            landmarks: None,
        };
        let b = FrameLocation { x: 5.0, confidence: 0.8, ..a };
        // overlap 50, union 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
        let far = FrameLocation { x: 100.0, ..b };
        assert_eq!(a.iou(&far), 0.0);
    }
}
