//! Nearest-neighbour matching of observations against the gallery.

use crate::gallery::Gallery;
use crate::types::{Embedding, MatchResult};

/// Largest Euclidean distance accepted as the same person.
///
/// Tuned for L2-normalised ArcFace embeddings: a distance of 1.10 corresponds
/// to a cosine similarity of roughly 0.40. Changing the embedding model
/// requires retuning this value.
pub const MATCH_DISTANCE_THRESHOLD: f32 = 1.10;

/// Strategy for deciding which gallery identity, if any, a query belongs to.
pub trait Matcher<const D: usize> {
    fn compare(&self, query: &Embedding<D>, gallery: &Gallery<D>) -> MatchResult;
}

/// Euclidean nearest-neighbour matcher with a fixed acceptance threshold.
///
/// Acceptance is two-stage: every entry gets a match flag
/// (`distance < threshold`), then the minimum-distance entry is chosen and
/// accepted only if its own flag holds. Ties on distance go to the entry
/// with the lowest build index.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    threshold: f32,
}

impl EuclideanMatcher {
    pub fn new() -> Self {
        Self { threshold: MATCH_DISTANCE_THRESHOLD }
    }

    pub fn with_threshold(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl<const D: usize> Matcher<D> for EuclideanMatcher {
    fn compare(&self, query: &Embedding<D>, gallery: &Gallery<D>) -> MatchResult {
        let distances: Vec<f32> = gallery
            .entries()
            .iter()
            .map(|entry| query.euclidean_distance(&entry.embedding))
            .collect();
        let flags: Vec<bool> = distances.iter().map(|&d| d < self.threshold).collect();

        // Strict `<` keeps the first-encountered entry on ties. NaN never wins.
        let mut best: Option<(usize, f32)> = None;
        for (i, &d) in distances.iter().enumerate() {
            if d.is_nan() {
                continue;
            }
            if best.map_or(true, |(_, best_d)| d < best_d) {
                best = Some((i, d));
            }
        }

        match best {
            Some((idx, distance)) if flags[idx] => MatchResult {
                identity: Some(gallery.entries()[idx].identity.clone()),
                distance,
            },
            Some((_, distance)) => MatchResult::unknown(distance),
            None => MatchResult::unknown(f32::INFINITY),
        }
    }
}
