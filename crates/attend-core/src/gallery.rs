//! Reference gallery: one embedding per labelled reference image.

use crate::boundary::{FaceExtractor, Reference};
use crate::types::{Embedding, Identity, EMBEDDING_DIM};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GalleryError {
    #[error("gallery is empty: register at least one reference image with a detectable face")]
    Empty,
}

#[derive(Debug, Clone)]
pub struct GalleryEntry<const D: usize = EMBEDDING_DIM> {
    pub identity: Identity,
    pub embedding: Embedding<D>,
}

/// Ordered, immutable set of known faces.
///
/// Order is build order and decides tie-breaks in matching. Entries sharing a
/// label are all kept.
#[derive(Debug, Clone)]
pub struct Gallery<const D: usize = EMBEDDING_DIM> {
    entries: Vec<GalleryEntry<D>>,
}

impl<const D: usize> Gallery<D> {
    /// Build a gallery by extracting one embedding per reference image.
    ///
    /// Images with no detectable face, or on which extraction fails, are
    /// skipped with a warning. When an image holds several faces the first
    /// one reported by the extractor is used.
    pub fn build<I, E>(references: I, extractor: &mut E) -> Self
    where
        I: IntoIterator<Item = Reference<E::Image>>,
        E: FaceExtractor<D>,
    {
        let mut entries: Vec<GalleryEntry<D>> = Vec::new();
        let mut skipped = 0usize;

        for reference in references {
            let Reference { identity, image } = reference;

            let locations = match extractor.detect_faces(&image) {
                Ok(locations) => locations,
                Err(err) => {
                    tracing::warn!(
                        identity = %identity,
                        error = %err,
                        "face detection failed; skipping reference"
                    );
                    skipped += 1;
                    continue;
                }
            };

            let Some(first) = locations.first() else {
                tracing::warn!(identity = %identity, "no face found in reference image; skipping");
                skipped += 1;
                continue;
            };

            if locations.len() > 1 {
                tracing::warn!(
                    identity = %identity,
                    faces = locations.len(),
                    "reference image holds several faces; using the first"
                );
            }

            let embedding = match extractor.embed(&image, std::slice::from_ref(first)) {
                Ok(mut embeddings) if !embeddings.is_empty() => embeddings.swap_remove(0),
                Ok(_) => {
                    tracing::warn!(
                        identity = %identity,
                        "extractor returned no embedding; skipping reference"
                    );
                    skipped += 1;
                    continue;
                }
                Err(err) => {
                    tracing::warn!(
                        identity = %identity,
                        error = %err,
                        "embedding failed; skipping reference"
                    );
                    skipped += 1;
                    continue;
                }
            };

            if entries.iter().any(|e| e.identity == identity) {
                tracing::warn!(
                    identity = %identity,
                    "duplicate reference label; keeping both entries"
                );
            }

            entries.push(GalleryEntry { identity, embedding });
        }

        tracing::info!(entries = entries.len(), skipped, "gallery built");
        Self { entries }
    }

    pub fn from_entries(entries: Vec<GalleryEntry<D>>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[GalleryEntry<D>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct identities in build order.
    pub fn identities(&self) -> Vec<Identity> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .filter(|e| seen.insert(&e.identity))
            .map(|e| e.identity.clone())
            .collect()
    }

    /// Precondition check for callers that cannot work without known faces.
    pub fn require_non_empty(&self) -> Result<&Self, GalleryError> {
        if self.entries.is_empty() {
            Err(GalleryError::Empty)
        } else {
            Ok(self)
        }
    }
}
