//! Reference images kept as files in one directory, labelled by file stem.

use attend_core::{Identity, Reference, ReferenceStore};
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("cannot read reference directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot create reference directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid identity label {0:?}")]
    InvalidLabel(String),
    #[error("image error for {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Directory of `<label>.<ext>` reference images.
///
/// Listing is sorted by file name so gallery order, and with it matching
/// tie-breaks, does not depend on the filesystem.
#[derive(Debug, Clone)]
pub struct ImageDirStore {
    dir: PathBuf,
}

impl ImageDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Sorted paths of regular files in the directory.
    fn files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let read_err = |source| StoreError::ReadDir { path: self.dir.clone(), source };

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Save `image` as the reference for `identity`, replacing any previous
    /// `<identity>.jpg`. Returns the written path.
    pub fn register(&self, identity: &Identity, image: &RgbImage) -> Result<PathBuf, StoreError> {
        let label = identity.as_str();
        let path_like = label.contains(|c: char| c == '/' || c == '\\');
        if label.is_empty() || path_like || label.starts_with('.') {
            return Err(StoreError::InvalidLabel(label.to_string()));
        }

        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.dir.join(format!("{label}.jpg"));
        image.save(&path).map_err(|source| StoreError::Image { path: path.clone(), source })?;
        tracing::info!(identity = %identity, path = %path.display(), "reference image saved");
        Ok(path)
    }
}

impl ReferenceStore for ImageDirStore {
    type Image = RgbImage;
    type Error = StoreError;

    fn list(&self) -> Result<Vec<Reference<RgbImage>>, StoreError> {
        if !self.dir.exists() {
            tracing::warn!(path = %self.dir.display(), "reference directory does not exist");
            return Ok(Vec::new());
        }

        let mut references = Vec::new();
        for path in self.files()? {
            let Some(identity) = Identity::from_path_stem(&path) else {
                tracing::warn!(path = %path.display(), "no usable label in file name; skipping");
                continue;
            };
            match image::open(&path) {
                Ok(img) => references.push(Reference { identity, image: img.to_rgb8() }),
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "unable to read reference image; skipping"
                    );
                }
            }
        }

        tracing::info!(
            path = %self.dir.display(),
            count = references.len(),
            "reference images loaded"
        );
        Ok(references)
    }
}
