//! Capture source that replays a directory of still frames in name order.

use attend_core::CaptureSource;
use image::RgbImage;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameSourceError {
    #[error("cannot read frame directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode frame {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

pub struct ImageSequence {
    pending: VecDeque<PathBuf>,
}

impl ImageSequence {
    pub fn open(dir: &Path) -> Result<Self, FrameSourceError> {
        let read_err = |source| FrameSourceError::ReadDir { path: dir.to_path_buf(), source };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        tracing::info!(path = %dir.display(), frames = paths.len(), "frame sequence opened");
        Ok(Self { pending: paths.into() })
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl CaptureSource for ImageSequence {
    type Frame = RgbImage;
    type Error = FrameSourceError;

    fn next_frame(&mut self) -> Result<Option<RgbImage>, FrameSourceError> {
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };
        let frame = image::open(&path)
            .map_err(|source| FrameSourceError::Decode { path: path.clone(), source })?;
        Ok(Some(frame.to_rgb8()))
    }
}
