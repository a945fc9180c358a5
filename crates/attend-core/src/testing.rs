//! In-crate test doubles for the boundary traits.

use crate::boundary::{CaptureSource, Clock, FaceExtractor, NotificationSink};
use crate::ledger::Status;
use crate::types::{Embedding, FrameLocation, Identity};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::cell::RefCell;
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("corrupt image")]
pub struct CorruptImage;

/// An "image" that carries the embeddings of the faces it contains.
#[derive(Debug, Clone)]
pub struct FakeImage {
    faces: Vec<[f32; 2]>,
    corrupt: bool,
}

impl FakeImage {
    pub fn faces(faces: Vec<[f32; 2]>) -> Self {
        Self { faces, corrupt: false }
    }

    pub fn corrupt() -> Self {
        Self { faces: Vec::new(), corrupt: true }
    }
}

/// Extractor that reads embeddings straight out of a [`FakeImage`].
/// Each location's `x` holds the face index.
pub struct FakeExtractor;

impl FaceExtractor<2> for FakeExtractor {
    type Image = FakeImage;
    type Error = CorruptImage;

    fn detect_faces(&mut self, image: &FakeImage) -> Result<Vec<FrameLocation>, CorruptImage> {
        if image.corrupt {
            return Err(CorruptImage);
        }
        Ok((0..image.faces.len())
            .map(|i| FrameLocation {
                x: i as f32,
                y: 0.0,
                width: 1.0,
                height: 1.0,
                confidence: 1.0,
                landmarks: None,
            })
            .collect())
    }

    fn embed(
        &mut self,
        image: &FakeImage,
        locations: &[FrameLocation],
    ) -> Result<Vec<Embedding<2>>, CorruptImage> {
        if image.corrupt {
            return Err(CorruptImage);
        }
        locations
            .iter()
            .map(|loc| {
                image
                    .faces
                    .get(loc.x as usize)
                    .map(|values| Embedding::new(*values))
                    .ok_or(CorruptImage)
            })
            .collect()
    }
}

/// Frames served from a queue; `Err` entries become capture failures.
pub struct ScriptedCapture {
    frames: VecDeque<Result<FakeImage, CorruptImage>>,
}

impl ScriptedCapture {
    pub fn new(frames: Vec<Result<FakeImage, CorruptImage>>) -> Self {
        Self { frames: frames.into() }
    }
}

impl CaptureSource for ScriptedCapture {
    type Frame = FakeImage;
    type Error = CorruptImage;

    fn next_frame(&mut self) -> Result<Option<FakeImage>, CorruptImage> {
        self.frames.pop_front().transpose()
    }
}

/// Records every notification it receives.
#[derive(Default)]
pub struct RecordingNotifier {
    pub events: RefCell<Vec<(Identity, Status)>>,
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, identity: &Identity, status: Status) {
        self.events.borrow_mut().push((identity.clone(), status));
    }
}

/// Clock pinned to one instant.
pub struct FixedClock(pub NaiveDateTime);

impl FixedClock {
    pub fn at(date: &str, time: &str) -> Self {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("test date");
        let time = NaiveTime::parse_from_str(time, "%H:%M:%S").expect("test time");
        Self(date.and_time(time))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
