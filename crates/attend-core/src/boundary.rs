//! Traits for the collaborators the attendance core drives but does not own:
//! reference image storage, face extraction, frame capture, notifications
//! and the wall clock.

use crate::ledger::Status;
use crate::types::{Embedding, FrameLocation, Identity};
use chrono::NaiveDateTime;
use std::error::Error as StdError;

/// A reference image labelled with the identity it depicts.
#[derive(Debug, Clone)]
pub struct Reference<I> {
    pub identity: Identity,
    pub image: I,
}

/// Source of labelled reference images.
pub trait ReferenceStore {
    type Image;
    type Error: StdError + Send + Sync + 'static;

    /// List every readable reference image. Unreadable entries are skipped
    /// by the store with a warning; only a failure to enumerate is an error.
    fn list(&self) -> Result<Vec<Reference<Self::Image>>, Self::Error>;
}

/// Face detection and embedding over one image type.
///
/// Zero detected faces is a valid result, not an error.
pub trait FaceExtractor<const D: usize> {
    type Image;
    type Error: StdError + Send + Sync + 'static;

    fn detect_faces(&mut self, image: &Self::Image) -> Result<Vec<FrameLocation>, Self::Error>;

    /// Embed the faces at `locations`; output is aligned by index.
    fn embed(
        &mut self,
        image: &Self::Image,
        locations: &[FrameLocation],
    ) -> Result<Vec<Embedding<D>>, Self::Error>;
}

/// Producer of frames for a recognition session.
pub trait CaptureSource {
    type Frame;
    type Error: StdError + Send + Sync + 'static;

    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Self::Frame>, Self::Error>;
}

/// Receiver of attendance events. Fire-and-forget: implementations must not
/// block and cannot report failure.
pub trait NotificationSink {
    fn notify(&self, identity: &Identity, status: Status);
}

/// Notification sink that writes an `info` event per notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, identity: &Identity, status: Status) {
        tracing::info!(identity = %identity, %status, "attendance recorded");
    }
}

/// Source of the local date and time written to the ledger.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}
