//! attend-core: Attendance decision engine.
//!
//! Matches face embeddings against a reference gallery, deduplicates
//! sightings within a recognition session, and merges the results into a
//! per-day attendance ledger. Detection, embedding and capture sit behind
//! the traits in [`boundary`].

pub mod boundary;
pub mod gallery;
pub mod ledger;
pub mod matcher;
pub mod recognition;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;

pub use boundary::{
    CaptureSource, Clock, FaceExtractor, NotificationSink, Reference, ReferenceStore, SystemClock,
    TracingNotifier,
};
pub use gallery::{Gallery, GalleryEntry, GalleryError};
pub use ledger::{
    CsvLedgerStore, Ledger, LedgerError, LedgerRow, LedgerStore, MemoryLedgerStore, MergeOutcome,
    Status,
};
pub use matcher::{EuclideanMatcher, Matcher, MATCH_DISTANCE_THRESHOLD};
pub use recognition::{
    RecognitionError, RecognitionSession, SessionReport, StopReason, StopSignal,
    DEFAULT_SESSION_TIMEOUT,
};
pub use session::{Session, SightingOutcome};
pub use types::{
    DimensionMismatch, Embedding, FrameLocation, Identity, MatchResult, Observation, EMBEDDING_DIM,
};
