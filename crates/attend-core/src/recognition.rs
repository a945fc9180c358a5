//! The recognition loop: frames in, ledger rows out.

use crate::boundary::{CaptureSource, Clock, FaceExtractor, NotificationSink};
use crate::gallery::Gallery;
use crate::ledger::{Ledger, LedgerError, LedgerStore, MergeOutcome, Status};
use crate::matcher::Matcher;
use crate::session::{Session, SightingOutcome};
use crate::types::{Identity, Observation};
use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default wall-clock bound on a recognition session.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("no usable reference faces; recognition cannot start")]
    EmptyGallery,
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Clone-safe flag used to end a session early from another thread.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Timeout,
    Cancelled,
    EndOfStream,
    CaptureFailed,
}

/// Summary of a finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub date: NaiveDate,
    pub frames: usize,
    /// Identities sighted, in first-sighting order.
    pub present: Vec<Identity>,
    /// Identities never sighted that were written as absent. Those already
    /// recorded for the day are counted in `skipped_duplicates` instead.
    pub absent: Vec<Identity>,
    /// Merges rejected because the identity already had a row for the day.
    pub skipped_duplicates: usize,
    pub stop_reason: StopReason,
}

/// Everything one recognition run needs, borrowed from the caller.
pub struct RecognitionSession<'a, const D: usize, E, M, S, N, C> {
    pub gallery: &'a Gallery<D>,
    pub extractor: &'a mut E,
    pub matcher: &'a M,
    pub ledger: &'a mut Ledger<S>,
    pub notifier: &'a N,
    pub clock: &'a C,
    pub timeout: Duration,
}

impl<'a, const D: usize, E, M, S, N, C> RecognitionSession<'a, D, E, M, S, N, C>
where
    E: FaceExtractor<D>,
    M: Matcher<D>,
    S: LedgerStore,
    N: NotificationSink,
    C: Clock,
{
    /// Run one session to completion.
    ///
    /// The stop signal and timeout are checked once per frame, before the
    /// next frame is pulled; a frame that has started processing is always
    /// finished. Absentees are written once the loop has ended.
    pub fn run<F>(
        self,
        capture: &mut F,
        stop: &StopSignal,
    ) -> Result<SessionReport, RecognitionError>
    where
        F: CaptureSource<Frame = E::Image>,
    {
        if self.gallery.is_empty() {
            return Err(RecognitionError::EmptyGallery);
        }

        let Self { gallery, extractor, matcher, ledger, notifier, clock, timeout } = self;

        let date = clock.now().date();
        let started = Instant::now();
        let mut session = Session::new();
        let mut frames = 0usize;
        let mut skipped_duplicates = 0usize;

        tracing::info!(
            %date,
            gallery = gallery.len(),
            timeout_secs = timeout.as_secs_f32(),
            "recognition session started"
        );

        let stop_reason = loop {
            if stop.is_stopped() {
                break StopReason::Cancelled;
            }
            if started.elapsed() >= timeout {
                break StopReason::Timeout;
            }

            let frame = match capture.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break StopReason::EndOfStream,
                Err(err) => {
                    tracing::warn!(error = %err, frame = frames, "capture failed; ending session");
                    break StopReason::CaptureFailed;
                }
            };
            frames += 1;

            let observations = match observe(extractor, &frame) {
                Ok(observations) => observations,
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        frame = frames,
                        "face extraction failed; skipping frame"
                    );
                    continue;
                }
            };
            tracing::debug!(frame = frames, faces = observations.len(), "frame processed");

            for observation in &observations {
                let result = matcher.compare(&observation.embedding, gallery);
                let Some(identity) = result.identity else {
                    continue;
                };

                if session.record_sighting(&identity) == SightingOutcome::AlreadySeen {
                    continue;
                }

                tracing::info!(
                    identity = %identity,
                    distance = result.distance,
                    x = observation.location.x,
                    y = observation.location.y,
                    "first sighting"
                );
                let time = clock.now().time();
                match ledger.merge_record(&identity, date, time, Status::Present)? {
                    MergeOutcome::Inserted => notifier.notify(&identity, Status::Present),
                    MergeOutcome::SkippedDuplicate => skipped_duplicates += 1,
                }
            }
        };

        let known = gallery.identities();
        let absentees = session.finalize(&known);
        let mut absent = Vec::with_capacity(absentees.len());
        for (identity, status) in absentees {
            let time = clock.now().time();
            match ledger.merge_record(&identity, date, time, status)? {
                MergeOutcome::Inserted => {
                    notifier.notify(&identity, status);
                    absent.push(identity);
                }
                MergeOutcome::SkippedDuplicate => skipped_duplicates += 1,
            }
        }

        let report = SessionReport {
            date,
            frames,
            present: session.present().to_vec(),
            absent,
            skipped_duplicates,
            stop_reason,
        };
        tracing::info!(
            frames = report.frames,
            present = report.present.len(),
            absent = report.absent.len(),
            skipped_duplicates = report.skipped_duplicates,
            stop_reason = ?report.stop_reason,
            "recognition session finished"
        );
        Ok(report)
    }
}

/// Detect and embed every face in one frame.
fn observe<const D: usize, E: FaceExtractor<D>>(
    extractor: &mut E,
    frame: &E::Image,
) -> Result<Vec<Observation<D>>, E::Error> {
    let locations = extractor.detect_faces(frame)?;
    if locations.is_empty() {
        return Ok(Vec::new());
    }
    let embeddings = extractor.embed(frame, &locations)?;
    Ok(embeddings
        .into_iter()
        .zip(locations)
        .map(|(embedding, location)| Observation { embedding, location })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::Reference;
    use crate::ledger::MemoryLedgerStore;
    use crate::matcher::EuclideanMatcher;
    use crate::testing::{
        CorruptImage, FakeExtractor, FakeImage, FixedClock, RecordingNotifier, ScriptedCapture,
    };

    const A: [f32; 2] = [0.0, 0.0];
    const B: [f32; 2] = [5.0, 0.0];
    const C: [f32; 2] = [0.0, 5.0];
    const STRANGER: [f32; 2] = [-5.0, -5.0];

    fn gallery() -> Gallery<2> {
        let refs = vec![
            Reference { identity: Identity::new("A"), image: FakeImage::faces(vec![A]) },
            Reference { identity: Identity::new("B"), image: FakeImage::faces(vec![B]) },
            Reference { identity: Identity::new("C"), image: FakeImage::faces(vec![C]) },
        ];
        Gallery::build(refs, &mut FakeExtractor)
    }

    type Frames = Vec<Result<FakeImage, CorruptImage>>;

    fn run(
        gallery: &Gallery<2>,
        ledger: &mut Ledger<MemoryLedgerStore>,
        notifier: &RecordingNotifier,
        frames: Frames,
    ) -> Result<SessionReport, RecognitionError> {
        run_until(gallery, ledger, notifier, frames, &StopSignal::new(), Duration::from_secs(60))
    }

    fn run_until(
        gallery: &Gallery<2>,
        ledger: &mut Ledger<MemoryLedgerStore>,
        notifier: &RecordingNotifier,
        frames: Frames,
        stop: &StopSignal,
        timeout: Duration,
    ) -> Result<SessionReport, RecognitionError> {
        let clock = FixedClock::at("2024-01-01", "09:00:00");
        let matcher = EuclideanMatcher::with_threshold(0.4);
        let mut extractor = FakeExtractor;
        let session = RecognitionSession {
            gallery,
            extractor: &mut extractor,
            matcher: &matcher,
            ledger,
            notifier,
            clock: &clock,
            timeout,
        };
        session.run(&mut ScriptedCapture::new(frames), stop)
    }

    #[test]
    fn test_session_marks_present_and_absent() {
        let gallery = gallery();
        let mut ledger = Ledger::new(MemoryLedgerStore::new());
        let notifier = RecordingNotifier::default();
        let frames = vec![
            Ok(FakeImage::faces(vec![[0.1, 0.0], STRANGER])),
            Ok(FakeImage::faces(vec![[0.0, 0.1]])),
            Ok(FakeImage::faces(vec![[5.1, 0.0]])),
        ];

        let report = run(&gallery, &mut ledger, &notifier, frames).unwrap();

        assert_eq!(report.stop_reason, StopReason::EndOfStream);
        assert_eq!(report.frames, 3);
        assert_eq!(report.present, vec![Identity::new("A"), Identity::new("B")]);
        assert_eq!(report.absent, vec![Identity::new("C")]);

        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let rows = ledger.rows(day).unwrap();
        let summary: Vec<(&str, Status)> =
            rows.iter().map(|r| (r.identity.as_str(), r.status)).collect();
        assert_eq!(
            summary,
            vec![("A", Status::Present), ("B", Status::Present), ("C", Status::Absent)]
        );

        // One notification per inserted row; the repeat sighting of A is silent.
        assert_eq!(notifier.events.borrow().len(), 3);
    }

    #[test]
    fn test_empty_gallery_refuses_to_start() {
        let gallery: Gallery<2> = Gallery::from_entries(Vec::new());
        let mut ledger = Ledger::new(MemoryLedgerStore::new());
        let notifier = RecordingNotifier::default();

        let err = run(&gallery, &mut ledger, &notifier, Vec::new()).unwrap_err();
        assert!(matches!(err, RecognitionError::EmptyGallery));
        assert!(notifier.events.borrow().is_empty());
    }

    #[test]
    fn test_stopped_session_processes_no_frames_but_finalizes() {
        let gallery = gallery();
        let mut ledger = Ledger::new(MemoryLedgerStore::new());
        let notifier = RecordingNotifier::default();
        let stop = StopSignal::new();
        stop.stop();

        let frames = vec![Ok(FakeImage::faces(vec![A]))];
        let report =
            run_until(&gallery, &mut ledger, &notifier, frames, &stop, Duration::from_secs(60))
                .unwrap();

        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(report.frames, 0);
        assert_eq!(report.absent.len(), 3);
    }

    #[test]
    fn test_zero_timeout_ends_before_first_frame() {
        let gallery = gallery();
        let mut ledger = Ledger::new(MemoryLedgerStore::new());
        let notifier = RecordingNotifier::default();

        let frames = vec![Ok(FakeImage::faces(vec![A]))];
        let stop = StopSignal::new();
        let report =
            run_until(&gallery, &mut ledger, &notifier, frames, &stop, Duration::ZERO).unwrap();

        assert_eq!(report.stop_reason, StopReason::Timeout);
        assert_eq!(report.frames, 0);
    }

    #[test]
    fn test_bad_frame_is_skipped() {
        let gallery = gallery();
        let mut ledger = Ledger::new(MemoryLedgerStore::new());
        let notifier = RecordingNotifier::default();

        let frames = vec![Ok(FakeImage::corrupt()), Ok(FakeImage::faces(vec![C]))];
        let report = run(&gallery, &mut ledger, &notifier, frames).unwrap();

        assert_eq!(report.frames, 2);
        assert_eq!(report.present, vec![Identity::new("C")]);
    }

    #[test]
    fn test_capture_failure_ends_session() {
        let gallery = gallery();
        let mut ledger = Ledger::new(MemoryLedgerStore::new());
        let notifier = RecordingNotifier::default();

        let frames = vec![
            Ok(FakeImage::faces(vec![A])),
            Err(CorruptImage),
            Ok(FakeImage::faces(vec![B])),
        ];
        let report = run(&gallery, &mut ledger, &notifier, frames).unwrap();

        assert_eq!(report.stop_reason, StopReason::CaptureFailed);
        assert_eq!(report.present, vec![Identity::new("A")]);
        assert_eq!(report.absent, vec![Identity::new("B"), Identity::new("C")]);
    }

    #[test]
    fn test_manual_mark_earlier_in_day_wins() {
        let gallery = gallery();
        let mut ledger = Ledger::new(MemoryLedgerStore::new());
        let notifier = RecordingNotifier::default();
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let eight = chrono::NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        ledger.merge_record(&Identity::new("B"), day, eight, Status::Leave).unwrap();

        let frames = vec![Ok(FakeImage::faces(vec![B]))];
        let report = run(&gallery, &mut ledger, &notifier, frames).unwrap();

        assert_eq!(report.present, vec![Identity::new("B")]);
        assert_eq!(report.skipped_duplicates, 1);
        let rows = ledger.rows(day).unwrap();
        let b_rows: Vec<_> = rows.iter().filter(|r| r.identity.as_str() == "B").collect();
        assert_eq!(b_rows.len(), 1);
        assert_eq!(b_rows[0].status, Status::Leave);
        // B's sighting was not announced since nothing was written.
        assert!(!notifier.events.borrow().iter().any(|(id, _)| id.as_str() == "B"));
    }

    #[test]
    fn test_absentee_on_leave_is_not_reported_absent() {
        let gallery = gallery();
        let mut ledger = Ledger::new(MemoryLedgerStore::new());
        let notifier = RecordingNotifier::default();
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let eight = chrono::NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        ledger.merge_record(&Identity::new("C"), day, eight, Status::Leave).unwrap();

        let frames = vec![Ok(FakeImage::faces(vec![A, B]))];
        let report = run(&gallery, &mut ledger, &notifier, frames).unwrap();

        assert!(report.absent.is_empty(), "absent = {:?}", report.absent);
        assert_eq!(report.skipped_duplicates, 1);
        let rows = ledger.rows(day).unwrap();
        let c_rows: Vec<_> = rows.iter().filter(|r| r.identity.as_str() == "C").collect();
        assert_eq!(c_rows.len(), 1);
        assert_eq!(c_rows[0].status, Status::Leave);
    }
}
