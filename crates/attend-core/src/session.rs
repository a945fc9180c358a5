//! Per-session sighting tracker.

use crate::ledger::Status;
use crate::types::Identity;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SightingOutcome {
    /// First time this identity was seen in the session.
    FirstSighting,
    AlreadySeen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Populated,
    Closed,
}

/// Identities confirmed present during one recognition run.
///
/// Grows monotonically until [`finalize`](Session::finalize), after which the
/// session is closed and any further use panics.
#[derive(Debug, Default)]
pub struct Session {
    seen: HashSet<Identity>,
    /// Sighting order, for reporting.
    order: Vec<Identity>,
    closed: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        if self.closed {
            SessionState::Closed
        } else if self.seen.is_empty() {
            SessionState::Empty
        } else {
            SessionState::Populated
        }
    }

    /// Record a confirmed match.
    ///
    /// # Panics
    ///
    /// Panics if the session has already been finalized.
    pub fn record_sighting(&mut self, identity: &Identity) -> SightingOutcome {
        assert!(
            !self.closed,
            "record_sighting({identity}) called on a finalized session"
        );

        if self.seen.insert(identity.clone()) {
            self.order.push(identity.clone());
            SightingOutcome::FirstSighting
        } else {
            SightingOutcome::AlreadySeen
        }
    }

    pub fn is_present(&self, identity: &Identity) -> bool {
        self.seen.contains(identity)
    }

    /// Identities sighted so far, in first-sighting order.
    pub fn present(&self) -> &[Identity] {
        &self.order
    }

    /// Close the session and list every known identity that was never sighted.
    ///
    /// Output follows `known` order; duplicates in `known` are reported once.
    ///
    /// # Panics
    ///
    /// Panics if called more than once.
    pub fn finalize<'a, I>(&mut self, known: I) -> Vec<(Identity, Status)>
    where
        I: IntoIterator<Item = &'a Identity>,
    {
        assert!(!self.closed, "finalize called twice on the same session");
        self.closed = true;

        let mut reported = HashSet::new();
        known
            .into_iter()
            .filter(|id| !self.seen.contains(*id) && reported.insert(*id))
            .map(|id| (id.clone(), Status::Absent))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(label: &str) -> Identity {
        Identity::new(label)
    }

    #[test]
    fn test_repeat_sighting_is_already_seen() {
        let mut session = Session::new();
        let outcomes = vec![
            session.record_sighting(&id("A")),
            session.record_sighting(&id("A")),
        ];
        assert_eq!(outcomes, vec![SightingOutcome::FirstSighting, SightingOutcome::AlreadySeen]);

        let absent = session.finalize(&[id("A"), id("B")]);
        assert_eq!(absent, vec![(id("B"), Status::Absent)]);
    }

    #[test]
    fn test_only_first_of_many_sightings_counts() {
        let mut session = Session::new();
        let first = session.record_sighting(&id("A"));
        assert_eq!(first, SightingOutcome::FirstSighting);
        for _ in 0..20 {
            assert_eq!(session.record_sighting(&id("A")), SightingOutcome::AlreadySeen);
        }
        assert_eq!(session.present(), &[id("A")]);
    }

    #[test]
    fn test_finalize_emits_one_absent_per_unseen_identity() {
        let mut session = Session::new();
        session.record_sighting(&id("B"));

        let known = [id("A"), id("B"), id("C"), id("A")];
        let absent = session.finalize(&known);
        assert_eq!(absent, vec![(id("A"), Status::Absent), (id("C"), Status::Absent)]);
    }

    #[test]
    fn test_state_transitions() {
        let mut session = Session::new();
        assert_eq!(session.state(), SessionState::Empty);
        session.record_sighting(&id("A"));
        assert_eq!(session.state(), SessionState::Populated);
        session.finalize(&[id("A")]);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_empty_session_finalize_marks_everyone_absent() {
        let mut session = Session::new();
        let absent = session.finalize(&[id("A"), id("B")]);
        assert_eq!(absent.len(), 2);
    }

    #[test]
    #[should_panic(expected = "finalized session")]
    fn test_sighting_after_finalize_panics() {
        let mut session = Session::new();
        session.finalize(&[id("A")]);
        session.record_sighting(&id("A"));
    }

    #[test]
    #[should_panic(expected = "finalize called twice")]
    fn test_double_finalize_panics() {
        let mut session = Session::new();
        session.finalize(&[id("A")]);
        session.finalize(&[id("A")]);
    }
}
