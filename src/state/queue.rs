use std::sync::Arc;

use rand::{Rng, seq::SliceRandom};

use crate::state::game::{Candidate, ViewerId};

/// Outcome of [`SessionQueue::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The cursor moved to the next candidate.
    Next,
    /// The cursor went past the last candidate and wrapped back to the first one.
    Wrapped,
    /// The queue holds no candidates; nothing moved.
    Empty,
}

/// Shuffled candidates for one viewer session plus the cursor walking through them.
///
/// An empty sequence is the "no candidates available" state, it never means a
/// cursor pointing at nothing.
#[derive(Debug, Clone, Default)]
pub struct SessionQueue {
    viewer_id: Option<ViewerId>,
    sequence: Vec<Arc<Candidate>>,
    cursor: usize,
}

impl SessionQueue {
    /// Create a queue that has not been built for any viewer yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the sequence with a fresh shuffle of `candidates` for `viewer_id`.
    pub fn rebuild(&mut self, viewer_id: ViewerId, candidates: Vec<Arc<Candidate>>) {
        let mut rng = rand::rng();
        self.rebuild_with(viewer_id, candidates, &mut rng);
    }

    /// Same as [`SessionQueue::rebuild`] with a caller supplied random source.
    pub fn rebuild_with<R: Rng + ?Sized>(
        &mut self,
        viewer_id: ViewerId,
        mut candidates: Vec<Arc<Candidate>>,
        rng: &mut R,
    ) {
        candidates.shuffle(rng);
        self.viewer_id = Some(viewer_id);
        self.sequence = candidates;
        self.cursor = 0;
    }

    /// Candidate currently on screen.
    pub fn current(&self) -> Option<&Arc<Candidate>> {
        if self.sequence.is_empty() {
            return None;
        }
        self.sequence.get(self.cursor % self.sequence.len())
    }

    /// Move to the next candidate, wrapping to the first one after the last.
    pub fn advance(&mut self) -> Advance {
        if self.sequence.is_empty() {
            return Advance::Empty;
        }

        self.cursor += 1;
        if self.cursor >= self.sequence.len() {
            self.cursor = 0;
            Advance::Wrapped
        } else {
            Advance::Next
        }
    }

    /// Viewer the queue was last built for.
    pub fn viewer_id(&self) -> Option<&str> {
        self.viewer_id.as_deref()
    }

    /// True when the last rebuild produced no candidates.
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Number of candidates in the current cycle.
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// Zero-based position inside the current cycle.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Drop every candidate and forget the viewer.
    pub fn clear(&mut self) {
        self.viewer_id = None;
        self.sequence.clear();
        self.cursor = 0;
    }
}
