use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use std::collections::VecDeque;
use tracing::{debug, info};

/// One requested track. Immutable once queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioEntry {
    audio_ref: String,
    requested_by: String,
    queued_at: DateTime<Utc>,
}

impl AudioEntry {
    pub fn new(audio_ref: impl Into<String>, requested_by: impl Into<String>) -> Self {
        Self {
            audio_ref: audio_ref.into(),
            requested_by: requested_by.into(),
            queued_at: Utc::now(),
        }
    }

    // Getters
    pub fn audio_ref(&self) -> &str {
        &self.audio_ref
    }
    pub fn requested_by(&self) -> &str {
        &self.requested_by
    }
    pub fn queued_at(&self) -> DateTime<Utc> {
        self.queued_at
    }
}

/// Per-guild queue state.
///
/// `current` holds the entry a drain loop dequeued and is still playing.
/// `draining` marks that a drain loop owns the guild; it is claimed and
/// released under the same lock as the entries so two loops can never
/// run for one guild.
#[derive(Debug, Default)]
pub struct QueueState {
    entries: VecDeque<AudioEntry>,
    current: Option<AudioEntry>,
    looping: bool,
    draining: bool,
    retired: bool,
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un entry al final de la cola
    pub fn push_back(&mut self, entry: AudioEntry) {
        debug!("➕ Queued {} (requested by {})", entry.audio_ref, entry.requested_by);
        self.entries.push_back(entry);
    }

    /// Removes the head and makes it `current`. An empty queue clears `current`.
    pub fn pop_front(&mut self) -> Option<AudioEntry> {
        if self.retired {
            self.current = None;
            return None;
        }

        match self.entries.pop_front() {
            Some(entry) => {
                self.current = Some(entry.clone());
                Some(entry)
            }
            None => {
                self.current = None;
                None
            }
        }
    }

    /// Ends playback of `current`.
    ///
    /// With loop on the finished entry goes back to the tail. If the queue
    /// was cleared mid-playback there is nothing to finish.
    pub fn finish_current(&mut self) {
        if let Some(finished) = self.current.take() {
            if self.looping && !self.retired {
                info!("🔁 Re-queued at tail by loop: {}", finished.audio_ref);
                self.entries.push_back(finished);
            }
        }
    }

    pub fn clear(&mut self) {
        let cleared = self.entries.len();
        self.entries.clear();
        self.current = None;
        info!("🗑️ Queue cleared: {} entries removed", cleared);
    }

    pub fn clear_current(&mut self) {
        self.current = None;
    }

    /// Mezcla la cola (sin tocar `current`)
    pub fn shuffle(&mut self) {
        let mut rng = rand::thread_rng();
        self.entries.make_contiguous().shuffle(&mut rng);
        info!("🔀 Queue shuffled ({} entries)", self.entries.len());
    }

    pub fn toggle_loop(&mut self) -> bool {
        self.looping = !self.looping;
        if self.looping {
            info!("🔁 Loop enabled");
        } else {
            info!("➡️ Loop disabled");
        }
        self.looping
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn current(&self) -> Option<&AudioEntry> {
        self.current.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Claims the guild for a new drain loop. Returns `false` if one already runs.
    pub(crate) fn claim_drain(&mut self) -> bool {
        if self.draining || self.retired {
            return false;
        }
        self.draining = true;
        true
    }

    pub(crate) fn release_drain(&mut self) {
        self.draining = false;
    }

    pub(crate) fn is_draining(&self) -> bool {
        self.draining
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired
    }

    /// Pops the next entry for the drain loop, releasing its claim when the
    /// queue is empty so the release and the emptiness check are one step.
    pub(crate) fn next_for_drain(&mut self) -> Option<AudioEntry> {
        let next = self.pop_front();
        if next.is_none() {
            self.draining = false;
        }
        next
    }

    /// Marks the guild as torn down. A drain loop still holding this state
    /// sees an empty queue on its next pop.
    pub(crate) fn retire(&mut self) {
        self.retired = true;
        self.entries.clear();
        self.current = None;
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            entries: self.entries.iter().cloned().collect(),
            current: self.current.clone(),
            looping: self.looping,
        }
    }
}

/// Deep copy of a guild queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub entries: Vec<AudioEntry>,
    pub current: Option<AudioEntry>,
    pub looping: bool,
}

impl QueueSnapshot {
    pub fn audio_refs(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.audio_ref()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.current.is_none()
    }
}
