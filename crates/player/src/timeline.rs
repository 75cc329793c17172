//! Global timeline over independently loaded chunks
//!
//! Chunk durations are only known once a chunk has been loaded. Until then a
//! constant estimate stands in, so the total converges on the real length as
//! playback progresses.

use std::time::Duration;

/// Per-chunk durations, probed or estimated
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    durations: Vec<Option<Duration>>,
    placeholder: Duration,
}

impl Timeline {
    pub fn new(total_chunks: usize, placeholder: Duration) -> Self {
        Self {
            durations: vec![None; total_chunks],
            placeholder,
        }
    }

    pub fn len(&self) -> usize {
        self.durations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    /// Record the real duration of a chunk
    pub fn set_duration(&mut self, index: usize, duration: Duration) {
        if let Some(slot) = self.durations.get_mut(index) {
            *slot = Some(duration);
        }
    }

    pub fn is_probed(&self, index: usize) -> bool {
        matches!(self.durations.get(index), Some(Some(_)))
    }

    /// Real duration if probed, the estimate otherwise
    pub fn duration(&self, index: usize) -> Duration {
        match self.durations.get(index) {
            Some(Some(d)) => *d,
            Some(None) => self.placeholder,
            None => Duration::ZERO,
        }
    }

    pub fn durations(&self) -> Vec<Duration> {
        (0..self.len()).map(|i| self.duration(i)).collect()
    }

    /// Start of chunk `index` on the global timeline
    pub fn offset_of(&self, index: usize) -> Duration {
        (0..index.min(self.len())).map(|i| self.duration(i)).sum()
    }

    pub fn total(&self) -> Duration {
        self.offset_of(self.len())
    }

    /// Translate a global time into `(chunk index, offset within chunk)`
    ///
    /// Walks the durations accumulating until the chunk containing `target`
    /// is found. Targets at or past the end land at the end of the last
    /// chunk.
    pub fn locate(&self, target: Duration) -> Option<(usize, Duration)> {
        if self.is_empty() {
            return None;
        }

        let mut start = Duration::ZERO;
        for index in 0..self.len() {
            let end = start + self.duration(index);
            if target < end {
                return Some((index, target.saturating_sub(start)));
            }
            start = end;
        }

        let last = self.len() - 1;
        Some((last, self.duration(last)))
    }
}
