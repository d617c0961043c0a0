//! # Replay Buffer
//!
//! Ring-style cursor over persisted readings. Loading sorts ascending by
//! timestamp and keeps only the most recent [`REPLAY_CAPACITY`] entries; the
//! cursor then walks oldest to newest and wraps around indefinitely.

use crate::readings::Reading;

/// Maximum number of readings replayed per cycle.
pub const REPLAY_CAPACITY: usize = 1_000;

#[derive(Debug, Default)]
pub struct ReplayBuffer {
    entries: Vec<Reading>,
    cursor: usize,
}

impl ReplayBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the buffer contents and rewinds the cursor.
    ///
    /// Entries are sorted by timestamp ascending; when more than
    /// [`REPLAY_CAPACITY`] are supplied, only the newest survive.
    pub fn load(&mut self, mut entries: Vec<Reading>) {
        entries.sort_by_key(|r| r.timestamp);
        if entries.len() > REPLAY_CAPACITY {
            let excess = entries.len() - REPLAY_CAPACITY;
            entries.drain(..excess);
        }
        self.entries = entries;
        self.cursor = 0;
    }

    /// Next reading in timestamp order, wrapping to the oldest after the
    /// newest. `None` when nothing is loaded.
    pub fn next(&mut self) -> Option<Reading> {
        if self.entries.is_empty() {
            return None;
        }
        let reading = self.entries[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.entries.len();
        Some(reading)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(ts: i64) -> Reading {
        Reading {
            timestamp: ts,
            sensor_ppm: ts as f64 * 1.5,
            normalized_aqi: ts as f64,
        }
    }

    #[test]
    fn empty_buffer_yields_nothing() {
        let mut buffer = ReplayBuffer::new();
        assert!(buffer.next().is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn load_sorts_by_timestamp_ascending() {
        let mut buffer = ReplayBuffer::new();
        buffer.load(vec![reading(30), reading(10), reading(20)]);
        let order: Vec<i64> = (0..3).filter_map(|_| buffer.next()).map(|r| r.timestamp).collect();
        assert_eq!(order, vec![10, 20, 30]);
    }

    #[test]
    fn cursor_wraps_after_newest() {
        let mut buffer = ReplayBuffer::new();
        buffer.load(vec![reading(1), reading(2), reading(3)]);
        let order: Vec<i64> = (0..7).filter_map(|_| buffer.next()).map(|r| r.timestamp).collect();
        assert_eq!(order, vec![1, 2, 3, 1, 2, 3, 1]);
    }

    #[test]
    fn keeps_only_the_newest_at_capacity() {
        let mut buffer = ReplayBuffer::new();
        let entries: Vec<Reading> = (0..REPLAY_CAPACITY as i64 + 500).map(reading).collect();
        buffer.load(entries);
        assert_eq!(buffer.len(), REPLAY_CAPACITY);
        // the 500 oldest were discarded
        assert_eq!(buffer.next().map(|r| r.timestamp), Some(500));
    }

    #[test]
    fn reload_replaces_contents_and_rewinds() {
        let mut buffer = ReplayBuffer::new();
        buffer.load(vec![reading(10), reading(20), reading(30)]);
        buffer.next();
        buffer.next();
        buffer.load(vec![reading(100), reading(200)]);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.next().map(|r| r.timestamp), Some(100));
    }

    #[test]
    fn clear_drops_everything() {
        let mut buffer = ReplayBuffer::new();
        buffer.load(vec![reading(1)]);
        buffer.clear();
        assert!(buffer.next().is_none());
        assert_eq!(buffer.len(), 0);
    }
}
