//! Play record ledger
//!
//! One entry per `(platform, id)`: the track as it was first resolved plus
//! its playback record. Recency order is not kept in the backing vector; it
//! is computed on demand by [`Ledger::ordered_view`], and the queue is always
//! a projection of that view, so the two can never drift apart.

use crate::catalog::{Track, TrackKey};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayRecord {
    /// Resume point in seconds, never negative.
    pub offset: f64,
    /// Last duration the element reported; 0 until metadata arrives.
    pub duration: f64,
    /// Last interaction, epoch milliseconds. Orders the history and versions
    /// durable writes.
    pub stamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub track: Track,
    pub record: PlayRecord,
}

impl Entry {
    pub fn key(&self) -> TrackKey {
        self.track.key()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entries: Vec<Entry>,
    last_stamp: i64,
    dirty: bool,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries. Later duplicates of a key are dropped.
    pub fn from_entries(entries: impl IntoIterator<Item = Entry>) -> Self {
        let mut ledger = Self::new();
        for entry in entries {
            if ledger.position(&entry.key()).is_some() {
                continue;
            }
            ledger.last_stamp = ledger.last_stamp.max(entry.record.stamp);
            ledger.entries.push(entry);
        }
        ledger
    }

    /// Record an interaction with `track`.
    ///
    /// A known key only gets a fresh timestamp, so its resume point and
    /// duration survive a replay. An unknown key is appended with
    /// `initial_offset`.
    pub fn upsert(&mut self, track: Track, initial_offset: f64, now_ms: i64) -> &Entry {
        let stamp = self.next_stamp(now_ms);
        self.dirty = true;

        let idx = match self.position(&track.key()) {
            Some(idx) => {
                self.entries[idx].record.stamp = stamp;
                idx
            }
            None => {
                self.entries.push(Entry {
                    track,
                    record: PlayRecord {
                        offset: sanitize(initial_offset),
                        duration: 0.0,
                        stamp,
                    },
                });
                self.entries.len() - 1
            }
        };
        &self.entries[idx]
    }

    /// Returns false when the key is unknown.
    pub fn update_offset(&mut self, key: &TrackKey, offset_secs: f64) -> bool {
        if !offset_secs.is_finite() {
            return false;
        }
        self.update(key, |r| r.offset = sanitize(offset_secs))
    }

    /// Returns false when the key is unknown.
    pub fn update_duration(&mut self, key: &TrackKey, duration_secs: f64) -> bool {
        if !duration_secs.is_finite() {
            return false;
        }
        self.update(key, |r| r.duration = sanitize(duration_secs))
    }

    /// Artwork is the one track field that may change after the first
    /// resolution.
    pub fn set_artwork(&mut self, key: &TrackKey, pic: String) -> bool {
        match self.position(key) {
            Some(idx) => {
                self.entries[idx].track.pic = Some(pic);
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, key: &TrackKey) -> Option<Entry> {
        let idx = self.position(key)?;
        self.dirty = true;
        Some(self.entries.remove(idx))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.dirty = true;
    }

    /// Replace everything with `tracks`, zero offsets, stamped so that the
    /// first track is the most recent.
    pub fn replace_all(&mut self, tracks: Vec<Track>, base_ms: i64) {
        let base = self.next_stamp(base_ms);
        let n = tracks.len() as i64;
        self.entries = tracks
            .into_iter()
            .enumerate()
            .map(|(i, track)| Entry {
                track,
                record: PlayRecord {
                    offset: 0.0,
                    duration: 0.0,
                    stamp: base + (n - 1 - i as i64),
                },
            })
            .collect();
        self.last_stamp = self.last_stamp.max(base + n - 1);
        self.dirty = true;
    }

    /// Entries, most recent first. Ties keep insertion order.
    pub fn ordered_view(&self) -> Vec<&Entry> {
        let mut view: Vec<&Entry> = self.entries.iter().collect();
        view.sort_by(|a, b| b.record.stamp.cmp(&a.record.stamp));
        view
    }

    /// The "continue listening" queue: tracks in [`Self::ordered_view`] order.
    pub fn queue(&self) -> Vec<Track> {
        self.ordered_view().into_iter().map(|e| e.track.clone()).collect()
    }

    pub fn keys_by_recency(&self) -> Vec<TrackKey> {
        self.queue().iter().map(Track::key).collect()
    }

    pub fn get(&self, key: &TrackKey) -> Option<&Entry> {
        self.position(key).map(|i| &self.entries[i])
    }

    pub fn contains(&self, key: &TrackKey) -> bool {
        self.position(key).is_some()
    }

    /// Backing order, for persistence.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clear the dirty flag, returning whether it was set.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    fn position(&self, key: &TrackKey) -> Option<usize> {
        self.entries.iter().position(|e| e.track.is(key))
    }

    fn update(&mut self, key: &TrackKey, f: impl FnOnce(&mut PlayRecord)) -> bool {
        match self.position(key) {
            Some(idx) => {
                f(&mut self.entries[idx].record);
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Wall-clock stamps can repeat or step backwards; ordering must not.
    fn next_stamp(&mut self, now_ms: i64) -> i64 {
        let stamp = now_ms.max(self.last_stamp + 1);
        self.last_stamp = stamp;
        stamp
    }
}

fn sanitize(secs: f64) -> f64 {
    if secs.is_finite() { secs.max(0.0) } else { 0.0 }
}
