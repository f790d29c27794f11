//! Synchronised lyrics for the active track
//!
//! This module provides:
//! - A parser for time-tagged lyric text
//! - A cursor that follows playback time and reports the active cue

pub mod parser;

pub use parser::{LyricCue, active_index, parse};

/// Cues for the current track plus the position of the playback cursor.
///
/// Time normally only moves forward, so `tick` scans onward from the last
/// active cue. A backwards jump (seek, restart) triggers a full rescan.
#[derive(Debug, Clone, Default)]
pub struct LyricTrack {
    cues: Vec<LyricCue>,
    index: Option<usize>,
    last_time: f64,
}

impl LyricTrack {
    pub fn load(raw: &str) -> Self {
        Self {
            cues: parse(raw),
            ..Self::default()
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn cues(&self) -> &[LyricCue] {
        &self.cues
    }

    pub fn active(&self) -> Option<usize> {
        self.index
    }

    pub fn active_cue(&self) -> Option<&LyricCue> {
        self.index.and_then(|i| self.cues.get(i))
    }

    /// Rescan from the start, e.g. after a seek.
    pub fn seek(&mut self, current_time: f64) -> Option<usize> {
        self.index = active_index(&self.cues, current_time);
        self.last_time = current_time;
        self.index
    }

    /// Follow a playback-time tick and return the active cue index.
    pub fn tick(&mut self, current_time: f64) -> Option<usize> {
        if current_time < self.last_time || self.index.is_some_and(|i| i >= self.cues.len()) {
            return self.seek(current_time);
        }

        let mut next = self.index.map_or(0, |i| i + 1);
        while next < self.cues.len() && self.cues[next].time <= current_time {
            self.index = Some(next);
            next += 1;
        }
        self.last_time = current_time;
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_matches_binary_search_when_moving_forward() {
        let mut track = LyricTrack::load("[00:01.00]a\n[00:02.50]b\n[00:04.00]c");
        for t in [0.0, 0.5, 1.0, 2.0, 2.5, 3.9, 4.0, 10.0] {
            assert_eq!(track.tick(t), active_index(track.cues(), t), "t={t}");
        }
    }

    #[test]
    fn backwards_jump_rescans() {
        let mut track = LyricTrack::load("[00:01.00]a\n[00:02.00]b\n[00:03.00]c");
        assert_eq!(track.tick(3.5), Some(2));
        assert_eq!(track.tick(0.2), None);
        assert_eq!(track.tick(1.5), Some(0));
        assert_eq!(track.active_cue().map(|c| c.text.as_str()), Some("a"));
    }

    #[test]
    fn clear_drops_cues_and_cursor() {
        let mut track = LyricTrack::load("[00:01.00]a");
        track.tick(5.0);
        track.clear();
        assert!(track.cues().is_empty());
        assert_eq!(track.active(), None);
        assert_eq!(track.tick(5.0), None);
    }
}
