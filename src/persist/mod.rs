//! When to write, and how to come back.
//!
//! Two tiers: the ephemeral snapshot is rewritten wholesale whenever the
//! session configuration, the current track or the ledger changes; the
//! durable store gets per-track progress on pause and on a throttled tick.
//! This module holds the policy and the timers. The I/O lives in
//! [`crate::storage`] and [`crate::snapshot`].

use crate::ledger::{Entry, Ledger};
use crate::snapshot::Snapshot;
use crate::storage::StoredRecord;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct PersistPolicy {
    /// Minimum spacing between periodic durable saves.
    pub save_interval: Duration,
    /// Durable writes are suppressed for this long after a track starts.
    pub startup_guard: Duration,
}

impl Default for PersistPolicy {
    fn default() -> Self {
        Self {
            save_interval: Duration::from_secs(20),
            startup_guard: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Coordinator {
    policy: PersistPolicy,
    last_save: Option<Instant>,
    track_started: Option<Instant>,
}

impl Coordinator {
    pub fn new(policy: PersistPolicy) -> Self {
        Self {
            policy,
            last_save: None,
            track_started: None,
        }
    }

    /// Arm the start-up guard. Called when a track enters `Playing` and when a
    /// restored track is loaded.
    pub fn track_started(&mut self, now: Instant) {
        self.track_started = Some(now);
    }

    pub fn in_startup_guard(&self, now: Instant) -> bool {
        self.track_started
            .is_some_and(|start| now.saturating_duration_since(start) < self.policy.startup_guard)
    }

    /// Periodic save while playing: at most once per interval, never inside
    /// the start-up guard. Only a save that goes ahead restarts the interval.
    pub fn tick_due(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_save
            && now.saturating_duration_since(last) < self.policy.save_interval
        {
            return false;
        }
        if self.in_startup_guard(now) {
            return false;
        }
        self.last_save = Some(now);
        true
    }

    /// Save on pause: immediate unless inside the start-up guard.
    pub fn pause_due(&mut self, now: Instant) -> bool {
        if self.in_startup_guard(now) {
            return false;
        }
        self.last_save = Some(now);
        true
    }

    /// Duration updates are persisted as they arrive, guard permitting.
    pub fn duration_due(&self, now: Instant) -> bool {
        !self.in_startup_guard(now)
    }
}

/// Everything needed to rebuild a session at start-up.
#[derive(Debug, Default)]
pub struct Restored {
    pub ledger: Ledger,
    pub snapshot: Snapshot,
    /// Whether the ledger came from the durable store.
    pub authoritative: bool,
}

/// Merge the durable listing with the local snapshot.
///
/// The durable store decides what is in the ledger and where each track
/// resumes. The snapshot only contributes configuration and UI state. If the
/// durable read failed the snapshot's ledger is used as a fallback.
pub fn restore(durable: anyhow::Result<Vec<StoredRecord>>, snapshot: Option<Snapshot>) -> Restored {
    let mut snapshot = snapshot.unwrap_or_default();
    let local_entries = std::mem::take(&mut snapshot.entries);

    match durable {
        Ok(records) => {
            let ledger = Ledger::from_entries(records.into_iter().map(StoredRecord::into_entry));
            if ledger.is_empty() {
                tracing::info!("no play history yet");
            } else {
                tracing::info!(records = ledger.len(), "restored ledger from durable store");
            }
            Restored {
                ledger,
                snapshot,
                authoritative: true,
            }
        }
        Err(e) => {
            let error = format!("{e:#}");
            tracing::warn!(%error, "durable store unavailable, using local snapshot");
            Restored {
                ledger: Ledger::from_entries(local_entries),
                snapshot,
                authoritative: false,
            }
        }
    }
}

/// Durable payload for `entry` at the given playback position.
pub fn payload(entry: &Entry, offset: f64, duration: f64, now_ms: i64) -> StoredRecord {
    let mut record = StoredRecord::from_entry(entry, now_ms);
    if offset.is_finite() {
        record.play_time = offset.max(0.0);
    }
    if duration.is_finite() && duration > 0.0 {
        record.duration = duration;
    }
    record
}
