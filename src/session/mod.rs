//! Playback session controller.
//!
//! A synchronous state machine: every input (user action, media element
//! event, resolution result, window message) mutates the session and
//! returns the [`Effect`]s the runtime must carry out. No I/O happens here,
//! which keeps ordering explicit and makes every transition testable.
//!
//! `Idle -> Resolving -> Playing <-> Paused -> Ended`, with `Failed`
//! reachable from `Resolving`.

pub mod state;

use crate::catalog::{Platform, ProxyRule, Quality, Resolution, ResolveError, ResolveRequest, Track, TrackKey};
use crate::ledger::Ledger;
use crate::lyrics::LyricTrack;
use crate::notifier::{InboundMessage, Mirror, Notifier, OutboundMessage, WindowUpdate};
use crate::persist::{self, Coordinator, PersistPolicy, Restored};
use crate::queue::{self, Queue};
use crate::snapshot::Snapshot;
use crate::storage::StoredRecord;
use rand::Rng;
use state::{BrowseView, PlayMode, PlayOrigin, PlaybackState, SessionConfig};
use std::time::Instant;

/// Commands for the single media element.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaCommand {
    ClearSource,
    Load { url: String, autoplay: bool },
    Play,
    Pause,
    Seek(f64),
    Volume(u8),
}

/// Writes for the durable store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCommand {
    Upsert(StoredRecord),
    Delete(TrackKey),
    DeleteAll,
    /// `DeleteAll` followed by one batch insert.
    ReplaceAll(Vec<StoredRecord>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Media(MediaCommand),
    Resolve(ResolveRequest),
    Store(StoreCommand),
    /// Rewrite the ephemeral snapshot from [`Session::snapshot`].
    Snapshot,
    Window(OutboundMessage),
}

/// A point in time on both clocks the session cares about.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    /// For throttling and the start-up guard.
    pub mono: Instant,
    /// Epoch milliseconds, for record stamps.
    pub wall_ms: i64,
}

impl Clock {
    pub fn now() -> Self {
        let wall = time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        Self {
            mono: Instant::now(),
            wall_ms: wall as i64,
        }
    }

    #[cfg(test)]
    pub fn after(self, d: std::time::Duration) -> Self {
        Self {
            mono: self.mono + d,
            wall_ms: self.wall_ms + d.as_millis() as i64,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Forward,
    Back,
}

#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    ledger: Ledger,
    queue: Queue,
    browse: Vec<Track>,
    browse_index: Option<usize>,

    current: Option<Track>,
    state: PlaybackState,
    stream_url: Option<String>,
    position: f64,
    duration: f64,
    lyrics: LyricTrack,

    /// The resolution whose result is still wanted, and whether it should
    /// start playing on arrival.
    target: Option<(ResolveRequest, bool)>,
    next_ticket: u64,
    /// Resume point to apply once the element reports metadata.
    pending_seek: Option<f64>,

    persist: Coordinator,
    notifier: Notifier,
    proxy: ProxyRule,
}

impl Session {
    pub fn new(policy: PersistPolicy, proxy: ProxyRule) -> Self {
        Self {
            config: SessionConfig::default(),
            ledger: Ledger::new(),
            queue: Queue::new(),
            browse: Vec::new(),
            browse_index: None,
            current: None,
            state: PlaybackState::Idle,
            stream_url: None,
            position: 0.0,
            duration: 0.0,
            lyrics: LyricTrack::default(),
            target: None,
            next_ticket: 1,
            pending_seek: None,
            persist: Coordinator::new(policy),
            notifier: Notifier::default(),
            proxy,
        }
    }

    /// Rebuild a session from the start-up read. The most recent record
    /// becomes the current track and is resolved without autoplay; its stored
    /// offset is applied once metadata arrives.
    pub fn restore(restored: Restored, policy: PersistPolicy, proxy: ProxyRule, at: Clock) -> (Self, Vec<Effect>) {
        let mut session = Self::new(policy, proxy);
        let Restored { ledger, snapshot, .. } = restored;

        session.config = snapshot.config;
        session.config.volume = session.config.volume.min(100);
        session.browse = snapshot.browse;
        session.notifier = Notifier::new(snapshot.window);
        session.ledger = ledger;
        session.ledger.take_dirty();
        session.queue.rebuild(&session.ledger);

        let mut effects = vec![Effect::Media(MediaCommand::Volume(session.config.volume))];

        let latest = session.ledger.ordered_view().first().map(|e| (*e).clone());
        if let Some(entry) = latest {
            session.queue.set_current(Some(0));
            session.current = Some(entry.track.clone());
            session.state = PlaybackState::Resolving;
            session.pending_seek = (entry.record.offset > 0.0).then_some(entry.record.offset);
            session.persist.track_started(at.mono);
            let req = session.issue(entry.key(), false);
            tracing::info!(track = %req.key, resume = entry.record.offset, "restoring last session");
            effects.push(Effect::Resolve(req));
        }

        (session, effects)
    }

    // ---- accessors ----

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn browse(&self) -> &[Track] {
        &self.browse
    }

    pub fn browse_index(&self) -> Option<usize> {
        self.browse_index
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn stream_url(&self) -> Option<&str> {
        self.stream_url.as_deref()
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn lyrics(&self) -> &LyricTrack {
        &self.lyrics
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            config: self.config.clone(),
            browse: self.browse.clone(),
            entries: self.ledger.entries().to_vec(),
            queue: self.queue.keys().to_vec(),
            queue_index: self.queue.current_index(),
            current: self.current.clone(),
            window: self.notifier.prefs().clone(),
        }
    }

    // ---- playback ----

    /// Start `track`. Supersedes any resolution still in flight.
    pub fn play(&mut self, track: Track, origin: PlayOrigin, at: Clock) -> Vec<Effect> {
        let key = track.key();
        let is_new = !self.ledger.contains(&key);
        self.ledger.upsert(track.clone(), 0.0, at.wall_ms);

        if is_new {
            self.queue.rebuild(&self.ledger);
        }
        match origin {
            PlayOrigin::Queue(i) if self.queue.get(i) == Some(&key) => {
                self.queue.set_current(Some(i));
                self.browse_index = None;
            }
            PlayOrigin::Browse(i) => {
                self.queue.set_current_key(&key);
                self.browse_index = Some(i);
            }
            PlayOrigin::Queue(_) | PlayOrigin::Direct => {
                self.queue.set_current_key(&key);
                self.browse_index = None;
            }
        }

        self.current = Some(track);
        self.state = PlaybackState::Resolving;
        self.stream_url = None;
        self.position = 0.0;
        self.duration = 0.0;
        self.pending_seek = None;
        self.lyrics.clear();

        let req = self.issue(key, true);
        tracing::debug!(track = %req.key, quality = %req.quality, ticket = req.ticket, "resolving");

        let effects = vec![
            Effect::Media(MediaCommand::ClearSource),
            Effect::Resolve(req),
            Effect::Snapshot,
        ];
        self.finish(effects)
    }

    /// Apply a resolution result. Results for anything but the current
    /// target are dropped.
    pub fn on_resolved(
        &mut self,
        req: &ResolveRequest,
        result: Result<Resolution, ResolveError>,
        at: Clock,
    ) -> Vec<Effect> {
        let autoplay = match &self.target {
            Some((target, autoplay)) if target == req => *autoplay,
            _ => {
                tracing::debug!(track = %req.key, ticket = req.ticket, "discarding superseded resolution");
                return Vec::new();
            }
        };
        self.target = None;

        let resolution = match result {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(track = %req.key, error = %e, "resolution failed");
                self.state = PlaybackState::Failed;
                self.pending_seek = None;
                return self.finish(Vec::new());
            }
        };

        let platform = req.key.platform;
        let url = self.proxy.rewrite(platform, &resolution.url);
        let mut effects = Vec::new();

        if let Some(cover) = resolution.cover.as_deref() {
            let pic = self.proxy.rewrite(platform, cover);
            if let Some(track) = self.current.as_mut() {
                track.pic = Some(pic.clone());
            }
            self.ledger.set_artwork(&req.key, pic);
            effects.push(Effect::Snapshot);
        }
        if let Some(raw) = resolution.lyrics.as_deref() {
            self.lyrics = LyricTrack::load(raw);
        }

        self.stream_url = Some(url.clone());
        self.state = if autoplay { PlaybackState::Playing } else { PlaybackState::Paused };
        self.persist.track_started(at.mono);
        tracing::info!(track = %req.key, cues = self.lyrics.cues().len(), autoplay, "stream ready");

        effects.insert(0, Effect::Media(MediaCommand::Load { url, autoplay }));
        self.finish(effects)
    }

    /// Flip between playing and paused. Pausing saves progress.
    pub fn toggle_play(&mut self, at: Clock) -> Vec<Effect> {
        match self.state {
            PlaybackState::Playing => {
                self.state = PlaybackState::Paused;
                let mut effects = vec![Effect::Media(MediaCommand::Pause), Effect::Snapshot];
                effects.extend(self.save_on_pause(at));
                self.finish(effects)
            }
            PlaybackState::Paused => {
                self.state = PlaybackState::Playing;
                self.finish(vec![Effect::Media(MediaCommand::Play)])
            }
            PlaybackState::Ended => {
                let effects = self.restart();
                self.finish(effects)
            }
            PlaybackState::Idle | PlaybackState::Resolving | PlaybackState::Failed => Vec::new(),
        }
    }

    /// The element paused or resumed on its own (or echoed our command).
    pub fn on_pause_changed(&mut self, paused: bool, at: Clock) -> Vec<Effect> {
        match (paused, self.state) {
            (true, PlaybackState::Playing) => {
                self.state = PlaybackState::Paused;
                let mut effects = vec![Effect::Snapshot];
                effects.extend(self.save_on_pause(at));
                self.finish(effects)
            }
            (false, PlaybackState::Paused) => {
                self.state = PlaybackState::Playing;
                self.finish(Vec::new())
            }
            _ => Vec::new(),
        }
    }

    pub fn on_time_update(&mut self, position: f64, at: Clock) -> Vec<Effect> {
        if !position.is_finite() || self.stream_url.is_none() {
            return Vec::new();
        }
        self.position = position.max(0.0);
        self.lyrics.tick(self.position);

        let mut effects = Vec::new();
        let active = matches!(self.state, PlaybackState::Playing | PlaybackState::Paused);
        if active && self.persist.tick_due(at.mono) {
            effects.extend(self.save_progress(at));
        }
        self.finish(effects)
    }

    pub fn on_duration(&mut self, duration: f64, at: Clock) -> Vec<Effect> {
        if !duration.is_finite() || duration <= 0.0 || self.stream_url.is_none() {
            return Vec::new();
        }
        self.duration = duration;
        let mut effects = Vec::new();

        if let Some(offset) = self.pending_seek.take() {
            let offset = offset.min(duration);
            self.position = offset;
            self.lyrics.seek(offset);
            effects.push(Effect::Media(MediaCommand::Seek(offset)));
        }

        if self.persist.duration_due(at.mono)
            && let Some(key) = self.current.as_ref().map(Track::key)
            && self.ledger.update_duration(&key, duration)
            && let Some(entry) = self.ledger.get(&key)
        {
            let record = persist::payload(entry, entry.record.offset, duration, at.wall_ms);
            effects.push(Effect::Store(StoreCommand::Upsert(record)));
        }
        self.finish(effects)
    }

    /// End of track: dispatch on the play mode.
    pub fn on_ended(&mut self, rng: &mut impl Rng, at: Clock) -> Vec<Effect> {
        if !matches!(self.state, PlaybackState::Playing | PlaybackState::Paused) {
            return Vec::new();
        }
        self.state = PlaybackState::Ended;

        match self.config.mode {
            PlayMode::SingleRepeat => {
                let effects = self.restart();
                self.finish(effects)
            }
            PlayMode::Random => {
                if let Some(i) = self.queue.random_index(&mut *rng) {
                    self.play_queue_index(i, at)
                } else if let Some(i) = queue::random_index(self.browse.len(), rng) {
                    self.play_browse_index(i, at)
                } else {
                    self.finish(Vec::new())
                }
            }
            PlayMode::Sequential => self.advance(Direction::Forward, at),
        }
    }

    pub fn next(&mut self, at: Clock) -> Vec<Effect> {
        self.advance(Direction::Forward, at)
    }

    pub fn previous(&mut self, at: Clock) -> Vec<Effect> {
        self.advance(Direction::Back, at)
    }

    /// Play the queue entry at `index`.
    pub fn play_queue_index(&mut self, index: usize, at: Clock) -> Vec<Effect> {
        let track = self
            .queue
            .get(index)
            .and_then(|key| self.ledger.get(key))
            .map(|entry| entry.track.clone());
        match track {
            Some(track) => self.play(track, PlayOrigin::Queue(index), at),
            None => {
                tracing::warn!(index, "queue index does not match the ledger, unsetting");
                self.queue.set_current(None);
                Vec::new()
            }
        }
    }

    /// Play the browse list entry at `index`.
    pub fn play_browse_index(&mut self, index: usize, at: Clock) -> Vec<Effect> {
        match self.browse.get(index).cloned() {
            Some(track) => self.play(track, PlayOrigin::Browse(index), at),
            None => Vec::new(),
        }
    }

    pub fn seek(&mut self, position: f64) -> Vec<Effect> {
        if !position.is_finite() || self.stream_url.is_none() {
            return Vec::new();
        }
        let mut position = position.max(0.0);
        if self.duration > 0.0 {
            position = position.min(self.duration);
        }
        self.position = position;
        self.lyrics.seek(position);
        self.finish(vec![Effect::Media(MediaCommand::Seek(position))])
    }

    // ---- configuration ----

    pub fn set_volume(&mut self, volume: u8) -> Vec<Effect> {
        self.config.volume = volume.min(100);
        self.finish(vec![
            Effect::Media(MediaCommand::Volume(self.config.volume)),
            Effect::Snapshot,
        ])
    }

    /// Takes effect on the next `play()`.
    pub fn set_quality(&mut self, quality: Quality) -> Vec<Effect> {
        self.config.quality = quality;
        self.finish(vec![Effect::Snapshot])
    }

    pub fn cycle_quality(&mut self) -> Vec<Effect> {
        self.set_quality(self.config.quality.next())
    }

    pub fn set_mode(&mut self, mode: PlayMode) -> Vec<Effect> {
        self.config.mode = mode;
        self.finish(vec![Effect::Snapshot])
    }

    pub fn cycle_mode(&mut self) -> Vec<Effect> {
        self.set_mode(self.config.mode.next())
    }

    /// Switch catalog platform. Resets the browse state.
    pub fn switch_platform(&mut self, platform: Platform) -> Vec<Effect> {
        self.config.platform = platform;
        self.config.view = BrowseView::Playlists;
        self.config.keyword.clear();
        self.browse.clear();
        self.browse_index = None;
        self.finish(vec![Effect::Snapshot])
    }

    pub fn set_keyword(&mut self, keyword: impl Into<String>) -> Vec<Effect> {
        self.config.keyword = keyword.into();
        self.finish(vec![Effect::Snapshot])
    }

    pub fn set_browse(&mut self, tracks: Vec<Track>, view: BrowseView) -> Vec<Effect> {
        self.browse = tracks;
        self.browse_index = None;
        self.config.view = view;
        self.finish(vec![Effect::Snapshot])
    }

    // ---- history ----

    pub fn remove_record(&mut self, key: &TrackKey) -> Vec<Effect> {
        if self.ledger.remove(key).is_none() {
            return Vec::new();
        }
        self.queue.remove(key);
        self.finish(vec![Effect::Store(StoreCommand::Delete(key.clone()))])
    }

    pub fn clear_records(&mut self) -> Vec<Effect> {
        self.ledger.clear();
        self.queue.clear();
        self.finish(vec![Effect::Store(StoreCommand::DeleteAll)])
    }

    /// Replace the whole history with `tracks` and play the first.
    pub fn play_all(&mut self, tracks: Vec<Track>, at: Clock) -> Vec<Effect> {
        if tracks.is_empty() {
            return Vec::new();
        }
        self.ledger.replace_all(tracks, at.wall_ms);
        self.queue.clear();
        self.queue.rebuild(&self.ledger);

        let records = self
            .ledger
            .entries()
            .iter()
            .map(|e| StoredRecord::from_entry(e, e.record.stamp))
            .collect();
        let mut effects = vec![Effect::Store(StoreCommand::ReplaceAll(records))];
        effects.extend(self.play_queue_index(0, at));
        self.finish(effects)
    }

    // ---- detached window ----

    pub fn window_attached(&mut self) -> Vec<Effect> {
        self.notifier.attach();
        self.finish(Vec::new())
    }

    pub fn window_detached(&mut self) {
        self.notifier.detach();
    }

    pub fn window_message(&mut self, msg: InboundMessage) -> Vec<Effect> {
        match self.notifier.handle(msg) {
            WindowUpdate::Prefs => self.finish(vec![Effect::Snapshot]),
            WindowUpdate::Closed => {
                tracing::info!("lyrics window closed");
                self.finish(vec![Effect::Window(OutboundMessage::Close), Effect::Snapshot])
            }
            WindowUpdate::Unchanged => Vec::new(),
        }
    }

    /// Last durable save of the live position before exit. Same rules as a
    /// pause.
    pub fn on_shutdown(&mut self, at: Clock) -> Vec<Effect> {
        if !matches!(self.state, PlaybackState::Playing | PlaybackState::Paused)
            || self.persist.in_startup_guard(at.mono)
        {
            return Vec::new();
        }
        self.save_progress(at)
    }

    // ---- internals ----

    fn advance(&mut self, direction: Direction, at: Clock) -> Vec<Effect> {
        if !self.queue.is_empty() {
            let index = match direction {
                Direction::Forward => self.queue.next_index(),
                Direction::Back => self.queue.prev_index(),
            };
            return match index {
                Some(i) => self.play_queue_index(i, at),
                None => Vec::new(),
            };
        }

        let len = self.browse.len();
        let index = match direction {
            Direction::Forward => queue::wrap_next(self.browse_index, len),
            Direction::Back => queue::wrap_prev(self.browse_index, len),
        };
        match index {
            Some(i) => self.play_browse_index(i, at),
            None => self.finish(Vec::new()),
        }
    }

    /// Play the loaded stream again from the top. The element has already
    /// unloaded it at end of file, so it is loaded afresh.
    fn restart(&mut self) -> Vec<Effect> {
        let Some(url) = self.stream_url.clone() else {
            return Vec::new();
        };
        self.state = PlaybackState::Playing;
        self.position = 0.0;
        self.lyrics.seek(0.0);
        vec![Effect::Media(MediaCommand::Load { url, autoplay: true })]
    }

    fn issue(&mut self, key: TrackKey, autoplay: bool) -> ResolveRequest {
        let req = ResolveRequest {
            key,
            quality: self.config.quality,
            ticket: self.next_ticket,
        };
        self.next_ticket += 1;
        self.target = Some((req.clone(), autoplay));
        req
    }

    fn save_on_pause(&mut self, at: Clock) -> Vec<Effect> {
        if self.persist.pause_due(at.mono) {
            self.save_progress(at)
        } else {
            tracing::debug!("inside start-up guard, pause save skipped");
            Vec::new()
        }
    }

    /// Write the live position into the ledger and the durable store.
    fn save_progress(&mut self, at: Clock) -> Vec<Effect> {
        let Some(key) = self.current.as_ref().map(Track::key) else {
            return Vec::new();
        };
        // Only records still in the history are persisted.
        if !self.ledger.update_offset(&key, self.position) {
            return Vec::new();
        }
        if self.duration > 0.0 {
            self.ledger.update_duration(&key, self.duration);
        }
        match self.ledger.get(&key) {
            Some(entry) => {
                let record = persist::payload(entry, self.position, self.duration, at.wall_ms);
                vec![Effect::Store(StoreCommand::Upsert(record))]
            }
            None => Vec::new(),
        }
    }

    /// Fold in the snapshot request from ledger changes and the window mirror.
    fn finish(&mut self, mut effects: Vec<Effect>) -> Vec<Effect> {
        let wants_snapshot = self.ledger.take_dirty() || effects.contains(&Effect::Snapshot);
        effects.retain(|e| *e != Effect::Snapshot);
        if wants_snapshot {
            effects.push(Effect::Snapshot);
        }

        let mirror = Mirror {
            track: self.current.clone(),
            cue_index: self.lyrics.active(),
            line: self.lyrics.active_cue().map(|c| c.text.clone()),
            state: self.state,
            elapsed: self.position,
            opacity: 0.0,
            minimized: false,
        };
        if let Some(frame) = self.notifier.observe(mirror) {
            effects.push(Effect::Window(OutboundMessage::State(frame)));
        }
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Platform;
    use crate::ledger::{Entry, PlayRecord};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::time::Duration;

    fn track(id: &str) -> Track {
        Track {
            platform: Platform::Netease,
            id: id.to_string(),
            name: format!("Song {id}"),
            artist: "Artist".to_string(),
            album: None,
            pic: None,
        }
    }

    fn session() -> Session {
        Session::new(PersistPolicy::default(), ProxyRule::default())
    }

    fn secs(at: Clock, s: f64) -> Clock {
        at.after(Duration::from_secs_f64(s))
    }

    fn stream(url: &str) -> Resolution {
        Resolution {
            url: url.to_string(),
            lyrics: None,
            cover: None,
        }
    }

    fn requests(effects: &[Effect]) -> Vec<ResolveRequest> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Resolve(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    fn loads(effects: &[Effect]) -> Vec<(String, bool)> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Media(MediaCommand::Load { url, autoplay }) => Some((url.clone(), *autoplay)),
                _ => None,
            })
            .collect()
    }

    fn upserts(effects: &[Effect]) -> Vec<StoredRecord> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Store(StoreCommand::Upsert(r)) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    /// Resolve the single request in `effects` successfully.
    fn complete(s: &mut Session, effects: &[Effect], at: Clock) -> Vec<Effect> {
        let reqs = requests(effects);
        assert_eq!(reqs.len(), 1, "expected exactly one resolution in {effects:?}");
        s.on_resolved(&reqs[0], Ok(stream(&format!("https://cdn/{}", reqs[0].key.id))), at)
    }

    /// Play `ids` in order so the queue ends up as `ids` reversed.
    fn played(ids: &[&str], at: Clock) -> Session {
        let mut s = session();
        for (i, id) in ids.iter().enumerate() {
            let at = secs(at, i as f64);
            let effects = s.play(track(id), PlayOrigin::Direct, at);
            complete(&mut s, &effects, at);
        }
        s
    }

    #[test]
    fn play_emits_one_resolution_and_clears_the_source() {
        let at = Clock::now();
        let mut s = session();
        let effects = s.play(track("1"), PlayOrigin::Direct, at);

        assert_eq!(effects[0], Effect::Media(MediaCommand::ClearSource));
        assert_eq!(requests(&effects).len(), 1);
        assert_eq!(effects.iter().filter(|e| **e == Effect::Snapshot).count(), 1);
        assert_eq!(s.state(), PlaybackState::Resolving);
        assert_eq!(s.current().map(|t| t.id.as_str()), Some("1"));
        assert!(s.stream_url().is_none());

        let effects = complete(&mut s, &effects, at);
        assert_eq!(loads(&effects), vec![("https://cdn/1".to_string(), true)]);
        assert_eq!(s.state(), PlaybackState::Playing);
        assert_eq!(s.queue().current_index(), Some(0));
    }

    #[test]
    fn superseded_resolution_is_discarded() {
        let at = Clock::now();
        let mut s = session();
        let x = requests(&s.play(track("x"), PlayOrigin::Direct, at)).remove(0);
        let y = requests(&s.play(track("y"), PlayOrigin::Direct, at)).remove(0);
        assert!(y.ticket > x.ticket);

        let effects = s.on_resolved(&x, Ok(stream("https://cdn/x")), at);
        assert!(effects.is_empty());
        assert_eq!(s.state(), PlaybackState::Resolving);
        assert!(s.stream_url().is_none());
        assert_eq!(s.current().map(|t| t.id.as_str()), Some("y"));

        let effects = s.on_resolved(&y, Ok(stream("https://cdn/y")), at);
        assert_eq!(loads(&effects), vec![("https://cdn/y".to_string(), true)]);
        assert_eq!(s.stream_url(), Some("https://cdn/y"));
    }

    #[test]
    fn replaying_the_same_track_supersedes_the_earlier_request() {
        let at = Clock::now();
        let mut s = session();
        let first = requests(&s.play(track("x"), PlayOrigin::Direct, at)).remove(0);
        let second = requests(&s.play(track("x"), PlayOrigin::Direct, at)).remove(0);
        assert!(s.on_resolved(&first, Ok(stream("old")), at).is_empty());
        assert!(!s.on_resolved(&second, Ok(stream("new")), at).is_empty());
    }

    #[test]
    fn resolution_failure_keeps_the_track_shown() {
        let at = Clock::now();
        let mut s = session();
        let req = requests(&s.play(track("1"), PlayOrigin::Direct, at)).remove(0);
        let effects = s.on_resolved(&req, Err(ResolveError::NoStream(req.key.clone())), at);

        assert!(loads(&effects).is_empty());
        assert_eq!(s.state(), PlaybackState::Failed);
        assert_eq!(s.current().map(|t| t.id.as_str()), Some("1"));
        assert!(s.toggle_play(at).is_empty());

        // Re-selecting retries.
        let effects = s.play(track("1"), PlayOrigin::Direct, at);
        assert_eq!(requests(&effects).len(), 1);
    }

    #[test]
    fn random_mode_always_issues_exactly_one_resolution() {
        let at = Clock::now();
        let mut s = played(&["1", "2", "3", "4", "5"], at);
        s.set_mode(PlayMode::Random);
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = [false; 5];

        for i in 0..1000 {
            let at = secs(at, 10.0 + i as f64);
            let effects = s.on_ended(&mut rng, at);
            assert_eq!(requests(&effects).len(), 1);
            let index = s.queue().current_index().unwrap();
            assert!(index < 5);
            seen[index] = true;
            complete(&mut s, &effects, at);
        }
        assert!(seen.iter().all(|&hit| hit));
    }

    #[test]
    fn sequential_wraps_from_last_to_first() {
        let at = Clock::now();
        let mut s = played(&["1", "2", "3", "4", "5"], at);
        // Queue is most recent first: 5 4 3 2 1.
        let effects = s.play_queue_index(4, at);
        assert_eq!(requests(&effects)[0].key, track("1").key());
        complete(&mut s, &effects, at);
        assert_eq!(s.queue().current_index(), Some(4));

        let mut rng = StdRng::seed_from_u64(1);
        let effects = s.on_ended(&mut rng, secs(at, 1.0));
        assert_eq!(requests(&effects)[0].key, track("5").key());
        assert_eq!(s.queue().current_index(), Some(0));
    }

    #[test]
    fn previous_wraps_from_first_to_last() {
        let at = Clock::now();
        let mut s = played(&["1", "2", "3"], at);
        assert_eq!(s.queue().current_index(), Some(0));
        let effects = s.previous(at);
        assert_eq!(requests(&effects)[0].key, track("1").key());
        assert_eq!(s.queue().current_index(), Some(2));
    }

    #[test]
    fn replays_do_not_reshuffle_the_cursor() {
        let at = Clock::now();
        let mut s = played(&["1", "2"], at);
        // Queue: 2 1. Walking forward twice alternates, it does not get stuck.
        let first = requests(&s.next(secs(at, 5.0))).remove(0);
        assert_eq!(first.key, track("1").key());
        let second = requests(&s.next(secs(at, 6.0))).remove(0);
        assert_eq!(second.key, track("2").key());
    }

    #[test]
    fn new_track_realigns_the_queue_with_recency() {
        let at = Clock::now();
        let mut s = played(&["1", "2", "3"], at);
        s.play(track("9"), PlayOrigin::Direct, secs(at, 30.0));
        assert_eq!(s.queue().keys(), s.ledger().keys_by_recency().as_slice());
        assert_eq!(s.queue().current_index(), Some(0));
    }

    #[test]
    fn single_repeat_reloads_the_stream_without_resolving() {
        let at = Clock::now();
        let mut s = played(&["1"], at);
        s.set_mode(PlayMode::SingleRepeat);
        s.on_time_update(199.0, secs(at, 199.0));
        let mut rng = StdRng::seed_from_u64(3);
        let effects = s.on_ended(&mut rng, secs(at, 200.0));
        assert!(requests(&effects).is_empty());
        assert_eq!(loads(&effects), vec![("https://cdn/1".to_string(), true)]);
        assert!(!effects.contains(&Effect::Media(MediaCommand::Seek(0.0))));
        assert_eq!(s.state(), PlaybackState::Playing);
        assert_eq!(s.position(), 0.0);
    }

    #[test]
    fn resuming_after_the_end_reloads_the_stream() {
        let at = Clock::now();
        let mut s = played(&["1"], at);
        s.clear_records();
        let mut rng = StdRng::seed_from_u64(1);
        s.on_ended(&mut rng, secs(at, 100.0));
        assert_eq!(s.state(), PlaybackState::Ended);
        let effects = s.toggle_play(secs(at, 101.0));
        assert_eq!(loads(&effects), vec![("https://cdn/1".to_string(), true)]);
        assert!(!effects.contains(&Effect::Media(MediaCommand::Play)));
        assert_eq!(s.state(), PlaybackState::Playing);
    }

    #[test]
    fn empty_queue_falls_back_to_the_browse_list() {
        let at = Clock::now();
        let mut s = session();
        s.set_browse(vec![track("a"), track("b"), track("c")], BrowseView::Songs);

        let effects = s.previous(at);
        assert_eq!(requests(&effects)[0].key, track("c").key());
        assert_eq!(s.browse_index(), Some(2));

        s.clear_records();
        let effects = s.next(at);
        assert_eq!(requests(&effects)[0].key, track("a").key());
    }

    #[test]
    fn nothing_to_advance_to() {
        let mut s = session();
        assert!(requests(&s.next(Clock::now())).is_empty());
    }

    #[test]
    fn pause_inside_startup_guard_is_not_persisted() {
        let at = Clock::now();
        let mut s = session();
        let effects = s.play(track("1"), PlayOrigin::Direct, at);
        complete(&mut s, &effects, at);

        s.on_time_update(2.5, secs(at, 2.9));
        let effects = s.toggle_play(secs(at, 3.0));
        assert!(effects.contains(&Effect::Media(MediaCommand::Pause)));
        assert!(upserts(&effects).is_empty());

        s.toggle_play(secs(at, 4.0));
        let effects = s.toggle_play(secs(at, 6.0));
        let saved = upserts(&effects);
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].play_time, 2.5);
        assert_eq!(s.ledger().get(&track("1").key()).unwrap().record.offset, 2.5);
    }

    #[test]
    fn periodic_saves_are_throttled() {
        let at = Clock::now();
        let mut s = played(&["1"], at);

        assert!(upserts(&s.on_time_update(3.0, secs(at, 3.0))).is_empty());
        assert_eq!(upserts(&s.on_time_update(7.0, secs(at, 7.0))).len(), 1);
        assert!(upserts(&s.on_time_update(15.0, secs(at, 15.0))).is_empty());
        let saved = upserts(&s.on_time_update(27.5, secs(at, 27.5)));
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].play_time, 27.5);
    }

    #[test]
    fn restore_resumes_at_the_stored_offset() {
        let at = Clock::now();
        let mut snapshot = Snapshot::default();
        snapshot.config.volume = 30;
        let entries = vec![
            Entry {
                track: track("old"),
                record: PlayRecord {
                    offset: 5.0,
                    duration: 100.0,
                    stamp: 1,
                },
            },
            Entry {
                track: track("last"),
                record: PlayRecord {
                    offset: 42.0,
                    duration: 200.0,
                    stamp: 2,
                },
            },
        ];
        let restored = Restored {
            ledger: Ledger::from_entries(entries),
            snapshot,
            authoritative: true,
        };

        let (mut s, effects) = Session::restore(restored, PersistPolicy::default(), ProxyRule::default(), at);
        assert_eq!(effects[0], Effect::Media(MediaCommand::Volume(30)));
        assert_eq!(requests(&effects)[0].key, track("last").key());
        assert_eq!(s.queue().current_index(), Some(0));

        let effects = complete(&mut s, &effects, at);
        assert_eq!(loads(&effects)[0].1, false);
        assert_eq!(s.state(), PlaybackState::Paused);

        let effects = s.on_duration(200.0, secs(at, 1.0));
        assert!(effects.contains(&Effect::Media(MediaCommand::Seek(42.0))));
        assert!(upserts(&effects).is_empty());
        assert_eq!(s.position(), 42.0);
        // Applied once only.
        assert!(!s.on_duration(200.0, secs(at, 2.0)).contains(&Effect::Media(MediaCommand::Seek(42.0))));
    }

    #[test]
    fn restored_volume_is_clamped() {
        let mut snapshot = Snapshot::default();
        snapshot.config.volume = 250;
        let restored = Restored {
            snapshot,
            ..Restored::default()
        };
        let (s, effects) = Session::restore(restored, PersistPolicy::default(), ProxyRule::default(), Clock::now());
        assert_eq!(effects, vec![Effect::Media(MediaCommand::Volume(100))]);
        assert_eq!(s.config().volume, 100);
    }

    #[test]
    fn restore_of_empty_history_stays_idle() {
        let (s, effects) = Session::restore(
            Restored::default(),
            PersistPolicy::default(),
            ProxyRule::default(),
            Clock::now(),
        );
        assert!(requests(&effects).is_empty());
        assert_eq!(s.state(), PlaybackState::Idle);
    }

    #[test]
    fn kuwo_streams_are_proxied_on_secure_origin() {
        let at = Clock::now();
        let mut s = Session::new(PersistPolicy::default(), ProxyRule::new(true, "/api/music/proxy"));
        let kuwo = Track {
            platform: Platform::Kuwo,
            ..track("k")
        };
        let req = requests(&s.play(kuwo, PlayOrigin::Direct, at)).remove(0);
        let resolution = Resolution {
            url: "http://kuwo.example/a.mp3".into(),
            lyrics: None,
            cover: Some("http://kuwo.example/a.jpg".into()),
        };
        let effects = s.on_resolved(&req, Ok(resolution), at);

        let (url, _) = loads(&effects).remove(0);
        assert_eq!(url, "/api/music/proxy?url=http%3A%2F%2Fkuwo.example%2Fa.mp3");
        let pic = s.current().and_then(|t| t.pic.clone()).unwrap();
        assert!(pic.starts_with("/api/music/proxy?url="));
        assert_eq!(s.ledger().get(&req.key).unwrap().track.pic.as_ref(), Some(&pic));
    }

    #[test]
    fn lyrics_follow_playback_and_seeks() {
        let at = Clock::now();
        let mut s = session();
        let req = requests(&s.play(track("1"), PlayOrigin::Direct, at)).remove(0);
        let resolution = Resolution {
            url: "https://cdn/1".into(),
            lyrics: Some("[00:01.00]one\n[00:03.00]two\n[00:05.00]three".into()),
            cover: None,
        };
        s.on_resolved(&req, Ok(resolution), at);
        assert_eq!(s.lyrics().cues().len(), 3);

        s.on_time_update(3.5, at);
        assert_eq!(s.lyrics().active(), Some(1));
        s.seek(0.5);
        assert_eq!(s.lyrics().active(), None);
        s.on_time_update(5.2, at);
        assert_eq!(s.lyrics().active_cue().map(|c| c.text.as_str()), Some("three"));
    }

    #[test]
    fn quality_change_applies_to_the_next_play() {
        let at = Clock::now();
        let mut s = played(&["1"], at);
        let effects = s.set_quality(Quality::Lossless);
        assert!(requests(&effects).is_empty());
        assert_eq!(effects, vec![Effect::Snapshot]);

        let req = requests(&s.play(track("2"), PlayOrigin::Direct, at)).remove(0);
        assert_eq!(req.quality, Quality::Lossless);
    }

    #[test]
    fn removing_the_current_track_unsets_the_cursor() {
        let at = Clock::now();
        let mut s = played(&["1", "2", "3"], at);
        let effects = s.remove_record(&track("3").key());
        assert!(effects.contains(&Effect::Store(StoreCommand::Delete(track("3").key()))));
        assert!(effects.contains(&Effect::Snapshot));
        assert_eq!(s.queue().current_index(), None);
        assert_eq!(s.state(), PlaybackState::Playing);
        assert!(s.remove_record(&track("3").key()).is_empty());

        // With the cursor unset, next starts from the top.
        let req = requests(&s.next(at)).remove(0);
        assert_eq!(req.key, track("2").key());
    }

    #[test]
    fn clearing_records_empties_ledger_and_queue() {
        let at = Clock::now();
        let mut s = played(&["1", "2"], at);
        let effects = s.clear_records();
        assert!(effects.contains(&Effect::Store(StoreCommand::DeleteAll)));
        assert!(s.ledger().is_empty());
        assert!(s.queue().is_empty());
    }

    #[test]
    fn play_all_replaces_history_and_starts_the_first() {
        let at = Clock::now();
        let mut s = played(&["old"], at);
        let effects = s.play_all(vec![track("a"), track("b"), track("c")], secs(at, 50.0));

        match &effects[0] {
            Effect::Store(StoreCommand::ReplaceAll(records)) => assert_eq!(records.len(), 3),
            other => panic!("expected ReplaceAll first, got {other:?}"),
        }
        assert_eq!(requests(&effects)[0].key, track("a").key());
        let ids: Vec<String> = s.ledger().queue().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(s.queue().current_index(), Some(0));
        assert!(s.play_all(Vec::new(), at).is_empty());
    }

    #[test]
    fn platform_switch_resets_browse_state() {
        let mut s = session();
        s.set_browse(vec![track("a")], BrowseView::Songs);
        s.set_keyword("jazz");
        s.switch_platform(Platform::Qq);
        assert!(s.browse().is_empty());
        assert_eq!(s.config().view, BrowseView::Playlists);
        assert!(s.config().keyword.is_empty());
        assert_eq!(s.config().platform, Platform::Qq);
    }

    #[test]
    fn volume_is_clamped() {
        let mut s = session();
        let effects = s.set_volume(180);
        assert!(effects.contains(&Effect::Media(MediaCommand::Volume(100))));
        assert_eq!(s.config().volume, 100);
    }

    #[test]
    fn window_gets_frames_only_while_attached() {
        let at = Clock::now();
        let mut s = session();
        let effects = s.play(track("1"), PlayOrigin::Direct, at);
        assert!(!effects.iter().any(|e| matches!(e, Effect::Window(_))));

        let effects = s.window_attached();
        assert!(matches!(effects.as_slice(), [Effect::Window(OutboundMessage::State(_))]));

        let effects = s.window_message(InboundMessage::OpacityChange { opacity: 0.4 });
        assert!(effects.contains(&Effect::Snapshot));
        assert_eq!(s.snapshot().window.opacity, 0.4);

        let effects = s.window_message(InboundMessage::Close);
        assert!(effects.contains(&Effect::Window(OutboundMessage::Close)));
        assert!(s.seek(1.0).iter().all(|e| !matches!(e, Effect::Window(_))));
    }

    #[test]
    fn remaining_window_keeps_receiving_frames() {
        let at = Clock::now();
        let mut s = played(&["1"], at);
        s.window_attached();
        s.window_attached();
        s.window_detached();

        let effects = s.on_time_update(9.0, secs(at, 9.0));
        assert!(effects.iter().any(|e| matches!(e, Effect::Window(OutboundMessage::State(_)))));

        s.window_detached();
        let effects = s.on_time_update(12.0, secs(at, 12.0));
        assert!(!effects.iter().any(|e| matches!(e, Effect::Window(_))));
    }

    #[test]
    fn snapshot_reflects_session() {
        let at = Clock::now();
        let mut s = played(&["1", "2"], at);
        s.set_mode(PlayMode::Random);
        let snap = s.snapshot();
        assert_eq!(snap.config.mode, PlayMode::Random);
        assert_eq!(snap.entries.len(), 2);
        assert_eq!(snap.queue, s.queue().keys());
        assert_eq!(snap.current.map(|t| t.id), Some("2".to_string()));
    }

    #[test]
    fn shutdown_saves_the_live_position_outside_the_guard() {
        let at = Clock::now();
        let mut s = played(&["1"], at);
        s.on_time_update(2.0, secs(at, 2.0));
        assert!(s.on_shutdown(secs(at, 2.0)).is_empty());

        s.on_time_update(80.0, secs(at, 80.0));
        s.on_time_update(91.0, secs(at, 91.0));
        let saved = upserts(&s.on_shutdown(secs(at, 91.0)));
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].play_time, 91.0);
    }
}
