pub mod actions;
pub mod events;

use crate::catalog::{self, CatalogClient, ResolveRequest};
use crate::config::Config;
use crate::input;
use crate::notifier::WindowChannel;
use crate::persist;
use crate::player::MpvHandle;
use crate::session::state::BrowseView;
use crate::session::{Clock, Effect, MediaCommand, Session, StoreCommand};
use crate::snapshot::SnapshotFile;
use crate::storage::StorageHandle;
use actions::Action;
use anyhow::Context;
use events::{Event, NetworkEvent, PlayerEvent, WindowEvent};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const VOLUME_STEP: u8 = 5;

pub struct App {
    cfg: Config,
    session: Session,
    catalog: CatalogClient,
    snapshots: SnapshotFile,
    store_tx: Option<mpsc::UnboundedSender<StoreCommand>>,
    store_task: Option<JoinHandle<()>>,
    mpv: Option<MpvHandle>,
    window: Option<WindowChannel>,
    /// Effects produced by the restore, run once the media element is up.
    startup: Vec<Effect>,
    should_quit: bool,
}

impl App {
    /// Restore the last session. The durable store is read synchronously
    /// before anything else runs.
    pub fn new(cfg: Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&cfg.paths.data_dir)
            .with_context(|| format!("create dir {}", cfg.paths.data_dir.display()))?;

        let catalog = CatalogClient::new(
            cfg.catalog.base_url.clone(),
            Duration::from_secs(cfg.catalog.timeout_secs),
        )?;
        let storage = StorageHandle::new(cfg.database_path());
        let snapshots = SnapshotFile::in_dir(&cfg.paths.data_dir);

        let restored = persist::restore(storage.list(), snapshots.load());
        if !restored.authoritative {
            tracing::warn!(
                snapshot = %snapshots.path().display(),
                "history came from the local snapshot; saved offsets may be stale"
            );
        }
        let (session, startup) =
            Session::restore(restored, cfg.persist_policy(), cfg.proxy_rule(), Clock::now());
        let (store_tx, store_task) = spawn_store_worker(storage);

        Ok(Self {
            cfg,
            session,
            catalog,
            snapshots,
            store_tx: Some(store_tx),
            store_task: Some(store_task),
            mpv: None,
            window: None,
            startup,
            should_quit: false,
        })
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        let (tx, mut rx) = mpsc::channel::<Event>(256);

        input::spawn_input_task(tx.clone());

        // The session still works without audio; mpv is best-effort.
        let mpv_log = self.cfg.mpv_log_path();
        match MpvHandle::spawn(tx.clone(), self.cfg.player.audio_device.as_deref(), Some(&mpv_log)).await {
            Ok(h) => self.mpv = Some(h),
            Err(e) => {
                let error = format!("{e:#}");
                tracing::error!(%error, "mpv disabled");
            }
        }
        match WindowChannel::bind(self.cfg.window_socket_path(), tx.clone()) {
            Ok(w) => self.window = Some(w),
            Err(e) => {
                let error = format!("{e:#}");
                tracing::warn!(%error, "lyrics window unavailable");
            }
        }

        let startup = std::mem::take(&mut self.startup);
        self.apply(startup, &tx).await;
        self.print_status();

        while let Some(ev) = rx.recv().await {
            let effects = match ev {
                Event::Input(action) => self.handle_action(action),
                Event::Player(pe) => self.handle_player(pe),
                Event::Network(ne) => self.handle_network(ne),
                Event::Window(we) => self.handle_window(we),
            };
            self.apply(effects, &tx).await;

            if self.should_quit {
                break;
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&mut self) {
        let effects = self.session.on_shutdown(Clock::now());
        for effect in effects {
            if let Effect::Store(cmd) = effect {
                self.store(cmd);
            }
        }
        self.write_snapshot();

        // Let queued durable writes land before the runtime goes away.
        self.store_tx.take();
        if let Some(task) = self.store_task.take() {
            let _ = task.await;
        }
    }

    fn handle_action(&mut self, action: Action) -> Vec<Effect> {
        let at = Clock::now();
        match action {
            Action::Quit => {
                self.should_quit = true;
                Vec::new()
            }
            Action::Help => {
                println!("{}", input::HELP);
                Vec::new()
            }
            Action::Status => {
                self.print_status();
                Vec::new()
            }
            Action::History => {
                self.print_queue();
                Vec::new()
            }

            Action::PlayBrowse(i) => {
                if i >= self.session.browse().len() {
                    println!("no browse entry {}", i + 1);
                    return Vec::new();
                }
                self.session.play_browse_index(i, at)
            }
            Action::PlayQueue(i) => {
                if i >= self.session.queue().len() {
                    println!("no history entry {}", i + 1);
                    return Vec::new();
                }
                self.session.play_queue_index(i, at)
            }
            Action::PlayNext => self.session.next(at),
            Action::PlayPrev => self.session.previous(at),
            Action::TogglePause => self.session.toggle_play(at),
            Action::Seek(secs) => self.session.seek(secs),
            Action::SeekBy(delta) => self.session.seek(self.session.position() + delta),
            Action::SetVolume(v) => self.session.set_volume(v),
            Action::VolumeUp => {
                let v = self.session.config().volume.saturating_add(VOLUME_STEP);
                self.session.set_volume(v)
            }
            Action::VolumeDown => {
                let v = self.session.config().volume.saturating_sub(VOLUME_STEP);
                self.session.set_volume(v)
            }

            Action::CycleMode => {
                let effects = self.session.cycle_mode();
                println!("{}", self.session.config().mode.label());
                effects
            }
            Action::SetMode(mode) => self.session.set_mode(mode),
            Action::CycleQuality => {
                let effects = self.session.cycle_quality();
                println!("Quality: {}", self.session.config().quality);
                effects
            }
            Action::SetQuality(q) => self.session.set_quality(q),
            Action::SwitchPlatform(p) => self.session.switch_platform(p),
            Action::SetKeyword(k) => self.session.set_keyword(k),

            Action::LoadBrowse(path) => match catalog::read_track_list(&path, self.session.config().platform) {
                Ok(tracks) => {
                    println!("{} tracks", tracks.len());
                    self.session.set_browse(tracks, BrowseView::Songs)
                }
                Err(e) => {
                    println!("{e:#}");
                    Vec::new()
                }
            },
            Action::PlayAll(path) => {
                let tracks = match path {
                    Some(path) => match catalog::read_track_list(&path, self.session.config().platform) {
                        Ok(tracks) => tracks,
                        Err(e) => {
                            println!("{e:#}");
                            return Vec::new();
                        }
                    },
                    None => self.session.browse().to_vec(),
                };
                if tracks.is_empty() {
                    println!("nothing to play");
                    return Vec::new();
                }
                tracing::info!(tracks = tracks.len(), "replacing history");
                self.session.play_all(tracks, at)
            }
            Action::QueueRemove(i) => match self.session.queue().get(i).cloned() {
                Some(key) => self.session.remove_record(&key),
                None => {
                    println!("no history entry {}", i + 1);
                    Vec::new()
                }
            },
            Action::QueueClear => self.session.clear_records(),
        }
    }

    fn handle_player(&mut self, pe: PlayerEvent) -> Vec<Effect> {
        let at = Clock::now();
        match pe {
            PlayerEvent::Started => self.session.on_pause_changed(false, at),
            PlayerEvent::Paused => self.session.on_pause_changed(true, at),
            PlayerEvent::Position { seconds } => {
                let before = self.session.lyrics().active();
                let effects = self.session.on_time_update(seconds, at);
                if self.session.lyrics().active() != before
                    && let Some(cue) = self.session.lyrics().active_cue()
                {
                    println!("  ♪ {}", cue.text);
                }
                effects
            }
            PlayerEvent::Duration { seconds } => self.session.on_duration(seconds, at),
            PlayerEvent::Ended => self.session.on_ended(&mut rand::rng(), at),
            PlayerEvent::Error(error) => {
                let track = self.current_key();
                tracing::warn!(%track, %error, "player error");
                Vec::new()
            }
        }
    }

    fn handle_network(&mut self, ne: NetworkEvent) -> Vec<Effect> {
        match ne {
            NetworkEvent::Resolved { request, result } => {
                let failed = result.is_err();
                let effects = self.session.on_resolved(&request, result, Clock::now());
                if !effects.is_empty()
                    && let Some(track) = self.session.current()
                {
                    if failed {
                        println!("could not play {}", track.display_name());
                    } else {
                        println!("▶ {}", track.display_name());
                    }
                }
                effects
            }
        }
    }

    fn handle_window(&mut self, we: WindowEvent) -> Vec<Effect> {
        match we {
            WindowEvent::Attached => {
                tracing::info!("lyrics window attached");
                self.session.window_attached()
            }
            WindowEvent::Message(msg) => self.session.window_message(msg),
            WindowEvent::Detached => {
                tracing::debug!("lyrics window detached");
                self.session.window_detached();
                Vec::new()
            }
        }
    }

    async fn apply(&mut self, effects: Vec<Effect>, tx: &mpsc::Sender<Event>) {
        for effect in effects {
            match effect {
                Effect::Media(cmd) => self.drive_media(&cmd).await,
                Effect::Resolve(req) => self.spawn_resolve(req, tx),
                Effect::Store(cmd) => self.store(cmd),
                Effect::Snapshot => self.write_snapshot(),
                Effect::Window(msg) => {
                    if let Some(w) = &self.window {
                        w.send(&msg);
                    }
                }
            }
        }
    }

    async fn drive_media(&self, cmd: &MediaCommand) {
        let Some(mpv) = &self.mpv else {
            tracing::debug!(?cmd, "no media element");
            return;
        };
        if let Err(e) = mpv.apply(cmd).await {
            let track = self.current_key();
            let error = format!("{e:#}");
            tracing::warn!(%track, %error, ?cmd, "media command failed");
        }
    }

    fn spawn_resolve(&self, request: ResolveRequest, tx: &mpsc::Sender<Event>) {
        let catalog = self.catalog.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = catalog.resolve(&request.key, request.quality).await;
            let _ = tx
                .send(Event::Network(NetworkEvent::Resolved { request, result }))
                .await;
        });
    }

    fn store(&self, cmd: StoreCommand) {
        let sent = self.store_tx.as_ref().is_some_and(|tx| tx.send(cmd).is_ok());
        if !sent {
            tracing::warn!("durable store worker gone, write dropped");
        }
    }

    fn write_snapshot(&self) {
        if let Err(e) = self.snapshots.save(&self.session.snapshot()) {
            let error = format!("{e:#}");
            tracing::warn!(%error, "snapshot write failed");
        }
    }

    fn current_key(&self) -> String {
        self.session
            .current()
            .map(|t| t.key().to_string())
            .unwrap_or_default()
    }

    fn print_status(&self) {
        let s = &self.session;
        let cfg = s.config();
        match s.current() {
            Some(track) => println!(
                "[{:?}] {}  {} / {}",
                s.state(),
                track.display_name(),
                format_clock(s.position()),
                format_clock(s.duration()),
            ),
            None => println!("nothing playing"),
        }
        println!(
            "{} | {} | {} | volume {}",
            cfg.platform,
            cfg.quality,
            cfg.mode.label(),
            cfg.volume
        );
        if let Some(cue) = s.lyrics().active_cue() {
            println!("  ♪ {}", cue.text);
        }
    }

    fn print_queue(&self) {
        let queue = self.session.queue();
        if queue.is_empty() {
            println!("history is empty");
            return;
        }
        for (i, key) in queue.keys().iter().enumerate() {
            let Some(entry) = self.session.ledger().get(key) else {
                continue;
            };
            let marker = if queue.current_index() == Some(i) { '>' } else { ' ' };
            println!(
                "{marker}{:3}. {}  [{}]",
                i + 1,
                entry.track.display_name(),
                format_clock(entry.record.offset)
            );
        }
    }
}

/// Durable writes run one at a time, in the order they were issued.
fn spawn_store_worker(storage: StorageHandle) -> (mpsc::UnboundedSender<StoreCommand>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<StoreCommand>();
    let task = tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            let track = match &cmd {
                StoreCommand::Upsert(r) => r.key().to_string(),
                StoreCommand::Delete(k) => k.to_string(),
                StoreCommand::DeleteAll | StoreCommand::ReplaceAll(_) => "*".to_string(),
            };
            let storage = storage.clone();
            match tokio::task::spawn_blocking(move || execute_store(&storage, cmd)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    let error = format!("{e:#}");
                    tracing::warn!(%track, %error, "durable store write failed");
                }
                Err(e) => tracing::warn!(%track, error = %e, "durable store task failed"),
            }
        }
    });
    (tx, task)
}

fn execute_store(storage: &StorageHandle, cmd: StoreCommand) -> anyhow::Result<()> {
    match cmd {
        StoreCommand::Upsert(record) => storage.upsert(&record),
        StoreCommand::Delete(key) => storage.delete(&key),
        StoreCommand::DeleteAll => storage.delete_all(),
        StoreCommand::ReplaceAll(records) => {
            storage.delete_all()?;
            storage.batch_insert(&records)
        }
    }
}

/// `m:ss`
pub fn format_clock(secs: f64) -> String {
    let total = if secs.is_finite() { secs.max(0.0) as u64 } else { 0 };
    format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Platform, TrackKey};
    use crate::storage::StoredRecord;

    fn record(id: &str, play_time: f64) -> StoredRecord {
        StoredRecord {
            platform: Platform::Netease,
            id: id.to_string(),
            name: id.to_uppercase(),
            artist: "A".to_string(),
            album: None,
            pic: None,
            play_time,
            duration: 200.0,
            save_time: 1,
        }
    }

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(0.0), "0:00");
        assert_eq!(format_clock(61.9), "1:01");
        assert_eq!(format_clock(f64::NAN), "0:00");
        assert_eq!(format_clock(-4.0), "0:00");
    }

    #[test]
    fn store_commands_reach_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageHandle::new(dir.path().join("t.sqlite3"));

        execute_store(&storage, StoreCommand::Upsert(record("a", 1.0))).unwrap();
        execute_store(&storage, StoreCommand::Upsert(record("a", 9.0))).unwrap();
        execute_store(&storage, StoreCommand::Upsert(record("b", 2.0))).unwrap();
        execute_store(&storage, StoreCommand::Delete(TrackKey::new(Platform::Netease, "b"))).unwrap();
        let rows = storage.list().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].play_time, 9.0);

        execute_store(
            &storage,
            StoreCommand::ReplaceAll(vec![record("x", 0.0), record("y", 0.0)]),
        )
        .unwrap();
        let ids: Vec<String> = storage.list().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"x".to_string()));
    }
}
