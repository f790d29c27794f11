use crate::catalog::{Platform, Quality};
use crate::session::state::PlayMode;
use std::path::PathBuf;

/// User commands. Indices are zero-based.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Quit,
    Help,
    Status,
    History,

    PlayBrowse(usize),
    PlayQueue(usize),
    PlayNext,
    PlayPrev,
    TogglePause,
    Seek(f64),
    SeekBy(f64),
    SetVolume(u8),
    VolumeUp,
    VolumeDown,

    CycleMode,
    SetMode(PlayMode),
    CycleQuality,
    SetQuality(Quality),
    SwitchPlatform(Platform),
    SetKeyword(String),

    LoadBrowse(PathBuf),
    /// Replace the history with a track list file, or with the browse list.
    PlayAll(Option<PathBuf>),
    QueueRemove(usize),
    QueueClear,
}
