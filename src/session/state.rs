use crate::catalog::{Platform, Quality};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlayMode {
    /// Walk the queue, wrapping at the end.
    #[default]
    Sequential,
    /// Restart the current track.
    SingleRepeat,
    Random,
}

impl PlayMode {
    pub fn next(self) -> Self {
        match self {
            PlayMode::Sequential => PlayMode::SingleRepeat,
            PlayMode::SingleRepeat => PlayMode::Random,
            PlayMode::Random => PlayMode::Sequential,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PlayMode::Sequential => "Mode: Sequential",
            PlayMode::SingleRepeat => "Mode: Repeat One",
            PlayMode::Random => "Mode: Random",
        }
    }
}

impl FromStr for PlayMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" | "loop" | "seq" => Ok(PlayMode::Sequential),
            "single" | "single-repeat" | "repeat" | "one" => Ok(PlayMode::SingleRepeat),
            "random" | "shuffle" => Ok(PlayMode::Random),
            other => anyhow::bail!("unknown play mode: {other}"),
        }
    }
}

/// Which catalog view the browse list was filled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BrowseView {
    #[default]
    Playlists,
    Songs,
    MyPlaylists,
}

/// User-facing preferences that survive a reload via the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub platform: Platform,
    pub view: BrowseView,
    pub keyword: String,
    pub quality: Quality,
    pub mode: PlayMode,
    /// 0-100
    pub volume: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            platform: Platform::Netease,
            view: BrowseView::Playlists,
            keyword: String::new(),
            quality: Quality::Standard,
            mode: PlayMode::Sequential,
            volume: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Idle,
    Resolving,
    Playing,
    Paused,
    Ended,
    Failed,
}

/// Where a `play()` request came from; decides what next/previous walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOrigin {
    /// Position in the continue-listening queue.
    Queue(usize),
    /// Position in the ad-hoc browse list.
    Browse(usize),
    /// Anywhere else (restore, direct request).
    Direct,
}
