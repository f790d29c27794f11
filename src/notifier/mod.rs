//! Mirror of playback and lyric state for the detached lyrics window.
//!
//! Outbound traffic is a best-effort stream of [`Mirror`] frames, sent only
//! when something visible changed. Inbound traffic is the closed
//! [`InboundMessage`] union. Nothing is acknowledged: a lost frame only
//! leaves the window stale until the next one.

pub mod channel;

use crate::catalog::Track;
use crate::session::state::PlaybackState;
use serde::{Deserialize, Serialize};

pub use channel::WindowChannel;

/// Messages the detached window may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "PIP_OPACITY_CHANGE")]
    OpacityChange { opacity: f64 },
    #[serde(rename = "PIP_MINIMIZED_CHANGE")]
    MinimizedChange { minimized: bool },
    #[serde(rename = "PIP_CLOSE")]
    Close,
}

/// Messages sent to the detached window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "PIP_STATE")]
    State(Mirror),
    #[serde(rename = "PIP_CLOSE")]
    Close,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowPrefs {
    /// 0.0 (invisible) to 1.0 (opaque)
    pub opacity: f64,
    pub minimized: bool,
}

impl Default for WindowPrefs {
    fn default() -> Self {
        Self {
            opacity: 0.9,
            minimized: false,
        }
    }
}

/// One frame of state for the detached window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mirror {
    pub track: Option<Track>,
    pub cue_index: Option<usize>,
    pub line: Option<String>,
    pub state: PlaybackState,
    pub elapsed: f64,
    pub opacity: f64,
    pub minimized: bool,
}

impl Mirror {
    /// Elapsed time is compared at whole-second resolution; finer changes
    /// are invisible in the window's `mm:ss` readout.
    fn same_frame(&self, other: &Mirror) -> bool {
        self.track.as_ref().map(Track::key) == other.track.as_ref().map(Track::key)
            && self.track.as_ref().and_then(|t| t.pic.as_ref())
                == other.track.as_ref().and_then(|t| t.pic.as_ref())
            && self.cue_index == other.cue_index
            && self.state == other.state
            && self.elapsed.floor() == other.elapsed.floor()
            && self.opacity == other.opacity
            && self.minimized == other.minimized
    }
}

/// What an inbound message changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowUpdate {
    /// Preferences changed; the snapshot should be rewritten.
    Prefs,
    /// The window asked to close and must be torn down.
    Closed,
    /// Nothing changed.
    Unchanged,
}

#[derive(Debug, Clone, Default)]
pub struct Notifier {
    /// Connected windows. Frames are produced while any is attached.
    attached: usize,
    prefs: WindowPrefs,
    last: Option<Mirror>,
}

impl Notifier {
    pub fn new(prefs: WindowPrefs) -> Self {
        Self {
            attached: 0,
            prefs,
            last: None,
        }
    }

    pub fn prefs(&self) -> &WindowPrefs {
        &self.prefs
    }

    pub fn is_open(&self) -> bool {
        self.attached > 0
    }

    /// A window attached. The next `observe` always produces a frame so the
    /// newcomer starts from the current state.
    pub fn attach(&mut self) {
        self.attached += 1;
        self.last = None;
    }

    /// One window went away. The others keep receiving frames.
    pub fn detach(&mut self) {
        self.attached = self.attached.saturating_sub(1);
        if self.attached == 0 {
            self.last = None;
        }
    }

    /// Fill in the window preferences and return the frame if it should be
    /// sent.
    pub fn observe(&mut self, mut mirror: Mirror) -> Option<Mirror> {
        mirror.opacity = self.prefs.opacity;
        mirror.minimized = self.prefs.minimized;
        if !self.is_open() || self.last.as_ref().is_some_and(|last| last.same_frame(&mirror)) {
            return None;
        }
        self.last = Some(mirror.clone());
        Some(mirror)
    }

    pub fn handle(&mut self, msg: InboundMessage) -> WindowUpdate {
        match msg {
            InboundMessage::OpacityChange { opacity } => {
                if !opacity.is_finite() {
                    return WindowUpdate::Unchanged;
                }
                let opacity = opacity.clamp(0.0, 1.0);
                if opacity == self.prefs.opacity {
                    return WindowUpdate::Unchanged;
                }
                self.prefs.opacity = opacity;
                WindowUpdate::Prefs
            }
            InboundMessage::MinimizedChange { minimized } => {
                if minimized == self.prefs.minimized {
                    return WindowUpdate::Unchanged;
                }
                self.prefs.minimized = minimized;
                WindowUpdate::Prefs
            }
            InboundMessage::Close => {
                self.attached = 0;
                self.last = None;
                WindowUpdate::Closed
            }
        }
    }
}
