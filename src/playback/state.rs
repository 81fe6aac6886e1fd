use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical playback state, owned by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Unknown,
    ReadyToPlay,
    Loading,
    Seeking,
    Playing,
    Paused,
    Suspended,
    Dismissed,
    Error,
}

impl PlaybackState {
    /// States no engine event can leave; only `load_item` (for `Error`) does
    pub fn is_terminal(self) -> bool {
        matches!(self, PlaybackState::Dismissed | PlaybackState::Error)
    }

    /// Whether a seek may be issued from this state
    pub fn can_seek(self) -> bool {
        matches!(
            self,
            PlaybackState::ReadyToPlay
                | PlaybackState::Playing
                | PlaybackState::Paused
                | PlaybackState::Seeking
        )
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Unknown => "unknown",
            PlaybackState::ReadyToPlay => "ready-to-play",
            PlaybackState::Loading => "loading",
            PlaybackState::Seeking => "seeking",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Suspended => "suspended",
            PlaybackState::Dismissed => "dismissed",
            PlaybackState::Error => "error",
        };
        f.write_str(name)
    }
}
