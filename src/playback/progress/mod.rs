pub mod handle;

use crate::playback::error::PlaybackError;
use crate::playback::scrubber::TimeUpdate;
use crate::playback::session::SessionId;
use crate::playback::state::PlaybackState;
pub use handle::{BufferingDelegate, ObserverToken, PlaybackProgressHandle};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Notifications published by the playback controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlaybackProgress {
    /// Fired once per transition; never for a transition into the same state
    StateChanged {
        from: PlaybackState,
        to: PlaybackState,
    },
    /// Fired once per item, the first time its duration is known
    DurationLoaded {
        session: SessionId,
        duration: Duration,
    },
    /// Fired once per item
    ReadyToPlay {
        session: SessionId,
    },
    /// Debounced buffering flag changed
    BufferingChanged {
        buffering: bool,
    },
    /// Scrubber tick while playing
    TimeChanged {
        update: TimeUpdate,
    },
    /// Scrub thumb moved during a gesture; no seek has been issued
    ScrubPreview {
        position: Duration,
    },
    ReachedEnd {
        session: SessionId,
    },
    Error {
        session: SessionId,
        error: PlaybackError,
    },
}
