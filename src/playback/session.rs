use crate::playback::state::PlaybackState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Identifies one load-to-dismiss lifetime of a playable item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An active scrub gesture and what to restore once it ends
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ScrubGesture {
    pub was_playing: bool,
    pub rate: f32,
}

/// Everything the controller knows about the current item.
///
/// Created fresh by every `load_item`, so per-item flags and the cached
/// duration can never leak from one item into the next.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub(crate) id: SessionId,
    pub(crate) url: String,
    pub(crate) state: PlaybackState,
    /// Rate to play at; the engine's rate is 0 while paused
    pub(crate) rate: f32,
    pub(crate) duration: Option<Duration>,
    /// Engine reported the item ready (the duration may still be pending)
    pub(crate) item_ready: bool,
    pub(crate) ready_notified: bool,
    pub(crate) start_time: Option<Duration>,
    pub(crate) seek_to_zero_before_play: bool,
    pub(crate) has_seeked_to_sync_start: bool,
    /// State to return to when an interruption ends
    pub(crate) resume_state: Option<PlaybackState>,
    pub(crate) scrub: Option<ScrubGesture>,
}

impl PlaybackSession {
    pub(crate) fn new(url: String, start_time: Option<Duration>, rate: f32) -> Self {
        Self {
            id: SessionId::new(),
            url,
            state: PlaybackState::Unknown,
            rate,
            duration: None,
            item_ready: false,
            ready_notified: false,
            start_time,
            seek_to_zero_before_play: false,
            has_seeked_to_sync_start: false,
            resume_state: None,
            scrub: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn start_time(&self) -> Option<Duration> {
        self.start_time
    }

    pub fn seek_to_zero_before_play(&self) -> bool {
        self.seek_to_zero_before_play
    }

    pub fn has_seeked_to_sync_start(&self) -> bool {
        self.has_seeked_to_sync_start
    }

    pub fn is_scrubbing(&self) -> bool {
        self.scrub.is_some()
    }

    /// Cache the item duration. Returns true only the first time a usable
    /// duration is seen, which is when observers get told about it.
    pub(crate) fn cache_duration(&mut self, duration: Duration) -> bool {
        if self.duration.is_some() || duration.is_zero() {
            return false;
        }
        self.duration = Some(duration);
        true
    }

    /// Clamp a seek target into the item
    pub(crate) fn clamp_time(&self, time: Duration) -> Duration {
        match self.duration {
            Some(duration) => time.min(duration),
            None => time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_is_cached_once() {
        let mut session = PlaybackSession::new("sim://a".to_string(), None, 1.0);

        assert!(!session.cache_duration(Duration::ZERO));
        assert!(session.cache_duration(Duration::from_secs(120)));
        assert!(!session.cache_duration(Duration::from_secs(120)));
        assert!(!session.cache_duration(Duration::from_secs(90)));
        assert_eq!(session.duration(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_new_session_starts_clean() {
        let session = PlaybackSession::new("sim://a".to_string(), Some(Duration::from_secs(30)), 1.0);

        assert_eq!(session.state(), PlaybackState::Unknown);
        assert!(!session.seek_to_zero_before_play());
        assert!(!session.has_seeked_to_sync_start());
        assert!(!session.is_scrubbing());
        assert_eq!(session.start_time(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_clamp_time_respects_known_duration() {
        let mut session = PlaybackSession::new("sim://a".to_string(), None, 1.0);
        assert_eq!(session.clamp_time(Duration::from_secs(500)), Duration::from_secs(500));

        session.cache_duration(Duration::from_secs(120));
        assert_eq!(session.clamp_time(Duration::from_secs(500)), Duration::from_secs(120));
    }
}
