use crate::engine::SeekId;
use crate::playback::state::PlaybackState;
use std::time::Duration;
use tracing::debug;

/// Why a seek was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekKind {
    /// Requested by the user (seek, scrub, skip)
    User,
    /// Initial jump to the session's start time; setup, not a user action
    Resume,
    /// Rewind to zero before replaying a finished item
    Rewind,
}

/// A seek in flight
#[derive(Debug, Clone, PartialEq)]
pub struct SeekRequest {
    pub id: SeekId,
    pub kind: SeekKind,
    pub target: Duration,
    /// Play once the seek lands
    pub resume_after: bool,
    /// Rate captured when the seek was issued, replayed on completion
    pub restore_rate: Option<f32>,
    /// State to fall back to if the seek fails
    pub return_state: PlaybackState,
}

/// Serializes seeks against the engine.
///
/// At most one request is pending. Issuing a new one supersedes the old one:
/// the engine may still report the old completion, but `complete` will no
/// longer recognise its id, so only the latest seek's outcome is acted on.
#[derive(Debug, Default)]
pub struct SeekCoordinator {
    last_id: u64,
    pending: Option<SeekRequest>,
}

impl SeekCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<&SeekRequest> {
        self.pending.as_ref()
    }

    /// Change the resume intent of the pending seek (play/pause while seeking)
    pub fn set_resume_after(&mut self, resume_after: bool) -> bool {
        match self.pending.as_mut() {
            Some(request) => {
                request.resume_after = resume_after;
                true
            }
            None => false,
        }
    }

    /// Replace the rate replayed when the pending seek lands (rate changed mid-seek)
    pub fn set_restore_rate(&mut self, rate: f32) -> bool {
        match self.pending.as_mut() {
            Some(request) => {
                request.restore_rate = Some(rate);
                true
            }
            None => false,
        }
    }

    /// Replace the state the pending seek falls back to if it fails
    pub fn set_return_state(&mut self, state: PlaybackState) -> bool {
        match self.pending.as_mut() {
            Some(request) => {
                request.return_state = state;
                true
            }
            None => false,
        }
    }

    /// Register a new seek, superseding any pending one.
    ///
    /// `resume_after: None` keeps the superseded request's intent, falling
    /// back to `playing`. A superseding request also inherits the pending
    /// request's fallback state and, when it captured none itself, its rate.
    pub fn issue(
        &mut self,
        kind: SeekKind,
        target: Duration,
        resume_after: Option<bool>,
        playing: bool,
        captured_rate: Option<f32>,
        current_state: PlaybackState,
    ) -> SeekRequest {
        self.last_id += 1;
        let id = SeekId(self.last_id);

        let previous = self.pending.take();
        if let Some(previous) = &previous {
            debug!("Seek {:?} superseded by {:?}", previous.id, id);
        }

        let resume_after = resume_after
            .or(previous.as_ref().map(|p| p.resume_after))
            .unwrap_or(playing);
        let restore_rate = captured_rate.or(previous.as_ref().and_then(|p| p.restore_rate));
        let return_state = match &previous {
            Some(previous) => previous.return_state,
            None => current_state,
        };

        let request = SeekRequest {
            id,
            kind,
            target,
            resume_after,
            restore_rate,
            return_state,
        };
        self.pending = Some(request.clone());
        request
    }

    /// Take the pending request if `id` is the latest seek. Completions of
    /// superseded or cancelled seeks return `None`.
    pub fn complete(&mut self, id: SeekId) -> Option<SeekRequest> {
        match &self.pending {
            Some(request) if request.id == id => self.pending.take(),
            _ => {
                debug!("Ignoring stale completion for seek {:?}", id);
                None
            }
        }
    }

    /// Forget the pending seek; its completion will be ignored
    pub fn cancel(&mut self) -> Option<SeekRequest> {
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_only_latest_seek_completes() {
        let mut seeks = SeekCoordinator::new();
        let a = seeks.issue(SeekKind::User, secs(10), None, true, Some(1.0), PlaybackState::Playing);
        let b = seeks.issue(SeekKind::User, secs(20), None, true, None, PlaybackState::Seeking);

        assert_ne!(a.id, b.id);
        assert_eq!(seeks.complete(a.id), None);
        assert_eq!(seeks.complete(b.id).map(|r| r.target), Some(secs(20)));
        // Late duplicate is stale too
        assert_eq!(seeks.complete(b.id), None);
        assert!(seeks.pending().is_none());
    }

    #[test]
    fn test_superseding_request_inherits_context() {
        let mut seeks = SeekCoordinator::new();
        seeks.issue(SeekKind::User, secs(10), Some(true), true, Some(1.5), PlaybackState::Playing);
        let b = seeks.issue(SeekKind::User, secs(30), None, false, None, PlaybackState::Seeking);

        assert!(b.resume_after);
        assert_eq!(b.restore_rate, Some(1.5));
        assert_eq!(b.return_state, PlaybackState::Playing);
    }

    #[test]
    fn test_resume_defaults_to_current_playback() {
        let mut seeks = SeekCoordinator::new();
        let paused = seeks.issue(SeekKind::User, secs(5), None, false, None, PlaybackState::Paused);
        assert!(!paused.resume_after);
        seeks.cancel();

        let playing = seeks.issue(SeekKind::User, secs(5), None, true, Some(1.0), PlaybackState::Playing);
        assert!(playing.resume_after);
    }

    #[test]
    fn test_cancel_makes_completion_stale() {
        let mut seeks = SeekCoordinator::new();
        let a = seeks.issue(SeekKind::Rewind, Duration::ZERO, Some(true), false, None, PlaybackState::Paused);

        assert_eq!(seeks.cancel().map(|r| r.id), Some(a.id));
        assert_eq!(seeks.complete(a.id), None);
    }

    #[test]
    fn test_set_resume_after_updates_pending() {
        let mut seeks = SeekCoordinator::new();
        assert!(!seeks.set_resume_after(true));

        seeks.issue(SeekKind::User, secs(5), None, false, None, PlaybackState::Paused);
        assert!(seeks.set_resume_after(true));
        assert_eq!(seeks.pending().map(|r| r.resume_after), Some(true));
    }

    #[test]
    fn test_pending_rate_and_fallback_carry_into_superseding_request() {
        let mut seeks = SeekCoordinator::new();
        assert!(!seeks.set_restore_rate(2.0));
        assert!(!seeks.set_return_state(PlaybackState::Paused));

        seeks.issue(SeekKind::User, secs(10), None, true, Some(1.0), PlaybackState::Playing);
        assert!(seeks.set_restore_rate(2.0));
        assert!(seeks.set_return_state(PlaybackState::Paused));

        let b = seeks.issue(SeekKind::User, secs(40), None, false, None, PlaybackState::Seeking);
        assert_eq!(b.restore_rate, Some(2.0));
        assert_eq!(b.return_state, PlaybackState::Paused);
    }
}
