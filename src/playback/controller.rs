// # Playback Controller
//
// The playback state machine. Owns the session, the seek coordinator, the
// buffering monitor and the scrubber synchronizer, and is the only thing that
// changes `PlaybackState`. It is synchronous: the service loop feeds it UI
// commands, engine events and timer wake-ups one at a time, always with the
// current instant, and sleeps until `next_deadline` in between.

use crate::config::PlayerConfig;
use crate::engine::{EngineEvent, ItemStatus, MediaEngine, SeekId};
use crate::playback::buffering::BufferingMonitor;
use crate::playback::error::{PlaybackError, PlayerError};
use crate::playback::progress::PlaybackProgress;
use crate::playback::scrubber::{scrub_time_for_fraction, ScrubberSync};
use crate::playback::seek::{SeekCoordinator, SeekKind, SeekRequest};
use crate::playback::session::{PlaybackSession, ScrubGesture, SessionId};
use crate::playback::state::PlaybackState;
use std::time::Duration;
use tokio::sync::mpsc as tokio_mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub struct PlaybackController<E: MediaEngine> {
    config: PlayerConfig,
    engine: E,
    progress_tx: tokio_mpsc::UnboundedSender<PlaybackProgress>,
    session: Option<PlaybackSession>,
    dismissed: bool,
    seeks: SeekCoordinator,
    buffering: BufferingMonitor,
    scrubber: ScrubberSync,
}

impl<E: MediaEngine> PlaybackController<E> {
    pub fn new(
        config: PlayerConfig,
        engine: E,
        progress_tx: tokio_mpsc::UnboundedSender<PlaybackProgress>,
    ) -> Self {
        let buffering = BufferingMonitor::new(config.debounce_window);
        let scrubber = ScrubberSync::new(config.tick_interval);
        Self {
            config,
            engine,
            progress_tx,
            session: None,
            dismissed: false,
            seeks: SeekCoordinator::new(),
            buffering,
            scrubber,
        }
    }

    pub fn state(&self) -> PlaybackState {
        if self.dismissed {
            return PlaybackState::Dismissed;
        }
        self.session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(PlaybackState::Unknown)
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering.is_buffering()
    }

    pub fn pending_seek(&self) -> Option<&SeekRequest> {
        self.seeks.pending()
    }

    pub fn is_scrubber_running(&self) -> bool {
        self.scrubber.is_running()
    }

    /// Earliest instant a timer needs `on_timer`
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.buffering.deadline(), self.scrubber.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn emit(&self, progress: PlaybackProgress) {
        let _ = self.progress_tx.send(progress);
    }

    fn session_mut(&mut self) -> Result<&mut PlaybackSession, PlayerError> {
        self.session.as_mut().ok_or(PlayerError::NoActiveItem)
    }

    fn ensure_live(&self) -> Result<(), PlayerError> {
        if self.dismissed {
            return Err(PlayerError::Dismissed);
        }
        Ok(())
    }

    fn transition(&mut self, to: PlaybackState, now: Instant) {
        let from = self.state();
        if from == to {
            return;
        }

        if to == PlaybackState::Dismissed {
            self.dismissed = true;
        }
        let scrubbing = match self.session.as_mut() {
            Some(session) => {
                session.state = to;
                session.is_scrubbing()
            }
            None => false,
        };

        info!("Playback state {} -> {}", from, to);
        self.emit(PlaybackProgress::StateChanged { from, to });

        if to == PlaybackState::Playing && !scrubbing {
            self.scrubber.start(now);
            if let Some(buffering) = self.buffering.settle_if_recovered() {
                self.emit(PlaybackProgress::BufferingChanged { buffering });
            }
        } else {
            self.scrubber.stop();
        }
    }

    /// Start a new session for `url`, replacing the current one
    pub fn load_item(
        &mut self,
        url: &str,
        start_time: Option<Duration>,
        now: Instant,
    ) -> Result<SessionId, PlayerError> {
        self.ensure_live()?;

        let url = url.trim();
        if url.is_empty() || !url.contains("://") {
            return Err(PlayerError::InvalidUrl(url.to_string()));
        }

        if let Some(cancelled) = self.seeks.cancel() {
            debug!("Cancelled seek {:?} for previous item", cancelled.id);
        }
        self.scrubber.reset();
        if let Some(buffering) = self.buffering.reset() {
            self.emit(PlaybackProgress::BufferingChanged { buffering });
        }

        let mut session = PlaybackSession::new(url.to_string(), start_time, self.config.default_rate);
        session.state = self.state();
        let session_id = session.id;
        self.session = Some(session);

        info!("Loading {} (session {})", url, session_id);
        self.engine.load(url);
        self.transition(PlaybackState::Loading, now);

        Ok(session_id)
    }

    pub fn play(&mut self, now: Instant) -> Result<(), PlayerError> {
        self.ensure_live()?;

        let state = self.state();
        match state {
            PlaybackState::Playing => Ok(()),
            PlaybackState::Seeking => {
                self.seeks.set_resume_after(true);
                Ok(())
            }
            PlaybackState::Suspended => {
                self.session_mut()?.resume_state = Some(PlaybackState::Playing);
                Ok(())
            }
            PlaybackState::ReadyToPlay | PlaybackState::Paused => {
                if self.session_mut()?.seek_to_zero_before_play {
                    info!("Rewinding to zero before replay");
                    self.issue_seek(SeekKind::Rewind, Duration::ZERO, Some(true), None, now);
                } else {
                    self.start_engine(now);
                }
                Ok(())
            }
            _ => Err(PlayerError::InvalidState {
                operation: "play",
                state,
            }),
        }
    }

    fn start_engine(&mut self, now: Instant) {
        let Some(rate) = self.session.as_ref().map(|s| s.rate) else {
            return;
        };
        self.engine.set_rate(rate);
        self.transition(PlaybackState::Playing, now);
    }

    /// Stop the engine, remembering its live rate for the next resume
    fn halt_engine(&mut self) {
        let live = self.engine.rate();
        if live > 0.0 {
            if let Some(session) = self.session.as_mut() {
                session.rate = live;
            }
            self.engine.set_rate(0.0);
        }
    }

    pub fn pause(&mut self, now: Instant) -> Result<(), PlayerError> {
        self.ensure_live()?;

        let state = self.state();
        match state {
            PlaybackState::Playing => {
                self.halt_engine();
                self.transition(PlaybackState::Paused, now);
                Ok(())
            }
            PlaybackState::Seeking => {
                self.seeks.set_resume_after(false);
                Ok(())
            }
            PlaybackState::Suspended => {
                let session = self.session_mut()?;
                if session.resume_state == Some(PlaybackState::Playing) {
                    session.resume_state = Some(PlaybackState::Paused);
                }
                Ok(())
            }
            PlaybackState::Paused | PlaybackState::ReadyToPlay => Ok(()),
            _ => Err(PlayerError::InvalidState {
                operation: "pause",
                state,
            }),
        }
    }

    pub fn dismiss(&mut self, now: Instant) {
        if self.dismissed {
            return;
        }

        if let Some(cancelled) = self.seeks.cancel() {
            debug!("Cancelled seek {:?} on dismiss", cancelled.id);
        }
        self.scrubber.reset();
        if let Some(buffering) = self.buffering.reset() {
            self.emit(PlaybackProgress::BufferingChanged { buffering });
        }
        if self.session.is_some() {
            self.engine.set_rate(0.0);
            self.engine.unload();
        }

        self.transition(PlaybackState::Dismissed, now);
    }

    /// Seek the current item. `resume_after: None` keeps the current
    /// play/pause intent.
    pub fn request_seek(
        &mut self,
        time: Duration,
        resume_after: Option<bool>,
        now: Instant,
    ) -> Result<SeekId, PlayerError> {
        self.ensure_live()?;
        let target = self.seek_target("seek", time)?;
        Ok(self.issue_seek(SeekKind::User, target, resume_after, None, now))
    }

    pub fn skip_forward(&mut self, interval: Duration, now: Instant) -> Result<SeekId, PlayerError> {
        self.ensure_live()?;
        let base = self.seek_base();
        let target = self.seek_target("skip", base.saturating_add(interval))?;
        Ok(self.issue_seek(SeekKind::User, target, None, None, now))
    }

    pub fn skip_backward(&mut self, interval: Duration, now: Instant) -> Result<SeekId, PlayerError> {
        self.ensure_live()?;
        let base = self.seek_base();
        let target = self.seek_target("skip", base.saturating_sub(interval))?;
        Ok(self.issue_seek(SeekKind::User, target, None, None, now))
    }

    /// Where a relative seek starts from: the in-flight target, else the playhead
    fn seek_base(&self) -> Duration {
        match self.seeks.pending() {
            Some(request) => request.target,
            None => self.engine.current_time(),
        }
    }

    fn seek_target(&self, operation: &'static str, time: Duration) -> Result<Duration, PlayerError> {
        let state = self.state();
        if !state.can_seek() {
            return Err(PlayerError::InvalidState { operation, state });
        }
        let session = self.session.as_ref().ok_or(PlayerError::NoActiveItem)?;
        Ok(session.clamp_time(time))
    }

    fn issue_seek(
        &mut self,
        kind: SeekKind,
        target: Duration,
        resume_after: Option<bool>,
        rate: Option<f32>,
        now: Instant,
    ) -> SeekId {
        let state = self.state();
        let playing = state == PlaybackState::Playing;
        let live = self.engine.rate();
        let captured_rate = rate.or((playing && live > 0.0).then_some(live));

        let request = self
            .seeks
            .issue(kind, target, resume_after, playing, captured_rate, state);
        info!(
            "Seeking to {:?} ({:?}, seek {:?}, resume: {})",
            request.target, request.kind, request.id, request.resume_after
        );

        self.engine.seek(request.target, request.id);
        self.transition(PlaybackState::Seeking, now);
        request.id
    }

    pub fn begin_scrub(&mut self, now: Instant) -> Result<(), PlayerError> {
        self.ensure_live()?;

        let state = self.state();
        if !state.can_seek() {
            return Err(PlayerError::InvalidState {
                operation: "scrub",
                state,
            });
        }
        if self.session_mut()?.is_scrubbing() {
            return Ok(());
        }

        let was_playing = match state {
            PlaybackState::Playing => true,
            PlaybackState::Seeking => self.seeks.pending().map(|r| r.resume_after).unwrap_or(false),
            _ => false,
        };
        if state == PlaybackState::Seeking {
            // A seek landing or failing mid-gesture must not start playback
            self.seeks.set_resume_after(false);
            self.seeks.set_return_state(PlaybackState::Paused);
        }
        self.halt_engine();

        let session = self.session_mut()?;
        session.scrub = Some(ScrubGesture {
            was_playing,
            rate: session.rate,
        });
        debug!("Scrub started (was playing: {})", was_playing);

        self.scrubber.stop();
        if state == PlaybackState::Playing {
            self.transition(PlaybackState::Paused, now);
        }
        Ok(())
    }

    /// Thumb moved during a scrub gesture; publishes the position only
    pub fn scrub_preview(&mut self, position: Duration) -> Result<(), PlayerError> {
        self.ensure_live()?;
        let state = self.state();
        let session = self.session_mut()?;
        if !session.is_scrubbing() {
            return Err(PlayerError::InvalidState {
                operation: "preview a scrub",
                state,
            });
        }
        let position = session.clamp_time(position);
        self.emit(PlaybackProgress::ScrubPreview { position });
        Ok(())
    }

    /// Finish a scrub gesture by seeking to `target`. Playback resumes at
    /// the pre-gesture rate only if it was playing and `resume_if_was_playing`.
    pub fn end_scrub(
        &mut self,
        target: Duration,
        resume_if_was_playing: bool,
        now: Instant,
    ) -> Result<SeekId, PlayerError> {
        self.ensure_live()?;
        let target = self.seek_target("end a scrub", target)?;
        let state = self.state();
        let gesture = self
            .session_mut()?
            .scrub
            .take()
            .ok_or(PlayerError::InvalidState {
                operation: "end a scrub",
                state,
            })?;

        let resume = resume_if_was_playing && gesture.was_playing;
        debug!("Scrub ended at {:?} (resume: {})", target, resume);
        Ok(self.issue_seek(SeekKind::User, target, Some(resume), Some(gesture.rate), now))
    }

    pub fn end_scrub_at_fraction(
        &mut self,
        fraction: f32,
        resume_if_was_playing: bool,
        now: Instant,
    ) -> Result<SeekId, PlayerError> {
        let duration = self.session.as_ref().and_then(|s| s.duration);
        self.end_scrub(scrub_time_for_fraction(fraction, duration), resume_if_was_playing, now)
    }

    pub fn set_rate(&mut self, rate: f32) -> Result<(), PlayerError> {
        self.ensure_live()?;
        if !(rate.is_finite() && rate > 0.0) {
            return Err(PlayerError::InvalidRate(rate));
        }
        let session = self.session_mut()?;
        session.rate = rate;
        if let Some(gesture) = session.scrub.as_mut() {
            gesture.rate = rate;
        }
        // A seek in flight replays this rate when it lands
        self.seeks.set_restore_rate(rate);
        if self.state() == PlaybackState::Playing {
            self.engine.set_rate(rate);
        }
        Ok(())
    }

    /// The environment interrupted playback (call, other app, backgrounding)
    pub fn suspend(&mut self, now: Instant) {
        let state = self.state();
        if state.is_terminal() || state == PlaybackState::Suspended || self.session.is_none() {
            debug!("Ignoring interruption while {}", state);
            return;
        }

        self.halt_engine();
        if let Some(session) = self.session.as_mut() {
            session.resume_state = Some(state);
        }
        self.transition(PlaybackState::Suspended, now);
    }

    /// The interruption ended; go back to where playback was
    pub fn resume_from_interruption(&mut self, now: Instant) {
        if self.state() != PlaybackState::Suspended {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let target = session.resume_state.take().unwrap_or(PlaybackState::Paused);
        match target {
            PlaybackState::Playing => {
                let rate = session.rate;
                self.engine.set_rate(rate);
                self.transition(PlaybackState::Playing, now);
            }
            PlaybackState::Loading => {
                self.transition(PlaybackState::Loading, now);
                self.try_become_ready(now);
            }
            other => self.transition(other, now),
        }
    }

    pub fn handle_engine_event(&mut self, event: EngineEvent, now: Instant) {
        if self.dismissed || self.session.is_none() {
            debug!("Dropping engine event without a live session: {:?}", event);
            return;
        }

        match event {
            EngineEvent::ItemStatus(status) => self.on_item_status(status, now),
            EngineEvent::DurationAvailable(duration) => {
                if self.state() == PlaybackState::Error {
                    return;
                }
                self.record_duration(duration);
                self.try_become_ready(now);
            }
            EngineEvent::BufferEmpty => self.on_stall_signal(now),
            EngineEvent::LikelyToKeepUp => {
                if self.state() != PlaybackState::Error {
                    self.buffering.on_recovered_signal(now);
                }
            }
            EngineEvent::SeekCompleted { id, finished } => self.on_seek_completed(id, finished, now),
            EngineEvent::PlayedToEnd => self.on_played_to_end(now),
        }
    }

    fn on_item_status(&mut self, status: ItemStatus, now: Instant) {
        if self.state() == PlaybackState::Error {
            debug!("Ignoring item status {:?} after failure", status);
            return;
        }

        match status {
            ItemStatus::Unknown => debug!("Item status unknown"),
            ItemStatus::ReadyToPlay => {
                if let Some(session) = self.session.as_mut() {
                    session.item_ready = true;
                }
                if let Some(duration) = self.engine.duration() {
                    self.record_duration(duration);
                }
                self.try_become_ready(now);
            }
            ItemStatus::Failed(reason) => self.fail_load(reason, now),
        }
    }

    fn record_duration(&mut self, duration: Duration) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.cache_duration(duration) {
            info!("Duration loaded: {:?}", duration);
            let session = session.id;
            self.emit(PlaybackProgress::DurationLoaded { session, duration });
        }
    }

    /// `Loading -> ReadyToPlay` once the item is ready and its duration known
    fn try_become_ready(&mut self, now: Instant) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.state != PlaybackState::Loading
            || !session.item_ready
            || session.duration.is_none()
        {
            return;
        }

        let notify = !std::mem::replace(&mut session.ready_notified, true);
        let session_id = session.id;
        self.transition(PlaybackState::ReadyToPlay, now);
        if notify {
            self.emit(PlaybackProgress::ReadyToPlay {
                session: session_id,
            });
        }

        self.after_ready(now);
    }

    fn after_ready(&mut self, now: Instant) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let autoplay = self.config.autoplay;
        if !session.has_seeked_to_sync_start {
            let resume_at = session
                .start_time
                .filter(|start| *start > self.config.min_resume_time)
                .map(|start| session.clamp_time(start));
            match resume_at {
                Some(target) => {
                    self.issue_seek(SeekKind::Resume, target, Some(autoplay), None, now);
                    return;
                }
                None => session.has_seeked_to_sync_start = true,
            }
        }

        if autoplay {
            self.start_engine(now);
        }
    }

    fn fail_load(&mut self, reason: String, now: Instant) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        error!("Failed to load {}: {}", session.url, reason);
        let session_id = session.id;

        self.seeks.cancel();
        self.scrubber.reset();
        if let Some(buffering) = self.buffering.reset() {
            self.emit(PlaybackProgress::BufferingChanged { buffering });
        }

        self.transition(PlaybackState::Error, now);
        self.emit(PlaybackProgress::Error {
            session: session_id,
            error: PlaybackError::EngineLoadFailure { reason },
        });
    }

    fn on_stall_signal(&mut self, now: Instant) {
        let state = self.state();
        if state != PlaybackState::Playing {
            debug!("Ignoring stall signal while {}", state);
            return;
        }

        let position = self.engine.current_time();
        let duration = self.session.as_ref().and_then(|s| s.duration);
        let near_end = duration
            .map(|d| position.saturating_add(self.config.stall_edge_margin) >= d)
            .unwrap_or(false);
        if position.is_zero() || near_end {
            debug!("Ignoring stall signal at {:?}", position);
            return;
        }

        self.buffering.on_stall_signal(now);
    }

    fn on_seek_completed(&mut self, id: SeekId, finished: bool, now: Instant) {
        let Some(request) = self.seeks.complete(id) else {
            return;
        };
        let suspended = self.state() == PlaybackState::Suspended;
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if !finished {
            warn!("Seek to {:?} failed", request.target);
            let fallback = match request.return_state {
                state @ (PlaybackState::Playing
                | PlaybackState::Paused
                | PlaybackState::ReadyToPlay) => state,
                _ => PlaybackState::Paused,
            };
            let session_id = session.id;
            let rate = session.rate;
            if suspended {
                session.resume_state = Some(fallback);
            } else {
                if fallback == PlaybackState::Playing && self.engine.rate() == 0.0 {
                    self.engine.set_rate(rate);
                }
                self.transition(fallback, now);
            }
            self.emit(PlaybackProgress::Error {
                session: session_id,
                error: PlaybackError::SeekFailure {
                    target: request.target,
                },
            });
            return;
        }

        session.has_seeked_to_sync_start = true;
        // The playhead left the end of the item, whichever seek moved it
        if request.kind != SeekKind::Resume {
            session.seek_to_zero_before_play = false;
        }

        let target_state = if request.resume_after {
            PlaybackState::Playing
        } else if request.kind == SeekKind::Resume {
            request.return_state
        } else {
            PlaybackState::Paused
        };

        if request.resume_after && request.kind != SeekKind::Resume {
            if let Some(rate) = request.restore_rate {
                session.rate = rate;
            }
        }

        if suspended {
            session.resume_state = Some(target_state);
            return;
        }

        debug!("Seek {:?} landed at {:?}", request.id, request.target);
        if target_state == PlaybackState::Playing {
            let rate = session.rate;
            self.engine.set_rate(rate);
        } else {
            self.halt_engine();
        }
        self.transition(target_state, now);
    }

    fn on_played_to_end(&mut self, now: Instant) {
        let state = self.state();
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match state {
            PlaybackState::Playing | PlaybackState::Paused => {
                session.seek_to_zero_before_play = true;
                let session_id = session.id;
                self.halt_engine();
                self.transition(PlaybackState::Paused, now);
                self.emit(PlaybackProgress::ReachedEnd {
                    session: session_id,
                });
            }
            PlaybackState::Suspended => {
                session.seek_to_zero_before_play = true;
                session.resume_state = Some(PlaybackState::Paused);
                let session_id = session.id;
                self.emit(PlaybackProgress::ReachedEnd {
                    session: session_id,
                });
            }
            _ => debug!("Ignoring end of item while {}", state),
        }
    }

    /// Fire whatever timers are due at `now`
    pub fn on_timer(&mut self, now: Instant) {
        if let Some(buffering) = self.buffering.poll(now) {
            info!("Buffering: {}", buffering);
            self.emit(PlaybackProgress::BufferingChanged { buffering });
        }

        if self.state() != PlaybackState::Playing {
            self.scrubber.stop();
            return;
        }
        let duration = self.session.as_ref().and_then(|s| s.duration);
        let position = self.engine.current_time();
        if let Some(update) = self.scrubber.tick(now, position, duration) {
            self.emit(PlaybackProgress::TimeChanged { update });
        }
    }
}
