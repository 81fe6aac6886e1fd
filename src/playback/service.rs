use crate::config::PlayerConfig;
use crate::engine::{EngineEvent, EngineEventSender, MediaEngine};
use crate::playback::controller::PlaybackController;
use crate::playback::error::PlayerError;
use crate::playback::progress::{
    BufferingDelegate, ObserverToken, PlaybackProgress, PlaybackProgressHandle,
};
use crate::playback::session::SessionId;
use crate::playback::state::PlaybackState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc as tokio_mpsc, oneshot};
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

/// Commands processed by the playback service, from the UI and the engine alike
#[derive(Debug)]
pub enum PlaybackCommand {
    Load {
        url: String,
        start_time: Option<Duration>,
        reply: oneshot::Sender<Result<SessionId, PlayerError>>,
    },
    Play,
    Pause,
    Seek {
        time: Duration,
        resume_after: Option<bool>,
    },
    SkipForward(Duration),
    SkipBackward(Duration),
    BeginScrub,
    ScrubPreview(Duration),
    EndScrub {
        time: Duration,
        resume_if_was_playing: bool,
    },
    EndScrubAtFraction {
        fraction: f32,
        resume_if_was_playing: bool,
    },
    SetRate(f32),
    Suspend,
    ResumeFromInterruption,
    Dismiss,
    GetState(oneshot::Sender<PlaybackState>),
    Engine(EngineEvent),
}

/// Handle to the playback service for sending commands
#[derive(Clone)]
pub struct PlaybackHandle {
    command_tx: tokio_mpsc::UnboundedSender<PlaybackCommand>,
    progress_handle: PlaybackProgressHandle,
}

impl PlaybackHandle {
    fn send(&self, command: PlaybackCommand) {
        let _ = self.command_tx.send(command);
    }

    /// Start a new session. Resolves once the controller accepted or rejected
    /// the item; readiness is reported through progress notifications.
    pub async fn load(
        &self,
        url: impl Into<String>,
        start_time: Option<Duration>,
    ) -> Result<SessionId, PlayerError> {
        let (reply, response) = oneshot::channel();
        self.command_tx
            .send(PlaybackCommand::Load {
                url: url.into(),
                start_time,
                reply,
            })
            .map_err(|_| PlayerError::ServiceStopped)?;
        response.await.map_err(|_| PlayerError::ServiceStopped)?
    }

    pub fn play(&self) {
        self.send(PlaybackCommand::Play);
    }

    pub fn pause(&self) {
        self.send(PlaybackCommand::Pause);
    }

    /// Seek to `time`. `resume_after: None` keeps playing if playing.
    pub fn seek(&self, time: Duration, resume_after: Option<bool>) {
        self.send(PlaybackCommand::Seek { time, resume_after });
    }

    pub fn skip_forward(&self, interval: Duration) {
        self.send(PlaybackCommand::SkipForward(interval));
    }

    pub fn skip_backward(&self, interval: Duration) {
        self.send(PlaybackCommand::SkipBackward(interval));
    }

    pub fn begin_scrub(&self) {
        self.send(PlaybackCommand::BeginScrub);
    }

    pub fn scrub_preview(&self, time: Duration) {
        self.send(PlaybackCommand::ScrubPreview(time));
    }

    pub fn end_scrub(&self, time: Duration, resume_if_was_playing: bool) {
        self.send(PlaybackCommand::EndScrub {
            time,
            resume_if_was_playing,
        });
    }

    pub fn end_scrub_at_fraction(&self, fraction: f32, resume_if_was_playing: bool) {
        self.send(PlaybackCommand::EndScrubAtFraction {
            fraction,
            resume_if_was_playing,
        });
    }

    pub fn set_rate(&self, rate: f32) {
        self.send(PlaybackCommand::SetRate(rate));
    }

    pub fn suspend(&self) {
        self.send(PlaybackCommand::Suspend);
    }

    pub fn resume_from_interruption(&self) {
        self.send(PlaybackCommand::ResumeFromInterruption);
    }

    pub fn dismiss(&self) {
        self.send(PlaybackCommand::Dismiss);
    }

    /// Current state, after every command sent before this call
    pub async fn state(&self) -> Result<PlaybackState, PlayerError> {
        let (reply, response) = oneshot::channel();
        self.command_tx
            .send(PlaybackCommand::GetState(reply))
            .map_err(|_| PlayerError::ServiceStopped)?;
        response.await.map_err(|_| PlayerError::ServiceStopped)
    }

    pub fn subscribe_progress(&self) -> tokio_mpsc::UnboundedReceiver<PlaybackProgress> {
        self.progress_handle.subscribe_all()
    }

    /// Subscribe with a token that can later be passed to `unsubscribe`
    pub fn subscribe(&self) -> (ObserverToken, tokio_mpsc::UnboundedReceiver<PlaybackProgress>) {
        self.progress_handle.subscribe()
    }

    pub fn progress_stream(&self) -> UnboundedReceiverStream<PlaybackProgress> {
        UnboundedReceiverStream::new(self.progress_handle.subscribe_all())
    }

    pub fn register_delegate(&self, delegate: Arc<dyn BufferingDelegate>) -> ObserverToken {
        self.progress_handle.register_delegate(delegate)
    }

    pub fn unsubscribe(&self, token: ObserverToken) -> bool {
        self.progress_handle.unsubscribe(token)
    }
}

/// Playback service that owns the controller and its engine.
///
/// Every command, engine event and timer runs on the service task, one at a
/// time. The task stops once every `PlaybackHandle` has been dropped.
pub struct PlaybackService<E: MediaEngine> {
    controller: PlaybackController<E>,
    command_rx: tokio_mpsc::UnboundedReceiver<PlaybackCommand>,
}

impl<E: MediaEngine + 'static> PlaybackService<E> {
    /// Spawn the service. `make_engine` receives the sender the engine posts
    /// its events through.
    pub fn start<F>(
        config: PlayerConfig,
        make_engine: F,
        runtime_handle: tokio::runtime::Handle,
    ) -> PlaybackHandle
    where
        F: FnOnce(EngineEventSender) -> E,
    {
        let (command_tx, command_rx) = tokio_mpsc::unbounded_channel();
        let (progress_tx, progress_rx) = tokio_mpsc::unbounded_channel();

        let progress_handle = PlaybackProgressHandle::new(progress_rx, runtime_handle.clone());

        let engine = make_engine(EngineEventSender::new(&command_tx));
        let controller = PlaybackController::new(config, engine, progress_tx);

        let mut service = PlaybackService {
            controller,
            command_rx,
        };
        runtime_handle.spawn(async move {
            service.run().await;
        });

        PlaybackHandle {
            command_tx,
            progress_handle,
        }
    }

    async fn run(&mut self) {
        info!("PlaybackService started");

        loop {
            let deadline = self.controller.next_deadline();
            tokio::select! {
                biased;
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                _ = sleep_until(deadline) => {
                    self.controller.on_timer(Instant::now());
                }
            }
        }

        self.controller.dismiss(Instant::now());
        info!("PlaybackService stopped");
    }

    fn handle_command(&mut self, command: PlaybackCommand) {
        let now = Instant::now();
        let controller = &mut self.controller;

        let result = match command {
            PlaybackCommand::Load {
                url,
                start_time,
                reply,
            } => {
                let result = controller.load_item(&url, start_time, now);
                if let Err(e) = &result {
                    warn!("Rejected load of {}: {}", url, e);
                }
                let _ = reply.send(result);
                Ok(())
            }
            PlaybackCommand::Play => controller.play(now),
            PlaybackCommand::Pause => controller.pause(now),
            PlaybackCommand::Seek { time, resume_after } => {
                controller.request_seek(time, resume_after, now).map(|_| ())
            }
            PlaybackCommand::SkipForward(interval) => {
                controller.skip_forward(interval, now).map(|_| ())
            }
            PlaybackCommand::SkipBackward(interval) => {
                controller.skip_backward(interval, now).map(|_| ())
            }
            PlaybackCommand::BeginScrub => controller.begin_scrub(now),
            PlaybackCommand::ScrubPreview(time) => controller.scrub_preview(time),
            PlaybackCommand::EndScrub {
                time,
                resume_if_was_playing,
            } => controller
                .end_scrub(time, resume_if_was_playing, now)
                .map(|_| ()),
            PlaybackCommand::EndScrubAtFraction {
                fraction,
                resume_if_was_playing,
            } => controller
                .end_scrub_at_fraction(fraction, resume_if_was_playing, now)
                .map(|_| ()),
            PlaybackCommand::SetRate(rate) => controller.set_rate(rate),
            PlaybackCommand::Suspend => {
                controller.suspend(now);
                Ok(())
            }
            PlaybackCommand::ResumeFromInterruption => {
                controller.resume_from_interruption(now);
                Ok(())
            }
            PlaybackCommand::Dismiss => {
                controller.dismiss(now);
                Ok(())
            }
            PlaybackCommand::GetState(reply) => {
                let _ = reply.send(controller.state());
                Ok(())
            }
            PlaybackCommand::Engine(event) => {
                controller.handle_engine_event(event, now);
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!("Playback command rejected: {}", e);
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{EngineCall, ScriptedEngine};

    fn start(engine: &ScriptedEngine) -> PlaybackHandle {
        let engine = engine.clone();
        PlaybackService::start(
            PlayerConfig::default(),
            move |_events| engine,
            tokio::runtime::Handle::current(),
        )
    }

    #[tokio::test]
    async fn test_load_replies_with_session_or_rejection() {
        let engine = ScriptedEngine::new();
        let handle = start(&engine);

        let first = handle.load("https://cdn.example/a.mp4", None).await.unwrap();
        let second = handle.load("https://cdn.example/b.mp4", None).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(handle.state().await.unwrap(), PlaybackState::Loading);

        assert_eq!(
            handle.load("", None).await,
            Err(PlayerError::InvalidUrl(String::new()))
        );
        assert_eq!(
            engine.calls(),
            vec![
                EngineCall::Load("https://cdn.example/a.mp4".to_string()),
                EngineCall::Load("https://cdn.example/b.mp4".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_dismissed_service_rejects_loads() {
        let engine = ScriptedEngine::new();
        let handle = start(&engine);
        let mut progress = handle.subscribe_progress();

        handle.dismiss();
        assert_eq!(handle.state().await.unwrap(), PlaybackState::Dismissed);
        assert_eq!(
            progress.recv().await,
            Some(PlaybackProgress::StateChanged {
                from: PlaybackState::Unknown,
                to: PlaybackState::Dismissed
            })
        );
        assert_eq!(
            handle.load("https://cdn.example/a.mp4", None).await,
            Err(PlayerError::Dismissed)
        );
    }

    #[tokio::test]
    async fn test_dropping_handles_stops_service() {
        let engine = ScriptedEngine::new();
        let handle = start(&engine);
        handle.load("https://cdn.example/a.mp4", None).await.unwrap();
        let mut progress = handle.subscribe_progress();

        drop(handle);
        // Shutdown dismisses the controller, which unloads the engine
        let mut last = None;
        while let Some(progress) = progress.recv().await {
            last = Some(progress);
        }
        assert_eq!(
            last,
            Some(PlaybackProgress::StateChanged {
                from: PlaybackState::Loading,
                to: PlaybackState::Dismissed
            })
        );
        assert!(engine.calls().contains(&EngineCall::Unload));
    }
}
