use super::{EngineEvent, EngineEventSender, ItemStatus, MediaEngine, SeekId};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Behaviour of the item a [`SimulatedEngine`] pretends to load
#[derive(Debug, Clone)]
pub struct SimulatedItem {
    pub duration: Duration,
    /// Time between `load` and the ready (or failed) status
    pub load_delay: Duration,
    /// Time a seek takes to complete
    pub seek_delay: Duration,
    /// When set, loading fails with this reason instead of becoming ready
    pub fail_load: Option<String>,
}

impl Default for SimulatedItem {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(120),
            load_delay: Duration::from_millis(200),
            seek_delay: Duration::from_millis(100),
            fail_load: None,
        }
    }
}

struct Playhead {
    /// Bumped on load/unload; work scheduled for an older item is dropped
    generation: u64,
    /// Bumped whenever position or rate changes; invalidates the end timer
    epoch: u64,
    position: Duration,
    anchor: Instant,
    rate: f32,
    duration: Option<Duration>,
    latest_seek: Option<SeekId>,
}

impl Playhead {
    fn position_at(&self, now: Instant) -> Duration {
        let mut position = self.position;
        if self.rate > 0.0 {
            position += now.saturating_duration_since(self.anchor).mul_f32(self.rate);
        }
        match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    fn rebase(&mut self, now: Instant) {
        self.position = self.position_at(now);
        self.anchor = now;
        self.epoch += 1;
    }
}

fn lock(playhead: &Mutex<Playhead>) -> MutexGuard<'_, Playhead> {
    playhead.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process engine driven by the tokio clock.
///
/// Plays a virtual item of fixed duration: loading, seeking and reaching the
/// end all happen on timers, and are reported through the event sender just
/// like a real engine would. Must be used from within a tokio runtime.
pub struct SimulatedEngine {
    events: EngineEventSender,
    item: SimulatedItem,
    playhead: Arc<Mutex<Playhead>>,
}

impl SimulatedEngine {
    pub fn new(events: EngineEventSender, item: SimulatedItem) -> Self {
        Self {
            events,
            item,
            playhead: Arc::new(Mutex::new(Playhead {
                generation: 0,
                epoch: 0,
                position: Duration::ZERO,
                anchor: Instant::now(),
                rate: 0.0,
                duration: None,
                latest_seek: None,
            })),
        }
    }
}

/// Arm a timer that posts `PlayedToEnd` when the playhead reaches the end
fn schedule_end(playhead: &Arc<Mutex<Playhead>>, events: &EngineEventSender, state: &Playhead) {
    let Some(duration) = state.duration else {
        return;
    };
    if state.rate <= 0.0 {
        return;
    }

    let remaining = duration.saturating_sub(state.position).div_f32(state.rate);
    let generation = state.generation;
    let epoch = state.epoch;
    let playhead = playhead.clone();
    let events = events.clone();

    tokio::spawn(async move {
        tokio::time::sleep(remaining).await;
        {
            let mut state = lock(&playhead);
            if state.generation != generation || state.epoch != epoch {
                return;
            }
            state.position = duration;
            state.anchor = Instant::now();
            state.rate = 0.0;
            state.epoch += 1;
        }
        debug!("Simulated item reached its end");
        events.send(EngineEvent::PlayedToEnd);
    });
}

impl MediaEngine for SimulatedEngine {
    fn load(&mut self, url: &str) {
        info!("Simulated engine loading {}", url);

        let generation = {
            let mut state = lock(&self.playhead);
            state.generation += 1;
            state.epoch += 1;
            state.position = Duration::ZERO;
            state.anchor = Instant::now();
            state.rate = 0.0;
            state.duration = None;
            state.latest_seek = None;
            state.generation
        };

        let playhead = self.playhead.clone();
        let events = self.events.clone();
        let item = self.item.clone();
        tokio::spawn(async move {
            tokio::time::sleep(item.load_delay).await;
            {
                let mut state = lock(&playhead);
                if state.generation != generation {
                    return;
                }
                if item.fail_load.is_none() {
                    state.duration = Some(item.duration);
                }
            }

            match item.fail_load {
                Some(reason) => {
                    events.send(EngineEvent::ItemStatus(ItemStatus::Failed(reason)));
                }
                None => {
                    events.send(EngineEvent::ItemStatus(ItemStatus::ReadyToPlay));
                    events.send(EngineEvent::DurationAvailable(item.duration));
                }
            }
        });
    }

    fn unload(&mut self) {
        let mut state = lock(&self.playhead);
        state.generation += 1;
        state.epoch += 1;
        state.rate = 0.0;
        state.duration = None;
        state.latest_seek = None;
    }

    fn rate(&self) -> f32 {
        lock(&self.playhead).rate
    }

    fn set_rate(&mut self, rate: f32) {
        let mut state = lock(&self.playhead);
        state.rebase(Instant::now());
        state.rate = rate.max(0.0);
        schedule_end(&self.playhead, &self.events, &state);
    }

    fn current_time(&self) -> Duration {
        lock(&self.playhead).position_at(Instant::now())
    }

    fn duration(&self) -> Option<Duration> {
        lock(&self.playhead).duration
    }

    fn seek(&mut self, target: Duration, id: SeekId) {
        let generation = {
            let mut state = lock(&self.playhead);
            state.latest_seek = Some(id);
            state.generation
        };

        let playhead = self.playhead.clone();
        let events = self.events.clone();
        let delay = self.item.seek_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let finished = {
                let mut state = lock(&playhead);
                if state.generation != generation {
                    return;
                }
                // A newer seek replaces this one, like a real engine does
                let finished = state.latest_seek == Some(id);
                if finished {
                    state.position = match state.duration {
                        Some(duration) => target.min(duration),
                        None => target,
                    };
                    state.anchor = Instant::now();
                    state.epoch += 1;
                    schedule_end(&playhead, &events, &state);
                }
                finished
            };
            events.send(EngineEvent::SeekCompleted { id, finished });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::service::PlaybackCommand;
    use tokio::sync::mpsc as tokio_mpsc;

    type Commands = (
        tokio_mpsc::UnboundedSender<PlaybackCommand>,
        tokio_mpsc::UnboundedReceiver<PlaybackCommand>,
    );

    fn engine(item: SimulatedItem) -> (SimulatedEngine, Commands) {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        let engine = SimulatedEngine::new(EngineEventSender::new(&tx), item);
        (engine, (tx, rx))
    }

    async fn next_event(rx: &mut tokio_mpsc::UnboundedReceiver<PlaybackCommand>) -> EngineEvent {
        match rx.recv().await {
            Some(PlaybackCommand::Engine(event)) => event,
            other => panic!("expected engine event, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_reports_ready_then_duration() {
        let (mut engine, (_tx, mut rx)) = engine(SimulatedItem::default());
        engine.load("sim://movie");
        assert_eq!(engine.duration(), None);

        assert_eq!(
            next_event(&mut rx).await,
            EngineEvent::ItemStatus(ItemStatus::ReadyToPlay)
        );
        assert_eq!(
            next_event(&mut rx).await,
            EngineEvent::DurationAvailable(Duration::from_secs(120))
        );
        assert_eq!(engine.duration(), Some(Duration::from_secs(120)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_load_reports_failure() {
        let (mut engine, (_tx, mut rx)) = engine(SimulatedItem {
            fail_load: Some("unreachable host".to_string()),
            ..SimulatedItem::default()
        });
        engine.load("sim://broken");

        assert_eq!(
            next_event(&mut rx).await,
            EngineEvent::ItemStatus(ItemStatus::Failed("unreachable host".to_string()))
        );
        assert_eq!(engine.duration(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_seek_is_not_finished() {
        let (mut engine, (_tx, mut rx)) = engine(SimulatedItem::default());
        engine.load("sim://movie");
        next_event(&mut rx).await;
        next_event(&mut rx).await;

        engine.seek(Duration::from_secs(10), SeekId(1));
        engine.seek(Duration::from_secs(50), SeekId(2));

        let completions = vec![next_event(&mut rx).await, next_event(&mut rx).await];
        assert!(completions.contains(&EngineEvent::SeekCompleted {
            id: SeekId(1),
            finished: false
        }));
        assert!(completions.contains(&EngineEvent::SeekCompleted {
            id: SeekId(2),
            finished: true
        }));
        assert_eq!(engine.current_time(), Duration::from_secs(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_playing_reaches_end() {
        let (mut engine, (_tx, mut rx)) = engine(SimulatedItem {
            duration: Duration::from_secs(5),
            ..SimulatedItem::default()
        });
        engine.load("sim://short");
        next_event(&mut rx).await;
        next_event(&mut rx).await;

        engine.set_rate(1.0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(engine.current_time(), Duration::from_secs(2));

        assert_eq!(next_event(&mut rx).await, EngineEvent::PlayedToEnd);
        assert_eq!(engine.rate(), 0.0);
        assert_eq!(engine.current_time(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_for_unloaded_item_are_dropped() {
        let (mut engine, (_tx, mut rx)) = engine(SimulatedItem::default());
        engine.load("sim://movie");
        engine.unload();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }
}
