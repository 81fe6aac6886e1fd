// # Media Engine Boundary
//
// The engine loads, buffers and renders the media item. It is driven by the
// playback controller and reports back asynchronously through an
// `EngineEventSender`, which feeds the same channel the UI commands travel
// through so every event is handled on the controller's owner task.

mod simulated;

pub use simulated::{SimulatedEngine, SimulatedItem};

use crate::playback::service::PlaybackCommand;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc as tokio_mpsc;

/// Identifies one seek issued to the engine; echoed back on completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeekId(pub u64);

/// Status of the engine's current item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Unknown,
    ReadyToPlay,
    Failed(String),
}

/// Asynchronous notifications posted by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ItemStatus(ItemStatus),
    /// The item's duration became known (or changed)
    DurationAvailable(Duration),
    /// Playback buffer ran dry
    BufferEmpty,
    /// Enough data is buffered to keep playing
    LikelyToKeepUp,
    /// A seek finished; `finished == false` means the engine gave up on it
    SeekCompleted { id: SeekId, finished: bool },
    /// The item played to its end time
    PlayedToEnd,
}

/// Operations the controller needs from a media engine.
///
/// Every call is fire-and-forget: anything that takes time is reported later
/// as an [`EngineEvent`]. A rate of `0.0` means paused.
pub trait MediaEngine: Send {
    /// Replace the current item. Events belonging to the previous item must
    /// not be posted after this returns.
    fn load(&mut self, url: &str);

    /// Drop the current item and stop posting events for it
    fn unload(&mut self);

    fn rate(&self) -> f32;

    fn set_rate(&mut self, rate: f32);

    fn current_time(&self) -> Duration;

    /// Item duration, only available once the item is ready
    fn duration(&self) -> Option<Duration>;

    /// Start seeking; completion arrives as [`EngineEvent::SeekCompleted`]
    fn seek(&mut self, target: Duration, id: SeekId);
}

/// Sender engines use to post [`EngineEvent`]s to the playback service.
///
/// Holds a weak reference to the command channel: an engine owned by the
/// service must not keep the service alive after every handle is gone.
#[derive(Clone)]
pub struct EngineEventSender {
    tx: tokio_mpsc::WeakUnboundedSender<PlaybackCommand>,
}

impl EngineEventSender {
    pub(crate) fn new(tx: &tokio_mpsc::UnboundedSender<PlaybackCommand>) -> Self {
        Self { tx: tx.downgrade() }
    }

    /// Post an event. Returns false once the service has shut down.
    pub fn send(&self, event: EngineEvent) -> bool {
        match self.tx.upgrade() {
            Some(tx) => tx.send(PlaybackCommand::Engine(event)).is_ok(),
            None => false,
        }
    }
}
