use super::PlaybackProgress;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use tokio::sync::mpsc as tokio_mpsc;
use tracing::info;

/// Registration token for an observer; pass it to `unsubscribe` to revoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(u64);

/// Callback-style observer of the debounced buffering flag
pub trait BufferingDelegate: Send + Sync {
    fn is_buffering(&self, buffering: bool);
}

enum Observer {
    Channel(tokio_mpsc::UnboundedSender<PlaybackProgress>),
    Delegate(Arc<dyn BufferingDelegate>),
}

type Observers = Arc<Mutex<HashMap<ObserverToken, Observer>>>;

fn lock(observers: &Observers) -> MutexGuard<'_, HashMap<ObserverToken, Observer>> {
    observers.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle for subscribing to playback progress updates
#[derive(Clone)]
pub struct PlaybackProgressHandle {
    observers: Observers,
    next_id: Arc<AtomicU64>,
}

impl PlaybackProgressHandle {
    /// Create a new progress handle and spawn background task to process progress updates
    pub fn new(
        mut progress_rx: tokio_mpsc::UnboundedReceiver<PlaybackProgress>,
        runtime_handle: tokio::runtime::Handle,
    ) -> Self {
        let observers: Observers = Arc::new(Mutex::new(HashMap::new()));
        let observers_clone = observers.clone();

        runtime_handle.spawn(async move {
            while let Some(progress) = progress_rx.recv().await {
                dispatch(&observers_clone, &progress);
            }
            info!("Playback progress channel closed, exiting");
        });

        Self {
            observers,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn register(&self, observer: Observer) -> ObserverToken {
        let token = ObserverToken(self.next_id.fetch_add(1, Ordering::SeqCst));
        lock(&self.observers).insert(token, observer);
        token
    }

    /// Subscribe to all playback progress updates.
    /// The subscription is removed when the receiver is dropped or the
    /// token is revoked.
    pub fn subscribe(&self) -> (ObserverToken, tokio_mpsc::UnboundedReceiver<PlaybackProgress>) {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        (self.register(Observer::Channel(tx)), rx)
    }

    /// Subscribe without keeping the token; drop the receiver to unsubscribe
    pub fn subscribe_all(&self) -> tokio_mpsc::UnboundedReceiver<PlaybackProgress> {
        self.subscribe().1
    }

    /// Register a delegate for `is_buffering` callbacks
    pub fn register_delegate(&self, delegate: Arc<dyn BufferingDelegate>) -> ObserverToken {
        self.register(Observer::Delegate(delegate))
    }

    /// Revoke an observer. Returns false if it was already gone.
    pub fn unsubscribe(&self, token: ObserverToken) -> bool {
        lock(&self.observers).remove(&token).is_some()
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.observers).len()
    }
}

fn dispatch(observers: &Observers, progress: &PlaybackProgress) {
    let mut delegates = Vec::new();
    {
        let mut observers = lock(observers);
        let mut to_remove = Vec::new();

        for (token, observer) in observers.iter() {
            match observer {
                Observer::Channel(tx) => {
                    // Receiver dropped - observer is gone
                    if tx.send(progress.clone()).is_err() {
                        to_remove.push(*token);
                    }
                }
                Observer::Delegate(delegate) => delegates.push(delegate.clone()),
            }
        }

        for token in to_remove {
            observers.remove(&token);
        }
    }

    // Called outside the lock so a delegate may unsubscribe itself
    if let PlaybackProgress::BufferingChanged { buffering } = progress {
        for delegate in delegates {
            delegate.is_buffering(*buffering);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::state::PlaybackState;
    use std::time::Duration;

    struct RecordingDelegate {
        calls: Mutex<Vec<bool>>,
    }

    impl BufferingDelegate for RecordingDelegate {
        fn is_buffering(&self, buffering: bool) {
            self.calls.lock().unwrap().push(buffering);
        }
    }

    fn changed(from: PlaybackState, to: PlaybackState) -> PlaybackProgress {
        PlaybackProgress::StateChanged { from, to }
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        let handle = PlaybackProgressHandle::new(rx, tokio::runtime::Handle::current());
        let mut first = handle.subscribe_all();
        let mut second = handle.subscribe_all();

        tx.send(changed(PlaybackState::Unknown, PlaybackState::Loading)).unwrap();
        tx.send(changed(PlaybackState::Loading, PlaybackState::ReadyToPlay)).unwrap();

        for rx in [&mut first, &mut second] {
            assert_eq!(
                rx.recv().await,
                Some(changed(PlaybackState::Unknown, PlaybackState::Loading))
            );
            assert_eq!(
                rx.recv().await,
                Some(changed(PlaybackState::Loading, PlaybackState::ReadyToPlay))
            );
        }
    }

    #[tokio::test]
    async fn test_revoked_token_stops_delivery() {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        let handle = PlaybackProgressHandle::new(rx, tokio::runtime::Handle::current());
        let (token, mut revoked) = handle.subscribe();
        let mut kept = handle.subscribe_all();

        assert!(handle.unsubscribe(token));
        assert!(!handle.unsubscribe(token));

        tx.send(changed(PlaybackState::Unknown, PlaybackState::Loading)).unwrap();
        assert!(kept.recv().await.is_some());
        // Sender was dropped with the registration
        assert_eq!(revoked.recv().await, None);
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_cleaned_up() {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        let handle = PlaybackProgressHandle::new(rx, tokio::runtime::Handle::current());
        let dropped = handle.subscribe_all();
        let mut kept = handle.subscribe_all();
        drop(dropped);

        tx.send(changed(PlaybackState::Unknown, PlaybackState::Loading)).unwrap();
        assert!(kept.recv().await.is_some());
        assert_eq!(handle.observer_count(), 1);
    }

    #[tokio::test]
    async fn test_delegate_gets_buffering_changes_only() {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        let handle = PlaybackProgressHandle::new(rx, tokio::runtime::Handle::current());
        let delegate = Arc::new(RecordingDelegate {
            calls: Mutex::new(Vec::new()),
        });
        handle.register_delegate(delegate.clone());
        let mut sync = handle.subscribe_all();

        tx.send(changed(PlaybackState::Paused, PlaybackState::Playing)).unwrap();
        tx.send(PlaybackProgress::BufferingChanged { buffering: true }).unwrap();
        tx.send(PlaybackProgress::ScrubPreview {
            position: Duration::from_secs(1),
        })
        .unwrap();
        tx.send(PlaybackProgress::BufferingChanged { buffering: false }).unwrap();

        // Channel observer sees all four once the delegate calls are done
        for _ in 0..4 {
            sync.recv().await;
        }
        tokio::task::yield_now().await;
        assert_eq!(*delegate.calls.lock().unwrap(), vec![true, false]);
    }
}
