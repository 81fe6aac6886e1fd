use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingSignal {
    stalled: bool,
    deadline: Instant,
}

/// Debounces the engine's buffer-empty / likely-to-keep-up signals into a
/// single "is buffering" flag.
///
/// A new value only becomes visible after the latest raw signal has held for
/// the whole debounce window. Every raw signal restarts the window, and a
/// signal that agrees with the visible value cancels the pending toggle, so a
/// burst of flapping signals yields at most one visible change.
#[derive(Debug)]
pub struct BufferingMonitor {
    window: Duration,
    visible: bool,
    pending: Option<PendingSignal>,
}

impl BufferingMonitor {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            visible: false,
            pending: None,
        }
    }

    pub fn is_buffering(&self) -> bool {
        self.visible
    }

    /// Latest raw signal, whether or not it is visible yet
    pub fn raw_stalled(&self) -> bool {
        self.pending.map(|p| p.stalled).unwrap_or(self.visible)
    }

    /// When the pending toggle becomes due
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|p| p.deadline)
    }

    pub fn on_stall_signal(&mut self, now: Instant) {
        self.on_signal(true, now);
    }

    pub fn on_recovered_signal(&mut self, now: Instant) {
        self.on_signal(false, now);
    }

    fn on_signal(&mut self, stalled: bool, now: Instant) {
        if stalled == self.visible {
            if self.pending.take().is_some() {
                debug!("Buffering signal flapped back to {}", stalled);
            }
            return;
        }
        self.pending = Some(PendingSignal {
            stalled,
            deadline: now + self.window,
        });
    }

    /// Apply the pending toggle if its window has elapsed. Returns the new
    /// visible value when it changed.
    pub fn poll(&mut self, now: Instant) -> Option<bool> {
        match self.pending {
            Some(pending) if now >= pending.deadline => {
                self.pending = None;
                self.visible = pending.stalled;
                Some(self.visible)
            }
            _ => None,
        }
    }

    /// Clear a visible or pending stall right away if the latest raw signal
    /// says playback is keeping up. A genuine pending stall is left alone.
    pub fn settle_if_recovered(&mut self) -> Option<bool> {
        if self.raw_stalled() {
            return None;
        }
        self.pending = None;
        if self.visible {
            self.visible = false;
            return Some(false);
        }
        None
    }

    /// Drop all state. Returns `Some(false)` if buffering was visible.
    pub fn reset(&mut self) -> Option<bool> {
        self.pending = None;
        if std::mem::take(&mut self.visible) {
            Some(false)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(300);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_stall_becomes_visible_after_window() {
        let t0 = Instant::now();
        let mut monitor = BufferingMonitor::new(WINDOW);

        monitor.on_stall_signal(t0);
        assert_eq!(monitor.poll(t0 + ms(299)), None);
        assert!(!monitor.is_buffering());

        assert_eq!(monitor.poll(t0 + ms(300)), Some(true));
        assert!(monitor.is_buffering());
        assert_eq!(monitor.deadline(), None);
    }

    #[test]
    fn test_flapping_burst_produces_no_toggle() {
        let t0 = Instant::now();
        let mut monitor = BufferingMonitor::new(WINDOW);

        monitor.on_stall_signal(t0);
        monitor.on_recovered_signal(t0 + ms(50));
        monitor.on_stall_signal(t0 + ms(100));
        monitor.on_recovered_signal(t0 + ms(150));

        assert_eq!(monitor.deadline(), None);
        assert_eq!(monitor.poll(t0 + ms(1000)), None);
        assert!(!monitor.is_buffering());
    }

    #[test]
    fn test_burst_ending_stalled_toggles_once() {
        let t0 = Instant::now();
        let mut monitor = BufferingMonitor::new(WINDOW);
        let mut toggles = Vec::new();

        monitor.on_stall_signal(t0);
        monitor.on_recovered_signal(t0 + ms(50));
        monitor.on_stall_signal(t0 + ms(100));
        for step in 0..20 {
            toggles.extend(monitor.poll(t0 + ms(100 + step * 50)));
        }

        assert_eq!(toggles, vec![true]);
    }

    #[test]
    fn test_each_signal_restarts_window() {
        let t0 = Instant::now();
        let mut monitor = BufferingMonitor::new(WINDOW);

        monitor.on_stall_signal(t0);
        monitor.on_stall_signal(t0 + ms(200));
        assert_eq!(monitor.poll(t0 + ms(300)), None);
        assert_eq!(monitor.poll(t0 + ms(500)), Some(true));
    }

    #[test]
    fn test_steady_state_never_renotifies() {
        let t0 = Instant::now();
        let mut monitor = BufferingMonitor::new(WINDOW);

        monitor.on_stall_signal(t0);
        assert_eq!(monitor.poll(t0 + WINDOW), Some(true));

        monitor.on_stall_signal(t0 + ms(400));
        assert_eq!(monitor.deadline(), None);
        assert_eq!(monitor.poll(t0 + ms(2000)), None);

        monitor.on_recovered_signal(t0 + ms(2000));
        assert_eq!(monitor.poll(t0 + ms(2300)), Some(false));
        assert_eq!(monitor.poll(t0 + ms(5000)), None);
    }

    #[test]
    fn test_settle_only_when_genuinely_recovered() {
        let t0 = Instant::now();
        let mut monitor = BufferingMonitor::new(WINDOW);

        monitor.on_stall_signal(t0);
        assert_eq!(monitor.settle_if_recovered(), None);
        assert!(monitor.deadline().is_some());

        monitor.poll(t0 + WINDOW);
        monitor.on_recovered_signal(t0 + ms(400));
        assert_eq!(monitor.settle_if_recovered(), Some(false));
        assert!(!monitor.is_buffering());
        assert_eq!(monitor.deadline(), None);
    }

    #[test]
    fn test_reset_reports_visible_stall() {
        let t0 = Instant::now();
        let mut monitor = BufferingMonitor::new(WINDOW);
        assert_eq!(monitor.reset(), None);

        monitor.on_stall_signal(t0);
        monitor.poll(t0 + WINDOW);
        assert_eq!(monitor.reset(), Some(false));
        assert!(!monitor.is_buffering());
    }
}
