use crate::time_format::format_timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Playback position published on each scrubber tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeUpdate {
    pub position: Duration,
    pub duration: Option<Duration>,
    /// Scrub slider value in `[0, 1]`
    pub progress: f32,
}

impl fmt::Display for TimeUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.duration {
            Some(duration) => write!(
                f,
                "{} / {}",
                format_timestamp(self.position),
                format_timestamp(duration)
            ),
            None => f.write_str(&format_timestamp(self.position)),
        }
    }
}

/// Slider value for a media time; zero while the duration is unknown
pub fn fraction_for_time(time: Duration, duration: Option<Duration>) -> f32 {
    match duration {
        Some(duration) if !duration.is_zero() => {
            (time.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0) as f32
        }
        _ => 0.0,
    }
}

/// Media time for a slider value; zero while the duration is unknown
pub fn scrub_time_for_fraction(fraction: f32, duration: Option<Duration>) -> Duration {
    match duration {
        Some(duration) if fraction.is_finite() => {
            duration.mul_f64(f64::from(fraction.clamp(0.0, 1.0)))
        }
        _ => Duration::ZERO,
    }
}

/// Periodically samples playback time for the scrubber.
///
/// Only runs while the controller keeps it started, which it does exactly
/// while the state is `Playing`. A stopped synchronizer has no deadline, so
/// the owner loop never wakes it.
#[derive(Debug)]
pub struct ScrubberSync {
    interval: Duration,
    next_tick: Option<Instant>,
    last_reported: Option<Duration>,
}

impl ScrubberSync {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            next_tick: None,
            last_reported: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        if self.next_tick.is_none() {
            self.next_tick = Some(now + self.interval);
        }
    }

    pub fn stop(&mut self) {
        self.next_tick = None;
    }

    /// Stop and forget the last published position (new item)
    pub fn reset(&mut self) {
        self.stop();
        self.last_reported = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.next_tick
    }

    /// Produce an update if a tick is due. Missed ticks are skipped rather
    /// than replayed, and a position equal to the last published one is not
    /// published again.
    pub fn tick(
        &mut self,
        now: Instant,
        position: Duration,
        duration: Option<Duration>,
    ) -> Option<TimeUpdate> {
        let mut next = self.next_tick?;
        if now < next {
            return None;
        }
        while next <= now {
            next += self.interval;
        }
        self.next_tick = Some(next);

        if self.last_reported == Some(position) {
            return None;
        }
        self.last_reported = Some(position);

        Some(TimeUpdate {
            position,
            duration,
            progress: fraction_for_time(position, duration),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(500);

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_stopped_scrubber_never_ticks() {
        let t0 = Instant::now();
        let mut scrubber = ScrubberSync::new(TICK);

        assert_eq!(scrubber.tick(t0 + secs(10), secs(3), Some(secs(120))), None);
        assert_eq!(scrubber.deadline(), None);

        scrubber.start(t0);
        scrubber.stop();
        assert_eq!(scrubber.tick(t0 + secs(10), secs(3), Some(secs(120))), None);
    }

    #[test]
    fn test_ticks_at_cadence() {
        let t0 = Instant::now();
        let mut scrubber = ScrubberSync::new(TICK);
        scrubber.start(t0);

        assert_eq!(scrubber.deadline(), Some(t0 + TICK));
        assert_eq!(scrubber.tick(t0 + Duration::from_millis(499), secs(0), None), None);

        let update = scrubber
            .tick(t0 + TICK, Duration::from_millis(500), Some(secs(100)))
            .expect("tick due");
        assert_eq!(update.position, Duration::from_millis(500));
        assert!((update.progress - 0.005).abs() < 1e-6);
        assert_eq!(scrubber.deadline(), Some(t0 + TICK * 2));
    }

    #[test]
    fn test_missed_ticks_are_skipped() {
        let t0 = Instant::now();
        let mut scrubber = ScrubberSync::new(TICK);
        scrubber.start(t0);

        assert!(scrubber.tick(t0 + Duration::from_millis(1700), secs(1), None).is_some());
        assert_eq!(scrubber.deadline(), Some(t0 + Duration::from_millis(2000)));
    }

    #[test]
    fn test_unchanged_position_is_not_republished() {
        let t0 = Instant::now();
        let mut scrubber = ScrubberSync::new(TICK);
        scrubber.start(t0);

        assert!(scrubber.tick(t0 + TICK, secs(7), None).is_some());
        assert!(scrubber.tick(t0 + TICK * 2, secs(7), None).is_none());
        assert!(scrubber.tick(t0 + TICK * 3, secs(8), None).is_some());
    }

    #[test]
    fn test_fraction_mapping() {
        let duration = Some(secs(200));
        assert_eq!(fraction_for_time(secs(50), duration), 0.25);
        assert_eq!(fraction_for_time(secs(500), duration), 1.0);
        assert_eq!(fraction_for_time(secs(50), None), 0.0);

        assert_eq!(scrub_time_for_fraction(0.5, duration), secs(100));
        assert_eq!(scrub_time_for_fraction(1.5, duration), secs(200));
        assert_eq!(scrub_time_for_fraction(-1.0, duration), Duration::ZERO);
        assert_eq!(scrub_time_for_fraction(0.5, None), Duration::ZERO);
    }

    #[test]
    fn test_time_update_display() {
        let update = TimeUpdate {
            position: secs(65),
            duration: Some(secs(3725)),
            progress: 0.0,
        };
        assert_eq!(update.to_string(), "01:05 / 1:02:05");
    }
}
