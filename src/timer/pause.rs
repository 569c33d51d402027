//! Drift-free pause bookkeeping for a running countdown.
//!
//! The clock keeps an effective start instant. Pausing freezes `elapsed`;
//! resuming shifts `start` forward by the time spent paused so the countdown
//! deadlines (`start + k seconds`) move with it.

use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct PauseClock {
    start: Instant,
    paused_at: Option<Instant>,
}

impl PauseClock {
    pub fn started_at(now: Instant) -> Self {
        Self {
            start: now,
            paused_at: None,
        }
    }

    /// Effective start, already shifted by every completed pause.
    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn paused_at(&self) -> Option<Instant> {
        self.paused_at
    }

    /// Returns `false` when already paused.
    pub fn pause(&mut self, now: Instant) -> bool {
        if self.paused_at.is_some() {
            return false;
        }
        self.paused_at = Some(now);
        true
    }

    /// Returns the length of the pause that just ended, or `None` when the
    /// clock was not paused.
    pub fn resume(&mut self, now: Instant) -> Option<Duration> {
        let paused_at = self.paused_at.take()?;
        let pause_duration = now.saturating_duration_since(paused_at);
        self.start += pause_duration;
        Some(pause_duration)
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.paused_at
            .unwrap_or(now)
            .saturating_duration_since(self.start)
    }

    /// Instant at which `secs` seconds of un-paused time will have elapsed.
    pub fn deadline_after(&self, secs: u64) -> Instant {
        self.start + Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_freezes_while_paused() {
        let t0 = Instant::now();
        let mut clock = PauseClock::started_at(t0);

        assert!(clock.pause(t0 + Duration::from_secs(5)));
        assert_eq!(
            clock.elapsed(t0 + Duration::from_secs(15)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn resume_excludes_pause_duration() {
        let t0 = Instant::now();
        let mut clock = PauseClock::started_at(t0);

        clock.pause(t0 + Duration::from_secs(5));
        let paused_for = clock.resume(t0 + Duration::from_secs(15));

        assert_eq!(paused_for, Some(Duration::from_secs(10)));
        assert_eq!(clock.start(), t0 + Duration::from_secs(10));
        assert_eq!(
            clock.elapsed(t0 + Duration::from_secs(16)),
            Duration::from_secs(6)
        );
        assert_eq!(clock.deadline_after(6), t0 + Duration::from_secs(16));
    }

    #[test]
    fn double_pause_and_stray_resume_are_noops() {
        let t0 = Instant::now();
        let mut clock = PauseClock::started_at(t0);

        assert!(clock.resume(t0 + Duration::from_secs(1)).is_none());
        assert_eq!(clock.start(), t0);

        assert!(clock.pause(t0 + Duration::from_secs(2)));
        assert!(!clock.pause(t0 + Duration::from_secs(4)));
        assert_eq!(clock.paused_at(), Some(t0 + Duration::from_secs(2)));
    }

    #[test]
    fn instant_pause_resume_keeps_elapsed() {
        let t0 = Instant::now();
        let mut clock = PauseClock::started_at(t0);
        let at = t0 + Duration::from_secs(7);

        for _ in 0..3 {
            clock.pause(at);
            clock.resume(at);
        }

        assert_eq!(clock.elapsed(at), Duration::from_secs(7));
    }
}
