//! Fixed-rate tick scheduling with drift compensation
//!
//! Timers are allowed to fire late. Instead of letting that lateness pile up,
//! the scheduler keeps a running sum of how far every tick strayed from the
//! target interval and shortens (or lengthens) the next delay by that amount,
//! so the long-run tick rate stays at the target.

use std::time::Duration;
use tokio::time::Instant;

/// Largest simulation step handed to the match, in seconds.
pub const MAX_TICK_DT: f32 = 0.05;
/// Bound on the accumulated drift, in tick intervals.
pub const MAX_DRIFT_TICKS: f64 = 5.0;
pub const MIN_TICK_DELAY: Duration = Duration::from_millis(1);

#[derive(Debug)]
pub struct TickScheduler {
    interval: Duration,
    running: bool,
    last_tick: Option<Instant>,
    next_deadline: Option<Instant>,
    /// Seconds, positive when ticks have been running late.
    accumulated_drift: f64,
    ticks: u64,
}

impl TickScheduler {
    pub fn new(tick_rate: u32) -> Self {
        let rate = tick_rate.max(1);
        Self {
            interval: Duration::from_secs_f64(1.0 / rate as f64),
            running: false,
            last_tick: None,
            next_deadline: None,
            accumulated_drift: 0.0,
            ticks: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.next_deadline
    }

    pub fn accumulated_drift(&self) -> f64 {
        self.accumulated_drift
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Arms the first tick one interval from `now`. No-op when already running.
    pub fn start(&mut self, now: Instant) {
        if self.running {
            return;
        }
        self.running = true;
        self.last_tick = Some(now);
        self.next_deadline = Some(now + self.interval);
        self.accumulated_drift = 0.0;
    }

    /// Returns true only for the call that actually stopped the scheduler.
    pub fn stop(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        self.next_deadline = None;
        true
    }

    /// Records a tick at `now`, schedules the next one and returns the
    /// simulation step in seconds.
    pub fn on_tick(&mut self, now: Instant) -> Option<f32> {
        if !self.running {
            return None;
        }

        let last = self.last_tick.unwrap_or(now);
        let elapsed = now.saturating_duration_since(last).as_secs_f64();
        let interval = self.interval.as_secs_f64();
        let bound = interval * MAX_DRIFT_TICKS;

        self.accumulated_drift =
            (self.accumulated_drift + elapsed - interval).clamp(-bound, bound);

        let delay = (interval - self.accumulated_drift).max(MIN_TICK_DELAY.as_secs_f64());
        self.next_deadline = Some(now + Duration::from_secs_f64(delay));
        self.last_tick = Some(now);
        self.ticks += 1;

        Some((elapsed as f32).min(MAX_TICK_DT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn delay_after(scheduler: &TickScheduler, now: Instant) -> Duration {
        scheduler.deadline().unwrap().duration_since(now)
    }

    #[test]
    fn test_interval_from_rate() {
        let scheduler = TickScheduler::new(60);
        assert_approx_eq!(scheduler.interval().as_secs_f64(), 1.0 / 60.0, 1e-9);
        assert!(!scheduler.is_running());
        assert!(scheduler.deadline().is_none());

        let zero = TickScheduler::new(0);
        assert_eq!(zero.interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_start_and_stop_once() {
        let mut scheduler = TickScheduler::new(60);
        let now = Instant::now();
        scheduler.start(now);
        assert!(scheduler.is_running());
        assert_eq!(scheduler.deadline(), Some(now + scheduler.interval()));

        assert!(scheduler.stop());
        assert!(!scheduler.stop());
        assert!(scheduler.deadline().is_none());
        assert_eq!(scheduler.on_tick(now + Duration::from_secs(1)), None);
    }

    #[test]
    fn test_on_time_ticks_keep_interval() {
        let mut scheduler = TickScheduler::new(60);
        let interval = scheduler.interval();
        let mut now = Instant::now();
        scheduler.start(now);

        for _ in 0..10 {
            now += interval;
            let dt = scheduler.on_tick(now).unwrap();
            assert_approx_eq!(dt, interval.as_secs_f32(), 1e-6);
            assert_approx_eq!(scheduler.accumulated_drift(), 0.0, 1e-9);
            assert_approx_eq!(
                delay_after(&scheduler, now).as_secs_f64(),
                interval.as_secs_f64(),
                1e-6
            );
        }
        assert_eq!(scheduler.ticks(), 10);
    }

    #[test]
    fn test_late_tick_shortens_next_delay() {
        let mut scheduler = TickScheduler::new(60);
        let interval = scheduler.interval();
        let start = Instant::now();
        scheduler.start(start);

        let late = start + interval + Duration::from_millis(5);
        scheduler.on_tick(late);
        assert_approx_eq!(scheduler.accumulated_drift(), 0.005, 1e-6);
        assert_approx_eq!(
            delay_after(&scheduler, late).as_secs_f64(),
            interval.as_secs_f64() - 0.005,
            1e-6
        );
    }

    #[test]
    fn test_early_tick_lengthens_next_delay() {
        let mut scheduler = TickScheduler::new(60);
        let interval = scheduler.interval();
        let start = Instant::now();
        scheduler.start(start);

        let early = start + interval - Duration::from_millis(4);
        scheduler.on_tick(early);
        assert_approx_eq!(
            delay_after(&scheduler, early).as_secs_f64(),
            interval.as_secs_f64() + 0.004,
            1e-6
        );
    }

    #[test]
    fn test_stall_is_bounded_and_dt_capped() {
        let mut scheduler = TickScheduler::new(60);
        let interval = scheduler.interval();
        let start = Instant::now();
        scheduler.start(start);

        let stalled = start + Duration::from_secs(10);
        let dt = scheduler.on_tick(stalled).unwrap();
        assert_eq!(dt, MAX_TICK_DT);
        assert_approx_eq!(
            scheduler.accumulated_drift(),
            interval.as_secs_f64() * MAX_DRIFT_TICKS,
            1e-9
        );
        assert_eq!(delay_after(&scheduler, stalled), MIN_TICK_DELAY);

        // Catching up takes a bounded number of short ticks.
        let mut now = stalled;
        let mut catch_up = 0;
        while delay_after(&scheduler, now) < interval / 2 {
            now = scheduler.deadline().unwrap();
            scheduler.on_tick(now);
            catch_up += 1;
            assert!(catch_up <= MAX_DRIFT_TICKS as usize + 1);
        }
    }

    #[test]
    fn test_long_run_rate_tracks_target() {
        let mut scheduler = TickScheduler::new(60);
        let start = Instant::now();
        scheduler.start(start);

        // Every timer fires 3ms after the requested deadline.
        let mut now = start;
        for _ in 0..600 {
            now = scheduler.deadline().unwrap() + Duration::from_millis(3);
            scheduler.on_tick(now);
        }
        let elapsed = now.duration_since(start).as_secs_f64();
        assert_approx_eq!(elapsed, 10.0, 0.05);
    }
}
