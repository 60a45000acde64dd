// Countdown timer for one tick cadence

use std::time::Duration;

use crate::config::timing;

/// Countdown towards the next tick of one cadence (logic or render).
///
/// The timer fires when the time left drops to the grace window or below,
/// reporting how long it has been since it last fired. It starts due, so the
/// first `advance` always fires.
#[derive(Debug, Clone)]
pub struct TickTimer {
    interval: Duration,
    grace: Duration,
    // signed: a late loop iteration overshoots past zero
    time_till_tick_ns: i128,
    time_since_tick: Duration,
}

impl TickTimer {
    /// `grace = ceil(interval_ms * grace_threshold) - interval_ms`, in whole milliseconds
    pub fn new(interval: Duration, grace_threshold: f64) -> Self {
        let interval_ms = interval.as_nanos() as f64 / 1_000_000.0;
        let grace_ms = ((interval_ms * grace_threshold).ceil() - interval_ms).max(0.0);

        Self {
            interval,
            grace: Duration::from_nanos((grace_ms * 1_000_000.0).round() as u64),
            time_till_tick_ns: 0,
            time_since_tick: Duration::ZERO,
        }
    }

    /// Timer for `hz` ticks per second, with the interval floored to whole milliseconds
    pub fn from_frequency(hz: u32, grace_threshold: f64) -> Self {
        Self::new(Duration::from_millis(timing::interval_ms(hz)), grace_threshold)
    }

    /// Account for `delta` of elapsed time; returns the observed tick
    /// duration when the timer fires.
    pub fn advance(&mut self, delta: Duration) -> Option<Duration> {
        self.time_till_tick_ns -= delta.as_nanos() as i128;
        self.time_since_tick += delta;

        if self.time_till_tick_ns > self.grace.as_nanos() as i128 {
            return None;
        }

        let observed = self.time_since_tick;
        self.time_till_tick_ns = self.interval.as_nanos() as i128;
        self.time_since_tick = Duration::ZERO;
        Some(observed)
    }

    /// True when `observed` exceeds the interval by more than `warning_threshold` times
    pub fn is_slow(&self, observed: Duration, warning_threshold: f64) -> bool {
        observed.as_nanos() as f64 > self.interval.as_nanos() as f64 * warning_threshold
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Time left until the next tick; zero once due
    pub fn time_till_tick(&self) -> Duration {
        Duration::from_nanos(self.time_till_tick_ns.max(0) as u64)
    }

    pub fn time_since_tick(&self) -> Duration {
        self.time_since_tick
    }
}
