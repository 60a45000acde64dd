// Dual-rate cooperative tick loop
// One loop drives both cadences. Each iteration advances both timers by the
// measured duration of the previous iteration, then sleeps whatever is left of
// the base interval (the shorter of the two target intervals).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::TimingSettings;

use super::clock::{Clock, SystemClock};
use super::timer::TickTimer;

/// Receives the fired ticks of a `TickScheduler`
pub trait TickHandler {
    /// Called at the top of every loop iteration, before any timer fires
    fn poll(&mut self) {}

    fn logic_tick(&mut self, delta: Duration);

    fn render_tick(&mut self, delta: Duration);
}

/// Cloneable handle that stops a running loop at its next iteration
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct TickScheduler<C: Clock = SystemClock> {
    logic: TickTimer,
    render: TickTimer,
    base_interval: Duration,
    clock: C,
    stop: StopHandle,
}

impl TickScheduler<SystemClock> {
    pub fn from_settings(timing: &TimingSettings) -> Self {
        Self::with_clock(timing, SystemClock)
    }
}

impl<C: Clock> TickScheduler<C> {
    pub fn new(logic: TickTimer, render: TickTimer, clock: C) -> Self {
        let base_interval = logic.interval().min(render.interval());
        Self {
            logic,
            render,
            base_interval,
            clock,
            stop: StopHandle::default(),
        }
    }

    pub fn with_clock(timing: &TimingSettings, clock: C) -> Self {
        Self::new(
            TickTimer::from_frequency(timing.logic_hz, timing.grace_threshold),
            TickTimer::from_frequency(timing.render_hz, timing.grace_threshold),
            clock,
        )
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Shorter of the two target intervals
    pub fn base_interval(&self) -> Duration {
        self.base_interval
    }

    pub fn logic_timer(&self) -> &TickTimer {
        &self.logic
    }

    pub fn render_timer(&self) -> &TickTimer {
        &self.render
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Run until a `StopHandle` is triggered. Returns the number of iterations.
    ///
    /// A stop requested before `run` makes it return immediately. The stop
    /// flag is cleared on return, so the scheduler can be run again.
    pub fn run<H: TickHandler>(&mut self, handler: &mut H) -> u64 {
        self.run_loop(handler, None)
    }

    /// Like `run`, but returns after at most `max_iterations` iterations
    pub fn run_for<H: TickHandler>(&mut self, handler: &mut H, max_iterations: u64) -> u64 {
        self.run_loop(handler, Some(max_iterations))
    }

    fn run_loop<H: TickHandler>(&mut self, handler: &mut H, max_iterations: Option<u64>) -> u64 {
        info!(
            logic_ms = self.logic.interval().as_millis() as u64,
            render_ms = self.render.interval().as_millis() as u64,
            "Tick loop started"
        );

        let mut delta = Duration::ZERO;
        let mut iterations = 0u64;

        while !self.stop.is_stopped() && max_iterations.map_or(true, |max| iterations < max) {
            let started = self.clock.now();

            handler.poll();
            if let Some(observed) = self.logic.advance(delta) {
                handler.logic_tick(observed);
            }
            if let Some(observed) = self.render.advance(delta) {
                handler.render_tick(observed);
            }
            iterations += 1;

            let work = self.clock.now().saturating_duration_since(started);
            if work >= self.base_interval {
                delta = work;
                continue;
            }

            self.clock.sleep(self.base_interval - work);
            delta = self.clock.now().saturating_duration_since(started);
        }

        self.stop.reset();
        info!(iterations, "Tick loop stopped");
        iterations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualClock;

    const MS: Duration = Duration::from_millis(1);

    #[derive(Default)]
    struct Recorder {
        polls: u32,
        logic: Vec<(u32, Duration)>,
        render: Vec<(u32, Duration)>,
        stop_after_renders: Option<(usize, StopHandle)>,
        slow_logic: Option<(ManualClock, Duration)>,
    }

    impl TickHandler for Recorder {
        fn poll(&mut self) {
            self.polls += 1;
        }

        fn logic_tick(&mut self, delta: Duration) {
            self.logic.push((self.polls - 1, delta));
            if let Some((clock, cost)) = &self.slow_logic {
                clock.advance(*cost);
            }
        }

        fn render_tick(&mut self, delta: Duration) {
            self.render.push((self.polls - 1, delta));
            if let Some((limit, handle)) = &self.stop_after_renders {
                if self.render.len() >= *limit {
                    handle.stop();
                }
            }
        }
    }

    fn scheduler(clock: &ManualClock) -> TickScheduler<ManualClock> {
        TickScheduler::with_clock(&TimingSettings::default(), clock.clone())
    }

    #[test]
    fn test_base_interval_is_shorter_timer() {
        let clock = ManualClock::new();
        let scheduler = scheduler(&clock);
        assert_eq!(scheduler.base_interval(), 16 * MS);
        assert_eq!(scheduler.logic_timer().grace(), 9 * MS);
        assert_eq!(scheduler.render_timer().grace(), 4 * MS);
    }

    #[test]
    fn test_default_cadence() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        let mut recorder = Recorder::default();

        assert_eq!(scheduler.run_for(&mut recorder, 6), 6);

        assert_eq!(recorder.polls, 6);
        assert_eq!(
            recorder.logic,
            vec![(0, Duration::ZERO), (2, 32 * MS), (4, 32 * MS)]
        );
        assert_eq!(recorder.render.len(), 6);
        assert_eq!(recorder.render[0], (0, Duration::ZERO));
        assert!(recorder.render[1..].iter().all(|(_, delta)| *delta == 16 * MS));
        assert_eq!(clock.elapsed(), 96 * MS);
    }

    #[test]
    fn test_slow_iteration_skips_sleep() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        let mut recorder = Recorder {
            slow_logic: Some((clock.clone(), 50 * MS)),
            ..Recorder::default()
        };

        scheduler.run_for(&mut recorder, 2);

        // First iteration took 50 ms of work and did not sleep
        assert_eq!(recorder.render[1], (1, 50 * MS));
        assert_eq!(recorder.logic[1], (1, 50 * MS));
    }

    #[test]
    fn test_stop_from_handler() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        let mut recorder = Recorder {
            stop_after_renders: Some((3, scheduler.stop_handle())),
            ..Recorder::default()
        };

        assert_eq!(scheduler.run(&mut recorder), 3);
        assert_eq!(recorder.render.len(), 3);
        assert!(!scheduler.stop_handle().is_stopped());
    }

    #[test]
    fn test_stop_before_run() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        scheduler.stop_handle().stop();

        let mut recorder = Recorder::default();
        assert_eq!(scheduler.run(&mut recorder), 0);
        assert_eq!(recorder.polls, 0);

        assert_eq!(scheduler.run_for(&mut recorder, 1), 1);
    }
}
