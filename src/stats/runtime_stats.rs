// Runtime statistics for the tick loop
// Averages are constant-time: an exact mean until the window is full, then
// an incremental approximation over the last `ticks_to_average` ticks.

use std::fmt;
use std::time::{Duration, Instant};
use tracing::info;

/// Last, average and count of one tick cadence
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickStats {
    /// Duration of the last tick in milliseconds
    pub last_ms: f64,
    /// Rolling average in milliseconds
    pub average_ms: f64,
    pub count: u64,
}

impl TickStats {
    fn record(&mut self, tick: Duration, ticks_to_average: u32) {
        let tick_ms = tick.as_nanos() as f64 / 1_000_000.0;
        let window = u64::from(ticks_to_average.max(1));

        self.last_ms = tick_ms;
        self.average_ms = if self.count < window {
            (self.average_ms * self.count as f64 + tick_ms) / (self.count + 1) as f64
        } else {
            self.average_ms + (tick_ms - self.average_ms) / window as f64
        };
        self.count += 1;
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeStats {
    logic: TickStats,
    render: TickStats,
    ticks_to_average: u32,
    started: Instant,
}

impl RuntimeStats {
    pub fn new(ticks_to_average: u32) -> Self {
        Self {
            logic: TickStats::default(),
            render: TickStats::default(),
            ticks_to_average: ticks_to_average.max(1),
            started: Instant::now(),
        }
    }

    pub fn update_logic(&mut self, tick: Duration) {
        self.logic.record(tick, self.ticks_to_average);
    }

    pub fn update_render(&mut self, tick: Duration) {
        self.render.record(tick, self.ticks_to_average);
    }

    pub fn logic(&self) -> &TickStats {
        &self.logic
    }

    pub fn render(&self) -> &TickStats {
        &self.render
    }

    pub fn ticks_to_average(&self) -> u32 {
        self.ticks_to_average
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Log the report at info level
    pub fn print_stats(&self) {
        info!("{}", self);
    }
}

impl Default for RuntimeStats {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl fmt::Display for RuntimeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Runtime Stats")?;
        writeln!(f, "\tLast Logic Tick: {:.1}ms", self.logic.last_ms)?;
        writeln!(
            f,
            "\tAverage Of Last {} Logic Ticks: {:.1}ms",
            self.ticks_to_average, self.logic.average_ms
        )?;
        writeln!(f, "\tTotal Logic Ticks: {}", self.logic.count)?;
        writeln!(f, "\tLast Render Tick: {:.1}ms", self.render.last_ms)?;
        writeln!(
            f,
            "\tAverage Of Last {} Render Ticks: {:.1}ms",
            self.ticks_to_average, self.render.average_ms
        )?;
        writeln!(f, "\tTotal Render Ticks: {}", self.render.count)?;
        write!(f, "\tUptime: {}", human_readable_interval(self.uptime()))
    }
}

/// Format as `"{h}h:{m}m:{s}s"`, dropping sub-second precision
pub fn human_readable_interval(interval: Duration) -> String {
    let seconds = interval.as_secs();
    let minutes = seconds / 60;
    let hours = minutes / 60;
    format!("{}h:{}m:{}s", hours, minutes % 60, seconds % 60)
}
