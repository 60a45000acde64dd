// Application-level topic names and tick payloads

use std::time::Duration;

use super::event::Event;

/// Topic names the engine publishes on the application hub
pub mod topics {
    /// Published once per logic tick with the observed tick duration
    pub const LOGIC_TICK: &str = "logicTick";

    /// Published once per render tick with the observed tick duration
    pub const RENDER_TICK: &str = "renderTick";
}

/// Payload of `logicTick` and `renderTick`: time since the previous tick of the same cadence
pub type TickEvent = Event<Duration>;

/// Observed tick duration in fractional milliseconds
#[inline]
pub fn tick_millis(tick: &TickEvent) -> f64 {
    tick.data().as_secs_f64() * 1000.0
}
