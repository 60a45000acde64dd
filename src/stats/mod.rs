// Runtime statistics collected by the tick loop

pub mod runtime_stats;

pub use runtime_stats::{human_readable_interval, RuntimeStats, TickStats};
