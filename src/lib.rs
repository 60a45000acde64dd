// Prism engine runtime backbone
// Event hub, network dispatcher and dual-rate tick scheduler

macro_rules! debug_log {
    ($($arg:tt)*) => {
        if cfg!(feature = "debug_logs") {
            tracing::debug!($($arg)*);
        }
    };
}

pub mod config;  // Tuning constants and runtime settings
pub mod error;
pub mod logging;
pub mod events;  // Topic-based publish/subscribe
pub mod network;  // Outbound queues, connection state, transports
pub mod scheduler;  // Cooperative dual-rate loop
pub mod stats;
pub mod render;
pub mod engine;  // Explicit context tying the subsystems together

pub use config::EngineSettings;
pub use engine::{Engine, EngineContext};
pub use error::{ConfigError, EngineError, HubError, NetError};
pub use events::{Event, EventHub, Publisher, Subscriber, TickEvent};
pub use network::{ConnectionState, Delivery, NetworkDispatcher, NetworkMessage};
pub use scheduler::{StopHandle, TickScheduler, TickTimer};
pub use stats::RuntimeStats;
