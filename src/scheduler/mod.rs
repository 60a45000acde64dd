// Tick scheduling: timers, clocks and the cooperative loop

pub mod clock;
pub mod tick_scheduler;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use tick_scheduler::{StopHandle, TickHandler, TickScheduler};
pub use timer::TickTimer;
