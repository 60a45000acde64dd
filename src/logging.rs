//! Logging setup for the engine.
//!
//! All crate output goes through the `tracing` macros. Hot-path, per-tick
//! messages use the crate-internal `debug_log!` macro, which only emits when
//! the `debug_logs` feature is enabled.

use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: OnceCell<bool> = OnceCell::new();

/// Install the global fmt subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. Safe to call more than
/// once: only the first call installs anything. Returns `false` when another
/// subscriber was already registered by the host application.
pub fn init_logging(default_filter: &str) -> bool {
    *INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_filter))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_timer(fmt::time::uptime()),
            )
            .with(filter)
            .try_init()
            .is_ok()
    })
}

/// Whether `init_logging` has run in this process
pub fn is_initialized() -> bool {
    INIT.get().is_some()
}
