//! Centralized configuration for the engine runtime
//!
//! Constant modules hold the compile-time defaults. `EngineSettings` is the
//! runtime surface, deserialized from JSON with every field defaulted, so a
//! settings file only needs to name what it changes.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::render::WindowDimensions;

/// Tick timing constants
pub mod timing {
    /// Logic ticks per second
    pub const LOGIC_FREQ: u32 = 30;

    /// Render ticks per second
    pub const RENDER_FREQ: u32 = 60;

    /// Multiplier on the target interval that sets how early a tick may fire
    /// (33ms * 1.25 rounds up to 42ms => 9ms grace)
    pub const TICK_GRACE_THRESHOLD: f64 = 1.25;

    /// How far past its target interval a tick may run before a warning is logged
    pub const TICK_WARNING_THRESHOLD: f64 = 5.0;

    /// Convert a frequency to a whole-millisecond interval, rounding down
    /// (30 Hz => 33ms, 60 Hz => 16ms)
    #[inline]
    pub fn interval_ms(freq: u32) -> u64 {
        1000 / u64::from(freq.max(1))
    }
}

/// Network dispatcher constants
pub mod network {
    /// A logic tick slower than this means queued messages are stale and get dropped
    pub const DELAYED_PACKAGE_DROP_MS: u64 = 5000;

    /// Combined queue length above which both outbound queues are dropped
    pub const EXCESSIVE_MESSAGE_QUEUE_SIZE: usize = 100;

    /// Delay between reconnection attempts
    pub const RECONNECT_INTERVAL_MS: u64 = 1000;

    /// Maximum reconnection attempts (0 = infinite)
    pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

    /// Timeout for a single TCP connect attempt
    pub const CONNECT_TIMEOUT_MS: u64 = 5000;
}

/// Renderer constants
pub mod render {
    /// Vertical field of view handed to the renderer at startup (degrees)
    pub const FIELD_OF_VIEW: f32 = 45.0;
}

/// Cadence settings for the tick scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimingSettings {
    pub logic_hz: u32,
    pub render_hz: u32,
    pub grace_threshold: f64,
    pub warning_threshold: f64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            logic_hz: timing::LOGIC_FREQ,
            render_hz: timing::RENDER_FREQ,
            grace_threshold: timing::TICK_GRACE_THRESHOLD,
            warning_threshold: timing::TICK_WARNING_THRESHOLD,
        }
    }
}

/// Dispatcher and transport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkSettings {
    /// Slow-loop threshold in milliseconds
    pub delayed_package_drop_ms: u64,

    /// Queue-depth ceiling across both lanes
    pub max_queued_messages: usize,

    /// Enable automatic reconnection in the TCP transport
    pub auto_reconnect: bool,

    /// Reconnection attempt interval in milliseconds
    pub reconnect_interval_ms: u64,

    /// Maximum reconnection attempts (0 = infinite)
    pub max_reconnect_attempts: u32,

    /// Timeout for one connect attempt in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            delayed_package_drop_ms: network::DELAYED_PACKAGE_DROP_MS,
            max_queued_messages: network::EXCESSIVE_MESSAGE_QUEUE_SIZE,
            auto_reconnect: true,
            reconnect_interval_ms: network::RECONNECT_INTERVAL_MS,
            max_reconnect_attempts: network::MAX_RECONNECT_ATTEMPTS,
            connect_timeout_ms: network::CONNECT_TIMEOUT_MS,
        }
    }
}

/// Settings for the engine on start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineSettings {
    /// Start the network dispatcher and pump it on every logic tick
    pub enable_network: bool,

    /// Address the dispatcher connects to
    pub network_server: String,

    /// Collect runtime stats such as average tick duration
    pub gather_stats: bool,

    /// Size of the render target, forwarded to the renderer only
    pub window_dim: WindowDimensions,

    /// Filter directive for `logging::init_logging` (RUST_LOG still wins)
    pub log_filter: String,

    /// Number of ticks the rolling stats average covers
    pub stats_ticks_to_average: u32,

    pub timing: TimingSettings,

    pub network: NetworkSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            enable_network: false,
            network_server: String::new(),
            gather_stats: false,
            window_dim: WindowDimensions::default(),
            log_filter: "info".to_string(),
            stats_ticks_to_average: 1000,
            timing: TimingSettings::default(),
            network: NetworkSettings::default(),
        }
    }
}

impl EngineSettings {
    /// Parse settings from a JSON document and validate them
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Serialize settings back to pretty JSON
    pub fn to_json_string(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject settings the scheduler or dispatcher cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.timing.logic_hz == 0 || self.timing.render_hz == 0 {
            return Err(ConfigError::Invalid(
                "tick frequencies must be greater than zero".to_string(),
            ));
        }
        if self.timing.logic_hz > 1000 || self.timing.render_hz > 1000 {
            return Err(ConfigError::Invalid(
                "tick frequencies above 1000 Hz round to a zero interval".to_string(),
            ));
        }
        if self.timing.grace_threshold < 1.0 || self.timing.warning_threshold < 1.0 {
            return Err(ConfigError::Invalid(
                "grace and warning thresholds must be at least 1.0".to_string(),
            ));
        }
        if self.enable_network && self.network_server.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "enableNetwork requires a networkServer address".to_string(),
            ));
        }
        if self.stats_ticks_to_average == 0 {
            return Err(ConfigError::Invalid(
                "statsTicksToAverage must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Logic tick interval in milliseconds
    pub fn logic_interval_ms(&self) -> u64 {
        timing::interval_ms(self.timing.logic_hz)
    }

    /// Render tick interval in milliseconds
    pub fn render_interval_ms(&self) -> u64 {
        timing::interval_ms(self.timing.render_hz)
    }
}
