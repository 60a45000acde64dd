// Engine context and top-level runtime
// `EngineContext` owns every subsystem and receives the scheduler's ticks.
// `Engine` pairs it with a `TickScheduler` and runs the loop.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{render::FIELD_OF_VIEW, EngineSettings};
use crate::error::EngineError;
use crate::events::{topics, EventHub, Publisher, TickEvent};
use crate::network::{NetworkDispatcher, TcpTransport, Transport};
use crate::render::{HeadlessRenderer, Renderer};
use crate::logging;
use crate::scheduler::{Clock, StopHandle, SystemClock, TickHandler, TickScheduler, TickTimer};
use crate::stats::RuntimeStats;

/// Everything a tick touches: settings, application hub, network dispatcher,
/// stats and renderer.
pub struct EngineContext {
    settings: EngineSettings,
    events: Arc<EventHub>,
    network: NetworkDispatcher,
    stats: RuntimeStats,
    renderer: Box<dyn Renderer>,
    // Target cadences, used to flag slow ticks
    logic_budget: TickTimer,
    render_budget: TickTimer,
    logic_tick: Publisher<TickEvent>,
    render_tick: Publisher<TickEvent>,
}

impl EngineContext {
    pub fn new(
        settings: EngineSettings,
        transport: Box<dyn Transport>,
        renderer: Box<dyn Renderer>,
    ) -> Result<Self, EngineError> {
        settings.validate()?;

        let events = Arc::new(EventHub::new());
        let logic_tick = events.advertise::<TickEvent>(topics::LOGIC_TICK)?;
        let render_tick = events.advertise::<TickEvent>(topics::RENDER_TICK)?;

        Ok(Self {
            network: NetworkDispatcher::new(transport, settings.network.clone()),
            stats: RuntimeStats::new(settings.stats_ticks_to_average),
            logic_budget: TickTimer::from_frequency(
                settings.timing.logic_hz,
                settings.timing.grace_threshold,
            ),
            render_budget: TickTimer::from_frequency(
                settings.timing.render_hz,
                settings.timing.grace_threshold,
            ),
            settings,
            events,
            renderer,
            logic_tick,
            render_tick,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Application hub carrying `logicTick`, `renderTick` and user topics
    pub fn events(&self) -> &Arc<EventHub> {
        &self.events
    }

    pub fn network(&self) -> &NetworkDispatcher {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut NetworkDispatcher {
        &mut self.network
    }

    pub fn stats(&self) -> &RuntimeStats {
        &self.stats
    }

    pub fn renderer(&self) -> &dyn Renderer {
        self.renderer.as_ref()
    }
}

impl TickHandler for EngineContext {
    fn poll(&mut self) {
        if self.settings.enable_network {
            self.network.poll();
        }
    }

    fn logic_tick(&mut self, delta: Duration) {
        if self.logic_budget.is_slow(delta, self.settings.timing.warning_threshold) {
            warn!(
                target_ms = self.logic_budget.interval().as_millis() as u64,
                observed_ms = delta.as_millis() as u64,
                "Logic loop running slow"
            );
        }
        if self.settings.gather_stats {
            self.stats.update_logic(delta);
        }
        if self.settings.enable_network {
            self.network.update(delta);
        }
        self.logic_tick.publish(TickEvent::new(delta));
    }

    fn render_tick(&mut self, delta: Duration) {
        if self.render_budget.is_slow(delta, self.settings.timing.warning_threshold) {
            warn!(
                target_ms = self.render_budget.interval().as_millis() as u64,
                observed_ms = delta.as_millis() as u64,
                "Render loop running slow"
            );
        }
        if self.settings.gather_stats {
            self.stats.update_render(delta);
        }
        self.renderer.render_frame();
        self.render_tick.publish(TickEvent::new(delta));
    }
}

/// The runtime: an `EngineContext` driven by a `TickScheduler`
pub struct Engine<C: Clock = SystemClock> {
    ctx: EngineContext,
    scheduler: TickScheduler<C>,
    started: bool,
}

impl Engine<SystemClock> {
    /// Engine with a TCP transport and a headless renderer
    pub fn new(settings: EngineSettings) -> Result<Self, EngineError> {
        let transport = TcpTransport::from_settings(&settings.network);
        Self::with_parts(settings, Box::new(transport), Box::new(HeadlessRenderer::new()), SystemClock)
    }
}

impl<C: Clock> Engine<C> {
    pub fn with_parts(
        settings: EngineSettings,
        transport: Box<dyn Transport>,
        renderer: Box<dyn Renderer>,
        clock: C,
    ) -> Result<Self, EngineError> {
        settings.validate()?;
        logging::init_logging(&settings.log_filter);

        let scheduler = TickScheduler::with_clock(&settings.timing, clock);
        let ctx = EngineContext::new(settings, transport, renderer)?;
        Ok(Self {
            ctx,
            scheduler,
            started: false,
        })
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut EngineContext {
        &mut self.ctx
    }

    pub fn events(&self) -> Arc<EventHub> {
        Arc::clone(&self.ctx.events)
    }

    /// Handle that stops `start` at its next loop iteration
    pub fn stop_handle(&self) -> StopHandle {
        self.scheduler.stop_handle()
    }

    /// Start networking (if enabled) and the renderer, then run the tick loop
    /// until stopped. Returns the number of loop iterations.
    ///
    /// Networking and renderer setup happen once; starting again after a stop
    /// resumes the loop only.
    pub fn start(&mut self) -> u64 {
        self.begin();
        self.scheduler.run(&mut self.ctx)
    }

    /// Like `start`, returning after at most `max_iterations` loop iterations
    pub fn start_for(&mut self, max_iterations: u64) -> u64 {
        self.begin();
        self.scheduler.run_for(&mut self.ctx, max_iterations)
    }

    /// Close the network connection; a later `start` sets everything up again
    pub fn shutdown(&mut self) {
        if self.ctx.settings.enable_network {
            self.ctx.network.stop();
        }
        self.started = false;
    }

    fn begin(&mut self) {
        if self.started {
            return;
        }
        self.started = true;

        if self.ctx.settings.enable_network {
            let server = self.ctx.settings.network_server.clone();
            self.ctx.network.start(&server);
        }
        self.ctx.renderer.init(self.ctx.settings.window_dim, FIELD_OF_VIEW);

        info!(
            network = self.ctx.settings.enable_network,
            stats = self.ctx.settings.gather_stats,
            "Engine started"
        );
    }
}
