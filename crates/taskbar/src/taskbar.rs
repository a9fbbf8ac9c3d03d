//! Alcove taskbar: the embedded window-manager shell that hosts applications.
//!
//! The taskbar runs the single control loop that owns the instance table.
//! Hosted applications never delete themselves: closing is a handshake
//! (`Block`, acknowledge, `Destroy`) carried over the control queue, and the
//! loop drops the instance's box at a point where no window event can still
//! reach it. Phases along the way are recorded per instance, so a stuck
//! teardown can say exactly how far it got.

pub mod app;
pub mod events;
pub mod icons;
pub mod registry;
pub mod router;
pub mod windows;

pub use app::{
    AppFactory, AppInstance, EventSink, LifecyclePhase, MenuEntry, StartFunction, SubMenu,
};
pub use events::EventCode;
pub use icons::{Bitmap, BuiltinIcons, IconProvider};
pub use registry::{ApplicationRegistry, MenuItem};
pub use router::{ControlMessage, MessageRouter};
pub use windows::{HostWindows, WindowHost, WindowId, WindowRef};

use collections::FxHashMap;
use parking_lot::RwLock;
use settings::constants::timing::{DRAIN_SLICE, IDLE_TICK};
use settings::{load_config, Config};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tasks::TaskRunner;
use tracing::{debug, info, trace, warn};
use util::debug_panic;

/// Capabilities the taskbar lends to application factories.
///
/// A handle is everything a factory sees of the taskbar: window allocation,
/// the control queue, the task runner, and a settings snapshot. It cannot
/// reach the instance table.
#[derive(Clone)]
pub struct TaskbarHandle {
    windows: Arc<dyn WindowHost>,
    router: MessageRouter,
    runner: TaskRunner,
    settings: Arc<RwLock<Config>>,
}

impl TaskbarHandle {
    /// Assemble a handle from parts, for embedding applications without a
    /// full taskbar.
    pub fn from_parts(
        windows: Arc<dyn WindowHost>,
        router: MessageRouter,
        runner: TaskRunner,
        settings: Arc<RwLock<Config>>,
    ) -> Self {
        Self {
            windows,
            router,
            runner,
            settings,
        }
    }

    pub fn windows(&self) -> &Arc<dyn WindowHost> {
        &self.windows
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    /// Snapshot of the current configuration.
    pub fn settings(&self) -> Config {
        self.settings.read().clone()
    }

    /// Queue a launch of the named application.
    pub fn launch(&self, name: &str) -> bool {
        self.router.post(ControlMessage::Launch {
            name: name.to_string(),
        })
    }
}

/// The taskbar shell.
pub struct Taskbar {
    registry: ApplicationRegistry,
    windows: Arc<HostWindows>,
    runner: TaskRunner,
    router: MessageRouter,
    control_rx: Receiver<ControlMessage>,
    instances: FxHashMap<WindowId, Box<dyn AppInstance>>,
    settings: Arc<RwLock<Config>>,
    exit_when_idle: bool,
    ever_started: bool,
    shutting_down: bool,
}

impl Taskbar {
    pub fn new(config: Config, runner: TaskRunner) -> Self {
        let (router, control_rx) = MessageRouter::channel();
        let windows = Arc::new(HostWindows::new(config.max_windows, config.scrollback_bytes));
        Self {
            registry: ApplicationRegistry::new(),
            windows,
            runner,
            router,
            control_rx,
            instances: FxHashMap::default(),
            settings: Arc::new(RwLock::new(config)),
            exit_when_idle: false,
            ever_started: false,
            shutting_down: false,
        }
    }

    /// Initialize and register an application factory.
    pub fn register(&mut self, factory: Box<dyn AppFactory>) -> bool {
        self.registry.register(factory)
    }

    pub fn handle(&self) -> TaskbarHandle {
        TaskbarHandle {
            windows: self.windows.clone(),
            router: self.router.clone(),
            runner: self.runner.clone(),
            settings: self.settings.clone(),
        }
    }

    pub fn router(&self) -> MessageRouter {
        self.router.clone()
    }

    /// Main-menu rows for every registered application.
    pub fn menu_items(&self) -> Vec<MenuItem> {
        self.registry.menu_items()
    }

    /// Exit the control loop once the last application closes.
    pub fn set_exit_when_idle(&mut self, exit_when_idle: bool) {
        self.exit_when_idle = exit_when_idle;
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn window_ids(&self) -> Vec<WindowId> {
        self.instances.keys().copied().collect()
    }

    pub fn phase_of(&self, window: WindowId) -> Option<LifecyclePhase> {
        self.instances.get(&window).map(|instance| instance.phase())
    }

    /// Activate a main-menu row by name, the way the menu surface does.
    ///
    /// A factory with an event sink gets its menu event delivered there;
    /// otherwise the start function runs.
    pub fn activate_menu_item(&mut self, name: &str) -> bool {
        let (sink, event, start) = {
            let Some(factory) = self.registry.factory_mut(name) else {
                return false;
            };
            (
                factory.event_handler(),
                factory.menu_event(),
                factory.start_function(),
            )
        };
        if let Some(sink) = sink {
            sink.handle(event);
            return true;
        }
        if event != EventCode::Nop {
            trace!("menu event {:?} for '{}' has no sink, dropping", event, name);
            return true;
        }
        start(&self.handle())
    }

    /// Pump one control message with a bounded wait. Returns false once the
    /// loop should exit.
    pub fn step(&mut self, timeout: Duration) -> bool {
        match self.control_rx.recv_timeout(timeout) {
            Ok(message) => self.dispatch(message),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return false,
        }
        if self.shutting_down && self.instances.is_empty() {
            return false;
        }
        if self.exit_when_idle && self.ever_started && self.instances.is_empty() {
            info!("last application closed, exiting");
            return false;
        }
        true
    }

    /// Run the control loop until shutdown completes, bounding the final
    /// drain with the configured block-ack timeout.
    pub fn run(&mut self) {
        info!("taskbar control loop started");
        let mut deadline: Option<Instant> = None;
        let mut deadline_armed = false;
        loop {
            // Tighter ticks while draining so the deadline is honored
            // promptly.
            let tick = if self.shutting_down {
                DRAIN_SLICE
            } else {
                IDLE_TICK
            };
            if !self.step(tick) {
                break;
            }
            if self.shutting_down && !deadline_armed {
                deadline_armed = true;
                deadline = self
                    .settings
                    .read()
                    .block_ack_timeout()
                    .map(|timeout| Instant::now() + timeout);
                if deadline.is_none() {
                    debug!("waiting indefinitely for close handshakes");
                }
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(
                    "close handshakes still pending after {}ms, abandoning",
                    self.settings.read().block_ack_timeout_ms
                );
                self.abandon_stragglers();
                break;
            }
        }
        info!("taskbar control loop finished");
    }

    fn dispatch(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::WindowEvent { window, event } => {
                self.handle_window_event(window, event)
            }
            ControlMessage::Block { window } => self.handle_block(window),
            ControlMessage::Destroy { window } => self.handle_destroy(window),
            ControlMessage::WindowEmpty { window } => self.handle_window_empty(window),
            ControlMessage::Launch { name } => self.handle_launch(&name),
            ControlMessage::ConfigChanged => self.handle_config_changed(),
            ControlMessage::Shutdown => self.begin_shutdown(),
        }
    }

    fn handle_window_event(&mut self, window: WindowId, event: EventCode) {
        let Some(instance) = self.instances.get_mut(&window) else {
            trace!("event {:?} for unknown {}", event, window);
            return;
        };
        if instance.window().is_blocked() {
            trace!("dropping {:?} for blocked {}", event, window);
            return;
        }
        match event {
            EventCode::WindowClose => instance.destroy(),
            EventCode::WindowMinimize => instance.minimize(),
            EventCode::WindowRaise => instance.redraw(),
            EventCode::WindowLower => instance.hide(),
            EventCode::Nop => {}
            EventCode::MenuSelect => trace!("menu select outside a menu for {}", window),
        }
    }

    fn handle_block(&mut self, window: WindowId) {
        // Everything queued ahead of this message has already been
        // dispatched; the block takes effect for everything after.
        if !self.windows.mark_blocked(window) {
            trace!("block for unknown {}", window);
        }
        let Some(instance) = self.instances.get_mut(&window) else {
            trace!("block for untracked {}", window);
            return;
        };
        if instance.phase() != LifecyclePhase::Blocking {
            debug_panic!(
                "block for {} in phase {}, expected blocking",
                window,
                instance.phase()
            );
        }
        instance.block_acknowledged();
    }

    fn handle_destroy(&mut self, window: WindowId) {
        match self.instances.remove(&window) {
            Some(instance) => {
                debug!(
                    "deleting '{}' ({}), {} instance(s) remain",
                    instance.name(),
                    window,
                    self.instances.len()
                );
                drop(instance);
            }
            // Duplicate destroys are tolerated.
            None => trace!("destroy for unknown {}", window),
        }
    }

    fn handle_window_empty(&mut self, window: WindowId) {
        let Some(instance) = self.instances.get_mut(&window) else {
            trace!("window-empty for unknown {}", window);
            return;
        };
        // The session ended on its own; converge on the normal close
        // handshake.
        if instance.phase() == LifecyclePhase::Running {
            debug!("session for {} ended, closing its window", window);
            instance.destroy();
        }
    }

    fn handle_launch(&mut self, name: &str) {
        if self.shutting_down {
            debug!("ignoring launch of '{}' during shutdown", name);
            return;
        }
        let handle = self.handle();
        let Some(factory) = self.registry.factory_mut(name) else {
            warn!("launch of unknown application '{}'", name);
            return;
        };
        let Some(mut instance) = factory.create(&handle) else {
            warn!("application '{}' could not be created", name);
            return;
        };
        let window = instance.window().id();
        if !instance.run() {
            warn!("application '{}' failed to start", name);
            instance.destroy();
            return;
        }
        self.ever_started = true;
        debug!("application '{}' running in {}", name, window);
        self.instances.insert(window, instance);
    }

    fn handle_config_changed(&mut self) {
        let config = load_config();
        debug!("configuration reloaded");
        *self.settings.write() = config;
    }

    fn begin_shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        info!(
            "taskbar shutting down, {} instance(s) open",
            self.instances.len()
        );
        for instance in self.instances.values_mut() {
            instance.stop();
            instance.destroy();
        }
    }

    fn abandon_stragglers(&mut self) {
        for (window, instance) in std::mem::take(&mut self.instances) {
            warn!(
                "instance '{}' ({}) stuck in phase {}, dropping (trace: {:?})",
                instance.name(),
                window,
                instance.phase(),
                instance.teardown_trace()
            );
        }
    }
}
