//! Factory that mints console instances for the taskbar menu.

use crate::{ConsoleApp, CONSOLE_NAME};
use settings::Config;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use taskbar::{
    AppFactory, AppInstance, Bitmap, BuiltinIcons, IconProvider, StartFunction, TaskbarHandle,
};
use tracing::{debug, warn};
use util::debug_panic;
use vterm::{
    init_shell_runtime, shell_runtime, DeviceHub, MinorRange, SessionProgram, ShellSession,
};

/// Icon name the console asks its provider for.
pub const CONSOLE_ICON: &str = "console";

/// Builds the session program for a console about to start. Returns `None`
/// when no program can be built, which fails the creation cleanly.
pub type SessionBuilder = Box<dyn FnMut() -> Option<Box<dyn SessionProgram>> + Send>;

fn shell_session_builder() -> Option<Box<dyn SessionProgram>> {
    let runtime = shell_runtime()?;
    Some(Box::new(ShellSession::new(
        runtime.program.clone(),
        runtime.args.clone(),
    )))
}

/// Builds [`ConsoleApp`] instances and describes the console's main-menu
/// row: fixed name, caller-owned icon, no submenu, no event sink.
pub struct ConsoleFactory {
    icons: Box<dyn IconProvider>,
    shell: Option<String>,
    shell_args: Vec<String>,
    first_minor: u32,
    max_consoles: u32,
    /// Set once by `initialize`; later calls keep the first hub.
    hub: OnceLock<DeviceHub>,
    /// Minor cursor. Monotonic: minors are never reused, even after their
    /// console is deleted.
    next_minor: AtomicU32,
    session_builder: SessionBuilder,
}

impl ConsoleFactory {
    pub fn new(config: &Config) -> Self {
        Self {
            icons: Box::new(BuiltinIcons),
            shell: config.shell.clone(),
            shell_args: config.shell_args.clone(),
            first_minor: config.first_minor,
            max_consoles: config.max_consoles,
            hub: OnceLock::new(),
            next_minor: AtomicU32::new(config.first_minor),
            session_builder: Box::new(shell_session_builder),
        }
    }

    /// Replace how session programs are built. For embedding and tests.
    pub fn with_session_builder(mut self, builder: SessionBuilder) -> Self {
        self.session_builder = builder;
        self
    }

    /// The device hub, once `initialize` has run.
    pub fn device_hub(&self) -> Option<&DeviceHub> {
        self.hub.get()
    }

    /// Build a console for the given taskbar. Fails cleanly: on any error
    /// nothing new is left allocated.
    pub fn create_console(&mut self, taskbar: &TaskbarHandle) -> Option<ConsoleApp> {
        let Some(hub) = self.hub.get() else {
            debug_panic!("console factory used before initialize");
            return None;
        };
        let session = (self.session_builder)()?;

        let window = match taskbar.windows().allocate_window(CONSOLE_NAME) {
            Ok(window) => window,
            Err(e) => {
                warn!("console window allocation failed: {:#}", e);
                return None;
            }
        };

        let minor = self.next_minor.fetch_add(1, Ordering::SeqCst);
        // The cursor starts at first_minor, so this subtraction cannot wrap
        // even for ranges whose end does not fit in u32.
        if minor - self.first_minor >= self.max_consoles {
            warn!(
                "console minors exhausted ({} consoles already created)",
                self.max_consoles
            );
            taskbar.windows().destroy_window(window.id());
            return None;
        }

        debug!("creating console on minor {}", minor);
        Some(ConsoleApp::new(
            minor,
            window,
            taskbar,
            hub.clone(),
            session,
            taskbar.settings().task_grace(),
        ))
    }
}

impl AppFactory for ConsoleFactory {
    /// One-time setup: resolve the shell runtime and build the device hub.
    /// Idempotent; repeat calls keep the first resolution.
    fn initialize(&mut self) -> bool {
        if !init_shell_runtime(self.shell.as_deref(), &self.shell_args) {
            warn!("console factory cannot initialize without a shell");
            return false;
        }
        let range = MinorRange::new(self.first_minor, self.max_consoles);
        let _ = self.hub.set(DeviceHub::new(range));
        true
    }

    fn name(&self) -> &str {
        CONSOLE_NAME
    }

    fn icon(&self) -> Option<Bitmap> {
        self.icons.load_icon(CONSOLE_ICON)
    }

    fn start_function(&self) -> StartFunction {
        |taskbar| taskbar.launch(CONSOLE_NAME)
    }

    fn create(&mut self, taskbar: &TaskbarHandle) -> Option<Box<dyn AppInstance>> {
        self.create_console(taskbar)
            .map(|console| Box::new(console) as Box<dyn AppInstance>)
    }
}
