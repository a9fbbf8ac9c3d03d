//! The console application: a shell session hosted in a taskbar window.
//!
//! A console ties four resources to one window: a terminal device leased
//! from the hub, a session task driving the shell, the window itself, and
//! an exit callback registered with the task runner. The instance is owned
//! by the taskbar's control loop; tearing it down is the close handshake
//! described in [`taskbar::app::AppInstance`], and every resource here is
//! released exactly once no matter which side initiates.

pub mod factory;

pub use factory::{ConsoleFactory, SessionBuilder, CONSOLE_ICON};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskbar::{
    AppInstance, LifecyclePhase, MessageRouter, TaskbarHandle, WindowHost, WindowRef,
};
use tasks::{TaskArgs, TaskId, TaskRunner};
use tracing::{debug, error, info, trace, warn};
use util::debug_panic;
use uuid::Uuid;
use vterm::{DeviceHub, DeviceLease, HostEndpoint, SessionProgram};

/// Name under which the console registers, and its window title.
pub const CONSOLE_NAME: &str = "Console";

struct ConsoleShared {
    session_id: Uuid,
    minor: u32,
    window: WindowRef,
    windows: Arc<dyn WindowHost>,
    router: MessageRouter,
    runner: TaskRunner,
    hub: DeviceHub,
    task_grace: Duration,
    /// Program to run, consumed by the first `run`.
    session: Mutex<Option<Box<dyn SessionProgram>>>,
    device: Mutex<Option<DeviceLease>>,
    host_stream: Mutex<Option<HostEndpoint>>,
    task: Mutex<Option<TaskId>>,
    stop_flag: Arc<AtomicBool>,
    phase: Mutex<LifecyclePhase>,
    trace: Mutex<Vec<LifecyclePhase>>,
}

impl ConsoleShared {
    fn phase(&self) -> LifecyclePhase {
        *self.phase.lock()
    }

    fn enter(&self, phase: LifecyclePhase) {
        *self.phase.lock() = phase;
        self.trace.lock().push(phase);
        trace!("console {} entered phase {}", self.minor, phase);
    }

    /// Drop the device lease. Returns whether this call released it; the
    /// lease is taken under the lock, so release happens exactly once even
    /// when the exit callback and the owner race here.
    fn release_device(&self) -> bool {
        self.device.lock().take().is_some()
    }

    /// Exit callback for the session task. Holds an `Arc` of this state,
    /// so the device and window handles are alive even if the instance box
    /// is already gone.
    fn session_exited(&self, code: i32) {
        debug!(
            "console session {} exited with code {}",
            self.session_id, code
        );
        self.release_device();
        self.task.lock().take();
        self.router.notify_window_empty(self.window.id());
    }
}

/// One console instance. Created by [`ConsoleFactory`], owned and deleted
/// by the taskbar's control loop.
pub struct ConsoleApp {
    shared: Arc<ConsoleShared>,
}

impl ConsoleApp {
    pub(crate) fn new(
        minor: u32,
        window: WindowRef,
        taskbar: &TaskbarHandle,
        hub: DeviceHub,
        session: Box<dyn SessionProgram>,
        task_grace: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(ConsoleShared {
                session_id: Uuid::new_v4(),
                minor,
                window,
                windows: taskbar.windows().clone(),
                router: taskbar.router().clone(),
                runner: taskbar.runner().clone(),
                hub,
                task_grace,
                session: Mutex::new(Some(session)),
                device: Mutex::new(None),
                host_stream: Mutex::new(None),
                task: Mutex::new(None),
                stop_flag: Arc::new(AtomicBool::new(false)),
                phase: Mutex::new(LifecyclePhase::Inert),
                trace: Mutex::new(vec![LifecyclePhase::Inert]),
            }),
        }
    }

    /// Diagnostic view of this console that stays valid after deletion.
    pub fn probe(&self) -> ConsoleProbe {
        ConsoleProbe {
            shared: self.shared.clone(),
        }
    }
}

impl AppInstance for ConsoleApp {
    fn name(&self) -> &str {
        CONSOLE_NAME
    }

    fn window(&self) -> WindowRef {
        self.shared.window.clone()
    }

    fn run(&mut self) -> bool {
        let shared = &self.shared;
        if shared.phase() != LifecyclePhase::Inert {
            debug_panic!("console {} run in phase {}", shared.minor, shared.phase());
            return false;
        }
        let Some(session) = shared.session.lock().take() else {
            debug_panic!("console {} has no session program", shared.minor);
            return false;
        };

        let lease = match shared.hub.allocate(shared.minor) {
            Ok(lease) => lease,
            Err(e) => {
                warn!("console {} cannot start: {:#}", shared.minor, e);
                return false;
            }
        };
        let endpoint = lease.session_endpoint();
        *shared.host_stream.lock() = Some(lease.host_endpoint());
        *shared.device.lock() = Some(lease);

        let stop = shared.stop_flag.clone();
        let spawned = shared.runner.spawn(
            TaskArgs {
                name: format!("console-{}", shared.minor),
                argv: vec![shared.minor.to_string()],
            },
            move |_args| session.run(endpoint, stop),
        );
        let task_id = match spawned {
            Ok(id) => id,
            Err(e) => {
                error!("console {} failed to start: {:#}", shared.minor, e);
                shared.release_device();
                shared.host_stream.lock().take();
                return false;
            }
        };
        *shared.task.lock() = Some(task_id);

        let exit_shared = shared.clone();
        if !shared
            .runner
            .register_exit_callback(task_id, Box::new(move |code| exit_shared.session_exited(code)))
        {
            debug_panic!("console {} lost its task record", shared.minor);
        }

        shared.enter(LifecyclePhase::Running);
        info!(
            "console session {} running on minor {} ({})",
            shared.session_id,
            shared.minor,
            shared.window.id()
        );
        true
    }

    fn stop(&mut self) {
        debug!("console {} stop requested", self.shared.minor);
        self.shared.stop_flag.store(true, Ordering::SeqCst);
    }

    fn destroy(&mut self) {
        let shared = &self.shared;
        match shared.phase() {
            LifecyclePhase::Inert => {
                // Never ran, so nothing to block; the caller drops the box.
                shared.enter(LifecyclePhase::PendingDelete);
            }
            LifecyclePhase::Running => {
                shared.stop_flag.store(true, Ordering::SeqCst);
                shared.enter(LifecyclePhase::Blocking);
                shared.router.request_block(shared.window.id());
            }
            // Close handshake already under way.
            phase => trace!("console {} destroy in phase {}", shared.minor, phase),
        }
    }

    fn minimize(&mut self) {
        self.shared
            .windows
            .set_minimized(self.shared.window.id(), true);
    }

    fn hide(&mut self) {
        self.shared.window.set_topmost(false);
    }

    fn redraw(&mut self) {
        let shared = &self.shared;
        let drained = shared
            .host_stream
            .lock()
            .as_ref()
            .map(|stream| stream.drain_output());
        if let Some(bytes) = drained {
            if !bytes.is_empty() {
                shared.window.push_content(&bytes);
            }
        }
        shared.windows.redraw(shared.window.id());
        shared.window.set_topmost(true);
    }

    fn is_full_screen(&self) -> bool {
        // Consoles live in framed application windows.
        false
    }

    fn block_acknowledged(&mut self) {
        let shared = &self.shared;
        if shared.phase() != LifecyclePhase::Blocking {
            debug_panic!(
                "console {} block-ack in phase {}",
                shared.minor,
                shared.phase()
            );
            return;
        }
        shared.enter(LifecyclePhase::Blocked);
        // Queue our own deletion; the control loop drops the box.
        shared.enter(LifecyclePhase::PendingDelete);
        shared.router.post_destroy(shared.window.id());
    }

    fn phase(&self) -> LifecyclePhase {
        self.shared.phase()
    }

    fn teardown_trace(&self) -> Vec<LifecyclePhase> {
        self.shared.trace.lock().clone()
    }
}

impl Drop for ConsoleApp {
    fn drop(&mut self) {
        let shared = &self.shared;
        shared.stop_flag.store(true, Ordering::SeqCst);

        let task = *shared.task.lock();
        if let Some(task) = task {
            if !shared.runner.wait_timeout(task, shared.task_grace) {
                warn!(
                    "console session {} still up after {:?}, reclaiming its device",
                    shared.session_id, shared.task_grace
                );
            }
        }

        // The exit callback releases the device when the task got to run;
        // reclaim it here when it never did, or never will in time.
        if shared.release_device() {
            trace!("console {} released its device at teardown", shared.minor);
        }
        shared.host_stream.lock().take();

        shared.windows.destroy_window(shared.window.id());
        shared.enter(LifecyclePhase::Deleted);
        info!("console session {} deleted", shared.session_id);
    }
}

/// Diagnostic handle into one console's state, alive after the instance
/// itself is deleted. Used by the taskbar's stall warnings and by tests.
#[derive(Clone)]
pub struct ConsoleProbe {
    shared: Arc<ConsoleShared>,
}

impl ConsoleProbe {
    pub fn session_id(&self) -> Uuid {
        self.shared.session_id
    }

    pub fn minor(&self) -> u32 {
        self.shared.minor
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.shared.phase()
    }

    pub fn teardown_trace(&self) -> Vec<LifecyclePhase> {
        self.shared.trace.lock().clone()
    }

    /// Whether the console still holds its device lease.
    pub fn device_held(&self) -> bool {
        self.shared.device.lock().is_some()
    }

    /// Whether the session task is still tracked.
    pub fn task_active(&self) -> bool {
        self.shared.task.lock().is_some()
    }

    pub fn window(&self) -> WindowRef {
        self.shared.window.clone()
    }
}
