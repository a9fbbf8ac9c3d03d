//! Shared fixtures for the console integration tests.

// Allow unused items - each test binary uses a different slice of the rig
#![allow(dead_code)]

use parking_lot::RwLock;
use settings::Config;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use taskbar::{ControlMessage, HostWindows, MessageRouter, TaskbarHandle};
use tasks::TaskRunner;
use vterm::{SessionEndpoint, SessionProgram};

/// Session stand-in: writes a banner, then exits or idles until stopped.
pub struct FakeSession {
    pub banner: &'static [u8],
    pub exit_code: i32,
    pub exit_immediately: bool,
    /// Ignore the stop flag; only a closed device ends the session.
    pub ignore_stop: bool,
}

impl SessionProgram for FakeSession {
    fn run(self: Box<Self>, device: SessionEndpoint, stop: Arc<AtomicBool>) -> i32 {
        if !self.banner.is_empty() {
            let _ = device.write_output(self.banner);
        }
        if self.exit_immediately {
            return self.exit_code;
        }
        loop {
            if device.is_closed() {
                break;
            }
            if !self.ignore_stop && stop.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        self.exit_code
    }
}

/// Hand-built taskbar surface plus the receiver end of its control queue,
/// so a test can play the owner task itself.
pub struct Rig {
    pub config: Config,
    pub windows: Arc<HostWindows>,
    pub router: MessageRouter,
    pub runner: TaskRunner,
    pub control_rx: Receiver<ControlMessage>,
    pub handle: TaskbarHandle,
}

pub fn rig(config: Config) -> Rig {
    let (router, control_rx) = MessageRouter::channel();
    let windows = Arc::new(HostWindows::new(
        config.max_windows,
        config.scrollback_bytes,
    ));
    let runner = TaskRunner::new();
    let handle = TaskbarHandle::from_parts(
        windows.clone(),
        router.clone(),
        runner.clone(),
        Arc::new(RwLock::new(config.clone())),
    );
    Rig {
        config,
        windows,
        router,
        runner,
        control_rx,
        handle,
    }
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub fn next_message(rx: &Receiver<ControlMessage>) -> ControlMessage {
    rx.recv_timeout(Duration::from_secs(5))
        .expect("control queue should deliver a message")
}
