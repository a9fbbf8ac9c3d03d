//! Virtual terminal devices keyed by minor number.
//!
//! A [`DeviceHub`] hands out at most one [`DeviceLease`] per minor. The lease
//! owns an in-process pipe with two ends: the session side (written by the
//! hosted program) and the host side (drained by the window manager). Dropping
//! the lease closes the pipe and returns the minor to the hub.

use anyhow::{bail, Result};
use collections::{FxHashMap, FxHashSet, VecDeque};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};
use util::debug_panic;

/// Cap on buffered session output the host has not drained yet.
const OUTPUT_BUFFER_BYTES: usize = 128 * 1024;

/// Cap on buffered host input the session has not consumed yet.
const INPUT_BUFFER_BYTES: usize = 16 * 1024;

/// Contiguous range of minor numbers a hub hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinorRange {
    pub first: u32,
    pub count: u32,
}

impl MinorRange {
    pub fn new(first: u32, count: u32) -> Self {
        Self { first, count }
    }

    pub fn contains(&self, minor: u32) -> bool {
        minor >= self.first && minor - self.first < self.count
    }
}

#[derive(Debug, Default)]
struct HubState {
    allocated: FxHashSet<u32>,
    /// Times each minor has been released over the hub's lifetime.
    releases: FxHashMap<u32, u64>,
}

#[derive(Debug)]
struct HubInner {
    range: MinorRange,
    state: Mutex<HubState>,
}

impl HubInner {
    fn release(&self, minor: u32) {
        let mut state = self.state.lock();
        if !state.allocated.remove(&minor) {
            debug_panic!("released terminal device {} that was not allocated", minor);
            return;
        }
        *state.releases.entry(minor).or_insert(0) += 1;
        debug!("terminal device {} released", minor);
    }
}

/// Allocates virtual terminal devices within a fixed minor range.
///
/// Cheap to clone; all clones share the same allocation table.
#[derive(Clone)]
pub struct DeviceHub {
    inner: Arc<HubInner>,
}

impl DeviceHub {
    pub fn new(range: MinorRange) -> Self {
        Self {
            inner: Arc::new(HubInner {
                range,
                state: Mutex::new(HubState::default()),
            }),
        }
    }

    pub fn range(&self) -> MinorRange {
        self.inner.range
    }

    /// Claim the device for `minor`. Fails when the minor is outside the
    /// hub's range or already allocated.
    pub fn allocate(&self, minor: u32) -> Result<DeviceLease> {
        let range = self.inner.range;
        if !range.contains(minor) {
            bail!(
                "minor {} outside device range [{}..{})",
                minor,
                range.first,
                u64::from(range.first) + u64::from(range.count)
            );
        }
        {
            let mut state = self.inner.state.lock();
            if !state.allocated.insert(minor) {
                bail!("terminal device {} is already allocated", minor);
            }
        }
        debug!("terminal device {} allocated", minor);
        Ok(DeviceLease {
            minor,
            pipe: Arc::new(DevicePipe::new()),
            hub: self.inner.clone(),
        })
    }

    pub fn is_allocated(&self, minor: u32) -> bool {
        self.inner.state.lock().allocated.contains(&minor)
    }

    pub fn allocated_count(&self) -> usize {
        self.inner.state.lock().allocated.len()
    }

    /// How many times `minor` has been released so far. Each lease must
    /// account for exactly one release, so this doubles as a leak check.
    pub fn release_count(&self, minor: u32) -> u64 {
        self.inner
            .state
            .lock()
            .releases
            .get(&minor)
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Debug)]
struct DevicePipe {
    closed: AtomicBool,
    /// Session to host.
    output: Mutex<VecDeque<u8>>,
    /// Host to session.
    input: Mutex<VecDeque<u8>>,
    input_ready: Condvar,
}

impl DevicePipe {
    fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            output: Mutex::new(VecDeque::new()),
            input: Mutex::new(VecDeque::new()),
            input_ready: Condvar::new(),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Wake any session blocked on input so it can observe the close.
        self.input_ready.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Owned claim on one terminal device.
///
/// Endpoints handed out from the lease stay valid after the lease drops, but
/// every operation on them reports the device as closed from then on.
#[derive(Debug)]
pub struct DeviceLease {
    minor: u32,
    pipe: Arc<DevicePipe>,
    hub: Arc<HubInner>,
}

impl DeviceLease {
    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn session_endpoint(&self) -> SessionEndpoint {
        SessionEndpoint {
            pipe: self.pipe.clone(),
        }
    }

    pub fn host_endpoint(&self) -> HostEndpoint {
        HostEndpoint {
            pipe: self.pipe.clone(),
        }
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.pipe.close();
        self.hub.release(self.minor);
    }
}

/// Session side of a terminal device: the hosted program writes its output
/// here and reads host input.
#[derive(Clone)]
pub struct SessionEndpoint {
    pipe: Arc<DevicePipe>,
}

impl SessionEndpoint {
    pub fn is_closed(&self) -> bool {
        self.pipe.is_closed()
    }

    /// Append session output for the host to drain. The oldest bytes are
    /// dropped once the buffer cap is reached.
    pub fn write_output(&self, bytes: &[u8]) -> Result<()> {
        if self.pipe.is_closed() {
            bail!("terminal device is closed");
        }
        let mut output = self.pipe.output.lock();
        output.extend(bytes.iter().copied());
        if output.len() > OUTPUT_BUFFER_BYTES {
            let excess = output.len() - OUTPUT_BUFFER_BYTES;
            output.drain(..excess);
            trace!("output buffer full, dropped {} oldest bytes", excess);
        }
        Ok(())
    }

    /// Blocking read of host input. Returns `Ok(None)` when `timeout` passes
    /// without input, and an error once the device is closed.
    pub fn read_input(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let mut input = self.pipe.input.lock();
        if input.is_empty() {
            if self.pipe.is_closed() {
                bail!("terminal device is closed");
            }
            self.pipe.input_ready.wait_for(&mut input, timeout);
        }
        if !input.is_empty() {
            return Ok(Some(input.drain(..).collect()));
        }
        if self.pipe.is_closed() {
            bail!("terminal device is closed");
        }
        Ok(None)
    }
}

/// Host side of a terminal device: the window manager queues keyboard input
/// and drains session output for display.
#[derive(Clone)]
pub struct HostEndpoint {
    pipe: Arc<DevicePipe>,
}

impl HostEndpoint {
    pub fn is_closed(&self) -> bool {
        self.pipe.is_closed()
    }

    /// Queue input for the session and wake it if it is blocked reading.
    pub fn send_input(&self, bytes: &[u8]) -> Result<()> {
        if self.pipe.is_closed() {
            bail!("terminal device is closed");
        }
        {
            let mut input = self.pipe.input.lock();
            input.extend(bytes.iter().copied());
            if input.len() > INPUT_BUFFER_BYTES {
                let excess = input.len() - INPUT_BUFFER_BYTES;
                input.drain(..excess);
                trace!("input buffer full, dropped {} oldest bytes", excess);
            }
        }
        self.pipe.input_ready.notify_one();
        Ok(())
    }

    /// Take all pending session output, oldest first.
    pub fn drain_output(&self) -> Vec<u8> {
        self.pipe.output.lock().drain(..).collect()
    }

    pub fn pending_output(&self) -> usize {
        self.pipe.output.lock().len()
    }
}
