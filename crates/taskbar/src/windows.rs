//! Application windows owned by the taskbar.
//!
//! Windows are account-keeping objects here: a title, display flags, and a
//! capped scrollback of the bytes an application has pushed for display.
//! [`WindowHost`] is the allocation surface handed to applications;
//! [`HostWindows`] is the taskbar's own table behind it.

use anyhow::{bail, Result};
use collections::{FxHashMap, VecDeque};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Identifier for one taskbar window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window-{}", self.0)
    }
}

#[derive(Debug)]
struct WindowState {
    title: String,
    minimized: AtomicBool,
    topmost: AtomicBool,
    blocked: AtomicBool,
    destroyed: AtomicBool,
    redraws: AtomicU64,
    content: Mutex<VecDeque<u8>>,
    scrollback_bytes: usize,
}

/// Shared handle to one window's state. Stays valid after the window is
/// destroyed; the flags just report it as such.
#[derive(Debug, Clone)]
pub struct WindowRef {
    id: WindowId,
    state: Arc<WindowState>,
}

impl WindowRef {
    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.state.title
    }

    pub fn is_minimized(&self) -> bool {
        self.state.minimized.load(Ordering::SeqCst)
    }

    pub fn is_topmost(&self) -> bool {
        self.state.topmost.load(Ordering::SeqCst)
    }

    pub fn is_blocked(&self) -> bool {
        self.state.blocked.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.destroyed.load(Ordering::SeqCst)
    }

    pub fn redraw_count(&self) -> u64 {
        self.state.redraws.load(Ordering::SeqCst)
    }

    pub fn set_topmost(&self, topmost: bool) {
        self.state.topmost.store(topmost, Ordering::SeqCst);
    }

    /// Append bytes to the window's display scrollback, dropping the oldest
    /// once the cap is reached.
    pub fn push_content(&self, bytes: &[u8]) {
        let mut content = self.state.content.lock();
        content.extend(bytes.iter().copied());
        if content.len() > self.state.scrollback_bytes {
            let excess = content.len() - self.state.scrollback_bytes;
            content.drain(..excess);
        }
    }

    /// Copy of the current scrollback, oldest bytes first.
    pub fn content(&self) -> Vec<u8> {
        self.state.content.lock().iter().copied().collect()
    }

    pub fn content_len(&self) -> usize {
        self.state.content.lock().len()
    }
}

/// Window allocation surface the taskbar lends to hosted applications.
pub trait WindowHost: Send + Sync {
    /// Allocate a framed application window. Fails when the window limit
    /// is reached.
    fn allocate_window(&self, title: &str) -> Result<WindowRef>;

    /// Release a window. Tolerates windows that are already gone.
    fn destroy_window(&self, id: WindowId);

    /// Schedule a repaint of the window's content region.
    fn redraw(&self, id: WindowId);

    fn set_minimized(&self, id: WindowId, minimized: bool);
}

/// The taskbar's window table.
pub struct HostWindows {
    max_windows: usize,
    scrollback_bytes: usize,
    next_id: AtomicU64,
    windows: Mutex<FxHashMap<WindowId, WindowRef>>,
}

impl HostWindows {
    pub fn new(max_windows: usize, scrollback_bytes: usize) -> Self {
        Self {
            max_windows,
            scrollback_bytes,
            next_id: AtomicU64::new(1),
            windows: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn window(&self, id: WindowId) -> Option<WindowRef> {
        self.windows.lock().get(&id).cloned()
    }

    pub fn window_count(&self) -> usize {
        self.windows.lock().len()
    }

    /// Stop routing events to `id`. False when the window is unknown.
    pub fn mark_blocked(&self, id: WindowId) -> bool {
        match self.windows.lock().get(&id) {
            Some(window) => {
                window.state.blocked.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }
}

impl WindowHost for HostWindows {
    fn allocate_window(&self, title: &str) -> Result<WindowRef> {
        let mut windows = self.windows.lock();
        if windows.len() >= self.max_windows {
            bail!(
                "window limit reached ({} of {} in use)",
                windows.len(),
                self.max_windows
            );
        }
        let id = WindowId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let window = WindowRef {
            id,
            state: Arc::new(WindowState {
                title: title.to_string(),
                minimized: AtomicBool::new(false),
                topmost: AtomicBool::new(true),
                blocked: AtomicBool::new(false),
                destroyed: AtomicBool::new(false),
                redraws: AtomicU64::new(0),
                content: Mutex::new(VecDeque::new()),
                scrollback_bytes: self.scrollback_bytes,
            }),
        };
        windows.insert(id, window.clone());
        debug!("allocated {} for '{}'", id, title);
        Ok(window)
    }

    fn destroy_window(&self, id: WindowId) {
        match self.windows.lock().remove(&id) {
            Some(window) => {
                window.state.destroyed.store(true, Ordering::SeqCst);
                debug!("destroyed {}", id);
            }
            None => trace!("destroy of unknown {}", id),
        }
    }

    fn redraw(&self, id: WindowId) {
        match self.windows.lock().get(&id) {
            Some(window) => {
                window.state.redraws.fetch_add(1, Ordering::SeqCst);
            }
            None => trace!("redraw of unknown {}", id),
        }
    }

    fn set_minimized(&self, id: WindowId, minimized: bool) {
        match self.windows.lock().get(&id) {
            Some(window) => window.state.minimized.store(minimized, Ordering::SeqCst),
            None => trace!("minimize of unknown {}", id),
        }
    }
}
