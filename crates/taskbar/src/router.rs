//! The control queue every taskbar mutation funnels through.

use crate::events::EventCode;
use crate::windows::WindowId;
use std::sync::mpsc::{self, Receiver, Sender};

/// Messages processed by the taskbar control loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// A window event for a hosted application.
    WindowEvent { window: WindowId, event: EventCode },
    /// First half of the close handshake: block this window's events.
    Block { window: WindowId },
    /// Second half: delete the instance owning this window.
    Destroy { window: WindowId },
    /// The application's task is gone and the window shows a dead session.
    WindowEmpty { window: WindowId },
    /// A main-menu row was activated.
    Launch { name: String },
    /// The config file changed on disk.
    ConfigChanged,
    /// Wind the whole taskbar down.
    Shutdown,
}

/// Cloneable sender half of the control queue.
///
/// The queue is the serialization point for the instance table: exactly one
/// task (the control loop) consumes it, so ordering between a window's
/// events and its close handshake is the queue order.
#[derive(Clone)]
pub struct MessageRouter {
    tx: Sender<ControlMessage>,
}

impl MessageRouter {
    pub fn channel() -> (Self, Receiver<ControlMessage>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    /// Queue a message. False once the control loop is gone.
    pub fn post(&self, message: ControlMessage) -> bool {
        self.tx.send(message).is_ok()
    }

    pub fn post_event(&self, window: WindowId, event: EventCode) -> bool {
        self.post(ControlMessage::WindowEvent { window, event })
    }

    /// Ask the control loop to block `window` and acknowledge.
    pub fn request_block(&self, window: WindowId) -> bool {
        self.post(ControlMessage::Block { window })
    }

    /// Queue the final deletion of the instance owning `window`.
    pub fn post_destroy(&self, window: WindowId) -> bool {
        self.post(ControlMessage::Destroy { window })
    }

    /// Report that `window`'s application task has finished on its own.
    pub fn notify_window_empty(&self, window: WindowId) -> bool {
        self.post(ControlMessage::WindowEmpty { window })
    }
}
