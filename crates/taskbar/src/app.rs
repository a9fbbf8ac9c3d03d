//! The application surface: what the taskbar hosts and how it starts.

use crate::events::EventCode;
use crate::icons::Bitmap;
use crate::windows::WindowRef;
use crate::TaskbarHandle;
use std::fmt;
use std::sync::Arc;

/// Teardown phases of a hosted application instance.
///
/// Instances only ever move forward: `Inert` until `run`, `Running` while
/// the session task is up, then the close handshake walks `Blocking`,
/// `Blocked`, `PendingDelete`, `Deleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Inert,
    Running,
    Blocking,
    Blocked,
    PendingDelete,
    Deleted,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecyclePhase::Inert => "inert",
            LifecyclePhase::Running => "running",
            LifecyclePhase::Blocking => "blocking",
            LifecyclePhase::Blocked => "blocked",
            LifecyclePhase::PendingDelete => "pending-delete",
            LifecyclePhase::Deleted => "deleted",
        };
        write!(f, "{}", name)
    }
}

/// One row of an application's drop-down submenu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    pub label: String,
    pub event: EventCode,
}

/// Per-application submenu attached under the main-menu row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubMenu {
    pub entries: Vec<MenuEntry>,
}

/// Receives menu events on behalf of a factory that intercepts them.
pub trait EventSink: Send + Sync {
    fn handle(&self, event: EventCode);
}

/// Function the main menu calls to start an application.
pub type StartFunction = fn(&TaskbarHandle) -> bool;

/// A running (or starting) application hosted in a taskbar window.
///
/// The taskbar's control loop holds the unique box for every live instance
/// and is the only place an instance is ever dropped. `destroy` does not
/// delete anything by itself: it starts the close handshake, and the loop
/// drops the box once the instance's `Destroy` message comes back around.
pub trait AppInstance: Send {
    /// Name shown in the window frame and the taskbar.
    fn name(&self) -> &str;

    /// The window this instance draws into.
    fn window(&self) -> WindowRef;

    /// Start the application's task. False when the instance cannot start,
    /// in which case the caller destroys it without ever tracking it.
    fn run(&mut self) -> bool;

    /// Ask the application's task to wind down. The window stays up until
    /// `destroy` completes the handshake.
    fn stop(&mut self);

    /// Begin the close handshake. Idempotent; callable from any phase.
    fn destroy(&mut self);

    fn minimize(&mut self);

    /// Drop the window out of the stacking order without minimizing it.
    fn hide(&mut self);

    /// Repaint the window from the application's pending output.
    fn redraw(&mut self);

    fn is_full_screen(&self) -> bool;

    /// Second half of the close handshake: the control loop has blocked the
    /// window, and the instance may now queue its own deletion.
    fn block_acknowledged(&mut self);

    fn phase(&self) -> LifecyclePhase;

    /// Every phase the instance has entered, oldest first.
    fn teardown_trace(&self) -> Vec<LifecyclePhase>;
}

/// Builds instances of one application and describes its main-menu row.
pub trait AppFactory: Send {
    /// One-time setup before the factory is exposed in the menu. False
    /// keeps the application out of the registry.
    fn initialize(&mut self) -> bool;

    /// Name shown in the main menu. Stable for the factory's lifetime.
    fn name(&self) -> &str;

    /// Menu icon. A fresh copy each call; the caller owns it.
    fn icon(&self) -> Option<Bitmap>;

    /// Drop-down submenu, for applications that carry one.
    fn sub_menu(&self) -> Option<SubMenu> {
        None
    }

    /// Called when the menu row is activated and no event sink intercepts.
    fn start_function(&self) -> StartFunction;

    /// Sink for applications that intercept their menu events.
    fn event_handler(&self) -> Option<Arc<dyn EventSink>> {
        None
    }

    /// Event delivered to the sink on menu selection.
    fn menu_event(&self) -> EventCode {
        EventCode::Nop
    }

    /// Build a new, not-yet-running instance.
    fn create(&mut self, taskbar: &TaskbarHandle) -> Option<Box<dyn AppInstance>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BareFactory;

    impl AppFactory for BareFactory {
        fn initialize(&mut self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "bare"
        }

        fn icon(&self) -> Option<Bitmap> {
            None
        }

        fn start_function(&self) -> StartFunction {
            |_| false
        }

        fn create(&mut self, _taskbar: &TaskbarHandle) -> Option<Box<dyn AppInstance>> {
            None
        }
    }

    #[test]
    fn factory_defaults_are_absent_and_inert() {
        let factory = BareFactory;
        assert!(factory.sub_menu().is_none());
        assert!(factory.event_handler().is_none());
        assert_eq!(factory.menu_event(), EventCode::Nop);
    }

    #[test]
    fn phases_display_as_kebab_case() {
        assert_eq!(LifecyclePhase::Running.to_string(), "running");
        assert_eq!(LifecyclePhase::PendingDelete.to_string(), "pending-delete");
    }
}
