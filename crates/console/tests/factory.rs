//! Console factory queries, registration, and full-taskbar integration.

mod common;

use common::{next_message, rig, wait_until, FakeSession};
use console::{ConsoleFactory, SessionBuilder, CONSOLE_NAME};
use mockall::mock;
use pretty_assertions::assert_eq;
use settings::Config;
use std::sync::Arc;
use std::time::Duration;
use taskbar::{
    AppFactory, ControlMessage, EventCode, Taskbar, TaskbarHandle, WindowHost, WindowId, WindowRef,
};
use tasks::TaskRunner;
use vterm::MinorRange;

mock! {
    pub Host {}
    impl WindowHost for Host {
        fn allocate_window(&self, title: &str) -> anyhow::Result<WindowRef>;
        fn destroy_window(&self, id: WindowId);
        fn redraw(&self, id: WindowId);
        fn set_minimized(&self, id: WindowId, minimized: bool);
    }
}

fn persistent_builder() -> SessionBuilder {
    Box::new(|| {
        Some(Box::new(FakeSession {
            banner: b"",
            exit_code: 0,
            exit_immediately: false,
            ignore_stop: false,
        }))
    })
}

fn config() -> Config {
    Config {
        first_minor: 0,
        max_consoles: 2,
        task_grace_ms: 500,
        ..Config::default()
    }
}

#[test]
fn menu_queries_are_fixed_for_the_factory_lifetime() {
    let factory = ConsoleFactory::new(&config());

    assert_eq!(factory.name(), CONSOLE_NAME);
    assert_eq!(factory.name(), "Console");
    assert!(factory.sub_menu().is_none());
    assert!(factory.event_handler().is_none());
    assert_eq!(factory.menu_event(), EventCode::Nop);
}

#[test]
fn each_icon_query_returns_an_owned_copy() {
    let factory = ConsoleFactory::new(&config());

    let mut first = factory.icon().unwrap();
    let second = factory.icon().unwrap();
    assert_eq!(first, second);

    first.rows[0] = 0xff;
    assert_ne!(first, second);
    assert_eq!(factory.icon().unwrap(), second);
}

#[test]
fn start_function_posts_a_launch() {
    let rig = rig(config());
    let factory = ConsoleFactory::new(&rig.config);

    let start = factory.start_function();
    assert!(start(&rig.handle));
    assert_eq!(
        next_message(&rig.control_rx),
        ControlMessage::Launch {
            name: CONSOLE_NAME.to_string()
        }
    );
}

#[test]
fn initialize_latches_the_first_hub() {
    let mut factory = ConsoleFactory::new(&config());
    assert!(factory.initialize());
    let hub = factory.device_hub().unwrap().clone();
    assert_eq!(hub.range(), MinorRange::new(0, 2));
    let _lease = hub.allocate(1).unwrap();

    // A second initialize keeps the first hub and its allocations.
    assert!(factory.initialize());
    assert!(factory.device_hub().unwrap().is_allocated(1));
}

#[test]
fn huge_minor_range_still_mints_consoles() {
    // A range whose end does not fit in u32 must not wrap the cursor check.
    let rig = rig(Config {
        first_minor: 1,
        max_consoles: u32::MAX,
        ..Config::default()
    });
    let mut factory = ConsoleFactory::new(&rig.config).with_session_builder(persistent_builder());
    assert!(factory.initialize());
    assert_eq!(factory.device_hub().unwrap().range(), MinorRange::new(1, u32::MAX));

    let console = factory.create_console(&rig.handle).unwrap();
    assert_eq!(console.probe().minor(), 1);
}

#[test]
fn create_fails_cleanly_when_window_allocation_fails() {
    let rig = rig(config());
    let mut factory = ConsoleFactory::new(&rig.config).with_session_builder(persistent_builder());
    assert!(factory.initialize());

    let mut mock = MockHost::new();
    mock.expect_allocate_window()
        .returning(|_| Err(anyhow::anyhow!("window limit reached")));
    mock.expect_destroy_window().times(0);

    let handle = TaskbarHandle::from_parts(
        Arc::new(mock),
        rig.router.clone(),
        rig.runner.clone(),
        Arc::new(parking_lot::RwLock::new(rig.config.clone())),
    );
    assert!(factory.create_console(&handle).is_none());

    // The minor cursor is untouched; the next creation starts at 0.
    let console = factory.create_console(&rig.handle).unwrap();
    assert_eq!(console.probe().minor(), 0);
}

#[test]
fn minor_exhaustion_destroys_the_fresh_window() {
    let rig = rig(config());
    let mut factory = ConsoleFactory::new(&rig.config).with_session_builder(persistent_builder());
    assert!(factory.initialize());

    let _first = factory.create_console(&rig.handle).unwrap();
    let _second = factory.create_console(&rig.handle).unwrap();
    assert_eq!(rig.windows.window_count(), 2);

    // Two consoles allowed; the third gets a window, then gives it back.
    assert!(factory.create_console(&rig.handle).is_none());
    assert_eq!(rig.windows.window_count(), 2);
}

#[test]
fn console_runs_inside_a_full_taskbar() {
    let config = config();
    let mut taskbar = Taskbar::new(config.clone(), TaskRunner::new());
    let factory = ConsoleFactory::new(&config).with_session_builder(persistent_builder());
    assert!(taskbar.register(Box::new(factory)));

    let items = taskbar.menu_items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, CONSOLE_NAME);
    assert!(items[0].icon.is_some());

    assert!(taskbar.activate_menu_item(CONSOLE_NAME));
    assert!(wait_until(Duration::from_secs(2), || {
        taskbar.step(Duration::from_millis(10));
        taskbar.instance_count() == 1
    }));

    let window = taskbar.window_ids()[0];
    taskbar.router().post_event(window, EventCode::WindowClose);
    assert!(wait_until(Duration::from_secs(2), || {
        taskbar.step(Duration::from_millis(10));
        taskbar.instance_count() == 0
    }));
}

#[test]
fn duplicate_console_registration_is_refused() {
    let config = config();
    let mut taskbar = Taskbar::new(config.clone(), TaskRunner::new());
    assert!(taskbar.register(Box::new(
        ConsoleFactory::new(&config).with_session_builder(persistent_builder())
    )));
    assert!(!taskbar.register(Box::new(
        ConsoleFactory::new(&config).with_session_builder(persistent_builder())
    )));
}
