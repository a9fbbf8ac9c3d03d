//! Alcove - a taskbar shell that hosts console sessions
//!
//! Main entry point for the application.

use anyhow::{Context, Result};
use console::{ConsoleFactory, CONSOLE_NAME};
use once_cell::sync::Lazy;
use settings::{ensure_config_file, load_config};
use std::time::Instant;
use taskbar::{ControlMessage, Taskbar};
use tasks::TaskRunner;
use tracing::{debug, error, info, warn};

/// Application startup time for performance monitoring
static STARTUP_TIME: Lazy<Instant> = Lazy::new(Instant::now);

/// Initialize required directories (cross-platform).
/// Uses platform-appropriate directories via `alcove_paths`.
fn init_paths() -> Result<()> {
    let config_dir = alcove_paths::config_dir();
    let data_dir = alcove_paths::data_dir();

    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

    debug!(
        "Initialized paths - config: {:?}, data: {:?}",
        config_dir, data_dir
    );
    Ok(())
}

/// Check if debug mode is enabled via environment variable.
fn is_debug_mode() -> bool {
    std::env::var("ALCOVE_DEBUG").is_ok()
}

/// Initialize the logging system.
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // In debug mode, enable trace logging for the whole workspace
    let default_filter = if is_debug_mode() {
        "alcove=trace,taskbar=trace,console=trace,vterm=trace,tasks=trace,info"
    } else {
        "alcove=info,taskbar=info,console=info,vterm=info,tasks=info,warn"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_line_number(true))
        .with(filter)
        .init();

    if is_debug_mode() {
        info!(
            "Alcove v{} starting up (DEBUG MODE ENABLED)",
            env!("CARGO_PKG_VERSION")
        );
        info!("Set RUST_LOG for custom log levels, e.g. RUST_LOG=taskbar=trace");
    } else {
        info!("Alcove v{} starting up", env!("CARGO_PKG_VERSION"));
    }
}

/// Watch the config file and forward changes to the control loop.
/// The debouncer must stay alive for the watch to keep working.
fn watch_config(taskbar: &Taskbar) {
    let router = taskbar.router();
    let debouncer = settings::watch_config(move || {
        if !router.post(ControlMessage::ConfigChanged) {
            warn!("Control loop gone; dropping config change notification");
        }
    });

    if let Some(debouncer) = debouncer {
        Box::leak(Box::new(debouncer));
    }
}

fn main() {
    let _ = *STARTUP_TIME;

    init_logging();

    if let Err(e) = init_paths() {
        error!("Failed to initialize paths: {}", e);
    }

    ensure_config_file();
    let config = load_config();

    let mut taskbar = Taskbar::new(config.clone(), TaskRunner::new());

    if !taskbar.register(Box::new(ConsoleFactory::new(&config))) {
        error!("Console factory failed to initialize, exiting");
        std::process::exit(1);
    }
    debug!("Console factory registered");

    watch_config(&taskbar);

    // Open the first console up front, then leave the rest to the menu.
    taskbar.router().post(ControlMessage::Launch {
        name: CONSOLE_NAME.to_string(),
    });
    taskbar.set_exit_when_idle(true);

    info!(
        "Application fully initialized in {:?}",
        STARTUP_TIME.elapsed()
    );

    taskbar.run();

    info!("All applications closed, shutting down");
}
