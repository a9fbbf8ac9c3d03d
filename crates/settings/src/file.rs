//! TOML config file support with live reload.
//!
//! Config location: `~/.config/alcove/config.toml`

use serde::Deserialize;
use std::path::PathBuf;

/// User-facing config parsed from TOML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Shell program for console sessions. Unset means `$SHELL`, then `/bin/sh`.
    pub shell: Option<String>,
    /// Extra arguments passed to the shell program.
    pub shell_args: Vec<String>,
    /// First terminal device minor number reserved for consoles.
    pub first_minor: u32,
    /// How many console instances may be created (size of the minor range).
    pub max_consoles: u32,
    /// Cap on concurrently allocated windows.
    pub max_windows: usize,
    /// Per-window content buffer size in bytes.
    pub scrollback_bytes: usize,
    /// Bound on the teardown handshake drain in milliseconds (0 = wait forever).
    pub block_ack_timeout_ms: u64,
    /// Grace period for a stopped session task before it is detached, in milliseconds.
    pub task_grace_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: None,
            shell_args: Vec::new(),
            first_minor: crate::constants::devices::DEFAULT_FIRST_MINOR,
            max_consoles: crate::constants::devices::DEFAULT_MAX_CONSOLES,
            max_windows: crate::constants::windows::DEFAULT_MAX_WINDOWS,
            scrollback_bytes: crate::constants::windows::DEFAULT_SCROLLBACK_BYTES,
            block_ack_timeout_ms: crate::constants::teardown::DEFAULT_BLOCK_ACK_TIMEOUT_MS,
            task_grace_ms: crate::constants::teardown::DEFAULT_TASK_GRACE_MS,
        }
    }
}

impl Config {
    /// Clamp values that exceed compile-time ceilings.
    fn sanitize(mut self) -> Self {
        let minor_ceiling = crate::constants::devices::MAX_MINORS;
        if self.first_minor >= minor_ceiling {
            tracing::warn!(
                "first-minor {} is past the minor ceiling ({}), using default",
                self.first_minor,
                minor_ceiling
            );
            self.first_minor = crate::constants::devices::DEFAULT_FIRST_MINOR;
        }
        // first_minor is below the ceiling here, so the subtraction cannot
        // wrap; comparing this way keeps huge max-consoles values from
        // overflowing a sum.
        if self.max_consoles > minor_ceiling - self.first_minor {
            let clamped = minor_ceiling - self.first_minor;
            tracing::warn!(
                "max-consoles {} exceeds the minor ceiling, clamping to {}",
                self.max_consoles,
                clamped
            );
            self.max_consoles = clamped;
        }

        let scrollback_ceiling = crate::constants::windows::MAX_SCROLLBACK_BYTES;
        if self.scrollback_bytes > scrollback_ceiling {
            tracing::warn!(
                "scrollback-bytes {} exceeds the ceiling, clamping to {}",
                self.scrollback_bytes,
                scrollback_ceiling
            );
            self.scrollback_bytes = scrollback_ceiling;
        }

        self
    }

    /// Teardown drain bound. `None` means wait indefinitely.
    pub fn block_ack_timeout(&self) -> Option<std::time::Duration> {
        if self.block_ack_timeout_ms == 0 {
            None
        } else {
            Some(std::time::Duration::from_millis(self.block_ack_timeout_ms))
        }
    }

    /// Grace period for a stopped session task at deletion.
    pub fn task_grace(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.task_grace_ms)
    }
}

/// Default config file content with comments (generated on first launch).
const DEFAULT_CONFIG: &str = r#"# Alcove Configuration
# Changes are applied live — just save this file.

# Shell program for console sessions (default: $SHELL, then /bin/sh)
# shell = "/bin/bash"

# Extra arguments passed to the shell program
# shell-args = ["-l"]

# First terminal device minor number reserved for consoles
first-minor = 0

# How many console instances may be created
max-consoles = 4

# Cap on concurrently allocated windows
max-windows = 8

# Per-window content buffer size in bytes
scrollback-bytes = 262144

# Bound on the teardown handshake drain in milliseconds (0 = wait forever)
block-ack-timeout-ms = 5000

# Grace period for a stopped session task before it is detached (milliseconds)
task-grace-ms = 1000
"#;

/// Return the config file path.
pub fn config_path() -> PathBuf {
    alcove_paths::config_file()
}

/// Ensure the config file exists, creating a default if missing.
/// Returns the path to the config file.
pub fn ensure_config_file() -> Option<PathBuf> {
    let path = config_path();
    if !path.exists() {
        let parent = path.parent()?;
        std::fs::create_dir_all(parent).ok()?;
        std::fs::write(&path, DEFAULT_CONFIG).ok()?;
        tracing::info!("Created default config at {:?}", path);
    }
    Some(path)
}

/// Load and parse the config file. Returns default on any error.
pub fn load_config() -> Config {
    let path = config_path();

    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to read config: {}", e);
            }
            return Config::default();
        }
    };

    // Size guard
    if content.len() > crate::constants::settings::MAX_FILE_SIZE as usize {
        tracing::warn!(
            "Config file too large ({} bytes), using defaults",
            content.len()
        );
        return Config::default();
    }

    match toml::from_str::<Config>(&content) {
        Ok(cfg) => cfg.sanitize(),
        Err(e) => {
            tracing::warn!("Failed to parse config.toml: {}", e);
            Config::default()
        }
    }
}

/// Start watching the config file for changes.
/// Returns a guard that stops watching on drop.
/// `on_change` runs on the watcher thread whenever a rewrite changes the
/// parsed config; callers typically post a reload message to their control
/// loop from it.
pub fn watch_config(
    on_change: impl Fn() + Send + 'static,
) -> Option<notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>> {
    use notify_debouncer_mini::new_debouncer;
    use std::time::Duration;

    let path = config_path();
    let watch_dir = path.parent()?.to_path_buf();

    // Rewrites that parse to the same config (editor saves, touch) stay
    // quiet.
    let current = parking_lot::Mutex::new(load_config());

    let mut debouncer = new_debouncer(
        Duration::from_millis(100),
        move |res: Result<Vec<notify_debouncer_mini::DebouncedEvent>, _>| {
            if let Ok(events) = res {
                if events.iter().any(|event| event.path == path) {
                    let new_config = load_config();
                    let mut prev = current.lock();
                    if new_config != *prev {
                        tracing::info!("Config file changed, reloading...");
                        *prev = new_config;
                        drop(prev);
                        on_change();
                    }
                }
            }
        },
    )
    .ok()?;

    debouncer
        .watcher()
        .watch(&watch_dir, notify::RecursiveMode::NonRecursive)
        .ok()?;

    tracing::info!("Watching config file: {:?}", config_path());
    Some(debouncer)
}
