//! Centralized configuration constants for Alcove.
//!
//! Compile-time limits and defaults, organized by component.

/// Terminal device configuration.
pub mod devices {
    /// Default first minor number handed to the console factory.
    pub const DEFAULT_FIRST_MINOR: u32 = 0;
    /// Default number of console instances the factory may mint.
    pub const DEFAULT_MAX_CONSOLES: u32 = 4;
    /// Hard ceiling on minor numbers across all factories.
    pub const MAX_MINORS: u32 = 64;
}

/// Hosted window configuration.
pub mod windows {
    /// Default cap on concurrently allocated windows.
    pub const DEFAULT_MAX_WINDOWS: usize = 8;
    /// Default per-window content buffer size in bytes.
    pub const DEFAULT_SCROLLBACK_BYTES: usize = 256 * 1024;
    /// Maximum allowed per-window content buffer size in bytes.
    pub const MAX_SCROLLBACK_BYTES: usize = 4 * 1024 * 1024;
}

/// Teardown handshake configuration.
pub mod teardown {
    /// Default bound on the shutdown drain, in milliseconds.
    /// Zero means wait indefinitely.
    pub const DEFAULT_BLOCK_ACK_TIMEOUT_MS: u64 = 5_000;
    /// Default grace period for a stopped session task, in milliseconds.
    pub const DEFAULT_TASK_GRACE_MS: u64 = 1_000;
}

/// Control loop timing.
pub mod timing {
    use std::time::Duration;

    /// Idle tick for the control loop's receive timeout.
    pub const IDLE_TICK: Duration = Duration::from_millis(100);
    /// Receive slice while draining the handshake at shutdown.
    pub const DRAIN_SLICE: Duration = Duration::from_millis(50);
}

/// Settings file validation limits.
pub mod settings {
    /// Maximum settings file size in bytes (64 KB).
    /// Settings files should be tiny; anything larger is suspicious.
    pub const MAX_FILE_SIZE: u64 = 64 * 1024;
}
