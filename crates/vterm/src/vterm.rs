//! Terminal device layer.
//!
//! Virtual terminal devices keyed by minor number, the session programs that
//! drive them, and one-time shell runtime initialization.

pub mod devices;
pub mod runtime;
pub mod session;

pub use devices::{DeviceHub, DeviceLease, HostEndpoint, MinorRange, SessionEndpoint};
pub use runtime::{init_shell_runtime, shell_runtime, ShellRuntime};
pub use session::{SessionProgram, ShellSession};
