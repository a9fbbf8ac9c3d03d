//! One-time shell runtime initialization.
//!
//! Console sessions all run the same resolved shell. Resolution happens once
//! per process, before the first console is created, and later initializers
//! see the first result.

use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Resolved shell program for console sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellRuntime {
    pub program: String,
    pub args: Vec<String>,
}

static SHELL_RUNTIME: OnceLock<ShellRuntime> = OnceLock::new();

/// Initialize the process-wide shell runtime.
///
/// Resolution order: the explicit override, then `$SHELL`, then `/bin/sh`.
/// Idempotent: once a shell has been resolved, later calls keep it and
/// return true. Returns false only when no usable shell exists.
pub fn init_shell_runtime(program_override: Option<&str>, args: &[String]) -> bool {
    if SHELL_RUNTIME.get().is_some() {
        return true;
    }

    let shell_env = std::env::var("SHELL").ok();
    let Some(program) = resolve_program(program_override, shell_env.as_deref()) else {
        warn!("no usable shell program found");
        return false;
    };

    let runtime = ShellRuntime {
        program: program.clone(),
        args: args.to_vec(),
    };
    if SHELL_RUNTIME.set(runtime).is_ok() {
        info!("shell runtime initialized: {}", program);
    }
    true
}

/// The resolved runtime, if `init_shell_runtime` has succeeded.
pub fn shell_runtime() -> Option<&'static ShellRuntime> {
    SHELL_RUNTIME.get()
}

fn resolve_program(program_override: Option<&str>, shell_env: Option<&str>) -> Option<String> {
    if let Some(program) = program_override.filter(|p| !p.is_empty()) {
        if usable(program) {
            return Some(program.to_string());
        }
        warn!("configured shell '{}' not found, falling back", program);
    }
    if let Some(shell) = shell_env.filter(|s| !s.is_empty()) {
        if usable(shell) {
            return Some(shell.to_string());
        }
    }
    usable("/bin/sh").then(|| "/bin/sh".to_string())
}

fn usable(program: &str) -> bool {
    // Bare names are resolved through PATH when the session spawns.
    if program.contains('/') {
        Path::new(program).exists()
    } else {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn override_wins_when_usable() {
        let got = resolve_program(Some("/bin/sh"), Some("/bin/should-not-win"));
        assert_eq!(got, Some("/bin/sh".to_string()));
    }

    #[test]
    fn missing_override_falls_back_to_shell_env() {
        let got = resolve_program(Some("/definitely/not/a/shell"), Some("/bin/sh"));
        assert_eq!(got, Some("/bin/sh".to_string()));
    }

    #[test]
    fn empty_values_fall_through_to_bin_sh() {
        let got = resolve_program(Some(""), Some(""));
        assert_eq!(got, Some("/bin/sh".to_string()));
    }

    #[test]
    fn bare_program_names_are_accepted() {
        let got = resolve_program(Some("fish"), None);
        assert_eq!(got, Some("fish".to_string()));
    }

    // Touches the process-wide OnceLock, so this is the only test allowed
    // to initialize it.
    #[test]
    #[serial]
    fn init_latches_first_resolution() {
        assert!(init_shell_runtime(Some("/bin/sh"), &["-l".to_string()]));
        let first = shell_runtime().unwrap().clone();
        assert_eq!(first.program, "/bin/sh");
        assert_eq!(first.args, vec!["-l".to_string()]);

        // A second init with a different override is a no-op.
        assert!(init_shell_runtime(Some("/bin/other"), &[]));
        assert_eq!(shell_runtime(), Some(&first));
    }
}
