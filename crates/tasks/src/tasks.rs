//! Hosted task management.
//!
//! A task is a named OS thread running an entry point with argv. The runner
//! tracks which tasks are still executing and routes each task's exit code
//! to callbacks registered against its id. Callbacks fire exactly once;
//! registering against a task that already finished invokes the callback
//! immediately with the stored code.

use anyhow::{bail, Context, Result};
use collections::FxHashMap;
use parking_lot::Mutex;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};
use util::debug_panic;

/// Exit code reported when a task entry panics.
pub const PANIC_EXIT_CODE: i32 = 101;

/// Poll interval for [`TaskRunner::wait_timeout`].
const WAIT_POLL: Duration = Duration::from_millis(5);

/// Identifier for a hosted task. Valid while the task is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Name and argv handed to a task entry point.
#[derive(Debug, Clone)]
pub struct TaskArgs {
    pub name: String,
    pub argv: Vec<String>,
}

/// Callback invoked with the exit code when a task finishes.
pub type ExitCallback = Box<dyn FnOnce(i32) + Send + 'static>;

enum ExitSlot {
    /// Task still executing; callbacks queued for its exit.
    Pending(Vec<ExitCallback>),
    /// Task finished with this code; late registrations fire immediately.
    Finished(i32),
}

struct TaskRecord {
    name: String,
    slot: Mutex<ExitSlot>,
}

struct RunnerInner {
    next_id: AtomicU64,
    /// Cap on concurrently executing tasks. `None` is unlimited.
    task_limit: Option<usize>,
    tasks: Mutex<FxHashMap<TaskId, Arc<TaskRecord>>>,
}

/// Spawns hosted tasks and delivers their exit codes.
///
/// Cheap to clone; all clones share the same task table.
#[derive(Clone)]
pub struct TaskRunner {
    inner: Arc<RunnerInner>,
}

impl TaskRunner {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                next_id: AtomicU64::new(1),
                task_limit: None,
                tasks: Mutex::new(FxHashMap::default()),
            }),
        }
    }

    /// A runner that refuses to spawn while `limit` tasks are executing.
    pub fn with_task_limit(limit: usize) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                next_id: AtomicU64::new(1),
                task_limit: Some(limit),
                tasks: Mutex::new(FxHashMap::default()),
            }),
        }
    }

    /// Spawn a named task on its own OS thread.
    ///
    /// Fails when the runner's task limit is reached. A panic in the entry
    /// is contained and reported as [`PANIC_EXIT_CODE`].
    pub fn spawn(
        &self,
        args: TaskArgs,
        entry: impl FnOnce(&TaskArgs) -> i32 + Send + 'static,
    ) -> Result<TaskId> {
        let record = Arc::new(TaskRecord {
            name: args.name.clone(),
            slot: Mutex::new(ExitSlot::Pending(Vec::new())),
        });
        let id = {
            let mut tasks = self.inner.tasks.lock();
            if let Some(limit) = self.inner.task_limit {
                let running = tasks
                    .values()
                    .filter(|record| matches!(*record.slot.lock(), ExitSlot::Pending(_)))
                    .count();
                if running >= limit {
                    bail!(
                        "task limit reached ({} of {} running), not spawning '{}'",
                        running,
                        limit,
                        args.name
                    );
                }
            }
            let id = TaskId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
            tasks.insert(id, record);
            id
        };

        let runner = self.clone();
        let spawned = thread::Builder::new()
            .name(args.name.clone())
            .spawn(move || {
                trace!("{} ({}) started", id, args.name);
                let code = match catch_unwind(AssertUnwindSafe(|| entry(&args))) {
                    Ok(code) => code,
                    Err(_) => {
                        warn!("{} ({}) panicked", id, args.name);
                        PANIC_EXIT_CODE
                    }
                };
                runner.finish(id, code);
            });

        match spawned {
            Ok(_handle) => Ok(id),
            Err(e) => {
                self.inner.tasks.lock().remove(&id);
                Err(e).with_context(|| format!("failed to spawn task '{}'", id))
            }
        }
    }

    /// Register a callback for a task's exit code.
    ///
    /// Returns `false` if the task id is unknown (never spawned, or its exit
    /// was already delivered to earlier callbacks).
    pub fn register_exit_callback(&self, id: TaskId, callback: ExitCallback) -> bool {
        let record = self.inner.tasks.lock().get(&id).cloned();
        let Some(record) = record else {
            warn!("exit callback registered for unknown {}", id);
            return false;
        };

        let mut pending = Some(callback);
        let finished_code = {
            let mut slot = record.slot.lock();
            match &mut *slot {
                ExitSlot::Pending(callbacks) => {
                    if let Some(callback) = pending.take() {
                        callbacks.push(callback);
                    }
                    None
                }
                ExitSlot::Finished(code) => Some(*code),
            }
        };

        if let Some(code) = finished_code {
            self.inner.tasks.lock().remove(&id);
            if let Some(callback) = pending.take() {
                callback(code);
            }
        }
        true
    }

    /// Whether the task is still executing.
    pub fn is_running(&self, id: TaskId) -> bool {
        match self.inner.tasks.lock().get(&id) {
            Some(record) => matches!(*record.slot.lock(), ExitSlot::Pending(_)),
            None => false,
        }
    }

    /// Number of tasks currently executing.
    pub fn running_count(&self) -> usize {
        self.inner
            .tasks
            .lock()
            .values()
            .filter(|record| matches!(*record.slot.lock(), ExitSlot::Pending(_)))
            .count()
    }

    /// Wait for a task to stop executing. Returns `true` if it stopped
    /// within the timeout.
    pub fn wait_timeout(&self, id: TaskId, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_running(id) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(WAIT_POLL);
        }
    }

    /// Deliver the exit code: mark finished, then run queued callbacks.
    fn finish(&self, id: TaskId, code: i32) {
        let record = self.inner.tasks.lock().get(&id).cloned();
        let Some(record) = record else {
            debug_panic!("{} finished but has no record", id);
            return;
        };

        let callbacks = {
            let mut slot = record.slot.lock();
            match std::mem::replace(&mut *slot, ExitSlot::Finished(code)) {
                ExitSlot::Pending(callbacks) => callbacks,
                ExitSlot::Finished(previous) => {
                    debug_panic!("{} finished twice (codes {} and {})", id, previous, code);
                    return;
                }
            }
        };

        debug!("{} ({}) exited with code {}", id, record.name, code);

        let delivered = !callbacks.is_empty();
        for callback in callbacks {
            callback(code);
        }

        // Records without callbacks stay behind so a late registration can
        // still observe the code; they are reclaimed at that point.
        if delivered {
            self.inner.tasks.lock().remove(&id);
        }
    }
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::mpsc;

    fn args(name: &str) -> TaskArgs {
        TaskArgs {
            name: name.to_string(),
            argv: Vec::new(),
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    #[test]
    fn spawn_runs_entry_with_argv() {
        let runner = TaskRunner::new();
        let (tx, rx) = mpsc::channel();
        let spawn_args = TaskArgs {
            name: "echo".to_string(),
            argv: vec!["3".to_string()],
        };
        runner
            .spawn(spawn_args, move |task_args| {
                let _ = tx.send(task_args.argv.clone());
                0
            })
            .unwrap();
        let argv = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(argv, vec!["3".to_string()]);
    }

    #[test]
    fn task_ids_are_distinct() {
        let runner = TaskRunner::new();
        let a = runner.spawn(args("a"), |_| 0).unwrap();
        let b = runner.spawn(args("b"), |_| 0).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn spawn_fails_at_the_task_limit() {
        let runner = TaskRunner::with_task_limit(1);
        let (hold_tx, hold_rx) = mpsc::channel::<()>();
        let id = runner
            .spawn(args("held"), move |_| {
                let _ = hold_rx.recv();
                0
            })
            .unwrap();

        let err = runner.spawn(args("extra"), |_| 0).unwrap_err();
        assert!(err.to_string().contains("task limit reached"));

        // The slot frees up once the running task exits.
        hold_tx.send(()).unwrap();
        assert!(wait_until(
            || !runner.is_running(id),
            Duration::from_secs(2)
        ));
        assert!(runner.spawn(args("retry"), |_| 0).is_ok());
    }

    #[test]
    fn exit_callback_receives_exit_code() {
        let runner = TaskRunner::new();
        let (tx, rx) = mpsc::channel();
        let id = runner.spawn(args("code"), |_| 42).unwrap();
        assert!(runner.register_exit_callback(
            id,
            Box::new(move |code| {
                let _ = tx.send(code);
            })
        ));
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 42);
    }

    #[test]
    fn register_after_exit_invokes_immediately() {
        let runner = TaskRunner::new();
        let id = runner.spawn(args("fast"), |_| 7).unwrap();
        assert!(wait_until(
            || !runner.is_running(id),
            Duration::from_secs(2)
        ));

        let (tx, rx) = mpsc::channel();
        assert!(runner.register_exit_callback(
            id,
            Box::new(move |code| {
                let _ = tx.send(code);
            })
        ));
        // The callback ran synchronously inside register_exit_callback.
        assert_eq!(rx.try_recv().unwrap(), 7);
        // And the record is reclaimed.
        assert!(!runner.register_exit_callback(id, Box::new(|_| {})));
    }

    #[test]
    fn panic_is_contained_and_reported() {
        let runner = TaskRunner::new();
        let (tx, rx) = mpsc::channel();
        let id = runner
            .spawn(args("boom"), |_| panic!("session blew up"))
            .unwrap();
        assert!(runner.register_exit_callback(
            id,
            Box::new(move |code| {
                let _ = tx.send(code);
            })
        ));
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            PANIC_EXIT_CODE
        );
    }

    #[test]
    fn callbacks_run_in_registration_order() {
        let runner = TaskRunner::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let (hold_tx, hold_rx) = mpsc::channel::<()>();
        let id = runner
            .spawn(args("held"), move |_| {
                let _ = hold_rx.recv();
                0
            })
            .unwrap();

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            assert!(runner.register_exit_callback(
                id,
                Box::new(move |_| {
                    order.lock().push(tag);
                })
            ));
        }

        hold_tx.send(()).unwrap();
        assert!(wait_until(
            || order.lock().len() == 3,
            Duration::from_secs(2)
        ));
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn unknown_task_registration_returns_false() {
        let runner = TaskRunner::new();
        let id = runner.spawn(args("known"), |_| 0).unwrap();
        assert!(wait_until(
            || !runner.is_running(id),
            Duration::from_secs(2)
        ));
        // Never-spawned ids are unknown too; construct one by exhausting the
        // record through delivery.
        let (tx, rx) = mpsc::channel();
        runner.register_exit_callback(
            id,
            Box::new(move |code| {
                let _ = tx.send(code);
            }),
        );
        let _ = rx.try_recv();
        assert!(!runner.register_exit_callback(id, Box::new(|_| {})));
    }

    #[test]
    fn is_running_tracks_task_lifetime() {
        let runner = TaskRunner::new();
        let (hold_tx, hold_rx) = mpsc::channel::<()>();
        let id = runner
            .spawn(args("held"), move |_| {
                let _ = hold_rx.recv();
                0
            })
            .unwrap();
        assert!(runner.is_running(id));
        assert_eq!(runner.running_count(), 1);

        hold_tx.send(()).unwrap();
        assert!(wait_until(
            || !runner.is_running(id),
            Duration::from_secs(2)
        ));
        assert_eq!(runner.running_count(), 0);
    }

    #[test]
    fn wait_timeout_observes_exit() {
        let runner = TaskRunner::new();
        let id = runner.spawn(args("quick"), |_| 0).unwrap();
        assert!(runner.wait_timeout(id, Duration::from_secs(2)));
    }

    #[test]
    fn wait_timeout_gives_up_on_stuck_task() {
        let runner = TaskRunner::new();
        let (hold_tx, hold_rx) = mpsc::channel::<()>();
        let id = runner
            .spawn(args("stuck"), move |_| {
                let _ = hold_rx.recv();
                0
            })
            .unwrap();
        assert!(!runner.wait_timeout(id, Duration::from_millis(50)));
        hold_tx.send(()).unwrap();
    }
}
