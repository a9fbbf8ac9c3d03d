//! Session programs that drive a terminal device.

use crate::devices::SessionEndpoint;
use anyhow::{Context, Result};
use portable_pty::{native_pty_system, Child, CommandBuilder, PtyPair, PtySize};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error};

/// Fixed geometry for session PTYs. Console windows do not resize.
const PTY_ROWS: u16 = 24;
const PTY_COLS: u16 = 80;

/// How long each pump cycle waits for host input.
const INPUT_POLL: Duration = Duration::from_millis(25);

/// What a console task runs once its terminal device is ready.
///
/// `run` consumes the program, drives it against the session side of the
/// device until it finishes or `stop` is raised, and returns its exit code.
pub trait SessionProgram: Send {
    fn run(self: Box<Self>, device: SessionEndpoint, stop: Arc<AtomicBool>) -> i32;
}

/// The production session program: a shell on a PTY, pumped through the
/// terminal device in both directions.
pub struct ShellSession {
    program: String,
    args: Vec<String>,
}

impl ShellSession {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn pump(&self, device: &SessionEndpoint, stop: &AtomicBool) -> Result<i32> {
        let mut pty = ShellPty::spawn(&self.program, &self.args, PTY_ROWS, PTY_COLS)?;
        debug!("shell session started: {}", self.program);

        loop {
            if stop.load(Ordering::SeqCst) {
                debug!("shell session stop requested");
                return Ok(pty.shutdown());
            }

            for chunk in pty.read_output() {
                if device.write_output(&chunk).is_err() {
                    // Device released under us; nothing is left to display on.
                    return Ok(pty.shutdown());
                }
            }

            if pty.has_exited() {
                // Flush whatever the reader picked up before EOF.
                for chunk in pty.read_output() {
                    let _ = device.write_output(&chunk);
                }
                return Ok(pty.wait_exit_code());
            }

            match device.read_input(INPUT_POLL) {
                Ok(Some(bytes)) => pty.write(&bytes)?,
                Ok(None) => {}
                Err(_) => return Ok(pty.shutdown()),
            }
        }
    }
}

impl SessionProgram for ShellSession {
    fn run(self: Box<Self>, device: SessionEndpoint, stop: Arc<AtomicBool>) -> i32 {
        match self.pump(&device, &stop) {
            Ok(code) => {
                debug!("shell session '{}' finished with code {}", self.program, code);
                code
            }
            Err(e) => {
                error!("shell session '{}' failed: {:#}", self.program, e);
                1
            }
        }
    }
}

/// PTY plumbing for one shell process.
///
/// Spawns the shell on a pseudo-terminal and collects its output on a reader
/// thread. Implements `Drop` to clean up the child process if the pump exits
/// without reaping it.
struct ShellPty {
    _pair: PtyPair,
    writer: Box<dyn Write + Send>,
    output_rx: Receiver<Vec<u8>>,
    exited: Arc<AtomicBool>,
    child: Box<dyn Child + Send + Sync>,
    _reader_thread: thread::JoinHandle<()>,
}

impl ShellPty {
    fn spawn(program: &str, args: &[String], rows: u16, cols: u16) -> Result<Self> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to open PTY")?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        cmd.env("TERM", "xterm-256color");

        let child = pair
            .slave
            .spawn_command(cmd)
            .context("Failed to spawn shell")?;

        // Writer for sending input to the PTY
        let writer = pair
            .master
            .take_writer()
            .context("Failed to get PTY writer")?;

        // Reader for receiving output from the PTY
        let mut reader = pair
            .master
            .try_clone_reader()
            .context("Failed to get PTY reader")?;

        // Channel for output bytes
        let (output_tx, output_rx): (Sender<Vec<u8>>, Receiver<Vec<u8>>) = mpsc::channel();

        let exited = Arc::new(AtomicBool::new(false));
        let exited_clone = exited.clone();

        let reader_thread = thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        // EOF - shell exited
                        exited_clone.store(true, Ordering::SeqCst);
                        break;
                    }
                    Ok(n) => {
                        if output_tx.send(buf[..n].to_vec()).is_err() {
                            break; // Channel closed
                        }
                    }
                    Err(_) => {
                        exited_clone.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            _pair: pair,
            writer,
            output_rx,
            exited,
            child,
            _reader_thread: reader_thread,
        })
    }

    /// Write input bytes to the PTY
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Read any pending output from the PTY (non-blocking)
    fn read_output(&self) -> Vec<Vec<u8>> {
        let mut output = Vec::new();
        while let Ok(data) = self.output_rx.try_recv() {
            output.push(data);
        }
        output
    }

    fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Kill the shell and reap it.
    fn shutdown(&mut self) -> i32 {
        if let Err(e) = self.child.kill() {
            // ESRCH (no such process) is expected if it already exited
            debug!("Kill shell process: {}", e);
        }
        self.wait_exit_code()
    }

    fn wait_exit_code(&mut self) -> i32 {
        match self.child.wait() {
            Ok(status) => status.exit_code() as i32,
            Err(e) => {
                debug!("Wait for shell process: {}", e);
                1
            }
        }
    }
}

impl Drop for ShellPty {
    fn drop(&mut self) {
        self.exited.store(true, Ordering::SeqCst);

        if let Err(e) = self.child.kill() {
            debug!("Kill shell process: {}", e);
        }

        // Reap it to avoid a zombie
        if let Err(e) = self.child.wait() {
            debug!("Wait for shell process: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{DeviceHub, MinorRange};
    use std::time::Instant;

    fn device_pair() -> (crate::devices::DeviceLease, SessionEndpoint) {
        let hub = DeviceHub::new(MinorRange::new(0, 1));
        let lease = hub.allocate(0).unwrap();
        let session = lease.session_endpoint();
        (lease, session)
    }

    #[test]
    fn shell_session_writes_output_and_exits_zero() {
        let (lease, device) = device_pair();
        let host = lease.host_endpoint();
        let stop = Arc::new(AtomicBool::new(false));
        let session = Box::new(ShellSession::new(
            "/bin/sh",
            vec!["-c".into(), "printf marker42".into()],
        ));

        let task = thread::spawn(move || session.run(device, stop));
        let code = task.join().unwrap();

        assert_eq!(code, 0);
        let output = host.drain_output();
        assert!(String::from_utf8_lossy(&output).contains("marker42"));
    }

    #[test]
    fn exit_code_reflects_shell_status() {
        let (_lease, device) = device_pair();
        let stop = Arc::new(AtomicBool::new(false));
        let session = Box::new(ShellSession::new("/bin/sh", vec!["-c".into(), "exit 7".into()]));

        let task = thread::spawn(move || session.run(device, stop));
        assert_eq!(task.join().unwrap(), 7);
    }

    #[test]
    fn stop_flag_ends_running_session() {
        let (_lease, device) = device_pair();
        let stop = Arc::new(AtomicBool::new(false));
        let session = Box::new(ShellSession::new(
            "/bin/sh",
            vec!["-c".into(), "sleep 30".into()],
        ));

        let stop_clone = stop.clone();
        let task = thread::spawn(move || session.run(device, stop_clone));
        thread::sleep(Duration::from_millis(100));

        let start = Instant::now();
        stop.store(true, Ordering::SeqCst);
        task.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn lease_drop_ends_running_session() {
        let (lease, device) = device_pair();
        let stop = Arc::new(AtomicBool::new(false));
        let session = Box::new(ShellSession::new(
            "/bin/sh",
            vec!["-c".into(), "sleep 30".into()],
        ));

        let task = thread::spawn(move || session.run(device, stop));
        thread::sleep(Duration::from_millis(100));

        let start = Instant::now();
        drop(lease);
        task.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn host_input_reaches_the_shell() {
        let (lease, device) = device_pair();
        let host = lease.host_endpoint();
        let stop = Arc::new(AtomicBool::new(false));
        let session = Box::new(ShellSession::new(
            "/bin/sh",
            vec!["-c".into(), "read line; printf \"got:%s\" \"$line\"".into()],
        ));

        let task = thread::spawn(move || session.run(device, stop));
        thread::sleep(Duration::from_millis(100));
        host.send_input(b"ping\n").unwrap();

        assert_eq!(task.join().unwrap(), 0);
        let output = host.drain_output();
        assert!(String::from_utf8_lossy(&output).contains("got:ping"));
    }
}
