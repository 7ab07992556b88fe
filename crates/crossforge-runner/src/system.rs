//! Runner backed by real child processes.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[cfg(unix)]
use nix::sys::signal::Signal;
use tracing::debug;

use crate::diagnostics::{Diagnostics, ExitSummary};
use crate::error::{RunError, RunResult};
use crate::invocation::{Invocation, RunOutput};
use crate::ProcessRunner;

/// Default grace period between SIGTERM and SIGKILL.
pub const DEFAULT_TERMINATION_GRACE_SECONDS: u64 = 10;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait for output after the group has been killed.
const POST_KILL_DRAIN: Duration = Duration::from_millis(500);

const READ_CHUNK: usize = 8192;

/// Shared cooperative cancellation flag.
///
/// Cloning shares the underlying flag. Once set, running children are
/// terminated and no new children are started.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

enum Outcome {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

/// Spawns processes with a cleared environment.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    cancel: CancelFlag,
    grace: Duration,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemRunner {
    /// Create a runner with its own cancellation flag.
    pub fn new() -> Self {
        Self {
            cancel: CancelFlag::new(),
            grace: Duration::from_secs(DEFAULT_TERMINATION_GRACE_SECONDS),
        }
    }

    /// Share an existing cancellation flag.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set the SIGTERM-to-SIGKILL grace period.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// The runner's cancellation flag.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    fn command(invocation: &Invocation) -> Command {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .env_clear()
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group so termination reaches compiler subprocesses.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        command
    }

    fn supervise(&self, child: &mut Child, deadline: Option<Instant>) -> io::Result<Outcome> {
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Outcome::Exited(status));
            }
            if self.cancel.is_cancelled() {
                self.terminate(child)?;
                return Ok(Outcome::Cancelled);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                self.terminate(child)?;
                return Ok(Outcome::TimedOut);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Terminate the child's process group: SIGTERM, then SIGKILL once the
    /// grace period ends or the group is empty.
    ///
    /// Descendants that ignore SIGTERM are killed even when the leader
    /// itself exits within the grace period.
    fn terminate(&self, child: &mut Child) -> io::Result<()> {
        #[cfg(unix)]
        let _ = signal_group(child, Some(Signal::SIGTERM));
        #[cfg(not(unix))]
        let _ = child.kill();

        let start = Instant::now();
        let mut leader_reaped = false;
        while start.elapsed() < self.grace {
            if !leader_reaped {
                leader_reaped = child.try_wait()?.is_some();
            }
            if leader_reaped && !group_alive(child) {
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL);
        }

        debug!(pid = child.id(), "grace period expired, killing process group");
        kill_group(child);
        if !leader_reaped {
            child.wait()?;
        }
        Ok(())
    }
}

/// Send `signal` to the child's process group; `None` only checks that it exists.
#[cfg(unix)]
fn signal_group(child: &Child, signal: Option<Signal>) -> bool {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    killpg(Pid::from_raw(child.id() as i32), signal).is_ok()
}

fn group_alive(child: &Child) -> bool {
    #[cfg(unix)]
    {
        signal_group(child, None)
    }
    #[cfg(not(unix))]
    {
        let _ = child;
        false
    }
}

fn kill_group(child: &mut Child) {
    #[cfg(unix)]
    let _ = signal_group(child, Some(Signal::SIGKILL));
    let _ = child.kill();
}

impl ProcessRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> RunResult<RunOutput> {
        let program = invocation.program_name();

        if self.cancel.is_cancelled() {
            let diagnostics = Diagnostics::capture(invocation, Vec::new(), Vec::new());
            diagnostics.log("cancelled before start");
            return Err(RunError::Cancelled {
                program,
                diagnostics: Box::new(diagnostics),
            });
        }

        debug!(
            working_dir = %invocation.working_dir.display(),
            "exec: {}",
            invocation.command_line()
        );

        let start = Instant::now();
        let deadline = invocation.timeout.map(|t| start + t);
        let mut child = match Self::command(invocation).spawn() {
            Ok(child) => child,
            Err(source) => {
                let diagnostics = Diagnostics::capture(invocation, Vec::new(), Vec::new());
                diagnostics.log("launch failed");
                return Err(RunError::Launch {
                    program,
                    source,
                    diagnostics: Box::new(diagnostics),
                });
            }
        };

        let stdout_capture = Capture::spawn(child.stdout.take());
        let stderr_capture = Capture::spawn(child.stderr.take());

        let mut outcome = match self.supervise(&mut child, deadline) {
            Ok(outcome) => outcome,
            Err(source) => {
                kill_group(&mut child);
                let _ = child.wait();
                return Err(RunError::Io { program, source });
            }
        };

        // Descendants may keep the pipes open after the leader exits.
        let drain_deadline = match outcome {
            Outcome::Exited(_) => deadline,
            Outcome::TimedOut | Outcome::Cancelled => Some(Instant::now() + POST_KILL_DRAIN),
        };
        let drained = stdout_capture.wait(drain_deadline) && stderr_capture.wait(drain_deadline);
        if !drained {
            debug!("output still open after {:?}, killing process group", start.elapsed());
            kill_group(&mut child);
            if matches!(outcome, Outcome::Exited(_)) {
                outcome = Outcome::TimedOut;
            }
        }

        let stdout = stdout_capture.take();
        let stderr = stderr_capture.take();
        let elapsed = start.elapsed();

        match outcome {
            Outcome::Exited(status) if status.success() => {
                debug!(elapsed_ms = elapsed.as_millis() as u64, "{} finished", program);
                Ok(RunOutput {
                    stdout,
                    stderr,
                    elapsed,
                })
            }
            Outcome::Exited(status) => {
                let exit = ExitSummary::from_status(status);
                let diagnostics = Diagnostics::capture(invocation, stdout, stderr).with_exit(exit);
                diagnostics.log("command failed");
                Err(RunError::Exit {
                    program,
                    exit,
                    diagnostics: Box::new(diagnostics),
                })
            }
            Outcome::TimedOut => {
                let diagnostics = Diagnostics::capture(invocation, stdout, stderr);
                diagnostics.log("command timed out");
                Err(RunError::TimedOut {
                    program,
                    timeout: invocation.timeout.unwrap_or(elapsed),
                    diagnostics: Box::new(diagnostics),
                })
            }
            Outcome::Cancelled => {
                let diagnostics = Diagnostics::capture(invocation, stdout, stderr);
                diagnostics.log("command cancelled");
                Err(RunError::Cancelled {
                    program,
                    diagnostics: Box::new(diagnostics),
                })
            }
        }
    }
}

/// Output collected by a reader thread, readable before the pipe closes.
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    done: Option<Receiver<()>>,
}

impl Capture {
    fn spawn<R>(source: Option<R>) -> Self
    where
        R: Read + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let Some(mut source) = source else {
            return Self { buf, done: None };
        };

        let (tx, rx) = mpsc::channel();
        let sink = Arc::clone(&buf);
        thread::spawn(move || {
            let mut chunk = [0u8; READ_CHUNK];
            loop {
                match source.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if let Ok(mut buf) = sink.lock() {
                            buf.extend_from_slice(&chunk[..n]);
                        }
                    }
                }
            }
            let _ = tx.send(());
        });

        Self { buf, done: Some(rx) }
    }

    /// Wait for end of stream; false if `deadline` passed first.
    fn wait(&self, deadline: Option<Instant>) -> bool {
        let Some(done) = &self.done else {
            return true;
        };
        match deadline {
            None => {
                let _ = done.recv();
                true
            }
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                !matches!(done.recv_timeout(remaining), Err(RecvTimeoutError::Timeout))
            }
        }
    }

    fn take(&self) -> Vec<u8> {
        self.buf
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }
}
