//! Command execution for script lines.
//!
//! A [`CommandRunner`] runs one command line in a given working directory and
//! reports how it ended. The runner owns the knowledge of its execution
//! environment, including which exit codes mean "command not found", so the
//! engine can classify failures without hardcoding one shell's conventions.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

/// Cooperative cancellation flag shared between a parse and whoever may stop
/// it (e.g. a Ctrl-C handler).
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// How a single command run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutput {
    /// Exit status 0. Stdout is kept byte-for-byte (lossy UTF-8).
    Success { stdout: String },
    /// The environment reported that the command itself does not exist.
    CommandNotFound { exit_code: i32, stderr: String },
    /// Any other non-zero exit, or termination by signal.
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },
    /// The process could not be started at all.
    SpawnFailed { reason: String },
    TimedOut { after: Duration },
    Cancelled,
}

/// Runs command lines on behalf of the script engine.
pub trait CommandRunner: Send + Sync {
    /// Run `command` with `work_dir` as its working directory.
    fn run(&self, command: &str, work_dir: &Path, cancel: &CancelToken) -> RunOutput;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, command: &str, work_dir: &Path, cancel: &CancelToken) -> RunOutput {
        (**self).run(command, work_dir, cancel)
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for Box<R> {
    fn run(&self, command: &str, work_dir: &Path, cancel: &CancelToken) -> RunOutput {
        (**self).run(command, work_dir, cancel)
    }
}

/// Resolved settings for [`ShellRunner`].
#[derive(Debug, Clone)]
pub struct ShellSettings {
    /// Shell program, e.g. `sh`.
    pub program: String,
    /// Arguments placed before the command text, e.g. `["-c"]`.
    pub args: Vec<String>,
    /// Exit codes the shell uses for "command not found".
    pub not_found_exit_codes: Vec<i32>,
    /// Per-command deadline; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Replacement `PATH` for child processes.
    pub path: Option<String>,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            program: "sh".to_string(),
            args: vec!["-c".to_string()],
            not_found_exit_codes: vec![127],
            timeout: Some(Duration::from_secs(300)),
            path: None,
        }
    }
}

/// Runs commands through a system shell.
pub struct ShellRunner {
    settings: ShellSettings,
    poll_interval: Duration,
}

impl ShellRunner {
    pub fn new(settings: ShellSettings) -> Self {
        Self {
            settings,
            poll_interval: Duration::from_millis(20),
        }
    }

    fn build_command(&self, command: &str, work_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.settings.program);
        cmd.args(&self.settings.args)
            .arg(command)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(path) = &self.settings.path {
            cmd.env("PATH", path);
        }
        // Own process group, so a timeout or cancel reaches everything the
        // shell started.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd
    }

    /// Why the run must stop now, if it must.
    fn interruption(&self, started: Instant, cancel: &CancelToken) -> Option<RunOutput> {
        if cancel.is_cancelled() {
            return Some(RunOutput::Cancelled);
        }
        match self.settings.timeout {
            Some(timeout) if started.elapsed() >= timeout => {
                Some(RunOutput::TimedOut { after: timeout })
            }
            _ => None,
        }
    }

    /// Wait for a pipe's contents under the same deadline and token as the
    /// process itself. A background job can keep the pipe open after the
    /// shell has exited.
    fn collect(
        &self,
        pipe: Option<Receiver<Vec<u8>>>,
        started: Instant,
        cancel: &CancelToken,
    ) -> Result<String, RunOutput> {
        let Some(pipe) = pipe else {
            return Ok(String::new());
        };
        loop {
            match pipe.recv_timeout(self.poll_interval) {
                Ok(bytes) => return Ok(String::from_utf8_lossy(&bytes).into_owned()),
                Err(RecvTimeoutError::Disconnected) => return Ok(String::new()),
                Err(RecvTimeoutError::Timeout) => {}
            }
            if let Some(stop) = self.interruption(started, cancel) {
                return Err(stop);
            }
        }
    }

    fn classify_exit(&self, exit_code: Option<i32>, stderr: String) -> RunOutput {
        match exit_code {
            Some(code) if self.settings.not_found_exit_codes.contains(&code) => {
                RunOutput::CommandNotFound {
                    exit_code: code,
                    stderr,
                }
            }
            _ => RunOutput::Failed { exit_code, stderr },
        }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new(ShellSettings::default())
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str, work_dir: &Path, cancel: &CancelToken) -> RunOutput {
        info!(command = %command, work_dir = %work_dir.display(), "running script command");

        let mut child = match self.build_command(command, work_dir).spawn() {
            Ok(child) => child,
            Err(error) => {
                warn!(command = %command, error = %error, "failed to spawn command");
                return RunOutput::SpawnFailed {
                    reason: error.to_string(),
                };
            }
        };

        // Drain both pipes off-thread so a chatty child cannot fill a pipe
        // buffer and stall while we poll for exit.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(error) => {
                    kill(&mut child, command);
                    return RunOutput::SpawnFailed {
                        reason: format!("failed to wait for command: {error}"),
                    };
                }
            }

            if let Some(stop) = self.interruption(started, cancel) {
                kill(&mut child, command);
                return stop;
            }

            thread::sleep(self.poll_interval);
        };

        let output = self
            .collect(stdout, started, cancel)
            .and_then(|stdout| Ok((stdout, self.collect(stderr, started, cancel)?)));
        let (stdout, stderr) = match output {
            Ok(output) => output,
            Err(stop) => {
                warn!(command = %command, "command left background work holding its output");
                kill_process_group(&child, command);
                return stop;
            }
        };
        let exit_code = status.code();

        debug!(
            success = status.success(),
            exit_code = ?exit_code,
            stdout_len = stdout.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "script command finished"
        );

        if status.success() {
            RunOutput::Success { stdout }
        } else {
            self.classify_exit(exit_code, stderr)
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<Vec<u8>>> {
    pipe.map(|mut pipe| {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(buf);
        });
        rx
    })
}

fn kill(child: &mut Child, command: &str) {
    kill_process_group(child, command);
    if let Err(error) = child.kill() {
        warn!(command = %command, error = %error, "failed to kill command");
    }
    let _ = child.wait();
}

/// SIGKILL every process in the child's group. The group outlives the shell
/// for as long as any job it started is alive.
#[cfg(unix)]
fn kill_process_group(child: &Child, command: &str) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: killpg only sends a signal; the group id is the one the child
    // was spawned with.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        debug!(
            command = %command,
            error = %std::io::Error::last_os_error(),
            "failed to signal process group"
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child, _command: &str) {}
