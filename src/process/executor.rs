//! Spawning git and racing its exit against timeout and cancellation

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::abort::AbortSignal;
use crate::error::CliError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Stderr beyond this is discarded
const STDERR_CAPTURE_LIMIT: usize = 1024 * 1024;
const READ_CHUNK: usize = 16 * 1024;

/// Executors are numbered so log lines from different installations can be told apart
static NEXT_EXECUTOR_ID: AtomicU64 = AtomicU64::new(1);

/// Settings shared by every invocation through one executor
#[derive(Debug, Clone)]
pub struct PersistentContext {
    pub env: HashMap<String, String>,
    pub timeout: Duration,
}

impl Default for PersistentContext {
    fn default() -> Self {
        Self {
            env: HashMap::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// How long one invocation may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// The executor's persistent timeout
    #[default]
    Inherit,
    After(Duration),
    /// No timer; only exit or cancellation settles the call
    Unbounded,
}

/// One git call
#[derive(Debug)]
pub struct InvocationRequest {
    pub cwd: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub stdin: Option<Vec<u8>>,
    /// Receives stdout chunks as they arrive; stdout is discarded when unset
    pub stdout: Option<mpsc::Sender<Vec<u8>>>,
    pub timeout: TimeoutPolicy,
    pub signal: Option<AbortSignal>,
}

impl InvocationRequest {
    pub fn new<I, S>(cwd: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cwd: cwd.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: HashMap::new(),
            stdin: None,
            stdout: None,
            timeout: TimeoutPolicy::Inherit,
            signal: None,
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn stdout(mut self, sink: mpsc::Sender<Vec<u8>>) -> Self {
        self.stdout = Some(sink);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = TimeoutPolicy::After(timeout);
        self
    }

    pub fn without_timeout(mut self) -> Self {
        self.timeout = TimeoutPolicy::Unbounded;
        self
    }

    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// The git subcommand, used for logging and error context
    pub fn command(&self) -> String {
        self.args.first().cloned().unwrap_or_default()
    }
}

/// Result of an invocation that exited with code 0
#[derive(Debug, Clone)]
pub struct ExitOutcome {
    pub pid: Option<u32>,
    /// Captured stderr; git writes progress here even on success
    pub stderr: String,
    pub duration: Duration,
}

enum Settled {
    Cancelled,
    TimedOut,
    Exited(std::io::Result<ExitStatus>),
}

/// Spawns one git executable
#[derive(Debug)]
pub struct Executor {
    executable: PathBuf,
    persistent: PersistentContext,
    id: u64,
    runs: AtomicU64,
}

impl Executor {
    pub fn new(executable: impl Into<PathBuf>, persistent: PersistentContext) -> Self {
        Self {
            executable: executable.into(),
            persistent,
            id: NEXT_EXECUTOR_ID.fetch_add(1, Ordering::Relaxed),
            runs: AtomicU64::new(0),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn persistent(&self) -> &PersistentContext {
        &self.persistent
    }

    /// Run git to completion
    ///
    /// Whichever of exit, timeout and cancellation settles first decides the
    /// result. When it is not exit, the process is killed and its output dropped.
    /// The deadline also covers draining stdout and stderr after exit, since a
    /// background descendant may hold the pipes open.
    pub async fn execute(&self, request: InvocationRequest) -> Result<ExitOutcome, CliError> {
        let invocation_id = format!("CMD_{}_{}", self.id, self.runs.fetch_add(1, Ordering::Relaxed));
        let command = request.command();

        if request.signal.as_ref().is_some_and(AbortSignal::is_aborted) {
            return Err(CliError::Cancelled { command });
        }
        if !request.cwd.is_dir() {
            return Err(CliError::Generic {
                command,
                message: format!("working directory {} does not exist", request.cwd.display()),
                source: None,
            });
        }

        let mut cmd = Command::new(&self.executable);
        cmd.args(&request.args)
            .current_dir(&request.cwd)
            .envs(&self.persistent.env)
            .envs(&request.env)
            .env("GIT_PAGER", "cat")
            .env("LANG", "en_US.UTF-8")
            .env("LC_ALL", "en_US.UTF-8")
            .env("VSCODE_GIT_COMMAND", &command)
            .stdin(if request.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("{} < ERROR spawn failed: {}", invocation_id, e);
                return Err(CliError::NotFound {
                    path: self.executable.clone(),
                });
            }
            Err(e) => {
                log::debug!("{} < ERROR spawn failed: {}", invocation_id, e);
                return Err(CliError::Generic {
                    command,
                    message: "failed to spawn git".to_string(),
                    source: Some(e),
                });
            }
        };

        let pid = child.id();
        log::debug!(
            "{} > (PID = {}) {} {}",
            invocation_id,
            display_pid(pid),
            self.executable.display(),
            request.args.join(" ")
        );

        if let (Some(input), Some(mut stdin)) = (request.stdin, child.stdin.take()) {
            tokio::spawn(async move {
                let _ = stdin.write_all(&input).await;
            });
        }
        let mut stdout_pump = child
            .stdout
            .take()
            .map(|out| tokio::spawn(pump(out, request.stdout)));
        let mut stderr_pump = child
            .stderr
            .take()
            .map(|err| tokio::spawn(capture(err, STDERR_CAPTURE_LIMIT)));

        let timeout = match request.timeout {
            TimeoutPolicy::Inherit => Some(self.persistent.timeout),
            TimeoutPolicy::After(timeout) => Some(timeout),
            TimeoutPolicy::Unbounded => None,
        };
        let deadline = timeout.map(|timeout| tokio::time::Instant::now() + timeout);
        let signal = request.signal.unwrap_or_else(AbortSignal::never);
        let timed_out = || CliError::Timeout {
            command: command.clone(),
            timeout: timeout.unwrap_or_default(),
        };

        // Exit is polled last so a simultaneous abort is reported as cancelled
        let settled = tokio::select! {
            biased;
            _ = signal.aborted() => Settled::Cancelled,
            _ = expire(deadline) => Settled::TimedOut,
            status = child.wait() => Settled::Exited(status),
        };

        let settled = match settled {
            Settled::Exited(Ok(status)) => Ok(status),
            Settled::Cancelled => Err(CliError::Cancelled {
                command: command.clone(),
            }),
            Settled::TimedOut => Err(timed_out()),
            Settled::Exited(Err(e)) => Err(CliError::Generic {
                command: command.clone(),
                message: "failed waiting for git to exit".to_string(),
                source: Some(e),
            }),
        };
        let status = match settled {
            Ok(status) => status,
            Err(err) => {
                log::debug!(
                    "{} < ERROR (PID = {}; Duration = {})",
                    invocation_id,
                    display_pid(pid),
                    format_duration(start.elapsed())
                );
                // Best effort; the caller stops waiting either way
                let _ = child.start_kill();
                abort_pumps(stdout_pump, stderr_pump);
                return Err(err);
            }
        };

        let drained = tokio::select! {
            biased;
            _ = signal.aborted() => Err(CliError::Cancelled {
                command: command.clone(),
            }),
            _ = expire(deadline) => Err(timed_out()),
            stderr = drain(&mut stdout_pump, &mut stderr_pump) => Ok(stderr),
        };
        let duration = start.elapsed();
        let stderr = match drained {
            Ok(stderr) => String::from_utf8_lossy(&stderr).into_owned(),
            Err(err) => {
                log::debug!(
                    "{} < ERROR output still open after exit (PID = {}; Duration = {})",
                    invocation_id,
                    display_pid(pid),
                    format_duration(duration)
                );
                abort_pumps(stdout_pump, stderr_pump);
                return Err(err);
            }
        };

        if !status.success() {
            log::debug!(
                "{} < ERROR (PID = {}; Duration = {})",
                invocation_id,
                display_pid(pid),
                format_duration(duration)
            );
            return Err(CliError::NonZeroExit {
                command,
                args: request.args,
                code: status.code(),
                stderr,
                stdout: String::new(),
            });
        }

        log::debug!(
            "{} < SUCCESS (PID = {}; Duration = {})",
            invocation_id,
            display_pid(pid),
            format_duration(duration)
        );
        Ok(ExitOutcome {
            pid,
            stderr,
            duration,
        })
    }
}

async fn expire(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Wait for both pumps to hit end of file; returns captured stderr
async fn drain(stdout: &mut Option<JoinHandle<()>>, stderr: &mut Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    if let Some(pump) = stdout {
        let _ = pump.await;
    }
    match stderr {
        Some(pump) => pump.await.unwrap_or_default(),
        None => Vec::new(),
    }
}

fn abort_pumps(stdout: Option<JoinHandle<()>>, stderr: Option<JoinHandle<Vec<u8>>>) {
    if let Some(pump) = stdout {
        pump.abort();
    }
    if let Some(pump) = stderr {
        pump.abort();
    }
}

/// Forward stdout into `sink`; keeps draining after the receiver goes away so git never blocks on a full pipe
async fn pump<R: AsyncRead + Unpin>(mut source: R, mut sink: Option<mpsc::Sender<Vec<u8>>>) {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = match source.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        if let Some(tx) = &sink {
            if tx.send(buf[..n].to_vec()).await.is_err() {
                sink = None;
            }
        }
    }
}

async fn capture<R: AsyncRead + Unpin>(mut source: R, limit: usize) -> Vec<u8> {
    let mut captured = Vec::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = match source.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let room = limit.saturating_sub(captured.len());
        captured.extend_from_slice(&buf[..n.min(room)]);
    }
    captured
}

fn display_pid(pid: Option<u32>) -> String {
    pid.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string())
}

pub(crate) fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}
