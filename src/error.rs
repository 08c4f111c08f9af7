//! Error taxonomy for git invocations and repository operations
//!
//! Two layers:
//! - [`CliError`] is what the process executor and stream readers report. Each
//!   variant maps onto exactly one [`ErrorKind`].
//! - [`GitError`] is what repository operations return to the UI layer. It wraps a
//!   `CliError` (or a higher-level failure) and adds the classified
//!   [`GitErrorCode`] derived from git's stderr.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed classification of how an invocation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The git executable does not exist
    NotFound,
    /// The executable exists but the version probe failed
    Unusable,
    Timeout,
    Cancelled,
    /// git ran and exited with a non-zero code
    NonZeroExit,
    /// Output exceeded the reader's byte cap
    BufferOverflow,
    Generic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Unusable => "unusable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::NonZeroExit => "non-zero exit",
            ErrorKind::BufferOverflow => "buffer overflow",
            ErrorKind::Generic => "generic",
        };
        f.write_str(name)
    }
}

/// Failure of a single git invocation
#[derive(Debug, Error)]
pub enum CliError {
    #[error("git executable not found: {path}")]
    NotFound { path: PathBuf },

    #[error("git executable at {path} is unusable: {reason}")]
    Unusable { path: PathBuf, reason: String },

    #[error("git {command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("git {command} was cancelled")]
    Cancelled { command: String },

    #[error("git {command} exited with code {}", display_code(.code))]
    NonZeroExit {
        command: String,
        args: Vec<String>,
        /// `None` when the process was terminated by a signal
        code: Option<i32>,
        stderr: String,
        stdout: String,
    },

    #[error("git {command} output exceeded {limit} bytes")]
    BufferOverflow { command: String, limit: usize },

    #[error("git {command} failed: {message}")]
    Generic {
        command: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "<signal>".to_string(),
    }
}

impl CliError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CliError::NotFound { .. } => ErrorKind::NotFound,
            CliError::Unusable { .. } => ErrorKind::Unusable,
            CliError::Timeout { .. } => ErrorKind::Timeout,
            CliError::Cancelled { .. } => ErrorKind::Cancelled,
            CliError::NonZeroExit { .. } => ErrorKind::NonZeroExit,
            CliError::BufferOverflow { .. } => ErrorKind::BufferOverflow,
            CliError::Generic { .. } => ErrorKind::Generic,
        }
    }

    /// The git subcommand (first argument) this error belongs to, if known
    pub fn command(&self) -> Option<&str> {
        match self {
            CliError::NotFound { .. } | CliError::Unusable { .. } => None,
            CliError::Timeout { command, .. }
            | CliError::Cancelled { command }
            | CliError::NonZeroExit { command, .. }
            | CliError::BufferOverflow { command, .. }
            | CliError::Generic { command, .. } => Some(command),
        }
    }

    pub fn stderr(&self) -> Option<&str> {
        match self {
            CliError::NonZeroExit { stderr, .. } => Some(stderr),
            _ => None,
        }
    }

    pub fn stdout(&self) -> Option<&str> {
        match self {
            CliError::NonZeroExit { stdout, .. } => Some(stdout),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CliError::NonZeroExit { code, .. } => *code,
            _ => None,
        }
    }

    /// Attach captured stdout to a `NonZeroExit`; other variants are returned unchanged
    pub fn with_stdout(self, captured: &[u8]) -> Self {
        match self {
            CliError::NonZeroExit {
                command,
                args,
                code,
                stderr,
                ..
            } => CliError::NonZeroExit {
                command,
                args,
                code,
                stderr,
                stdout: String::from_utf8_lossy(captured).into_owned(),
            },
            other => other,
        }
    }
}

/// Operation-specific classification of a git failure, derived from its output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GitErrorCode {
    AuthenticationFailed,
    BadConfigFile,
    BranchAlreadyExists,
    BranchNotFullyMerged,
    CantAccessRemote,
    CantCreatePipe,
    CantLockRef,
    CantRebaseMultipleBranches,
    Conflict,
    DirtyWorkTree,
    GitNotFound,
    InvalidBranchName,
    LocalChangesOverwritten,
    NoLocalChanges,
    NoPathFound,
    NoRemoteReference,
    NoRemoteRepositorySpecified,
    NoStashFound,
    NoUpstreamBranch,
    NoUserNameConfigured,
    NotAGitRepository,
    PermissionDenied,
    PushRejected,
    RemoteConnectionError,
    RepositoryIsLocked,
    RepositoryNotFound,
    StashConflict,
}

impl fmt::Display for GitErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Error returned by repository operations
///
/// This is the only error type that crosses into the UI layer. `code` is the
/// classified reason when git's output matched a known pattern.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct GitError {
    pub message: String,
    pub kind: ErrorKind,
    pub code: Option<GitErrorCode>,
    pub exit_code: Option<i32>,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub stderr: Option<String>,
    pub stdout: Option<String>,
    #[source]
    pub source: Option<CliError>,
}

impl GitError {
    /// A failure that did not come from a git invocation
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            code: None,
            exit_code: None,
            command: None,
            args: Vec::new(),
            stderr: None,
            stdout: None,
            source: None,
        }
    }

    /// Wrap an invocation failure, classifying it with the generic stderr table
    pub fn from_cli(err: CliError) -> Self {
        let code = match &err {
            CliError::NotFound { .. } => Some(GitErrorCode::GitNotFound),
            CliError::NonZeroExit { stderr, .. } => crate::git::classify::classify_stderr(stderr),
            _ => None,
        };
        let args = match &err {
            CliError::NonZeroExit { args, .. } => args.clone(),
            _ => Vec::new(),
        };
        let message = match err.kind() {
            ErrorKind::NonZeroExit => "Failed to execute git".to_string(),
            _ => err.to_string(),
        };

        Self {
            message,
            kind: err.kind(),
            code,
            exit_code: err.exit_code(),
            command: err.command().map(str::to_string),
            args,
            stderr: err.stderr().map(str::to_string),
            stdout: err.stdout().map(str::to_string),
            source: Some(err),
        }
    }

    pub fn with_code(mut self, code: GitErrorCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn has_code(&self, code: GitErrorCode) -> bool {
        self.code == Some(code)
    }
}

impl From<CliError> for GitError {
    fn from(err: CliError) -> Self {
        GitError::from_cli(err)
    }
}
