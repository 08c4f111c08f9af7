//! A validated git installation and how to find one

use std::path::{Path, PathBuf};

use super::executor::{ExitOutcome, Executor, InvocationRequest, PersistentContext};
use super::reader::{self, DEFAULT_MAX_BYTES};
use crate::error::CliError;

/// `git --version` output is tiny; anything larger is not git
const VERSION_MAX_BYTES: usize = 4096;

/// Executable path, version and executor bound together
///
/// Created once per discovered installation and shared (usually behind an
/// `Arc`) by every repository using it.
#[derive(Debug)]
pub struct GitContext {
    version: String,
    executor: Executor,
}

impl GitContext {
    /// Bind an executable without probing it
    pub fn new(executable: impl Into<PathBuf>, version: impl Into<String>, persistent: PersistentContext) -> Self {
        Self {
            version: version.into(),
            executor: Executor::new(executable, persistent),
        }
    }

    /// Probe `path` with `--version`
    pub async fn from_path(path: &Path, persistent: PersistentContext) -> Result<Self, CliError> {
        if !path.exists() {
            return Err(CliError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let executor = Executor::new(path, persistent);
        let cwd = std::env::current_dir().unwrap_or_else(|_| std::env::temp_dir());
        let output = reader::read_to_string(
            &executor,
            InvocationRequest::new(cwd, ["--version"]),
            VERSION_MAX_BYTES,
        )
        .await
        .map_err(|e| CliError::Unusable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let version = parse_version(&output);
        if version.is_empty() {
            return Err(CliError::Unusable {
                path: path.to_path_buf(),
                reason: "empty version output".to_string(),
            });
        }

        log::info!("Using git {} from {}", version, path.display());
        Ok(Self { version, executor })
    }

    /// Locate git on `PATH`
    pub async fn from_environment(persistent: PersistentContext) -> Result<Self, CliError> {
        match which::which("git") {
            Ok(path) => Self::from_path(&path, persistent).await,
            Err(e) => {
                log::debug!("git not found on PATH: {}", e);
                Err(CliError::NotFound {
                    path: PathBuf::from("git"),
                })
            }
        }
    }

    pub fn path(&self) -> &Path {
        self.executor.executable()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub async fn execute(&self, request: InvocationRequest) -> Result<ExitOutcome, CliError> {
        self.executor.execute(request).await
    }

    pub async fn read_to_buffer(&self, request: InvocationRequest, max_bytes: usize) -> Result<Vec<u8>, CliError> {
        reader::read_to_buffer(&self.executor, request, max_bytes).await
    }

    pub async fn read_to_string(&self, request: InvocationRequest, max_bytes: usize) -> Result<String, CliError> {
        reader::read_to_string(&self.executor, request, max_bytes).await
    }

    /// [`read_to_string`](Self::read_to_string) with the default cap
    pub async fn output(&self, request: InvocationRequest) -> Result<String, CliError> {
        self.read_to_string(request, DEFAULT_MAX_BYTES).await
    }
}

/// Try each hint in order, then `PATH`
///
/// An unusable candidate falls through to the next one; the last failure is
/// returned when nothing works.
pub async fn find_git(hints: &[PathBuf], persistent: PersistentContext) -> Result<GitContext, CliError> {
    for hint in hints {
        match GitContext::from_path(hint, persistent.clone()).await {
            Ok(context) => return Ok(context),
            Err(e) => log::warn!("Skipping git candidate {}: {}", hint.display(), e),
        }
    }
    GitContext::from_environment(persistent).await
}

/// `git version 2.43.0\n` → `2.43.0`
fn parse_version(output: &str) -> String {
    let trimmed = output.trim();
    trimmed
        .strip_prefix("git version ")
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}
