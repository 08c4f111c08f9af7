//! Working tree status, untracked files and ignore checks

use std::path::Path;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::CliError;
use crate::parse::{parse_check_ignore, parse_path_list, FileStatusEntry, StatusParser};
use crate::process::{AbortController, AbortSignal, GitContext, InvocationRequest, DEFAULT_MAX_BYTES};

pub const DEFAULT_STATUS_LIMIT: usize = 5000;

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusResult {
    pub entries: Vec<FileStatusEntry>,
    /// git reported more than `limit` entries; `entries` holds the first `limit`
    pub did_hit_limit: bool,
}

/// `status -z -u`, parsed while git is still writing
///
/// Once more than `limit` entries have arrived git is stopped and the result is
/// flagged with `did_hit_limit`.
pub async fn status(
    git: &GitContext,
    cwd: &Path,
    limit: usize,
    signal: Option<&AbortSignal>,
) -> Result<StatusResult, CliError> {
    let controller = AbortController::child_of(signal);
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(32);
    let request = InvocationRequest::new(cwd, ["status", "-z", "-u"])
        .env("GIT_OPTIONAL_LOCKS", "0")
        .stdout(tx)
        .signal(controller.signal());

    let parse = async {
        let mut parser = StatusParser::new();
        while let Some(chunk) = rx.recv().await {
            parser.update(&chunk);
            if parser.len() > limit {
                controller.abort();
                rx.close();
                let mut entries = parser.into_entries();
                entries.truncate(limit);
                return StatusResult {
                    entries,
                    did_hit_limit: true,
                };
            }
        }
        if parser.pending() > 0 {
            log::warn!("status output ended inside a record ({} bytes dropped)", parser.pending());
        }
        StatusResult {
            entries: parser.into_entries(),
            did_hit_limit: false,
        }
    };

    let (result, outcome) = tokio::join!(parse, git.execute(request));

    if result.did_hit_limit {
        log::debug!("status stopped after {} entries in {}", limit, cwd.display());
        return Ok(result);
    }
    outcome?;
    Ok(result)
}

/// Untracked, non-ignored paths relative to `cwd`
pub async fn untracked(git: &GitContext, cwd: &Path) -> Result<Vec<String>, CliError> {
    let output = git
        .read_to_string(
            InvocationRequest::new(cwd, ["ls-files", "-z", "--others", "--exclude-standard"]),
            DEFAULT_MAX_BYTES,
        )
        .await?;
    Ok(parse_path_list(&output))
}

/// Which of `paths` git ignores
pub async fn check_ignore(git: &GitContext, cwd: &Path, paths: &[String]) -> Result<Vec<String>, CliError> {
    if paths.is_empty() {
        return Ok(Vec::new());
    }

    let mut input = paths.join("\0");
    input.push('\0');
    let request = InvocationRequest::new(cwd, ["check-ignore", "-v", "-z", "--stdin"]).stdin(input);

    match git.read_to_string(request, DEFAULT_MAX_BYTES).await {
        Ok(output) => Ok(parse_check_ignore(&output)),
        // Exit 1: none of the paths are ignored
        Err(CliError::NonZeroExit { code: Some(1), .. }) => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}
