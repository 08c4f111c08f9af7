//! Map git's human-readable output onto [`GitErrorCode`]
//!
//! git has no machine-readable failure reasons, so these are substring and
//! line-prefix checks against stderr/stdout. The generic table applies to every
//! invocation; the per-command tables refine it and win when they match.

use crate::error::{GitError, GitErrorCode};

/// Generic classification applied to every non-zero exit
pub fn classify_stderr(stderr: &str) -> Option<GitErrorCode> {
    let lower = stderr.to_lowercase();

    if stderr.contains("Another git process seems to be running in this repository")
        || stderr.contains("If no other git process is currently running")
    {
        Some(GitErrorCode::RepositoryIsLocked)
    } else if lower.contains("authentication failed") {
        Some(GitErrorCode::AuthenticationFailed)
    } else if lower.contains("not a git repository") {
        Some(GitErrorCode::NotAGitRepository)
    } else if stderr.contains("bad config file") {
        Some(GitErrorCode::BadConfigFile)
    } else if stderr.contains("cannot make pipe for command substitution")
        || stderr.contains("cannot create standard input pipe")
    {
        Some(GitErrorCode::CantCreatePipe)
    } else if stderr.contains("Repository not found") {
        Some(GitErrorCode::RepositoryNotFound)
    } else if stderr.contains("unable to access") {
        Some(GitErrorCode::CantAccessRemote)
    } else if quoted_before(stderr, "branch '", "' is not fully merged") {
        Some(GitErrorCode::BranchNotFullyMerged)
    } else if stderr.contains("Couldn't find remote ref") {
        Some(GitErrorCode::NoRemoteReference)
    } else if quoted_before(stderr, "A branch named '", "' already exists") {
        Some(GitErrorCode::BranchAlreadyExists)
    } else if stderr.contains("' is not a valid branch name") {
        Some(GitErrorCode::InvalidBranchName)
    } else if stderr.contains("Please commit your changes or stash them")
        || stderr.contains("Please, commit your changes or stash them")
    {
        Some(GitErrorCode::DirtyWorkTree)
    } else {
        None
    }
}

pub fn classify_fetch(stderr: &str) -> Option<GitErrorCode> {
    if stderr.contains("No remote repository specified.") {
        Some(GitErrorCode::NoRemoteRepositorySpecified)
    } else if stderr.contains("Could not read from remote repository") {
        Some(GitErrorCode::RemoteConnectionError)
    } else {
        None
    }
}

pub fn classify_pull(stdout: &str, stderr: &str) -> Option<GitErrorCode> {
    let lower = stderr.to_lowercase();

    if has_conflict_marker(stdout) {
        Some(GitErrorCode::Conflict)
    } else if stderr.contains("Please tell me who you are.") {
        Some(GitErrorCode::NoUserNameConfigured)
    } else if stderr.contains("Could not read from remote repository") {
        Some(GitErrorCode::RemoteConnectionError)
    } else if lower.contains("pull is not possible because you have unmerged files")
        || lower.contains("pulling is not possible because you have unmerged files")
        || lower.contains("cannot pull with rebase: you have unstaged changes")
        || lower.contains("your local changes to the following files would be overwritten")
        || lower.contains("please, commit your changes before you can merge")
    {
        Some(GitErrorCode::DirtyWorkTree)
    } else if lower.contains("cannot lock ref") || lower.contains("unable to update local ref") {
        Some(GitErrorCode::CantLockRef)
    } else if lower.contains("cannot rebase onto multiple branches") {
        Some(GitErrorCode::CantRebaseMultipleBranches)
    } else {
        None
    }
}

pub fn classify_push(stderr: &str) -> Option<GitErrorCode> {
    if stderr
        .lines()
        .any(|line| line.starts_with("error: failed to push some refs to"))
    {
        Some(GitErrorCode::PushRejected)
    } else if stderr.contains("Could not read from remote repository") {
        Some(GitErrorCode::RemoteConnectionError)
    } else if stderr.starts_with("fatal: The current branch ") && stderr.contains(" has no upstream branch") {
        Some(GitErrorCode::NoUpstreamBranch)
    } else if permission_denied(stderr) {
        Some(GitErrorCode::PermissionDenied)
    } else {
        None
    }
}

pub fn classify_stash_create(stderr: &str) -> Option<GitErrorCode> {
    stderr
        .contains("No local changes to save")
        .then_some(GitErrorCode::NoLocalChanges)
}

/// `stash pop` and `stash apply`
pub fn classify_stash_restore(stdout: &str, stderr: &str) -> Option<GitErrorCode> {
    if no_stash(stderr) {
        Some(GitErrorCode::NoStashFound)
    } else if stderr.contains("error: Your local changes to the following files would be overwritten") {
        Some(GitErrorCode::LocalChangesOverwritten)
    } else if stdout.lines().any(|line| line.starts_with("CONFLICT")) {
        Some(GitErrorCode::StashConflict)
    } else {
        None
    }
}

pub fn classify_stash_drop(stderr: &str) -> Option<GitErrorCode> {
    no_stash(stderr).then_some(GitErrorCode::NoStashFound)
}

/// Older git says "No stash found", newer "No stash entries found"
fn no_stash(stderr: &str) -> bool {
    stderr.contains("No stash found") || stderr.contains("No stash entries found")
}

/// Apply a command-specific classifier on top of the generic one
pub fn refine<F>(mut err: GitError, classify: F) -> GitError
where
    F: FnOnce(&str, &str) -> Option<GitErrorCode>,
{
    let stdout = err.stdout.as_deref().unwrap_or("");
    let stderr = err.stderr.as_deref().unwrap_or("");
    if let Some(code) = classify(stdout, stderr) {
        err.code = Some(code);
    }
    err
}

/// A line of the form `CONFLICT (<kind>): <detail>`
fn has_conflict_marker(stdout: &str) -> bool {
    stdout.lines().any(|line| {
        line.strip_prefix("CONFLICT (")
            .and_then(|rest| rest.find("): ").map(|close| close > 0))
            .unwrap_or(false)
    })
}

/// `Permission` followed later on the same line by `denied`
fn permission_denied(stderr: &str) -> bool {
    stderr.lines().any(|line| {
        line.find("Permission")
            .map(|start| line[start..].contains("denied"))
            .unwrap_or(false)
    })
}

/// `prefix<non-empty>suffix` somewhere in `text`
fn quoted_before(text: &str, prefix: &str, suffix: &str) -> bool {
    text.lines().any(|line| {
        let Some(start) = line.find(prefix) else {
            return false;
        };
        let rest = &line[start + prefix.len()..];
        rest.find(suffix).map(|end| end > 0).unwrap_or(false)
    })
}
