//! Stash commands

use std::path::Path;

use super::classify::{self, refine};
use crate::error::GitError;
use crate::parse::{parse_stash_list, Stash};
use crate::process::{GitContext, InvocationRequest};

fn stash_ref(index: Option<usize>) -> Option<String> {
    index.map(|i| format!("stash@{{{}}}", i))
}

pub async fn create(
    git: &GitContext,
    cwd: &Path,
    message: Option<&str>,
    include_untracked: bool,
) -> Result<(), GitError> {
    let mut args = vec!["stash".to_string(), "push".to_string()];
    if include_untracked {
        args.push("-u".to_string());
    }
    if let Some(message) = message {
        args.push("-m".to_string());
        args.push(message.to_string());
    }

    git.output(InvocationRequest::new(cwd, args))
        .await
        .map(|_| ())
        .map_err(|e| refine(e.into(), |_, stderr| classify::classify_stash_create(stderr)))
}

/// Pop `stash@{index}`, or the latest stash
pub async fn pop(git: &GitContext, cwd: &Path, index: Option<usize>) -> Result<(), GitError> {
    restore(git, cwd, "pop", index).await
}

/// Apply without dropping
pub async fn apply(git: &GitContext, cwd: &Path, index: Option<usize>) -> Result<(), GitError> {
    restore(git, cwd, "apply", index).await
}

async fn restore(git: &GitContext, cwd: &Path, verb: &str, index: Option<usize>) -> Result<(), GitError> {
    let mut args = vec!["stash".to_string(), verb.to_string()];
    args.extend(stash_ref(index));

    git.output(InvocationRequest::new(cwd, args))
        .await
        .map(|_| ())
        .map_err(|e| refine(e.into(), classify::classify_stash_restore))
}

pub async fn drop(git: &GitContext, cwd: &Path, index: Option<usize>) -> Result<(), GitError> {
    let mut args = vec!["stash".to_string(), "drop".to_string()];
    args.extend(stash_ref(index));

    git.output(InvocationRequest::new(cwd, args))
        .await
        .map(|_| ())
        .map_err(|e| refine(e.into(), |_, stderr| classify::classify_stash_drop(stderr)))
}

pub async fn list(git: &GitContext, cwd: &Path) -> Result<Vec<Stash>, GitError> {
    let out = git.output(InvocationRequest::new(cwd, ["stash", "list"])).await?;
    Ok(parse_stash_list(&out))
}
