//! Fetch, pull, push and the refs/remotes they work on

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::classify::{self, refine};
use crate::error::{CliError, GitError};
use crate::parse::{parse_refs, parse_remotes, GitRef, Remote, REF_FORMAT};
use crate::process::{AbortSignal, GitContext, InvocationRequest};

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub remote: Option<String>,
    /// Only used together with `remote`
    pub refspec: Option<String>,
    pub all: bool,
    pub prune: bool,
    pub depth: Option<u32>,
    /// Hint for credential helpers not to prompt
    pub silent: bool,
}

impl FetchOptions {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["fetch".to_string()];
        if let Some(remote) = &self.remote {
            args.push(remote.clone());
            if let Some(refspec) = &self.refspec {
                args.push(refspec.clone());
            }
        } else if self.all {
            args.push("--all".to_string());
        }
        if self.prune {
            args.push("--prune".to_string());
        }
        if let Some(depth) = self.depth {
            args.push(format!("--depth={}", depth));
        }
        args
    }
}

#[derive(Debug, Clone, Default)]
pub struct PullOptions {
    pub rebase: bool,
    /// Remote and branch are only passed when both are given
    pub remote: Option<String>,
    pub branch: Option<String>,
    pub tags: bool,
    pub unshallow: bool,
}

impl PullOptions {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["pull".to_string()];
        if self.tags {
            args.push("--tags".to_string());
        }
        if self.unshallow {
            args.push("--unshallow".to_string());
        }
        if self.rebase {
            args.push("-r".to_string());
        }
        if let (Some(remote), Some(branch)) = (&self.remote, &self.branch) {
            args.push(remote.clone());
            args.push(branch.clone());
        }
        args
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForcePushMode {
    Force,
    ForceWithLease,
}

#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    pub remote: Option<String>,
    /// Refspec, e.g. `main` or `main:main`
    pub name: Option<String>,
    pub set_upstream: bool,
    pub follow_tags: bool,
    pub force: Option<ForcePushMode>,
    pub tags: bool,
}

impl PushOptions {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["push".to_string()];
        match self.force {
            Some(ForcePushMode::ForceWithLease) => args.push("--force-with-lease".to_string()),
            Some(ForcePushMode::Force) => args.push("--force".to_string()),
            None => {}
        }
        if self.set_upstream {
            args.push("-u".to_string());
        }
        if self.follow_tags {
            args.push("--follow-tags".to_string());
        }
        if self.tags {
            args.push("--tags".to_string());
        }
        if let Some(remote) = &self.remote {
            args.push(remote.clone());
        }
        if let Some(name) = &self.name {
            args.push(name.clone());
        }
        args
    }
}

/// Timer and cancellation for a command that talks to a remote
///
/// Transfers can take far longer than local reads, so they do not inherit the
/// executor's timeout.
#[derive(Debug, Clone, Default)]
pub struct TransferLimits {
    /// `None` runs without a timer
    pub timeout: Option<Duration>,
    pub signal: Option<AbortSignal>,
}

impl TransferLimits {
    fn apply(&self, request: InvocationRequest) -> InvocationRequest {
        let request = match self.timeout {
            Some(timeout) => request.timeout(timeout),
            None => request.without_timeout(),
        };
        match &self.signal {
            Some(signal) => request.signal(signal.clone()),
            None => request,
        }
    }
}

pub async fn fetch(
    git: &GitContext,
    cwd: &Path,
    options: &FetchOptions,
    limits: &TransferLimits,
) -> Result<(), GitError> {
    let mut request = InvocationRequest::new(cwd, options.args());
    if options.silent {
        request = request.env("VSCODE_GIT_FETCH_SILENT", "true");
    }

    git.output(limits.apply(request))
        .await
        .map(|_| ())
        .map_err(|e| refine(e.into(), |_, stderr| classify::classify_fetch(stderr)))
}

pub async fn pull(
    git: &GitContext,
    cwd: &Path,
    options: &PullOptions,
    limits: &TransferLimits,
) -> Result<(), GitError> {
    let request = InvocationRequest::new(cwd, options.args());
    git.output(limits.apply(request))
        .await
        .map(|_| ())
        .map_err(|e| refine(e.into(), classify::classify_pull))
}

pub async fn push(
    git: &GitContext,
    cwd: &Path,
    options: &PushOptions,
    limits: &TransferLimits,
) -> Result<(), GitError> {
    let request = InvocationRequest::new(cwd, options.args());
    git.output(limits.apply(request))
        .await
        .map(|_| ())
        .map_err(|e| refine(e.into(), |_, stderr| classify::classify_push(stderr)))
}

/// Local branches, remote branches and tags
pub async fn refs(git: &GitContext, cwd: &Path) -> Result<Vec<GitRef>, CliError> {
    let out = git
        .output(InvocationRequest::new(cwd, ["for-each-ref", "--format", REF_FORMAT]))
        .await?;
    Ok(parse_refs(&out))
}

pub async fn remotes(git: &GitContext, cwd: &Path) -> Result<Vec<Remote>, CliError> {
    let out = git.output(InvocationRequest::new(cwd, ["remote", "--verbose"])).await?;
    Ok(parse_remotes(&out))
}
