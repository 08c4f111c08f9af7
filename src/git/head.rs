//! Resolving HEAD and its upstream

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::error::CliError;
use crate::parse::{parse_ahead_behind, parse_upstream, Upstream};
use crate::process::{GitContext, InvocationRequest};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HeadRef {
    Branch(String),
    /// Detached at a commit
    Detached(String),
}

/// Both ways of resolving HEAD failed
///
/// `None` for a step means git succeeded but printed nothing.
#[derive(Debug, Error)]
#[error("Unable to resolve HEAD (symbolic-ref: {}; rev-parse: {})", describe(.symbolic), describe(.rev_parse))]
pub struct HeadError {
    pub symbolic: Option<CliError>,
    #[source]
    pub rev_parse: Option<CliError>,
}

fn describe(cause: &Option<CliError>) -> String {
    match cause {
        Some(err) => err.to_string(),
        None => "no output".to_string(),
    }
}

/// The checked-out branch and where it tracks
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Branch {
    /// `None` when detached
    pub name: Option<String>,
    /// `None` on an unborn branch
    pub commit: Option<String>,
    pub upstream: Option<Upstream>,
    /// `None` when there is no upstream or the count failed
    pub ahead: Option<u32>,
    pub behind: Option<u32>,
}

impl Branch {
    pub fn is_detached(&self) -> bool {
        self.name.is_none()
    }
}

/// Prefer the branch name; fall back to the commit when detached
pub async fn resolve_head(git: &GitContext, cwd: &Path) -> Result<HeadRef, HeadError> {
    let symbolic = match git
        .output(InvocationRequest::new(cwd, ["symbolic-ref", "--short", "HEAD"]))
        .await
    {
        Ok(out) if !out.trim().is_empty() => return Ok(HeadRef::Branch(out.trim().to_string())),
        Ok(_) => None,
        Err(e) => Some(e),
    };

    let rev_parse = match rev_parse_head(git, cwd).await {
        Ok(Some(commit)) => return Ok(HeadRef::Detached(commit)),
        Ok(None) => None,
        Err(e) => Some(e),
    };

    Err(HeadError { symbolic, rev_parse })
}

/// `rev-parse HEAD`; `None` when git prints nothing
pub async fn rev_parse_head(git: &GitContext, cwd: &Path) -> Result<Option<String>, CliError> {
    let out = git.output(InvocationRequest::new(cwd, ["rev-parse", "HEAD"])).await?;
    let commit = out.trim();
    Ok((!commit.is_empty()).then(|| commit.to_string()))
}

/// Upstream of `branch`, or `None` when it has none
pub async fn upstream(git: &GitContext, cwd: &Path, branch: &str) -> Result<Option<Upstream>, CliError> {
    let request = InvocationRequest::new(
        cwd,
        ["rev-parse".to_string(), "--abbrev-ref".to_string(), format!("{}@{{upstream}}", branch)],
    );
    match git.output(request).await {
        Ok(out) => Ok(parse_upstream(&out)),
        // No upstream configured
        Err(CliError::NonZeroExit { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Commits `branch` is (ahead of, behind) `upstream`
pub async fn ahead_behind(
    git: &GitContext,
    cwd: &Path,
    branch: &str,
    upstream: &Upstream,
) -> Result<Option<(u32, u32)>, CliError> {
    let range = format!("{}...{}/{}", branch, upstream.remote, upstream.name);
    let out = git
        .output(InvocationRequest::new(
            cwd,
            ["rev-list".to_string(), "--left-right".to_string(), "--count".to_string(), range],
        ))
        .await?;
    Ok(parse_ahead_behind(&out))
}

/// HEAD with upstream and ahead/behind filled in where available
pub async fn head_branch(git: &GitContext, cwd: &Path) -> Result<Branch, HeadError> {
    let name = match resolve_head(git, cwd).await? {
        HeadRef::Detached(commit) => {
            return Ok(Branch {
                commit: Some(commit),
                ..Default::default()
            })
        }
        HeadRef::Branch(name) => name,
    };

    let commit = rev_parse_head(git, cwd).await.unwrap_or_else(|e| {
        log::debug!("No commit for branch {}: {}", name, e);
        None
    });

    let upstream = match upstream(git, cwd, &name).await {
        Ok(upstream) => upstream,
        Err(e) => {
            log::warn!("Failed to read upstream of {}: {}", name, e);
            None
        }
    };

    let counts = match &upstream {
        Some(up) => ahead_behind(git, cwd, &name, up).await.unwrap_or_else(|e| {
            log::warn!("Failed to count commits against {}/{}: {}", up.remote, up.name, e);
            None
        }),
        None => None,
    };

    Ok(Branch {
        name: Some(name),
        commit,
        upstream,
        ahead: counts.map(|(ahead, _)| ahead),
        behind: counts.map(|(_, behind)| behind),
    })
}
