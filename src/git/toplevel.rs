//! Repository paths

use std::path::{Path, PathBuf};

use crate::error::CliError;
use crate::process::{GitContext, InvocationRequest};

/// Root of the working tree containing `cwd`
pub async fn show_toplevel(git: &GitContext, cwd: &Path) -> Result<PathBuf, CliError> {
    let out = git
        .output(InvocationRequest::new(cwd, ["rev-parse", "--show-toplevel"]))
        .await?;
    Ok(PathBuf::from(strip_line_ending(&out)))
}

/// The `.git` directory for `cwd`, resolved against `cwd` when git reports it relative
pub async fn git_dir(git: &GitContext, cwd: &Path) -> Result<PathBuf, CliError> {
    let out = git.output(InvocationRequest::new(cwd, ["rev-parse", "--git-dir"])).await?;
    let dir = PathBuf::from(strip_line_ending(&out));
    Ok(if dir.is_absolute() { dir } else { cwd.join(dir) })
}

/// Drop leading whitespace and trailing line breaks; trailing spaces can be part of a directory name
fn strip_line_ending(out: &str) -> &str {
    out.trim_start().trim_end_matches(['\r', '\n'])
}
