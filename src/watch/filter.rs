//! Deciding which file-system changes are worth forwarding

use std::path::{Path, PathBuf};

/// What one watcher cares about
#[derive(Debug, Clone, Default)]
pub struct WatchSpec {
    /// Paths (files or directory prefixes) whose changes are forwarded
    pub locations: Vec<PathBuf>,
    /// While any of these exists nothing is forwarded; they are never forwarded themselves
    pub locks: Vec<PathBuf>,
    /// Prefixes that are never forwarded
    pub ignore: Vec<PathBuf>,
    /// Remembered (not only the first change) while a lock is held
    pub important: Vec<PathBuf>,
}

impl WatchSpec {
    /// `.git` files that reflect a meaningful change in repository state
    ///
    /// `refs/` sub-directories are listed one by one so maintenance prefetch
    /// refs are left out.
    pub fn dot_git(dot_git: &Path) -> Self {
        Self {
            locations: ["HEAD", "index", "refs/heads", "refs/remotes", "refs/tags", "COMMIT_EDITMSG", "config"]
                .iter()
                .map(|p| dot_git.join(p))
                .collect(),
            locks: lock_files(dot_git),
            ignore: Vec::new(),
            important: Vec::new(),
        }
    }

    /// The whole working tree except `.git`, with `.gitignore` always remembered
    pub fn working_tree(root: &Path, dot_git: &Path) -> Self {
        Self {
            locations: vec![root.to_path_buf()],
            locks: lock_files(dot_git),
            ignore: vec![dot_git.to_path_buf()],
            important: vec![root.join(".gitignore")],
        }
    }

    fn is_lock(&self, path: &Path) -> bool {
        self.locks.iter().any(|l| l == path)
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        self.ignore.iter().any(|i| path.starts_with(i))
    }

    pub fn is_interesting(&self, path: &Path) -> bool {
        !self.is_lock(path) && !self.is_ignored(path) && self.locations.iter().any(|l| path.starts_with(l))
    }

    pub fn any_lock_exists(&self) -> bool {
        self.locks.iter().any(|l| l.exists())
    }
}

/// Files whose presence means git is writing or a merge-like command is in progress
fn lock_files(dot_git: &Path) -> Vec<PathBuf> {
    ["index.lock", "MERGE_HEAD", "REVERT_HEAD", "CHERRY_PICK_HEAD"]
        .iter()
        .map(|p| dot_git.join(p))
        .collect()
}

/// Holds back changes while a lock exists and releases them once it clears
#[derive(Debug)]
pub struct ChangeFilter {
    spec: WatchSpec,
    held: Vec<PathBuf>,
}

impl ChangeFilter {
    pub fn new(spec: WatchSpec) -> Self {
        Self { spec, held: Vec::new() }
    }

    pub fn spec(&self) -> &WatchSpec {
        &self.spec
    }

    /// Number of changes remembered while locked
    pub fn held(&self) -> usize {
        self.held.len()
    }

    /// Feed one changed path; returns the paths to forward now, in order
    ///
    /// `locked` is whether any lock file currently exists. While locked the
    /// first change and every later change to an important path are remembered
    /// and nothing is forwarded. The first unlocked change releases them.
    pub fn accept(&mut self, path: &Path, locked: bool) -> Vec<PathBuf> {
        let interesting = self.spec.is_interesting(path);

        if locked {
            if interesting {
                let important = self.spec.important.iter().any(|p| p == path);
                if (self.held.is_empty() || important) && !self.held.iter().any(|h| h == path) {
                    self.held.push(path.to_path_buf());
                }
            }
            return Vec::new();
        }

        let mut out = std::mem::take(&mut self.held);
        if !out.is_empty() {
            log::trace!("Releasing {} changes held while locked", out.len());
        }
        if interesting && !out.iter().any(|p| p == path) {
            out.push(path.to_path_buf());
        }
        out
    }
}
