//! Snapshot of repository state published after each status refresh

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::git::Branch;
use crate::parse::{FileStatusEntry, GitRef, Remote};

/// What happened to a file, from the point of view of one resource group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FileStatus {
    IndexModified,
    IndexAdded,
    IndexDeleted,
    IndexRenamed,
    IndexCopied,
    Modified,
    Deleted,
    IntentToAdd,
    Untracked,
    Ignored,
    AddedByUs,
    AddedByThem,
    DeletedByUs,
    DeletedByThem,
    BothAdded,
    BothDeleted,
    BothModified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resource {
    /// Absolute path
    pub path: PathBuf,
    pub status: FileStatus,
    /// Absolute new path for renames and copies
    pub rename: Option<PathBuf>,
}

/// Status entries sorted into the groups a source-control view shows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceGroups {
    pub merge: Vec<Resource>,
    pub index: Vec<Resource>,
    pub working_tree: Vec<Resource>,
    pub untracked: Vec<Resource>,
    pub ignored: Vec<Resource>,
}

impl ResourceGroups {
    pub fn is_empty(&self) -> bool {
        self.merge.is_empty()
            && self.index.is_empty()
            && self.working_tree.is_empty()
            && self.untracked.is_empty()
            && self.ignored.is_empty()
    }
}

/// Sort status entries into resource groups
///
/// Conflict codes go to `merge` only. Otherwise one entry may land in both
/// `index` (from X) and `working_tree` (from Y).
pub fn pigeonhole(root: &Path, entries: &[FileStatusEntry]) -> ResourceGroups {
    let mut groups = ResourceGroups::default();

    for entry in entries {
        let path = root.join(&entry.path);
        let rename = entry.rename.as_ref().map(|r| root.join(r));
        let resource = |status: FileStatus, rename: Option<PathBuf>| Resource {
            path: path.clone(),
            status,
            rename,
        };

        let conflict = match (entry.x, entry.y) {
            ('D', 'D') => Some(FileStatus::BothDeleted),
            ('A', 'U') => Some(FileStatus::AddedByUs),
            ('U', 'D') => Some(FileStatus::DeletedByThem),
            ('U', 'A') => Some(FileStatus::AddedByThem),
            ('D', 'U') => Some(FileStatus::DeletedByUs),
            ('A', 'A') => Some(FileStatus::BothAdded),
            ('U', 'U') => Some(FileStatus::BothModified),
            _ => None,
        };
        if let Some(status) = conflict {
            groups.merge.push(resource(status, None));
            continue;
        }

        match (entry.x, entry.y) {
            ('?', '?') => {
                groups.untracked.push(resource(FileStatus::Untracked, None));
                continue;
            }
            ('!', '!') => {
                groups.ignored.push(resource(FileStatus::Ignored, None));
                continue;
            }
            _ => {}
        }

        let index_status = match entry.x {
            'M' => Some(FileStatus::IndexModified),
            'A' => Some(FileStatus::IndexAdded),
            'D' => Some(FileStatus::IndexDeleted),
            'R' => Some(FileStatus::IndexRenamed),
            'C' => Some(FileStatus::IndexCopied),
            _ => None,
        };
        if let Some(status) = index_status {
            let rename = matches!(status, FileStatus::IndexRenamed | FileStatus::IndexCopied)
                .then(|| rename.clone())
                .flatten();
            groups.index.push(resource(status, rename));
        }

        let tree_status = match entry.y {
            'M' => Some(FileStatus::Modified),
            'D' => Some(FileStatus::Deleted),
            'A' => Some(FileStatus::IntentToAdd),
            _ => None,
        };
        if let Some(status) = tree_status {
            groups.working_tree.push(resource(status, rename.clone()));
        }
    }

    groups
}

/// Repository state as of the last successful refresh
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepositoryModel {
    /// `None` until the first refresh or when HEAD could not be resolved
    pub head: Option<Branch>,
    pub refs: Vec<GitRef>,
    pub remotes: Vec<Remote>,
    /// Raw status entries, in git's order
    pub entries: Vec<FileStatusEntry>,
    pub groups: ResourceGroups,
    pub did_hit_limit: bool,
}

impl RepositoryModel {
    pub fn remote(&self, name: &str) -> Option<&Remote> {
        self.remotes.iter().find(|r| r.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(code: &str, path: &str) -> FileStatusEntry {
        let mut chars = code.chars();
        FileStatusEntry {
            x: chars.next().unwrap(),
            y: chars.next().unwrap(),
            path: path.to_string(),
            rename: None,
        }
    }

    #[test]
    fn test_conflicts_only_in_merge() {
        let groups = pigeonhole(Path::new("/r"), &[entry("UU", "a"), entry("AA", "b"), entry("DU", "c")]);
        assert_eq!(groups.merge.len(), 3);
        assert_eq!(groups.merge[0].status, FileStatus::BothModified);
        assert_eq!(groups.merge[2].status, FileStatus::DeletedByUs);
        assert!(groups.index.is_empty());
        assert!(groups.working_tree.is_empty());
    }

    #[test]
    fn test_staged_and_modified_goes_to_both_groups() {
        let groups = pigeonhole(Path::new("/r"), &[entry("MM", "a.txt")]);
        assert_eq!(groups.index[0].status, FileStatus::IndexModified);
        assert_eq!(groups.working_tree[0].status, FileStatus::Modified);
        assert_eq!(groups.index[0].path, PathBuf::from("/r/a.txt"));
    }

    #[test]
    fn test_rename_carries_new_path() {
        let mut renamed = entry("R ", "old.txt");
        renamed.rename = Some("new.txt".to_string());
        let groups = pigeonhole(Path::new("/r"), &[renamed]);
        assert_eq!(groups.index[0].status, FileStatus::IndexRenamed);
        assert_eq!(groups.index[0].rename, Some(PathBuf::from("/r/new.txt")));
        assert!(groups.working_tree.is_empty());
    }

    #[test]
    fn test_untracked_ignored_and_intent_to_add() {
        let groups = pigeonhole(
            Path::new("/r"),
            &[entry("??", "n"), entry("!!", "i"), entry(" A", "p")],
        );
        assert_eq!(groups.untracked.len(), 1);
        assert_eq!(groups.ignored.len(), 1);
        assert_eq!(groups.working_tree[0].status, FileStatus::IntentToAdd);
        assert!(!groups.is_empty());
    }
}
