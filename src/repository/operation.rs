//! Logical repository operations and their static classification

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationKind {
    Status,
    Config,
    Diff,
    MergeBase,
    Add,
    Remove,
    RevertFiles,
    Commit,
    Clean,
    Branch,
    GetBranch,
    GetBranches,
    SetBranchUpstream,
    HashObject,
    Checkout,
    CheckoutTracking,
    Reset,
    Remote,
    Fetch,
    Pull,
    Push,
    CherryPick,
    Sync,
    Show,
    Stage,
    GetCommitTemplate,
    DeleteBranch,
    RenameBranch,
    DeleteRef,
    Merge,
    Rebase,
    Ignore,
    Tag,
    DeleteTag,
    Stash,
    CheckIgnore,
    GetObjectDetails,
    SubmoduleUpdate,
    RebaseAbort,
    RebaseContinue,
    FindTrackingBranches,
    Apply,
    Blame,
    Log,
    LogFile,
    Move,
}

impl OperationKind {
    /// Does not change repository state; may run alongside anything
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            OperationKind::Status
                | OperationKind::Config
                | OperationKind::Blame
                | OperationKind::CheckIgnore
                | OperationKind::Diff
                | OperationKind::FindTrackingBranches
                | OperationKind::GetBranch
                | OperationKind::GetCommitTemplate
                | OperationKind::GetObjectDetails
                | OperationKind::Log
                | OperationKind::LogFile
                | OperationKind::MergeBase
                | OperationKind::Show
        )
    }

    /// Worth a progress indicator while running
    pub fn should_show_progress(self) -> bool {
        !matches!(
            self,
            OperationKind::Fetch
                | OperationKind::CheckIgnore
                | OperationKind::GetObjectDetails
                | OperationKind::Show
        )
    }

    /// Lock contention on refs is transient for these kinds
    pub fn retries_ref_lock(self) -> bool {
        matches!(self, OperationKind::Pull | OperationKind::Sync | OperationKind::Fetch)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
