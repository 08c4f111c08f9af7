//! Typed git commands
//!
//! Each function runs one (or a short fixed sequence of) git invocation(s) in a
//! working directory and returns parsed output. Coordination between commands
//! lives in [`crate::repository`].

pub mod classify;
pub mod config;
pub mod head;
pub mod remote;
pub mod stash;
pub mod status;
pub mod toplevel;

pub use head::{Branch, HeadError, HeadRef};
pub use remote::{FetchOptions, ForcePushMode, PullOptions, PushOptions, TransferLimits};
pub use status::{StatusResult, DEFAULT_STATUS_LIMIT};
