//! Running git as a child process and coordinating repository operations
//!
//! The layers, bottom up: [`process`] spawns git and reports exactly one outcome
//! per invocation, [`parse`] turns captured output into values, [`git`] pairs
//! the two into typed commands, and [`repository`] decides when and how those
//! commands may run. [`watch`] keeps a repository's model current.

pub mod error;
pub mod events;
pub mod git;
pub mod logging;
pub mod parse;
pub mod process;
pub mod repository;
pub mod settings;
pub mod watch;

pub use error::{CliError, ErrorKind, GitError, GitErrorCode};
pub use process::GitContext;
pub use repository::{OperationKind, Repository, RepositoryEvent};
pub use settings::Settings;
