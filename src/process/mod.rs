//! Running the git executable
//!
//! Nothing here knows git semantics: it spawns a process, feeds and drains its
//! pipes, and reports exactly one outcome per invocation.

pub mod abort;
pub mod context;
pub mod executor;
pub mod reader;

pub use abort::{AbortController, AbortSignal};
pub use context::{find_git, GitContext};
pub use executor::{ExitOutcome, Executor, InvocationRequest, PersistentContext, TimeoutPolicy, DEFAULT_TIMEOUT};
pub use reader::{read_to_buffer, read_to_string, DEFAULT_MAX_BYTES};
