//! File-system watching of a repository
//!
//! Two debounced watchers per repository: one on a handful of `.git` files and
//! one on the working tree. Both hold everything back while git has a lock
//! file in place. [`RepositoryWatch`] wires them to a [`Repository`].

mod filter;
mod logger;
mod watcher;

pub use filter::{ChangeFilter, WatchSpec};
pub use logger::FileEventLogger;
pub use watcher::{FileWatcher, WatchError, DEBOUNCE};

use std::sync::{Arc, Weak};

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::events::Subscription;
use crate::logging::LogController;
use crate::repository::Repository;

/// Watchers attached to one repository
///
/// `.git` changes are forwarded as repository events; working-tree changes
/// request a status refresh. Requests that arrive while a refresh is running
/// collapse into one follow-up refresh.
pub struct RepositoryWatch {
    dot_git: FileWatcher,
    working_tree: FileWatcher,
    _subscriptions: Vec<Subscription>,
    refresher: JoinHandle<()>,
}

impl RepositoryWatch {
    /// Must be called inside a tokio runtime
    pub fn attach(repository: &Arc<Repository>) -> Result<Self, WatchError> {
        let dot_git = FileWatcher::dot_git(repository.dot_git())?;
        let working_tree = FileWatcher::working_tree(repository.root(), repository.dot_git())?;

        let weak: Weak<Repository> = Arc::downgrade(repository);
        let on_dot_git = dot_git.subscribe(move |path| {
            if let Some(repository) = weak.upgrade() {
                repository.on_dot_git_change(path);
            }
        });

        let wanted = Arc::new(Notify::new());
        let request = Arc::clone(&wanted);
        let on_working_tree = working_tree.subscribe(move |_| request.notify_one());

        let weak = Arc::downgrade(repository);
        let refresher = tokio::spawn(async move {
            loop {
                wanted.notified().await;
                let Some(repository) = weak.upgrade() else {
                    break;
                };
                repository.on_working_tree_change().await;
            }
        });

        Ok(Self {
            dot_git,
            working_tree,
            _subscriptions: vec![on_dot_git, on_working_tree],
            refresher,
        })
    }

    pub fn dot_git(&self) -> &FileWatcher {
        &self.dot_git
    }

    pub fn working_tree(&self) -> &FileWatcher {
        &self.working_tree
    }

    /// Log every change while `controller` is at `Debug` or finer
    pub fn file_event_logger(&self, controller: &LogController) -> FileEventLogger {
        FileEventLogger::new(controller, self.dot_git.events(), self.working_tree.events())
    }
}

impl Drop for RepositoryWatch {
    fn drop(&mut self) {
        self.refresher.abort();
    }
}
