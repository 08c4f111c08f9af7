//! Debug logging of every forwarded file change

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use log::LevelFilter;

use crate::events::{EventEmitter, Subscription};
use crate::logging::LogController;

struct Sources {
    dot_git: EventEmitter<PathBuf>,
    working_tree: EventEmitter<PathBuf>,
    attached: Vec<Subscription>,
}

impl Sources {
    fn apply(&mut self, level: LevelFilter) {
        let wanted = level >= LevelFilter::Debug;
        if wanted == !self.attached.is_empty() {
            return;
        }
        if !wanted {
            self.attached.clear();
            return;
        }
        self.attached.push(
            self.dot_git
                .subscribe(|path| log::debug!("[.git] Change: {}", path.display())),
        );
        self.attached.push(
            self.working_tree
                .subscribe(|path| log::debug!("[wt] Change: {}", path.display())),
        );
    }
}

/// Logs watcher events while the log level is at least `Debug`
pub struct FileEventLogger {
    sources: Arc<Mutex<Sources>>,
    _level: Subscription,
}

impl FileEventLogger {
    pub fn new(
        controller: &LogController,
        dot_git: EventEmitter<PathBuf>,
        working_tree: EventEmitter<PathBuf>,
    ) -> Self {
        let sources = Arc::new(Mutex::new(Sources {
            dot_git,
            working_tree,
            attached: Vec::new(),
        }));
        sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(controller.level());

        let on_change = Arc::clone(&sources);
        let level = controller.on_did_change_level(move |level| {
            on_change.lock().unwrap_or_else(PoisonError::into_inner).apply(*level);
        });

        Self { sources, _level: level }
    }

    pub fn is_attached(&self) -> bool {
        !self
            .sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .attached
            .is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attaches_only_at_debug() {
        let controller = LogController::new(LevelFilter::Info);
        let dot_git = EventEmitter::new();
        let working_tree = EventEmitter::new();
        let logger = FileEventLogger::new(&controller, dot_git.clone(), working_tree.clone());

        assert!(!logger.is_attached());
        assert_eq!(dot_git.listener_count(), 0);

        controller.set_level(LevelFilter::Trace);
        assert!(logger.is_attached());
        assert_eq!(dot_git.listener_count(), 1);
        assert_eq!(working_tree.listener_count(), 1);

        controller.set_level(LevelFilter::Warn);
        assert!(!logger.is_attached());
        assert_eq!(working_tree.listener_count(), 0);
    }
}
