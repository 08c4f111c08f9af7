//! Reference-counted table of in-flight operations

use std::collections::HashMap;

use super::operation::OperationKind;

/// Per-repository counts of running operations
///
/// A kind is present only while its count is above zero.
#[derive(Debug, Default)]
pub struct OperationRegistry {
    running: HashMap<OperationKind, usize>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, kind: OperationKind) {
        *self.running.entry(kind).or_insert(0) += 1;
    }

    /// Ending a kind that is not running is a no-op
    pub fn end(&mut self, kind: OperationKind) {
        if let Some(count) = self.running.get_mut(&kind) {
            *count -= 1;
            if *count == 0 {
                self.running.remove(&kind);
            }
        }
    }

    pub fn is_running(&self, kind: OperationKind) -> bool {
        self.running.contains_key(&kind)
    }

    /// True when everything running is read-only
    pub fn is_idle(&self) -> bool {
        self.running.keys().all(|kind| kind.is_read_only())
    }

    pub fn should_show_progress(&self) -> bool {
        self.running.keys().any(|kind| kind.should_show_progress())
    }

    pub fn count(&self, kind: OperationKind) -> usize {
        self.running.get(&kind).copied().unwrap_or(0)
    }

    pub fn running(&self) -> Vec<OperationKind> {
        let mut kinds: Vec<_> = self.running.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_removal() {
        let mut registry = OperationRegistry::new();
        registry.start(OperationKind::Status);
        registry.start(OperationKind::Status);
        assert_eq!(registry.count(OperationKind::Status), 2);

        registry.end(OperationKind::Status);
        assert!(registry.is_running(OperationKind::Status));
        registry.end(OperationKind::Status);
        assert!(!registry.is_running(OperationKind::Status));
        assert!(registry.running().is_empty());

        registry.end(OperationKind::Status);
        assert_eq!(registry.count(OperationKind::Status), 0);
    }

    #[test]
    fn test_idle_only_with_read_only_kinds() {
        let mut registry = OperationRegistry::new();
        assert!(registry.is_idle());

        registry.start(OperationKind::Diff);
        registry.start(OperationKind::Config);
        assert!(registry.is_idle());

        registry.start(OperationKind::Commit);
        assert!(!registry.is_idle());
        registry.end(OperationKind::Commit);
        assert!(registry.is_idle());
    }

    #[test]
    fn test_progress() {
        let mut registry = OperationRegistry::new();
        registry.start(OperationKind::Fetch);
        assert!(!registry.should_show_progress());
        registry.start(OperationKind::Push);
        assert!(registry.should_show_progress());
        assert_eq!(registry.running(), vec![OperationKind::Fetch, OperationKind::Push]);
    }
}
